use std::ptr::NonNull;

use cordyceps::Linked;
use cordyceps_avl::{AvlTree, Links, TreeNode};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
#[repr(C)]
struct Entry {
    links: Links<Entry>,
    key: u32,
}

impl Entry {
    fn new(key: u32) -> Box<Entry> {
        Box::new(Entry {
            links: Links::new(),
            key,
        })
    }
}

unsafe impl Linked<Links<Entry>> for Entry {
    type Handle = Box<Entry>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::from(Box::leak(r))
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<Entry>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<Entry>> for Entry {
    type Key = u32;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

fn keys<'a>(iter: impl Iterator<Item = &'a Entry>) -> Vec<u32> {
    iter.map(|entry| entry.key).collect()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut tree: AvlTree<Entry> = AvlTree::new();

    for key in [4, 2, 6, 1, 3, 5, 7] {
        if let Err(dup) = tree.insert(Entry::new(key)) {
            tracing::warn!(key, %dup, "skipped");
        }
        tree.assert_invariants();
    }

    if let Err(dup) = tree.insert(Entry::new(3)) {
        println!("insert 3 again: {dup}");
    }

    println!("in order:   {:?}", keys(tree.iter()));
    println!("reversed:   {:?}", keys(tree.iter().rev()));
    println!("post order: {:?}", keys(tree.post_order()));

    let mut graph = String::new();
    if tree.dotgraph("before", &mut graph).is_ok() {
        println!("{graph}");
    }

    let removed = tree.remove(&4).map(|entry| entry.key);
    tree.assert_invariants();
    println!("removed {removed:?}, in order: {:?}", keys(tree.iter()));

    let mut graph = String::new();
    if tree.dotgraph("after", &mut graph).is_ok() {
        println!("{graph}");
    }

    while let Some(first) = tree.pop_first() {
        tree.assert_invariants();
        println!("popped {}, {} left", first.key, tree.len());
    }
}

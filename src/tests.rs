use std::{
    fmt,
    ops::Range,
    prelude::v1::*,
    string::String,
    sync::{
        atomic::{AtomicUsize, Ordering::Relaxed},
        Arc,
    },
    vec,
};

use proptest::prelude::*;
use tracing_subscriber::{
    layer::{Context, SubscriberExt},
    util::SubscriberInitExt,
    Layer,
};

use crate::model::{self, TestNode};

use super::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Counts the rotation events emitted on the current thread.
#[derive(Clone, Default)]
struct RotationCounter {
    single: Arc<AtomicUsize>,
    double: Arc<AtomicUsize>,
}

struct Message(String);

impl tracing::field::Visit for Message {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for RotationCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut message = Message(String::new());
        event.record(&mut message);

        match message.0.as_str() {
            "rotate" => self.single.fetch_add(1, Relaxed),
            "double rotate" => self.double.fetch_add(1, Relaxed),
            _ => 0,
        };
    }
}

/// Runs `f`, returning its result with the number of (single, double) rotations it made.
fn count_rotations<R>(f: impl FnOnce() -> R) -> (R, (usize, usize)) {
    let counter = RotationCounter::default();

    let out = {
        let _guard = tracing_subscriber::registry()
            .with(counter.clone())
            .set_default();
        f()
    };

    let single = counter.single.load(Relaxed);
    let double = counter.double.load(Relaxed);
    (out, (single, double))
}

fn keys(tree: &AvlTree<TestNode>) -> Vec<u32> {
    tree.iter().map(|node| node.key).collect()
}

fn node_ptr(tree: &AvlTree<TestNode>, key: u32) -> NonNull<TestNode> {
    let node = tree.get(&key).expect("item not found");
    NonNull::from(node.get_ref())
}

fn key_of(node: Option<NonNull<TestNode>>) -> Option<u32> {
    node.map(|node| unsafe { node.as_ref().key })
}

// Calls `f` with every permutation of `items`, using Heap's algorithm.
fn for_each_permutation(items: &[u32], mut f: impl FnMut(&[u32])) {
    let mut items = items.to_vec();
    let mut counters = vec![0; items.len()];

    f(&items);

    let mut i = 1;
    while i < items.len() {
        if counters[i] < i {
            if i % 2 == 0 {
                items.swap(0, i);
            } else {
                items.swap(counters[i], i);
            }

            f(&items);

            counters[i] += 1;
            i = 1;
        } else {
            counters[i] = 0;
            i += 1;
        }
    }
}

fn insert_find_all(keys: &[u32]) {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in keys {
        assert!(tree.insert(TestNode::new(key)).is_ok());
        tree.assert_invariants();
    }

    for key in keys {
        let node = tree.get(key).expect("item not found");
        assert_eq!(&node.key, key);
    }
}

fn insert_remove(insert: &[u32], remove: &[u32]) {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in insert {
        assert!(tree.insert(TestNode::new(key)).is_ok());
        tree.assert_invariants();
    }

    for key in remove {
        let node = node_ptr(&tree, *key);
        let removed = unsafe { tree.remove_at(node) };
        assert_eq!(&removed.key, key);
        tree.assert_invariants();
        model::assert_post_order(&tree);
    }

    assert!(tree.is_empty());
    assert!(tree.root().is_none());
}

#[test]
fn zero_elems_find() {
    insert_find_all(&[]);
}

#[test]
fn single_elem_find() {
    insert_find_all(&[0]);
}

#[test]
fn all_insertion_orders_find() {
    for n in 2..=6 {
        let items: Vec<u32> = (0..n).collect();
        for_each_permutation(&items, insert_find_all);
    }
}

#[test]
fn all_insertion_and_removal_orders() {
    for n in 1..=5 {
        let items: Vec<u32> = (0..n).collect();

        for_each_permutation(&items, |insert| {
            for_each_permutation(&items, |remove| insert_remove(insert, remove));
        });
    }
}

#[test]
fn six_elems_remove_in_insertion_order() {
    let items: Vec<u32> = (0..6).collect();

    for_each_permutation(&items, |order| {
        insert_remove(order, order);

        let reversed: Vec<u32> = order.iter().rev().copied().collect();
        insert_remove(order, &reversed);
    });
}

#[test]
fn ascending_inserts_rotate_once() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    let ((), rotations) = count_rotations(|| {
        for key in [1, 2, 3] {
            assert!(tree.insert(TestNode::new(key)).is_ok());
        }
    });
    assert_eq!(rotations, (1, 0));

    let root = NonNull::from(tree.root().expect("tree is not empty").get_ref());

    unsafe {
        assert_eq!(root.as_ref().key, 2);
        assert_eq!(key_of(tree.left_child(root)), Some(1));
        assert_eq!(key_of(tree.right_child(root)), Some(3));
        assert_eq!(tree.parent_of(root), None);

        for key in [1, 2, 3] {
            assert_eq!(tree.balance_factor(node_ptr(&tree, key)), 0);
        }
    }

    tree.assert_invariants();
}

#[test]
fn zigzag_inserts_double_rotate_once() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    let ((), rotations) = count_rotations(|| {
        for key in [3, 1, 2] {
            assert!(tree.insert(TestNode::new(key)).is_ok());
        }
    });
    assert_eq!(rotations, (0, 1));

    assert_eq!(tree.root().map(|root| root.key), Some(2));
    assert_eq!(keys(&tree), [1, 2, 3]);
    tree.assert_invariants();
}

#[test]
fn insert_rotates_at_most_once() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for i in 0..300 {
        let key = (i * 173) % 307;
        let ((), (single, double)) =
            count_rotations(|| assert!(tree.insert(TestNode::new(key)).is_ok()));
        assert!(single + double <= 1, "insert of {key} rotated {single} + {double} times");
    }

    tree.assert_invariants();
}

#[test]
fn remove_node_with_two_children() {
    init_tracing();

    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in 1..=7 {
        assert!(tree.insert(TestNode::new(key)).is_ok());
    }
    assert_eq!(tree.root().map(|root| root.key), Some(4));

    let removed = tree.remove(&4).expect("4 is in the tree");
    assert_eq!(removed.key, 4);

    assert_eq!(keys(&tree), [1, 2, 3, 5, 6, 7]);
    // The in-order successor takes the removed node's place.
    assert_eq!(tree.root().map(|root| root.key), Some(5));
    tree.assert_invariants();
}

// Returns the keys of a minimal AVL tree of height `height`, in level order. Every node is left
// heavy, and keys are assigned in-order.
fn fibonacci_tree_keys(height: usize) -> Vec<u32> {
    let mut sizes = vec![0u32, 1];
    while sizes.len() <= height {
        let n = sizes.len();
        sizes.push(sizes[n - 1] + sizes[n - 2] + 1);
    }

    let mut keys = Vec::new();
    let mut queue = std::collections::VecDeque::new();
    queue.push_back((0u32, height));

    while let Some((lo, h)) = queue.pop_front() {
        if h == 0 {
            continue;
        }

        let key = lo + sizes[h - 1];
        keys.push(key);

        queue.push_back((lo, h - 1));
        if h >= 2 {
            queue.push_back((key + 1, h - 2));
        }
    }

    keys
}

#[test]
fn removal_rebalances_every_level() {
    init_tracing();

    let mut tree: AvlTree<TestNode> = AvlTree::new();
    let fib_keys = fibonacci_tree_keys(6);
    assert_eq!(fib_keys.len(), 20);

    // Level order insertion of a balanced shape never rotates, so the shape is kept.
    let ((), rotations) = count_rotations(|| {
        for &key in &fib_keys {
            assert!(tree.insert(TestNode::new(key)).is_ok());
        }
    });
    assert_eq!(rotations, (0, 0));
    tree.assert_invariants();
    assert_eq!(tree.root().map(|root| root.key), Some(12));
    assert_eq!(unsafe { height(tree.root) }, 6);

    for key in &fib_keys {
        assert!(unsafe { tree.balance_factor(node_ptr(&tree, *key)) } <= 0);
    }

    // Removing the maximum shrinks the right spine, and every ancestor on it must rotate.
    let (popped, rotations) = count_rotations(|| tree.pop_last().map(|node| node.key));
    assert_eq!(popped, Some(19));
    assert_eq!(rotations, (2, 0));
    tree.assert_invariants();

    assert_eq!(tree.root().map(|root| root.key), Some(7));
    assert_eq!(unsafe { height(tree.root) }, 5);
    assert_eq!(keys(&tree), (0..19).collect::<Vec<_>>());
}

#[test]
fn duplicate_insert_leaves_tree_unmodified() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in [5, 3, 8, 1, 4] {
        assert!(tree.insert(TestNode::new(key)).is_ok());
    }

    let before = keys(&tree);
    let existing = node_ptr(&tree, 3);

    let dup = tree.insert(TestNode::new(3)).expect_err("3 is already present");
    assert_eq!(NonNull::from(dup.existing().get_ref()), existing);

    let rejected = dup.into_item();
    assert_eq!(rejected.key, 3);
    assert_ne!(NonNull::from(&*rejected), existing);

    assert_eq!(keys(&tree), before);
    assert_eq!(tree.len(), 5);
    tree.assert_invariants();
}

#[test]
fn duplicate_error_display() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    assert!(tree.insert(TestNode::new(1)).is_ok());

    let dup = tree.insert(TestNode::new(1)).expect_err("1 is already present");
    assert_eq!(
        dup.to_string(),
        "an equal element is already present in the tree"
    );
}

#[test]
fn lookup_miss() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    assert!(tree.get(&1).is_none());

    for key in [10, 20, 30] {
        assert!(tree.insert(TestNode::new(key)).is_ok());
    }

    assert!(tree.get(&15).is_none());
    assert!(!tree.contains_key(&0));
    assert!(tree.contains_key(&20));
    assert!(tree.remove(&25).is_none());
    assert_eq!(tree.len(), 3);
}

#[test]
fn custom_comparators() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    let descending = |a: &TestNode, b: &TestNode| b.key.cmp(&a.key);

    for key in [4, 1, 3, 5, 2] {
        assert!(tree.insert_by(TestNode::new(key), descending).is_ok());
        tree.assert_invariants_by(descending);
    }

    assert_eq!(keys(&tree), [5, 4, 3, 2, 1]);

    let by_key = |key: &u32, node: &TestNode| node.key.cmp(key);
    assert_eq!(tree.get_by(&3, by_key).map(|node| node.key), Some(3));
    assert!(tree.get_by(&6, by_key).is_none());

    let dup = tree
        .insert_by(TestNode::new(2), descending)
        .expect_err("2 is already present");
    assert_eq!(dup.existing().key, 2);

    assert_eq!(tree.remove_by(&5, by_key).map(|node| node.key), Some(5));
    assert_eq!(keys(&tree), [4, 3, 2, 1]);
    tree.assert_invariants_by(descending);
}

#[test]
fn in_order_traversal_is_complete() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    assert!(tree.first().is_none());
    assert!(tree.last().is_none());

    let inserted: Vec<u32> = (0..200).map(|i| (i * 37) % 200).collect();
    for &key in &inserted {
        assert!(tree.insert(TestNode::new(key)).is_ok());
    }

    let mut forward = Vec::new();
    let mut cur = tree.first().map(|first| NonNull::from(first.get_ref()));
    while let Some(node) = cur {
        forward.push(unsafe { node.as_ref().key });
        cur = unsafe { tree.next_in_order(node) };
    }
    assert_eq!(forward, (0..200).collect::<Vec<_>>());

    let mut backward = Vec::new();
    let mut cur = tree.last().map(|last| NonNull::from(last.get_ref()));
    while let Some(node) = cur {
        backward.push(unsafe { node.as_ref().key });
        cur = unsafe { tree.prev_in_order(node) };
    }
    assert_eq!(backward, (0..200).rev().collect::<Vec<_>>());

    // Walks resume from any element.
    let middle = node_ptr(&tree, 100);
    assert_eq!(key_of(unsafe { tree.next_in_order(middle) }), Some(101));
    assert_eq!(key_of(unsafe { tree.prev_in_order(middle) }), Some(99));

    let iter = tree.iter();
    assert_eq!(iter.len(), 200);
    assert!(tree.iter().zip(tree.iter().rev()).all(|(a, b)| a.key + b.key == 199));
}

#[test]
fn double_ended_iteration_meets_in_the_middle() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in 0..5 {
        assert!(tree.insert(TestNode::new(key)).is_ok());
    }

    let mut iter = tree.iter();
    assert_eq!(iter.next().map(|n| n.key), Some(0));
    assert_eq!(iter.next_back().map(|n| n.key), Some(4));
    assert_eq!(iter.next().map(|n| n.key), Some(1));
    assert_eq!(iter.next_back().map(|n| n.key), Some(3));
    assert_eq!(iter.next().map(|n| n.key), Some(2));
    assert!(iter.next().is_none());
    assert!(iter.next_back().is_none());
}

#[test]
fn post_order_traversal_is_complete() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    assert!(tree.first_in_post_order().is_none());

    for key in [8, 4, 12, 2, 6, 10, 14, 1, 3, 5, 7] {
        assert!(tree.insert(TestNode::new(key)).is_ok());
    }

    // Resumable walk carrying the previous node and its parent.
    let mut order = Vec::new();
    let mut cur = tree
        .first_in_post_order()
        .map(|first| NonNull::from(first.get_ref()));
    while let Some(node) = cur {
        order.push(unsafe { node.as_ref().key });
        cur = unsafe { tree.next_in_post_order(node, tree.parent_of(node)) };
    }

    assert_eq!(order, [1, 3, 2, 5, 7, 6, 4, 10, 14, 12, 8]);
    assert!(tree.post_order().map(|node| node.key).eq(order));
    model::assert_post_order(&tree);
}

#[test]
fn round_trip_empties_tree() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    let inserted: Vec<u32> = (0..500).map(|i| (i * 7919) % 1009).collect();

    for &key in &inserted {
        assert!(tree.insert(TestNode::new(key)).is_ok());
    }
    assert_eq!(tree.len(), inserted.len());
    tree.assert_invariants();

    for (i, key) in inserted.iter().enumerate() {
        assert_eq!(tree.remove(key).map(|node| node.key), Some(*key));

        if i % 50 == 0 {
            tree.assert_invariants();
        }
    }

    assert!(tree.is_empty());
    assert!(tree.root().is_none());
    assert!(inserted.iter().all(|key| tree.get(key).is_none()));
}

#[test]
fn removed_node_is_marked_unlinked() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in 0..10 {
        assert!(tree.insert(TestNode::new(key)).is_ok());
    }

    let removed = tree.remove(&3).expect("3 is in the tree");
    let ptr = NonNull::from(&*removed);
    assert!(unsafe { AvlTree::<TestNode>::is_unlinked(ptr) });

    // An unlinked node can be inserted again.
    assert!(tree.insert(removed).is_ok());
    assert!(!unsafe { AvlTree::<TestNode>::is_unlinked(ptr) });
    tree.assert_invariants();
    assert_eq!(keys(&tree), (0..10).collect::<Vec<_>>());
}

#[test]
#[should_panic(expected = "is not in the tree")]
fn removing_a_fresh_node_is_fatal() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in 0..3 {
        assert!(tree.insert(TestNode::new(key)).is_ok());
    }

    let stray = TestNode::new(7);
    unsafe { tree.remove_at(NonNull::from(&*stray)) };
}

#[test]
#[should_panic(expected = "is not in the tree")]
fn removing_twice_is_fatal() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in 0..3 {
        assert!(tree.insert(TestNode::new(key)).is_ok());
    }

    let removed = tree.remove(&2).expect("2 is in the tree");
    unsafe { tree.remove_at(NonNull::from(&*removed)) };
}

#[test]
fn cursor_on_empty_tree_sits_on_ghost() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    let mut cursor = tree.cursor_first_mut();

    assert!(cursor.get().is_none());
    assert!(cursor.balance_factor().is_none());
    assert!(cursor.remove_current().is_none());

    cursor.move_next();
    assert!(cursor.peek_next().is_none());
    assert!(cursor.peek_prev().is_none());
    assert!(cursor.as_cursor().get().is_none());
}

#[test]
fn cursor_removal_moving_back() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in 0..10 {
        assert!(tree.insert(TestNode::new(key)).is_ok());
    }

    let mut removed = Vec::new();
    let mut cursor = tree.cursor_last_mut();
    while let Some(node) = cursor.remove_current_and_move_prev() {
        removed.push(node.key);

        if let Some(prev) = cursor.as_cursor().get() {
            assert_eq!(prev.key + 1, node.key);
            assert!(matches!(cursor.balance_factor(), Some(-1..=1)));
        }

        cursor.move_prev();
    }

    assert_eq!(removed, [9, 7, 5, 3, 1]);
    assert_eq!(keys(&tree), [0, 2, 4, 6, 8]);
    tree.assert_invariants();
}

#[test]
fn cursor_removal() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for key in 0..20 {
        assert!(tree.insert(TestNode::new(key)).is_ok());
    }

    let mut cursor = tree.cursor_first_mut();
    while cursor.get().is_some() {
        assert!(matches!(cursor.balance_factor(), Some(-1..=1)));
        assert!(cursor.remove_current().is_some());
        cursor.move_next();
    }
    assert!(cursor.balance_factor().is_none());
    assert_eq!(cursor.peek_next().map(|n| n.key), Some(1));
    assert_eq!(cursor.peek_prev().map(|n| n.key), Some(19));

    tree.assert_invariants();
    assert_eq!(keys(&tree), (0..20).filter(|k| k % 2 == 1).collect::<Vec<_>>());

    let mut cursor = tree.cursor_last();
    assert_eq!(cursor.get().map(|n| n.key), Some(19));
    cursor.move_next();
    assert!(cursor.get().is_none());
    cursor.move_next();
    assert_eq!(cursor.get().map(|n| n.key), Some(1));
}

#[test]
fn dotgraph_renders_levels() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    let mut out = String::new();
    tree.dotgraph("empty", &mut out).unwrap();
    assert_eq!(out, "digraph \"graph-empty\" {}");

    for key in [1, 2, 3] {
        assert!(tree.insert(TestNode::new(key)).is_ok());
    }

    let mut out = String::new();
    tree.dotgraph("t", &mut out).unwrap();

    assert!(out.starts_with("digraph \"graph-t\" {"));
    assert!(out.contains("{rank=same; \"grapht-2\" [label=\"2:0\"]; }"));
    assert!(out.contains("\"grapht-2\" -> \"grapht-1\";"));
    assert!(out.contains("\"grapht-2\" -> \"grapht-3\";"));
    assert!(out.contains("\"grapht-1\" -> \"grapht-missing0\";"));
    assert!(out.ends_with(" }\n}"));
}

// Records that live outside the tree, indexed through non-owning handles.
#[repr(C)]
struct Record {
    links: Links<Record>,
    hash: u64,
    id: u32,
    deleted: bool,
}

unsafe impl Linked<Links<Record>> for Record {
    type Handle = NonNull<Record>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        r
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        ptr
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<Record>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

fn scramble(i: u32) -> u64 {
    (u64::from(i) + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15).rotate_left(17)
}

#[test]
fn externally_owned_records() {
    init_tracing();

    const N: u32 = 2000;

    let mut records: Vec<Record> = (0..N)
        .map(|id| Record {
            links: Links::new(),
            hash: scramble(id),
            id,
            deleted: false,
        })
        .collect();
    let base = records.as_mut_ptr();
    let handle = |i: u32| unsafe { NonNull::new_unchecked(base.add(i as usize)) };

    let by_hash = |a: &Record, b: &Record| a.hash.cmp(&b.hash);
    let key_by_hash = |key: &u64, node: &Record| key.cmp(&node.hash);

    {
        let mut tree: AvlTree<Record> = AvlTree::new();

        for id in 0..N {
            assert!(tree.insert_by(handle(id), by_hash).is_ok());
        }
        tree.assert_invariants_by(by_hash);

        // Strictly increasing forwards, strictly decreasing backwards.
        assert!(tree.iter().zip(tree.iter().skip(1)).all(|(a, b)| a.hash < b.hash));
        assert!(tree
            .iter()
            .rev()
            .zip(tree.iter().rev().skip(1))
            .all(|(a, b)| a.hash > b.hash));

        // Post-order walk driven by parent links.
        let mut visited = 0;
        let mut cur = tree
            .first_in_post_order()
            .map(|first| NonNull::from(first.get_ref()));
        while let Some(node) = cur {
            visited += 1;
            cur = unsafe { tree.next_in_post_order(node, tree.parent_of(node)) };
        }
        assert_eq!(visited, N);

        for id in (0..N).step_by(2) {
            unsafe {
                tree.remove_at(handle(id));
                (*handle(id).as_ptr()).deleted = true;
            }
        }
        tree.assert_invariants_by(by_hash);
        assert_eq!(tree.len(), N as usize / 2);

        for id in 0..N {
            let found = tree.get_by(&scramble(id), key_by_hash).map(|r| r.id);
            let deleted = unsafe { handle(id).as_ref().deleted };

            if deleted {
                assert_eq!(found, None, "record {id} is still in the tree");
            } else {
                assert_eq!(found, Some(id), "record {id} is missing from the tree");
            }
        }

        // Dropping the tree unlinks the remaining records without freeing them.
    }

    for id in 0..N {
        assert!(unsafe { AvlTree::<Record>::is_unlinked(handle(id)) });
    }

    drop(records);
}

#[cfg(miri)]
const FUZZ_RANGE: Range<usize> = 0..10;

#[cfg(not(miri))]
const FUZZ_RANGE: Range<usize> = 0..1000;

proptest::proptest! {
    #![proptest_config(ProptestConfig {
        max_shrink_iters: 65536,
        .. ProptestConfig::default()
    })]

    #[test]
    fn btree_equivalence(ops in proptest::collection::vec(model::op_strategy(), FUZZ_RANGE)) {
        model::run_btree_equivalence(ops);
    }

    #[test]
    fn cursor_equivalence(
        values in proptest::collection::vec(0u32..1000, 0..100),
        ops in proptest::collection::vec(model::cursor_op_strategy(), FUZZ_RANGE),
    ) {
        model::run_cursor_equivalence(values, ops);
    }
}

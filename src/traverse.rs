//! Stackless walks over the tree, driven entirely by the parent and child links.
//!
//! None of these functions keep state between calls; each step is computed from the node
//! alone (or, for post-order, the node and its parent), so a walk may be resumed from any
//! element. Mutating the tree between steps invalidates the position.

use core::ptr::NonNull;

use cordyceps::Linked;

use crate::links::{links, same_node, Dir, Link, Links};

/// Descends from `root` towards `dir` until there is no further child on that side.
///
/// # Safety
///
/// `root`, if present, must be a node of a well-formed tree.
pub(crate) unsafe fn extreme<T>(root: Link<T>, dir: Dir) -> Link<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    let mut cur = root?;

    while let Some(next) = unsafe { links(cur).child(dir) } {
        cur = next;
    }

    Some(cur)
}

/// Returns the in-order neighbour of `node` on the `dir` side: the successor for
/// [`Dir::Right`], the predecessor for [`Dir::Left`].
///
/// # Safety
///
/// `node` must be an element of a well-formed tree.
pub(crate) unsafe fn step_in_order<T>(node: NonNull<T>, dir: Dir) -> Link<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    unsafe {
        if let Some(child) = links(node).child(dir) {
            return extreme(Some(child), !dir);
        }

        // Climb until we arrive from the `!dir` side.
        let mut cur = node;
        let mut opt_parent = links(cur).parent();

        while let Some(parent) = opt_parent {
            if !same_node(links(parent).child(dir), cur) {
                break;
            }

            cur = parent;
            opt_parent = links(cur).parent();
        }

        opt_parent
    }
}

/// Descends from `node` to the first leaf reached by preferring left children over right.
///
/// # Safety
///
/// `node` must be an element of a well-formed tree.
unsafe fn first_leaf<T>(node: NonNull<T>) -> NonNull<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    let mut cur = node;

    loop {
        let cur_links = unsafe { links(cur) };

        match cur_links.left().or_else(|| cur_links.right()) {
            Some(child) => cur = child,
            None => return cur,
        }
    }
}

/// Returns the first node of a post-order walk of the tree rooted at `root`.
///
/// # Safety
///
/// `root`, if present, must be the root of a well-formed tree.
pub(crate) unsafe fn first_in_post_order<T>(root: Link<T>) -> Link<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    root.map(|root| unsafe { first_leaf(root) })
}

/// Returns the node following `prev` in post-order, given `prev`'s parent.
///
/// # Safety
///
/// `prev` must be an element of a well-formed tree and `prev_parent` must be its parent.
pub(crate) unsafe fn next_in_post_order<T>(prev: NonNull<T>, prev_parent: Link<T>) -> Link<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    let parent = prev_parent?;

    unsafe {
        let parent_links = links(parent);

        match parent_links.right() {
            Some(right) if same_node(parent_links.left(), prev) => Some(first_leaf(right)),
            _ => Some(parent),
        }
    }
}

//! An intrusive AVL tree.
#![cfg_attr(not(test), no_std)]

// Conventions used in comments:
// - The balance factor of a node `x` is `b(x) = h(right(x)) - h(left(x))`, where `h` is the
//   height of a subtree and a missing subtree has height 0.
// - A node is `d`-heavy if its balance factor has the sign of direction `d` (left is negative).
// - "Growth" and "shrinkage" refer to a subtree changing height by exactly one.
//
// The invariants of an AVL tree are:
// 1. Every in-order neighbour pair compares strictly increasing.
// 2. `b(x) ∈ {-1, 0, 1}` for every node, and the stored balance equals `b(x)`.
// 3. Every child's parent link points back at the node holding it.
//
// Insertion grows exactly one leaf-to-root path, and at most one rotation (single or double)
// restores the height of the subtree it is applied to, so the ascent stops there. Deletion may
// rotate at every level: a rotation after shrinkage can itself shrink the rotated subtree.
//
// None of the algorithms recurse. Every descent and ascent is a loop over the links.

#[cfg(any(test, feature = "alloc"))]
extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

use core::{borrow::Borrow, cmp::Ordering, pin::Pin, ptr::NonNull};

use cordyceps::Linked;

mod balance;
mod cursor;
#[cfg(any(test, feature = "alloc"))]
mod debug;
mod error;
mod iter;
mod links;
mod traverse;

#[cfg(any(test, feature = "model"))]
pub mod model;

#[cfg(test)]
mod tests;

pub use cursor::{Cursor, CursorMut};
pub use error::Duplicate;
pub use iter::{Iter, PostOrder};
pub use links::Links;

use crate::links::{links, same_node, Dir, Link};

/// A record that is ordered by a key it carries.
///
/// Implementing this is optional: every operation is also available with a caller-supplied
/// comparator (`get_by`, `insert_by`, `remove_by`).
pub trait TreeNode<L>: Linked<L> {
    type Key: Ord;

    fn key(&self) -> &Self::Key;
}

/// An intrusive AVL tree.
///
/// Elements embed their own [`Links`]; the tree never allocates, and it never frees an element
/// itself. Elements leave the tree as `T::Handle`s, and whether dropping a handle frees anything
/// is up to the handle type.
pub struct AvlTree<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    root: Link<T>,
    len: usize,
}

// The tree only touches links while it is borrowed, mutably for any write.
unsafe impl<T> Send for AvlTree<T>
where
    T: Linked<Links<T>> + Send + ?Sized,
    T::Handle: Send,
{
}

unsafe impl<T> Sync for AvlTree<T> where T: Linked<Links<T>> + Sync + ?Sized {}

impl<T> AvlTree<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    /// Returns a new empty tree.
    pub const fn new() -> AvlTree<T> {
        AvlTree { root: None, len: 0 }
    }

    /// Returns `true` if the tree contains no elements.
    pub const fn is_empty(&self) -> bool {
        let empty = self.len() == 0;

        if cfg!(debug_assertions) {
            // Can't use assert_eq!() in const fn.
            assert!(empty == self.root.is_none());
        }

        empty
    }

    /// Returns the number of elements in the tree.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns the root element, if any.
    pub fn root(&self) -> Option<Pin<&T>> {
        self.root.map(|root| unsafe { pinned(root) })
    }

    /// Checks every structural invariant of the tree, panicking on the first violation.
    ///
    /// `cmp` must be the ordering the tree was built with.
    #[doc(hidden)]
    pub fn assert_invariants_by<F>(&self, mut cmp: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let Some(root) = self.root else {
            assert_eq!(self.len, 0, "empty tree with a nonzero length");
            return;
        };

        unsafe {
            assert_eq!(links(root).parent(), None, "root has a parent");

            let mut count = 0;
            let mut prev: Link<T> = None;
            let mut opt_cur = traverse::extreme(Some(root), Dir::Left);

            while let Some(cur) = opt_cur {
                count += 1;
                assert!(count <= self.len, "tree holds more nodes than its length");

                let cur_links = links(cur);

                for dir in [Dir::Left, Dir::Right] {
                    if let Some(child) = cur_links.child(dir) {
                        assert_eq!(
                            links(child).parent(),
                            Some(cur),
                            "child's parent link does not point back"
                        );
                    }
                }

                let left_height = height(cur_links.left()) as isize;
                let right_height = height(cur_links.right()) as isize;
                assert_eq!(
                    right_height - left_height,
                    cur_links.balance() as isize,
                    "stored balance factor disagrees with subtree heights"
                );

                if let Some(prev) = prev {
                    assert_eq!(
                        cmp(prev.as_ref(), cur.as_ref()),
                        Ordering::Less,
                        "in-order sequence is not strictly increasing"
                    );
                }

                prev = Some(cur);
                opt_cur = traverse::step_in_order(cur, Dir::Right);
            }

            assert_eq!(count, self.len, "tree holds fewer nodes than its length");
        }
    }

    /// Returns a reference to the element for which `cmp(key, element)` is `Equal`.
    ///
    /// `cmp` must be consistent with the ordering the tree was built with: `Less` means `key`
    /// sorts before the element.
    pub fn get_by<Q, F>(&self, key: &Q, cmp: F) -> Option<Pin<&T>>
    where
        Q: ?Sized,
        F: FnMut(&Q, &T) -> Ordering,
    {
        let ptr = self.get_raw_by(key, cmp)?;
        unsafe { Some(pinned(ptr)) }
    }

    fn get_raw_by<Q, F>(&self, key: &Q, mut cmp: F) -> Link<T>
    where
        Q: ?Sized,
        F: FnMut(&Q, &T) -> Ordering,
    {
        let mut opt_cur = self.root;

        loop {
            let cur = opt_cur?;

            unsafe {
                match cmp(key, cur.as_ref()) {
                    Ordering::Less => opt_cur = links(cur).left(),
                    Ordering::Equal => return Some(cur),
                    Ordering::Greater => opt_cur = links(cur).right(),
                }
            }
        }
    }

    /// Returns the minimum element of the tree.
    pub fn first(&self) -> Option<Pin<&T>> {
        unsafe { traverse::extreme(self.root, Dir::Left).map(|first| pinned(first)) }
    }

    /// Returns the maximum element of the tree.
    pub fn last(&self) -> Option<Pin<&T>> {
        unsafe { traverse::extreme(self.root, Dir::Right).map(|last| pinned(last)) }
    }

    /// Returns the first element of a post-order walk: a leaf reached by always preferring the
    /// left child.
    pub fn first_in_post_order(&self) -> Option<Pin<&T>> {
        unsafe { traverse::first_in_post_order(self.root).map(|first| pinned(first)) }
    }

    /// Returns the in-order successor of `node`.
    ///
    /// # Safety
    ///
    /// `node` must be an element of `self`.
    pub unsafe fn next_in_order(&self, node: NonNull<T>) -> Option<NonNull<T>> {
        unsafe { traverse::step_in_order(node, Dir::Right) }
    }

    /// Returns the in-order predecessor of `node`.
    ///
    /// # Safety
    ///
    /// `node` must be an element of `self`.
    pub unsafe fn prev_in_order(&self, node: NonNull<T>) -> Option<NonNull<T>> {
        unsafe { traverse::step_in_order(node, Dir::Left) }
    }

    /// Continues a post-order walk from `prev`, whose parent is `prev_parent`.
    ///
    /// Returns `None` once `prev` was the root.
    ///
    /// # Safety
    ///
    /// `prev` must be an element of `self`, and `prev_parent` must be its parent.
    pub unsafe fn next_in_post_order(
        &self,
        prev: NonNull<T>,
        prev_parent: Option<NonNull<T>>,
    ) -> Option<NonNull<T>> {
        unsafe { traverse::next_in_post_order(prev, prev_parent) }
    }

    /// Returns the parent of `node`.
    ///
    /// # Safety
    ///
    /// `node` must be an element of `self`.
    pub unsafe fn parent_of(&self, node: NonNull<T>) -> Option<NonNull<T>> {
        unsafe { links(node).parent() }
    }

    /// Returns the left child of `node`.
    ///
    /// # Safety
    ///
    /// `node` must be an element of `self`.
    pub unsafe fn left_child(&self, node: NonNull<T>) -> Option<NonNull<T>> {
        unsafe { links(node).left() }
    }

    /// Returns the right child of `node`.
    ///
    /// # Safety
    ///
    /// `node` must be an element of `self`.
    pub unsafe fn right_child(&self, node: NonNull<T>) -> Option<NonNull<T>> {
        unsafe { links(node).right() }
    }

    /// Returns the balance factor of `node`: the height of its right subtree minus the height of
    /// its left subtree. Always one of `-1`, `0` or `1`.
    ///
    /// # Safety
    ///
    /// `node` must be an element of `self`.
    pub unsafe fn balance_factor(&self, node: NonNull<T>) -> i8 {
        unsafe { links(node).balance() }
    }

    /// Returns an iterator over the elements in ascending order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    /// Returns an iterator that visits every element after both of its children.
    pub fn post_order(&self) -> PostOrder<'_, T> {
        PostOrder::new(self)
    }

    /// Returns a cursor pointing at the minimum element.
    pub fn cursor_first(&self) -> Cursor<'_, T> {
        Cursor::first(self)
    }

    /// Returns a cursor pointing at the maximum element.
    pub fn cursor_last(&self) -> Cursor<'_, T> {
        Cursor::last(self)
    }

    /// Returns an editing cursor pointing at the minimum element.
    pub fn cursor_first_mut(&mut self) -> CursorMut<'_, T> {
        CursorMut::first(self)
    }

    /// Returns an editing cursor pointing at the maximum element.
    pub fn cursor_last_mut(&mut self) -> CursorMut<'_, T> {
        CursorMut::last(self)
    }

    /// Returns `true` if `node` carries the unlinked marker.
    ///
    /// # Safety
    ///
    /// `node` must point to a live `T`.
    pub unsafe fn is_unlinked(node: NonNull<T>) -> bool {
        unsafe { same_node(links(node).parent(), node) }
    }

    /// Marks `node` as not belonging to any tree by pointing its parent link at itself.
    ///
    /// [`remove_at`](Self::remove_at) applies this marker to every node it removes.
    ///
    /// # Safety
    ///
    /// `node` must point to a live `T` that is not an element of any tree.
    pub unsafe fn set_unlinked(node: NonNull<T>) {
        unsafe {
            let node_links = links(node);
            node_links.clear();
            node_links.set_parent(Some(node));
        }
    }

    // Returns `true` if `node` is visibly part of a tree.
    //
    // A lone node with empty links that is not our root can't be told apart from a fresh one.
    unsafe fn is_linked(&self, node: NonNull<T>) -> bool {
        let node_links = unsafe { links(node) };

        match node_links.parent() {
            Some(parent) => !core::ptr::addr_eq(parent.as_ptr(), node.as_ptr()),
            None => !node_links.is_leaf() || same_node(self.root, node),
        }
    }

    unsafe fn maybe_set_parent(&mut self, opt_node: Link<T>, parent: Link<T>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { links(node).set_parent(parent) };
    }

    #[inline]
    unsafe fn replace_child_or_set_root(
        &mut self,
        parent: Link<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        match parent {
            Some(parent) => unsafe { self.replace_child(parent, old_child, new_child) },
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`.
    //
    // `new_child`'s parent pointer is not updated.
    //
    // # Safety
    //
    // The caller must ensure that the following conditions hold:
    // - `old_child` is a child node of `parent`.
    // - `new_child` is not a child node of `parent`.
    #[inline]
    unsafe fn replace_child(&mut self, parent: NonNull<T>, old_child: NonNull<T>, new_child: Link<T>) {
        unsafe {
            let dir = self.which_child(parent, old_child);

            debug_assert!(
                new_child.is_none() || links(parent).child(!dir) != new_child,
                "`new_child` must not be a child of `parent`"
            );

            links(parent).set_child(dir, new_child);
        }
    }

    #[inline]
    unsafe fn which_child(&self, parent: NonNull<T>, child: NonNull<T>) -> Dir {
        let parent_links = unsafe { links(parent) };

        if same_node(parent_links.left(), child) {
            Dir::Left
        } else {
            debug_assert_eq!(
                parent_links.right(),
                Some(child),
                "`child` must be a child of `parent`"
            );
            Dir::Right
        }
    }

    // Rotates the subtree rooted at `a` towards `dir`.
    //
    // `dir == Right` rotates clockwise:
    //
    //           P?            P?
    //           |             |
    //           A             B
    //          / \           / \
    //         B   C?  =>    D?  A
    //        / \               / \
    //       D?  E?            E?  C?
    //
    // `dir == Left` is the mirror image. Balance factors are not updated.
    unsafe fn rotate(&mut self, a: NonNull<T>, dir: Dir) {
        tracing::trace!(pivot = ?a, ?dir, "rotate");

        unsafe {
            let a_links = links(a);
            let b = a_links
                .child(!dir)
                .expect("rotation requires a child opposite the rotation direction");
            let b_links = links(b);
            let e = b_links.child(dir);
            let parent = a_links.parent();

            a_links.set_child(!dir, e);
            a_links.set_parent(Some(b));

            b_links.set_child(dir, Some(a));
            b_links.set_parent(parent);

            self.maybe_set_parent(e, Some(a));
            self.replace_child_or_set_root(parent, a, Some(b));
        }
    }

    // Rotates `b` (the `!dir` child of `a`) away from `dir`, then `a` towards `dir`, and fixes
    // up the balance factors of all three nodes involved. Returns `e`, the new subtree root.
    //
    // `dir == Right`:
    //
    //           P?            P?          P?
    //           |             |           |
    //           A             A           E
    //          / \           / \        /   \
    //         B   C?  =>    E   C? =>  B     A
    //        / \           / \        / \   / \
    //       D?  E         B   G?     D?  F?G?  C?
    //          / \       / \
    //         F?  G?    D?  F?
    //
    // Let `e = b(E)` before the rotation. Afterwards `b(E) = 0`. If `E` leaned towards `dir`,
    // `B` ends up with balance `-e` and `A` is balanced; if it leaned away, `A` gets `-e` and `B`
    // is balanced. If `e == 0` both are balanced.
    unsafe fn double_rotate(&mut self, b: NonNull<T>, a: NonNull<T>, dir: Dir) -> NonNull<T> {
        tracing::trace!(pivot = ?a, ?dir, "double rotate");

        unsafe {
            let a_links = links(a);
            let b_links = links(b);
            let e = b_links
                .child(dir)
                .expect("double rotation requires an inner grandchild");
            let e_links = links(e);
            let f = e_links.child(!dir);
            let g = e_links.child(dir);
            let parent = a_links.parent();

            let e_balance = e_links.balance();
            let lean = dir.sign() * e_balance;

            a_links.set_child(!dir, g);
            a_links.set_parent_balance(Some(e), if lean >= 0 { 0 } else { -e_balance });

            b_links.set_child(dir, f);
            b_links.set_parent_balance(Some(e), if lean <= 0 { 0 } else { -e_balance });

            e_links.set_child(dir, Some(a));
            e_links.set_child(!dir, Some(b));
            e_links.set_parent_balance(parent, 0);

            self.maybe_set_parent(g, Some(a));
            self.maybe_set_parent(f, Some(b));
            self.replace_child_or_set_root(parent, a, Some(e));

            e
        }
    }

    /// Inserts `item`, ordered by `cmp(candidate, existing)`.
    ///
    /// If an element comparing `Equal` to `item` is already present, the tree is left unmodified
    /// and `item` is returned inside the error together with the existing element.
    ///
    /// This operation completes in _O(log(n))_ time and performs at most one rotation.
    ///
    /// # Panics
    ///
    /// Panics if `item` is visibly still linked into a tree.
    pub fn insert_by<F>(&mut self, item: T::Handle, mut cmp: F) -> Result<(), Duplicate<'_, T>>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let ptr = T::into_ptr(item);

        assert!(
            !unsafe { self.is_linked(ptr) },
            "node is already linked into a tree"
        );

        let Some(root) = self.root else {
            // Tree is empty. Set `item` as the root and return.
            unsafe { links(ptr).clear() };
            tracing::trace!(node = ?ptr, "inserted as root");

            self.root = Some(ptr);
            self.len += 1;
            return Ok(());
        };

        // Descend the tree, looking for an empty slot.
        let mut parent = root;
        let dir = loop {
            let dir = match unsafe { cmp(ptr.as_ref(), parent.as_ref()) } {
                Ordering::Less => Dir::Left,
                Ordering::Equal => {
                    tracing::debug!(existing = ?parent, "rejected duplicate insert");

                    return Err(Duplicate {
                        item: unsafe { T::from_ptr(ptr) },
                        existing: unsafe { pinned(parent) },
                    });
                }
                Ordering::Greater => Dir::Right,
            };

            match unsafe { links(parent).child(dir) } {
                Some(child) => parent = child,
                None => break dir,
            }
        };

        unsafe {
            let ptr_links = links(ptr);
            ptr_links.clear();
            ptr_links.set_parent(Some(parent));
            links(parent).set_child(dir, Some(ptr));

            tracing::trace!(node = ?ptr, ?parent, ?dir, "inserted");

            self.rebalance_after_insert(parent, dir);
        }

        self.len += 1;
        Ok(())
    }

    // Performs a bottom-up rebalance after a leaf was attached as the `dir` child of `parent`.
    unsafe fn rebalance_after_insert(&mut self, parent: NonNull<T>, dir: Dir) {
        unsafe {
            // A leaf's parent is at worst singly heavy afterwards; no rotation at this level.
            links(parent).adjust_balance(dir.sign());

            if links(parent).balance() == 0 {
                return;
            }

            // The subtree rooted at `node` has grown.
            let mut node = parent;

            while let Some(parent) = links(node).parent() {
                let dir = self.which_child(parent, node);

                if self.handle_growth(node, parent, dir) {
                    return;
                }

                node = parent;
            }
        }
    }

    // Handles growth of `node`, the `dir` child of `parent`.
    //
    // Returns `true` if the tree is balanced again, or `false` if the subtree rooted at `parent`
    // is balanced but has itself grown, so the caller should continue up the tree. `false` is
    // only ever returned without rotating.
    unsafe fn handle_growth(&mut self, node: NonNull<T>, parent: NonNull<T>, dir: Dir) -> bool {
        unsafe {
            let parent_links = links(parent);
            let old_balance = parent_links.balance();

            if old_balance == 0 {
                // Singly heavy now, and taller.
                parent_links.adjust_balance(dir.sign());
                return false;
            }

            if old_balance + dir.sign() == 0 {
                // Perfectly balanced now, and no taller than before.
                parent_links.adjust_balance(dir.sign());
                return true;
            }

            // `parent` is doubly `dir`-heavy. `node` grew, so it can't be balanced.
            let node_links = links(node);

            if dir.sign() * node_links.balance() > 0 {
                // `node` is heavy on the same side as `parent`.
                //
                // With `dir == Left` and `x = h(C)`:
                //
                //           A              B
                //          / \           /   \
                //         B   C?  =>    D     A
                //        / \           / \   / \
                //       D   E?        F?  G?E?  C?
                //
                // Before: b(A) = -2, b(B) = -1, h(D) = x + 1, h(E) = x.
                // After:  h(D) = h(A) = x + 1, so b(A) = b(B) = 0.
                self.rotate(parent, !dir);
                parent_links.adjust_balance(-dir.sign());
                node_links.adjust_balance(-dir.sign());
            } else {
                // `node` is heavy on the opposite side.
                self.double_rotate(node, parent, !dir);
            }

            // The rotated subtree is back to its height before the insertion.
            true
        }
    }

    // Returns the minimum node in the subtree.
    //
    // If the subtree root is not the minimum, also returns the minimum node's parent.
    #[inline]
    unsafe fn min_in_subtree(&self, root: NonNull<T>) -> (NonNull<T>, Option<NonNull<T>>) {
        let mut parent = None;
        let mut cur = root;

        while let Some(left) = unsafe { links(cur).left() } {
            parent = Some(cur);
            cur = left;
        }

        (cur, parent)
    }

    /// Removes an arbitrary node from the tree.
    ///
    /// The removed node's links are marked unlinked (see [`is_unlinked`](Self::is_unlinked)).
    ///
    /// This operation completes in _O(log(n))_ time, and may rotate at every level of the tree.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` is an element of `self`, and not any
    /// other tree.
    ///
    /// # Panics
    ///
    /// Panics if `node` is detectably not an element of `self`: if it carries the unlinked
    /// marker, or if it has no parent and is not the root.
    pub unsafe fn remove_at(&mut self, node: NonNull<T>) -> T::Handle {
        unsafe {
            if Self::is_unlinked(node) {
                error::not_in_tree(node);
            }

            let node_links = links(node);
            let parent = node_links.parent();
            let left = node_links.left();
            let right = node_links.right();

            if parent.is_none() {
                // A parentless node that isn't the root is not in this tree.
                self.check_root(node);
            }

            // The node whose `dir` subtree has shrunk, if any.
            let shrunk = match (left, right) {
                (Some(left), Some(right)) => Some(self.swap_with_successor(node, left, right)),

                (child, None) | (None, child) => match parent {
                    Some(parent) => {
                        let dir = self.which_child(parent, node);

                        links(parent).set_child(dir, child);
                        self.maybe_set_parent(child, Some(parent));

                        Some((parent, dir))
                    }

                    None => {
                        self.maybe_set_parent(child, None);
                        self.root = child;
                        None
                    }
                },
            };

            tracing::trace!(?node, "unlinked");

            if let Some((mut parent, mut dir)) = shrunk {
                while let Some(next) = self.handle_shrink(parent, dir) {
                    (parent, dir) = next;
                }
            }

            self.len -= 1;
            Self::set_unlinked(node);

            T::from_ptr(node)
        }
    }

    #[inline]
    fn check_root(&self, node: NonNull<T>) {
        if !same_node(self.root, node) {
            error::not_in_tree(node);
        }
    }

    // Moves `node`'s in-order successor into `node`'s place, leaving `node` detached.
    //
    // The successor is the leftmost node `Y` of the right subtree and has no left child:
    //
    //     P?           P?                   P?           P?
    //     |            |                    |            |
    //     X            Y                    X            Y
    //    / \          / \                  / \          / \
    //   A   Y    =>  A   B?               A  ...   =>  A  ...
    //        \                                 |            |
    //         B?                               Q            Q
    //                                         /            /
    //                                        Y            B?
    //                                         \
    //                                          B?
    //
    // Returns the node whose subtree shrank (`Y` on the left, `Q` on the right) and the side of
    // it that shrank. No balance factors along that path have been updated yet.
    unsafe fn swap_with_successor(
        &mut self,
        node: NonNull<T>,
        left: NonNull<T>,
        right: NonNull<T>,
    ) -> (NonNull<T>, Dir) {
        unsafe {
            let node_links = links(node);
            let (successor, successor_parent) = self.min_in_subtree(right);
            let successor_links = links(successor);

            let shrunk = match successor_parent {
                None => (successor, Dir::Right),
                Some(successor_parent) => {
                    // Elevate the successor's right child to replace it.
                    let successor_right = successor_links.right();
                    links(successor_parent).set_left(successor_right);
                    self.maybe_set_parent(successor_right, Some(successor_parent));

                    successor_links.set_right(Some(right));
                    links(right).set_parent(Some(successor));

                    (successor_parent, Dir::Left)
                }
            };

            successor_links.set_left(Some(left));
            links(left).set_parent(Some(successor));

            // The successor inherits `node`'s position and balance.
            let parent = node_links.parent();
            successor_links.set_parent_balance(parent, node_links.balance());
            self.replace_child_or_set_root(parent, node, Some(successor));

            shrunk
        }
    }

    // Handles shrinkage of the `dir` subtree of `parent`.
    //
    // Returns `None` if the tree is balanced again. Otherwise the subtree that was rooted at
    // `parent` has itself shrunk, and the returned pair names its parent and the side of it that
    // shrank.
    unsafe fn handle_shrink(&mut self, parent: NonNull<T>, dir: Dir) -> Option<(NonNull<T>, Dir)> {
        unsafe {
            // Shrinkage on one side is growth on the other, as far as balance is concerned.
            let heavy = !dir;
            let sign = heavy.sign();

            let parent_links = links(parent);
            let old_balance = parent_links.balance();

            if old_balance == 0 {
                // Singly heavy now, same height.
                parent_links.adjust_balance(sign);
                return None;
            }

            let top = if old_balance + sign == 0 {
                // Was heavy on the shrunken side; now balanced and one shorter.
                parent_links.adjust_balance(sign);
                parent
            } else {
                // `parent` is doubly `heavy`-heavy.
                let node = parent_links
                    .child(heavy)
                    .expect("the heavy side of an unbalanced node is nonempty");
                let node_links = links(node);

                if sign * node_links.balance() >= 0 {
                    self.rotate(parent, dir);

                    if node_links.balance() == 0 {
                        // `node` was balanced, so `parent` keeps one subtree as tall as
                        // `node`'s former inner one. With `dir == Right` and `x = h(C)`:
                        //
                        //           A              B
                        //          / \           /   \
                        //         B   C?  =>    D     A
                        //        / \                 / \
                        //       D   E               E   C?
                        //
                        // Before: b(A) = -2, b(B) = 0, h(D) = h(E) = x + 1.
                        // After:  b(A) = -1, b(B) = +1, and h(B) = x + 3 as before.
                        node_links.adjust_balance(-sign);
                        return None;
                    }

                    parent_links.adjust_balance(-sign);
                    node_links.adjust_balance(-sign);
                    node
                } else {
                    self.double_rotate(node, parent, dir)
                }
            };

            let grandparent = links(top).parent()?;
            Some((grandparent, self.which_child(grandparent, top)))
        }
    }

    /// Removes the element for which `cmp(key, element)` is `Equal`.
    pub fn remove_by<Q, F>(&mut self, key: &Q, cmp: F) -> Option<T::Handle>
    where
        Q: ?Sized,
        F: FnMut(&Q, &T) -> Ordering,
    {
        let node = self.get_raw_by(key, cmp)?;
        unsafe { Some(self.remove_at(node)) }
    }

    /// Removes and returns the minimum element of the tree.
    pub fn pop_first(&mut self) -> Option<T::Handle> {
        let first = unsafe { traverse::extreme(self.root, Dir::Left)? };
        unsafe { Some(self.remove_at(first)) }
    }

    /// Removes and returns the maximum element of the tree.
    pub fn pop_last(&mut self) -> Option<T::Handle> {
        let last = unsafe { traverse::extreme(self.root, Dir::Right)? };
        unsafe { Some(self.remove_at(last)) }
    }

    /// Clears the tree, removing all elements.
    ///
    /// Each element is marked unlinked and its handle dropped.
    pub fn clear(&mut self) {
        let mut opt_cur = unsafe { traverse::first_in_post_order(self.root) };

        while let Some(cur) = opt_cur {
            unsafe {
                // Both children of `cur` are already gone; find the next node before `cur` goes.
                let parent = links(cur).parent();
                opt_cur = traverse::next_in_post_order(cur, parent);

                Self::set_unlinked(cur);
                drop(T::from_ptr(cur));
                self.len -= 1;
            }
        }

        self.root = None;
        debug_assert_eq!(self.len(), 0);
    }
}

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a reference to the element corresponding to `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<Pin<&T>>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get_by(key, |key, node| key.cmp(node.key().borrow()))
    }

    /// Returns `true` if the tree contains an element corresponding to `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Inserts an item into the tree, ordered by its key.
    ///
    /// See [`insert_by`](Self::insert_by).
    pub fn insert(&mut self, item: T::Handle) -> Result<(), Duplicate<'_, T>> {
        self.insert_by(item, |candidate, existing| candidate.key().cmp(existing.key()))
    }

    /// Removes the element corresponding to `key`.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<T::Handle>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.remove_by(key, |key, node| key.cmp(node.key().borrow()))
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        self.assert_invariants_by(|a, b| a.key().cmp(b.key()));
    }
}

impl<T> Default for AvlTree<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for AvlTree<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<'tree, T> IntoIterator for &'tree AvlTree<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    type Item = &'tree T;
    type IntoIter = Iter<'tree, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// Elements are pinned by contract with `Linked`.
#[inline]
unsafe fn pinned<'a, T: ?Sized>(ptr: NonNull<T>) -> Pin<&'a T> {
    unsafe { Pin::new_unchecked(ptr.as_ref()) }
}

// Returns the height of the subtree rooted at `link`, following the taller child at each level.
//
// Only meaningful if every balance factor in the subtree is correct.
unsafe fn height<T>(mut link: Link<T>) -> usize
where
    T: Linked<Links<T>> + ?Sized,
{
    let mut height = 0;

    while let Some(node) = link {
        height += 1;

        let node_links = unsafe { links(node) };
        link = if node_links.balance() > 0 {
            node_links.right()
        } else {
            node_links.left()
        };
    }

    height
}

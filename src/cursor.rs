//! Cursors over the in-order sequence of an [`AvlTree`].
//!
//! The sequence is closed into a ring by a "ghost" position that sits after the maximum and
//! before the minimum. Stepping forward from the ghost lands on the minimum, stepping back from
//! it lands on the maximum, and on an empty tree the ghost is the only position.

use core::{marker::PhantomData, pin::Pin, ptr::NonNull};

use cordyceps::Linked;

use crate::{
    links::{links, Dir, Link},
    traverse, AvlTree, Links,
};

/// A read-only cursor over an [`AvlTree`].
///
/// Created by [`AvlTree::cursor_first`] and [`AvlTree::cursor_last`].
pub struct Cursor<'tree, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    curs: CursorRaw<T>,
    phantom: PhantomData<&'tree AvlTree<T>>,
}

impl<'tree, T> Cursor<'tree, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    pub(crate) fn first(tree: &'tree AvlTree<T>) -> Cursor<'tree, T> {
        Cursor {
            curs: CursorRaw::first(tree.into()),
            phantom: PhantomData,
        }
    }

    pub(crate) fn last(tree: &'tree AvlTree<T>) -> Cursor<'tree, T> {
        Cursor {
            curs: CursorRaw::last(tree.into()),
            phantom: PhantomData,
        }
    }

    /// Steps to the in-order successor, or from the maximum onto the ghost.
    pub fn move_next(&mut self) {
        unsafe { self.curs.move_next() }
    }

    /// Steps to the in-order predecessor, or from the minimum onto the ghost.
    pub fn move_prev(&mut self) {
        unsafe { self.curs.move_prev() }
    }

    /// The element under the cursor; `None` on the ghost.
    pub fn get(&self) -> Option<&'tree T> {
        unsafe { self.curs.get() }
    }

    /// The balance factor of the element under the cursor.
    ///
    /// Always one of `-1`, `0` or `1`. The ghost has no subtrees and so no balance factor; this
    /// returns `None` there rather than `0`.
    pub fn balance_factor(&self) -> Option<i8> {
        unsafe { self.curs.balance_factor() }
    }

    /// The element [`move_next`](Self::move_next) would land on, without moving.
    pub fn peek_next(&self) -> Option<&'tree T> {
        unsafe { self.curs.peek_next() }
    }

    /// The element [`move_prev`](Self::move_prev) would land on, without moving.
    pub fn peek_prev(&self) -> Option<&'tree T> {
        unsafe { self.curs.peek_prev() }
    }
}

/// A cursor over an [`AvlTree`] that can also unlink the element under it.
///
/// Movement and inspection behave exactly as on [`Cursor`]. Removal rebalances the tree, which
/// may rotate nodes anywhere between the removed position and the root; the cursor only ever
/// holds a pointer to one element, so it stays valid across those rotations.
///
/// Created by [`AvlTree::cursor_first_mut`] and [`AvlTree::cursor_last_mut`].
pub struct CursorMut<'tree, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    curs: CursorRaw<T>,
    phantom: PhantomData<&'tree mut AvlTree<T>>,
}

impl<'tree, T> CursorMut<'tree, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    pub(crate) fn first(tree: &'tree mut AvlTree<T>) -> CursorMut<'tree, T> {
        CursorMut {
            curs: CursorRaw::first(tree.into()),
            phantom: PhantomData,
        }
    }

    pub(crate) fn last(tree: &'tree mut AvlTree<T>) -> CursorMut<'tree, T> {
        CursorMut {
            curs: CursorRaw::last(tree.into()),
            phantom: PhantomData,
        }
    }

    /// Borrows this cursor as a read-only [`Cursor`] at the same position.
    pub fn as_cursor(&self) -> Cursor<'_, T> {
        Cursor {
            curs: CursorRaw {
                tree: self.curs.tree,
                ptr: self.curs.ptr,
            },
            phantom: PhantomData,
        }
    }

    /// See [`Cursor::move_next`].
    pub fn move_next(&mut self) {
        unsafe { self.curs.move_next() }
    }

    /// See [`Cursor::move_prev`].
    pub fn move_prev(&mut self) {
        unsafe { self.curs.move_prev() }
    }

    /// See [`Cursor::get`].
    pub fn get(&self) -> Option<&T> {
        unsafe { self.curs.get() }
    }

    /// Pins the element under the cursor for mutation; `None` on the ghost.
    ///
    /// # Safety
    ///
    /// The element must keep comparing the same way against every other element of the tree.
    /// Changing its ordering key leaves it out of place, and later lookups, inserts and removals
    /// will descend the wrong way.
    pub unsafe fn get_mut(&mut self) -> Option<Pin<&mut T>> {
        unsafe { self.curs.get_mut() }
    }

    /// See [`Cursor::balance_factor`].
    pub fn balance_factor(&self) -> Option<i8> {
        unsafe { self.curs.balance_factor() }
    }

    /// See [`Cursor::peek_next`].
    pub fn peek_next(&self) -> Option<&T> {
        unsafe { self.curs.peek_next() }
    }

    /// See [`Cursor::peek_prev`].
    pub fn peek_prev(&self) -> Option<&T> {
        unsafe { self.curs.peek_prev() }
    }

    /// Unlinks the element under the cursor and moves onto its former successor.
    ///
    /// Removing the maximum leaves the cursor on the ghost. On the ghost this is a no-op that
    /// returns `None`. The returned node carries the unlinked marker.
    pub fn remove_current(&mut self) -> Option<T::Handle> {
        unsafe { self.curs.remove_and_step(Dir::Right) }
    }

    /// Like [`remove_current`](Self::remove_current), but moves onto the former predecessor.
    pub fn remove_current_and_move_prev(&mut self) -> Option<T::Handle> {
        unsafe { self.curs.remove_and_step(Dir::Left) }
    }
}

struct CursorRaw<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    tree: NonNull<AvlTree<T>>,
    ptr: Link<T>,
}

impl<T> CursorRaw<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    fn first(tree: NonNull<AvlTree<T>>) -> CursorRaw<T> {
        CursorRaw {
            tree,
            ptr: unsafe { traverse::extreme(tree.as_ref().root, Dir::Left) },
        }
    }

    fn last(tree: NonNull<AvlTree<T>>) -> CursorRaw<T> {
        CursorRaw {
            tree,
            ptr: unsafe { traverse::extreme(tree.as_ref().root, Dir::Right) },
        }
    }

    // Returns the neighbour of the current position on the `dir` side, wrapping through the ghost.
    unsafe fn step(&self, dir: Dir) -> Link<T> {
        unsafe {
            match self.ptr {
                Some(p) => traverse::step_in_order(p, dir),
                None => traverse::extreme(self.tree.as_ref().root, !dir),
            }
        }
    }

    unsafe fn move_next(&mut self) {
        self.ptr = unsafe { self.step(Dir::Right) };
    }

    unsafe fn move_prev(&mut self) {
        self.ptr = unsafe { self.step(Dir::Left) };
    }

    unsafe fn get<'a>(&self) -> Option<&'a T> {
        self.ptr.map(|p| unsafe { p.as_ref() })
    }

    unsafe fn get_mut<'a>(&mut self) -> Option<Pin<&'a mut T>> {
        self.ptr
            .map(|mut p| unsafe { Pin::new_unchecked(p.as_mut()) })
    }

    unsafe fn balance_factor(&self) -> Option<i8> {
        self.ptr.map(|p| unsafe { links(p).balance() })
    }

    unsafe fn peek_next<'a>(&self) -> Option<&'a T> {
        unsafe { self.step(Dir::Right).map(|p| p.as_ref()) }
    }

    unsafe fn peek_prev<'a>(&self) -> Option<&'a T> {
        unsafe { self.step(Dir::Left).map(|p| p.as_ref()) }
    }

    // The neighbour is found before unlinking. It stays an element afterwards, possibly moved
    // into the removed node's place by the successor swap.
    unsafe fn remove_and_step(&mut self, dir: Dir) -> Option<T::Handle> {
        let remove = self.ptr?;

        unsafe {
            self.ptr = self.step(dir);
            Some(self.tree.as_mut().remove_at(remove))
        }
    }
}

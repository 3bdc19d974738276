use core::{iter::FusedIterator, marker::PhantomData};

use cordyceps::Linked;

use crate::{
    links::{links, Dir, Link},
    traverse, AvlTree, Links,
};

/// An iterator over the elements of an [`AvlTree`] in ascending order.
///
/// Created by [`AvlTree::iter`].
pub struct Iter<'tree, T: Linked<Links<T>> + ?Sized> {
    front: Link<T>,
    back: Link<T>,
    len: usize,
    _tree: PhantomData<&'tree AvlTree<T>>,
}

impl<'tree, T: Linked<Links<T>> + ?Sized> Iter<'tree, T> {
    pub(crate) fn new(tree: &'tree AvlTree<T>) -> Self {
        unsafe {
            Iter {
                front: traverse::extreme(tree.root, Dir::Left),
                back: traverse::extreme(tree.root, Dir::Right),
                len: tree.len(),
                _tree: PhantomData,
            }
        }
    }
}

impl<'tree, T: Linked<Links<T>> + ?Sized> Iterator for Iter<'tree, T> {
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        // The two ends meet when `len` runs out; neither pointer is meaningful after that.
        if self.len == 0 {
            return None;
        }

        let cur = self.front?;
        self.len -= 1;

        unsafe {
            self.front = traverse::step_in_order(cur, Dir::Right);
            Some(cur.as_ref())
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<T: Linked<Links<T>> + ?Sized> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let cur = self.back?;
        self.len -= 1;

        unsafe {
            self.back = traverse::step_in_order(cur, Dir::Left);
            Some(cur.as_ref())
        }
    }
}

impl<T: Linked<Links<T>> + ?Sized> ExactSizeIterator for Iter<'_, T> {}

impl<T: Linked<Links<T>> + ?Sized> FusedIterator for Iter<'_, T> {}

/// An iterator over the elements of an [`AvlTree`] in post-order: every element is yielded after
/// both of its children.
///
/// Created by [`AvlTree::post_order`].
pub struct PostOrder<'tree, T: Linked<Links<T>> + ?Sized> {
    next: Link<T>,
    len: usize,
    _tree: PhantomData<&'tree AvlTree<T>>,
}

impl<'tree, T: Linked<Links<T>> + ?Sized> PostOrder<'tree, T> {
    pub(crate) fn new(tree: &'tree AvlTree<T>) -> Self {
        PostOrder {
            next: unsafe { traverse::first_in_post_order(tree.root) },
            len: tree.len(),
            _tree: PhantomData,
        }
    }
}

impl<'tree, T: Linked<Links<T>> + ?Sized> Iterator for PostOrder<'tree, T> {
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.next?;
        self.len -= 1;

        unsafe {
            self.next = traverse::next_in_post_order(cur, links(cur).parent());
            Some(cur.as_ref())
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<T: Linked<Links<T>> + ?Sized> ExactSizeIterator for PostOrder<'_, T> {}

impl<T: Linked<Links<T>> + ?Sized> FusedIterator for PostOrder<'_, T> {}

use core::{
    cell::UnsafeCell,
    fmt,
    marker::PhantomPinned,
    mem,
    ops::Not,
    ptr::{self, NonNull},
};

use cordyceps::Linked;

use crate::balance::Balance;

pub(crate) type Link<T> = Option<NonNull<T>>;

/// Links to other nodes in an [`AvlTree`](crate::AvlTree).
///
/// A record participates in a tree by embedding a `Links` and implementing
/// [`Linked`] so the tree can find it. The tree never allocates or frees records; it only
/// rewrites the fields stored here.
pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

/// The side of a parent a child hangs from.
///
/// Every rebalancing routine is written once in terms of a `Dir` and its mirror `!dir`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Dir {
    Left = 0,
    Right = 1,
}

impl Dir {
    /// The sign of the balance factor change caused by growth on this side.
    #[inline]
    pub(crate) fn sign(self) -> i8 {
        match self {
            Dir::Left => -1,
            Dir::Right => 1,
        }
    }
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Link<T>,
    children: [Link<T>; 2],
    balance: Balance,
    _unpin: PhantomPinned,
}

/// Returns the links embedded in the node at `node`.
///
/// # Safety
///
/// `node` must point to a live `T`, and the returned reference must not outlive it.
#[inline]
pub(crate) unsafe fn links<'a, T>(node: NonNull<T>) -> &'a Links<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    unsafe { T::links(node).as_ref() }
}

/// Returns `true` if `link` points at `node`.
///
/// Only addresses are compared, so metadata of unsized `T` never makes a node differ from itself.
#[inline]
pub(crate) fn same_node<T: ?Sized>(link: Link<T>, node: NonNull<T>) -> bool {
    link.is_some_and(|link| ptr::addr_eq(link.as_ptr(), node.as_ptr()))
}

impl<T: ?Sized> Links<T> {
    /// Returns zero-initialized links: no parent, no children, perfectly balanced.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                balance: Balance::EVEN,
                _unpin: PhantomPinned,
            }),
        }
    }

    #[inline]
    fn inner(&self) -> &LinksInner<T> {
        unsafe { &*self.inner.get() }
    }

    // All writes go through the cell. The tree is the only writer, and it only writes while it
    // holds `&mut AvlTree`.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    fn inner_mut(&self) -> &mut LinksInner<T> {
        unsafe { &mut *self.inner.get() }
    }

    #[inline]
    pub(crate) fn is_leaf(&self) -> bool {
        self.left().is_none() && self.right().is_none()
    }

    #[inline]
    pub(crate) fn balance(&self) -> i8 {
        self.inner().balance.get()
    }

    #[inline]
    pub(crate) fn parent(&self) -> Link<T> {
        self.inner().parent
    }

    #[inline]
    pub(crate) fn child(&self, dir: Dir) -> Link<T> {
        self.inner().children[dir as usize]
    }

    #[inline]
    pub(crate) fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    pub(crate) fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    #[inline]
    pub(crate) fn set_parent(&self, parent: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner_mut().parent, parent)
    }

    #[inline]
    pub(crate) fn set_child(&self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner_mut().children[dir as usize], child)
    }

    #[inline]
    pub(crate) fn set_left(&self, left: Link<T>) -> Link<T> {
        self.set_child(Dir::Left, left)
    }

    #[inline]
    pub(crate) fn set_right(&self, right: Link<T>) -> Link<T> {
        self.set_child(Dir::Right, right)
    }

    #[inline]
    pub(crate) fn set_parent_balance(&self, parent: Link<T>, balance: i8) {
        let inner = self.inner_mut();
        inner.parent = parent;
        inner.balance = Balance::new(balance);
    }

    #[inline]
    pub(crate) fn adjust_balance(&self, amount: i8) {
        self.inner_mut().balance.adjust(amount);
    }

    /// Resets to the state returned by [`Links::new`].
    pub(crate) fn clear(&self) {
        let inner = self.inner_mut();
        inner.parent = None;
        inner.children = [None; 2];
        inner.balance = Balance::EVEN;
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner();

        f.debug_struct("Links")
            .field("parent", &inner.parent)
            .field("left", &inner.children[Dir::Left as usize])
            .field("right", &inner.children[Dir::Right as usize])
            .field("balance", &inner.balance)
            .finish()
    }
}

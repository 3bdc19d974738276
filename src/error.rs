use core::{fmt, pin::Pin, ptr::NonNull};

use cordyceps::Linked;

use crate::Links;

/// The error returned by [`AvlTree::insert_by`](crate::AvlTree::insert_by) when an equal element
/// is already present.
///
/// The tree is left unmodified. The rejected item is handed back rather than dropped, so no
/// record is lost or freed on this path.
pub struct Duplicate<'tree, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    pub(crate) item: T::Handle,
    pub(crate) existing: Pin<&'tree T>,
}

impl<'tree, T> Duplicate<'tree, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    /// Returns the element already in the tree that compared equal to the rejected item.
    pub fn existing(&self) -> Pin<&'tree T> {
        self.existing
    }

    /// Returns the rejected item.
    pub fn into_item(self) -> T::Handle {
        self.item
    }
}

impl<T> fmt::Debug for Duplicate<'_, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Duplicate")
            .field("existing", &NonNull::from(self.existing.get_ref()))
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for Duplicate<'_, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an equal element is already present in the tree")
    }
}

/// Aborts a removal of a node that is not an element of the tree.
///
/// Continuing would leave the tree with a cycle or a dangling parent link, so this is fatal.
#[cold]
#[inline(never)]
#[track_caller]
pub(crate) fn not_in_tree<T: ?Sized>(node: NonNull<T>) -> ! {
    tracing::error!(?node, "attempted to remove a node that is not in the tree");

    panic!("node {node:?} is not in the tree")
}

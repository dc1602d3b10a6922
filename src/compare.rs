//! Key ordering.
//!
//! The tree orders keys through a [`KeyComparator`] chosen at construction.
//! [`Natural`] uses the key's `Ord` impl; any `Fn(&K, &K) -> Ordering` works
//! as a custom comparator.

use std::cmp::Ordering;

/// A total order over keys of type `K`.
///
/// Implementations must be consistent: the same two keys always compare the
/// same way for the lifetime of the tree.
pub trait KeyComparator<K: ?Sized> {
    /// Compare `a` with `b`.
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Orders keys by their [`Ord`] implementation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Natural;

impl<K: Ord + ?Sized> KeyComparator<K> for Natural {
    #[inline(always)]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

impl<K: ?Sized, F> KeyComparator<K> for F
where
    F: Fn(&K, &K) -> Ordering,
{
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        self(a, b)
    }
}

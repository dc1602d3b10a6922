//! Key search within a node's sorted key array.
//!
//! - [`lower_bound`]: exact slot of a key in a leaf, or its insertion point.
//! - [`upper_bound`]: child slot that routes a key through an internal node.
//!
//! A key equal to separator `keys[i]` belongs to child `i + 1`.

#![allow(clippy::redundant_pub_crate)]

use std::cmp::Ordering;

use crate::compare::KeyComparator;

/// Binary search `keys` for `key`.
///
/// Returns `Ok(i)` when `keys[i]` equals `key`, otherwise `Err(i)` with the
/// position that keeps `keys` sorted after inserting `key` at `i`.
#[inline]
pub(crate) fn lower_bound<K, C>(keys: &[K], key: &K, cmp: &C) -> Result<usize, usize>
where
    C: KeyComparator<K> + ?Sized,
{
    keys.binary_search_by(|k| cmp.compare(k, key))
}

/// Index of the child whose range contains `key`: the number of separators
/// less than or equal to `key`.
#[inline]
pub(crate) fn upper_bound<K, C>(keys: &[K], key: &K, cmp: &C) -> usize
where
    C: KeyComparator<K> + ?Sized,
{
    keys.partition_point(|k| cmp.compare(k, key) != Ordering::Greater)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::Natural;

    #[test]
    fn test_lower_bound_found_and_missing() {
        let keys = [10, 20, 30];
        assert_eq!(lower_bound(&keys, &20, &Natural), Ok(1));
        assert_eq!(lower_bound(&keys, &5, &Natural), Err(0));
        assert_eq!(lower_bound(&keys, &25, &Natural), Err(2));
        assert_eq!(lower_bound(&keys, &99, &Natural), Err(3));
    }

    #[test]
    fn test_lower_bound_empty() {
        let keys: [u64; 0] = [];
        assert_eq!(lower_bound(&keys, &1, &Natural), Err(0));
    }

    #[test]
    fn test_upper_bound_routes_equal_right() {
        let keys = [10, 20, 30];
        assert_eq!(upper_bound(&keys, &5, &Natural), 0);
        assert_eq!(upper_bound(&keys, &10, &Natural), 1);
        assert_eq!(upper_bound(&keys, &15, &Natural), 1);
        assert_eq!(upper_bound(&keys, &30, &Natural), 3);
        assert_eq!(upper_bound(&keys, &31, &Natural), 3);
    }

    #[test]
    fn test_upper_bound_custom_order() {
        let reverse = |a: &i32, b: &i32| b.cmp(a);
        let keys = [30, 20, 10];
        assert_eq!(upper_bound(&keys, &25, &reverse), 1);
        assert_eq!(upper_bound(&keys, &20, &reverse), 2);
    }
}

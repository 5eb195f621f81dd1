use std::iter::Map;
use std::slice::{Iter, IterMut};

use super::sparse::SparseArray;

/// One column of a zip: a store borrowed shared or exclusively.
pub trait Lane {
    type Item;
    type Iter: Iterator<Item = Option<Self::Item>>;

    fn into_lane(self) -> Self::Iter;
}

impl<'a, T> Lane for &'a SparseArray<T> {
    type Item = &'a T;
    type Iter = Map<Iter<'a, Option<T>>, fn(&'a Option<T>) -> Option<&'a T>>;

    fn into_lane(self) -> Self::Iter {
        self.slots()
            .iter()
            .map(Option::as_ref as fn(&'a Option<T>) -> Option<&'a T>)
    }
}

impl<'a, T> Lane for &'a mut SparseArray<T> {
    type Item = &'a mut T;
    type Iter = Map<IterMut<'a, Option<T>>, fn(&'a mut Option<T>) -> Option<&'a mut T>>;

    fn into_lane(self) -> Self::Iter {
        self.slots_mut()
            .iter_mut()
            .map(Option::as_mut as fn(&'a mut Option<T>) -> Option<&'a mut T>)
    }
}

pub trait IntoLanes {
    type Lanes;

    fn into_lanes(self) -> Self::Lanes;
}

/// Walks indices `0..min(len)` in ascending order and yields only the
/// indices where every store holds a value.
pub struct Zipper<S: IntoLanes> {
    lanes: S::Lanes,
    index: usize,
}

/// Same as [`Zipper`] but also yields the entity index.
pub struct IndexedZipper<S: IntoLanes>(Zipper<S>);

pub fn zip<S: IntoLanes>(stores: S) -> Zipper<S> {
    Zipper {
        lanes: stores.into_lanes(),
        index: 0,
    }
}

pub fn indexed_zip<S: IntoLanes>(stores: S) -> IndexedZipper<S> {
    IndexedZipper(zip(stores))
}

macro_rules! impl_zip {
    ($(($lane:ident, $var:ident, $idx:tt)),+) => {
        impl<$($lane: Lane),+> IntoLanes for ($($lane,)+) {
            type Lanes = ($($lane::Iter,)+);

            fn into_lanes(self) -> Self::Lanes {
                ($(self.$idx.into_lane(),)+)
            }
        }

        impl<$($lane: Lane),+> Zipper<($($lane,)+)> {
            fn advance(&mut self) -> Option<(usize, ($($lane::Item,)+))> {
                loop {
                    $(let $var = self.lanes.$idx.next()?;)+
                    let index = self.index;
                    self.index += 1;
                    if let ($(Some($var),)+) = ($($var,)+) {
                        return Some((index, ($($var,)+)));
                    }
                }
            }
        }

        impl<$($lane: Lane),+> Iterator for Zipper<($($lane,)+)> {
            type Item = ($($lane::Item,)+);

            fn next(&mut self) -> Option<Self::Item> {
                self.advance().map(|(_, items)| items)
            }
        }

        impl<$($lane: Lane),+> Iterator for IndexedZipper<($($lane,)+)> {
            type Item = (usize, ($($lane::Item,)+));

            fn next(&mut self) -> Option<Self::Item> {
                self.0.advance()
            }
        }
    };
}

impl_zip!((A, a, 0));
impl_zip!((A, a, 0), (B, b, 1));
impl_zip!((A, a, 0), (B, b, 1), (C, c, 2));
impl_zip!((A, a, 0), (B, b, 1), (C, c, 2), (D, d, 3));
impl_zip!((A, a, 0), (B, b, 1), (C, c, 2), (D, d, 3), (E, e, 4));
impl_zip!((A, a, 0), (B, b, 1), (C, c, 2), (D, d, 3), (E, e, 4), (F, f, 5));

#[cfg(test)]
mod tests {
    use super::*;

    fn store(values: &[(usize, i32)]) -> SparseArray<i32> {
        let mut store = SparseArray::new();
        for &(index, value) in values {
            store.set(index, value);
        }
        store
    }

    #[test]
    fn yields_only_co_present_indices() {
        let a = store(&[(0, 1), (1, 2), (3, 4), (6, 7)]);
        let b = store(&[(1, 20), (2, 30), (3, 40)]);

        let pairs: Vec<_> = indexed_zip((&a, &b))
            .map(|(i, (x, y))| (i, *x, *y))
            .collect();

        assert_eq!(pairs, vec![(1, 2, 20), (3, 4, 40)]);
    }

    #[test]
    fn count_bounded_by_shortest_store() {
        let a = store(&[(0, 1), (1, 1), (2, 1), (9, 1)]);
        let b = store(&[(0, 1), (1, 1), (2, 1)]);

        let count = zip((&a, &b)).count();
        assert!(count <= a.len().min(b.len()));
        assert_eq!(count, 3);
    }

    #[test]
    fn mutable_lane_writes_through() {
        let mut a = store(&[(0, 1), (2, 3), (4, 5)]);
        let b = store(&[(2, 10), (4, 100)]);

        for (x, y) in zip((&mut a, &b)) {
            *x += *y;
        }

        assert_eq!(a.get(0), Some(&1));
        assert_eq!(a.get(2), Some(&13));
        assert_eq!(a.get(4), Some(&105));
    }

    #[test]
    fn ascending_order_with_three_lanes() {
        let a = store(&[(5, 0), (1, 0), (3, 0)]);
        let b = store(&[(5, 0), (3, 0), (1, 0), (0, 0)]);
        let c = store(&[(1, 0), (5, 0), (3, 0)]);

        let order: Vec<usize> = indexed_zip((&a, &b, &c)).map(|(i, _)| i).collect();
        assert_eq!(order, vec![1, 3, 5]);
    }

    #[test]
    fn empty_store_yields_nothing() {
        let a = store(&[(0, 1)]);
        let empty = SparseArray::<i32>::new();
        assert_eq!(zip((&a, &empty)).count(), 0);
    }
}

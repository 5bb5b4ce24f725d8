//! Conversion of various types to [StableVec].

use armature_common::ArrayIndex;

use crate::StableVec;

impl<T, Idx: ArrayIndex> From<Vec<T>> for StableVec<T, Idx> {
    fn from(v: Vec<T>) -> Self {
        let mut res = Self::with_capacity(v.len());
        for value in v {
            res.insert(value);
        }
        res
    }
}

impl<T, Idx: ArrayIndex> FromIterator<T> for StableVec<T, Idx> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut res = Self::with_capacity(iter.size_hint().0);
        for value in iter {
            res.insert(value);
        }
        res
    }
}

impl<T, Idx: ArrayIndex> Extend<T> for StableVec<T, Idx> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for value in iter {
            self.insert(value);
        }
    }
}

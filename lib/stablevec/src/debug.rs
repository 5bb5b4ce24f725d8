use std::fmt::Debug;

use armature_common::ArrayIndex;

use crate::StableVec;

impl<T: Debug, Idx: ArrayIndex> Debug for StableVec<T, Idx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StableVec ({} / {} slots) ", self.len(), self.slots())?;
        f.debug_map()
            .entries(self.iter().map(|(key, v)| ((key.index(), key.generation()), v)))
            .finish()
    }
}

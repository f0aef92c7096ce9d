use std::hash::{Hash, Hasher};

use fnv::FnvHashMap;
use kiln_ir::{
    Function,
    structural::{structural_eq, structural_hash},
};

use crate::task::TaskIdx;

/// A kernel as a map key.
///
/// Hashing uses the precomputed structural hash, equality confirms with
/// a full structural comparison so that hash collisions never merge tasks.
#[derive(Clone, Copy)]
pub struct KernelKey<'m> {
    hash: u64,
    kernel: &'m Function,
}

impl<'m> KernelKey<'m> {
    pub fn new(kernel: &'m Function) -> Self {
        Self {
            hash: structural_hash(kernel),
            kernel,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_hash(hash: u64, kernel: &'m Function) -> Self {
        Self { hash, kernel }
    }

    pub fn structural_hash(&self) -> u64 {
        self.hash
    }
}

impl Hash for KernelKey<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl PartialEq for KernelKey<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && structural_eq(self.kernel, other.kernel)
    }
}

impl Eq for KernelKey<'_> {}

/// Maps each class of structurally equal kernels to its task.
#[derive(Default)]
pub struct DedupIndex<'m> {
    tasks: FnvHashMap<KernelKey<'m>, TaskIdx>,
}

impl<'m> DedupIndex<'m> {
    pub fn get(&self, key: &KernelKey<'m>) -> Option<TaskIdx> {
        self.tasks.get(key).copied()
    }

    pub fn insert(&mut self, key: KernelKey<'m>, task: TaskIdx) {
        self.tasks.insert(key, task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

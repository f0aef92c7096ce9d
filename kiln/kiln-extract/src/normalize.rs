use std::sync::Arc;

use arcstr::ArcStr;
use indexmap::IndexMap;
use kiln_ir::{Function, GlobalVar, Module};

use crate::{ExtractError, ExtractResult};

/// Turns a kernel into a standalone module that can be tuned on its own.
///
/// Implementations must be pure: the same kernel always normalizes to
/// structurally equal modules.
#[cfg_attr(
    any(test, feature = "unimock"),
    unimock::unimock(api = NormalizerMock)
)]
pub trait Normalizer: Send + Sync {
    fn normalize(&self, name: &GlobalVar, kernel: &Function) -> Module;
}

/// The name of the entry function of modules made by [StandaloneNormalizer].
pub const STANDALONE_ENTRY: &str = "main";

/// Copies the kernel into a fresh module as its only function, named [STANDALONE_ENTRY].
///
/// The original name is dropped, so structurally equal kernels normalize
/// to structurally equal modules.
#[derive(Clone, Copy, Default, Debug)]
pub struct StandaloneNormalizer;

impl Normalizer for StandaloneNormalizer {
    fn normalize(&self, _name: &GlobalVar, kernel: &Function) -> Module {
        let mut module = Module::new();
        module.insert(GlobalVar::new(STANDALONE_ENTRY), kernel.clone());
        module
    }
}

/// Normalizers by name, for selecting one from configuration.
#[derive(Clone, Default)]
pub struct NormalizerRegistry {
    normalizers: IndexMap<ArcStr, Arc<dyn Normalizer>>,
}

impl NormalizerRegistry {
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register("standalone", Arc::new(StandaloneNormalizer));
        registry
    }

    pub fn register(&mut self, name: impl Into<ArcStr>, normalizer: Arc<dyn Normalizer>) {
        self.normalizers.insert(name.into(), normalizer);
    }

    pub fn resolve(&self, name: &str) -> ExtractResult<&Arc<dyn Normalizer>> {
        self.normalizers
            .get(name)
            .ok_or_else(|| ExtractError::NormalizerNotFound(ArcStr::from(name)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.normalizers.keys().map(|name| name.as_str())
    }
}

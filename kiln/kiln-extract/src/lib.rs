#![forbid(unsafe_code)]

//! Extraction of tuning tasks from a program module.
//!
//! Orchestration functions are scanned for dispatches to kernels. Dispatches to
//! structurally equal kernels are grouped into one [ExtractedTask] whose weight
//! counts the dispatch call sites.

use kiln_ir::Module;

pub mod dedup;
pub mod error;
pub mod extractor;
pub mod normalize;
pub mod target;
pub mod task;

#[cfg(test)]
mod tests;

pub use error::{ExtractError, ExtractResult};
pub use extractor::TaskExtractor;
pub use normalize::{Normalizer, NormalizerRegistry, StandaloneNormalizer};
pub use target::{Target, TargetError};
pub use task::{ExtractedTask, TaskSummary};

#[cfg(any(test, feature = "unimock"))]
pub use normalize::NormalizerMock;

/// Extract the tasks of `module` in a fresh run.
pub fn extract_tasks(
    module: &Module,
    target: &Target,
    normalizer: &dyn Normalizer,
) -> ExtractResult<Vec<ExtractedTask>> {
    TaskExtractor::new(module, target, normalizer).extract()
}

use arcstr::ArcStr;
use kiln_ir::GlobalVar;
use thiserror::Error;

/// Errors aborting an extraction run.
///
/// Apart from [ExtractError::NormalizerNotFound], these signal a module that is
/// inconsistent with itself. Running extraction again on the same module fails the same way.
#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum ExtractError {
    #[error("normalizer `{0}` is not registered")]
    NormalizerNotFound(ArcStr),
    #[error("{caller} dispatches to {callee}, which is not defined in the module")]
    UnresolvedGlobal {
        caller: GlobalVar,
        callee: GlobalVar,
    },
    #[error("{caller} dispatches to {callee}, which is not a kernel")]
    NotAKernel {
        caller: GlobalVar,
        callee: GlobalVar,
    },
    #[error("dispatch in {caller} has no callee")]
    MissingCallee { caller: GlobalVar },
    #[error("dispatch in {caller} must target a global or an extern")]
    InvalidCallee { caller: GlobalVar },
}

pub type ExtractResult<T> = Result<T, ExtractError>;

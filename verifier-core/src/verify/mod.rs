mod compilation;
mod errors;
mod match_builder;
mod transformations;
mod values;
mod verifier;

pub use compilation::{Compilation, CompilationTarget, CompiledContract};
pub use errors::{MismatchPayload, VerificationError};
pub use match_builder::{Match, MatchBuilder};
pub use transformations::{Transformation, TransformationReason, TransformationType};
pub use values::Values;
pub use verifier::{
    verify, CreationTransactionProvider, DeploymentInfo, MatchType, VerificationContext,
    VerificationExport, VerificationRequest,
};

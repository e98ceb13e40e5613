//! Shared span, diagnostic, and identifier primitives used across the SDL toolchain.

mod diagnostic;
mod span;

pub use diagnostic::{Diagnostic, Diagnostics, Severity};
pub use span::{Position, Span};

/// Closed set of sampling distributions, shared by the parser's AST, the
/// sampler, and the calibrator so none of them need to duplicate the variant
/// list (see spec §4.4/§4.9's "polymorphic distribution set" design note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DistributionKind {
    Normal,
    Lognormal,
    Beta,
    Uniform,
    Triangular,
}

/// Closed set of variable growth models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ModelKind {
    Linear,
    Exponential,
    Logistic,
    Sigmoid,
    Polynomial,
}

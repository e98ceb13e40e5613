//! Semantic validation over the SDL AST: symbol resolution, causal-graph
//! construction, and cycle detection.

pub mod graph;
pub mod symbol;
pub mod validate;

pub use graph::CausalGraph;
pub use symbol::{SymbolKind, SymbolTable};
pub use validate::{validate, ValidationResult};

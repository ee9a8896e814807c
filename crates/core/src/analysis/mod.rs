//! Analysis stages over a loaded binary.
//!
//! [`calls`] builds the frozen call graph, [`paths`] enumerates call paths,
//! and [`stack`] recovers stack frames and worst-case cumulative stack.
//! Structural validation happens once, in the loader and the call analyzer;
//! query stages can only fail with [`QueryError`].

use thiserror::Error;

pub mod calls;
pub mod paths;
pub mod stack;

/// The only error a query stage may raise. Decode-level and heuristic
/// uncertainty is encoded in results instead.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown function: `{0}`")]
    UnknownFunction(String),
}

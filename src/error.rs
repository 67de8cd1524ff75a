use thiserror::Error;

/// Errors surfaced by the painter API.
///
/// Drawing operations never fail loudly: degenerate inputs and resource
/// failures inside the pipeline degrade to "draw nothing". Only surface
/// attachment, `flush` and the property interface report errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An argument was out of range or structurally invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// An allocation needed to complete the operation failed.
    #[error("out of memory")]
    OutOfMemory,
    /// The property name is not recognized by the painter.
    #[error("invalid property: {0}")]
    InvalidProperty(String),
}

pub type Result<T> = std::result::Result<T, Error>;

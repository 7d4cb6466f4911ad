//! Crate-wide error taxonomy.
//!
//! Every failure is a deterministic data or configuration fault: errors
//! propagate immediately to the caller, there is nothing to retry.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Bad or missing geometry, pattern shape, registry name, or degenerate
    /// input data detected before a pipeline stage runs.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A physical-to-pixel mapping collapsed (e.g. a cell footprint of zero
    /// pixels at the requested sensor pitch).
    #[error("degenerate geometry: {0}")]
    Geometry(String),

    /// Channel counts disagree across pipeline stages.
    #[error("dimension mismatch: expected {expected} channels, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// Depth slices of a volumetric PSF do not share a single shape.
    #[error("inconsistent depth-slice shapes: {first:?} vs {other:?}")]
    ShapeMismatch { first: Vec<usize>, other: Vec<usize> },

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// A decode was requested without the metadata needed to perform it, or
    /// the file contents cannot be interpreted as the requested format.
    #[error("format error: {0}")]
    Format(String),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self { Error::Configuration(msg.into()) }
    pub(crate) fn format(msg: impl Into<String>) -> Self { Error::Format(msg.into()) }
}

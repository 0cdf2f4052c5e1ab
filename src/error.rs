//! Error types for model construction and forward passes.

use thiserror::Error;

pub type Result<T, E = PredRnnError> = std::result::Result<T, E>;

/// Fatal configuration and shape errors.
///
/// Configuration errors are raised by `init` before any parameter is allocated.
/// Shape errors are raised at the start of a forward pass, before the first
/// projection touches the offending tensor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredRnnError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("num_hidden has {widths} entries but num_layers is {layers}")]
    LayerCountMismatch { layers: usize, widths: usize },

    #[error(
        "kernel {kernel_size} with stride {stride} maps a {height}x{width} frame to \
         {out_height}x{out_width}; recurrent state requires the size to be preserved"
    )]
    SpatialMismatch {
        kernel_size: usize,
        stride: usize,
        height: usize,
        width: usize,
        out_height: usize,
        out_width: usize,
    },

    #[error("{what}: expected shape {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("sampling ratio must lie in [0, 1], got {0}")]
    InvalidRatio(f64),
}

pub(crate) fn invalid(message: impl Into<String>) -> PredRnnError {
    PredRnnError::InvalidConfig(message.into())
}

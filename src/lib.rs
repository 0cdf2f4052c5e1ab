//! # PredRNN - Spatiotemporal Recurrent Forecasting (Rust)
//!
//! PredRNN v2 on the Burn framework: stacked spatiotemporal LSTM cells that
//! predict the next frame of a gridded sequence (video, sensor or energy maps).
//!
//! ## Features
//!
//! - **Spatiotemporal LSTM cell**: a per-layer cell state plus a memory that
//!   zigzags through the whole stack
//! - **Stacked predictor**: temporal unrolling with one predicted frame per step
//! - **Scheduled sampling**: Bernoulli feedback of the model's own predictions
//!   from an injectable random source
//! - **Memory decoupling features**: projected, L2-normalized cell and memory
//!   increments for an auxiliary loss
//!
//! Training, losses and data handling are left to the caller. Gradients come
//! from running the model on an `Autodiff` backend.
//!
//! ## Quick Start
//!
//! ```rust
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//! use predrnn::prelude::*;
//!
//! type Backend = NdArray<f32>;
//! let device = Default::default();
//!
//! let model = PredRnnConfig::new(2, vec![16, 16], [10, 1, 12, 12])
//!     .with_seq_len(10)
//!     .init::<Backend>(&device)
//!     .unwrap();
//!
//! let frames = Tensor::<Backend, 5>::zeros([1, 10, 1, 12, 12], &device);
//! let predicted = model.forward(frames, 0.0).unwrap();
//!
//! assert_eq!(predicted.dims(), [1, 10, 1, 12, 12]);
//! ```

pub mod cells;
pub mod error;
pub mod rnn;

pub use error::{PredRnnError, Result};

pub mod prelude {
    pub use crate::cells::{CellOutput, SpatioTemporalCell, SpatioTemporalCellConfig};
    pub use crate::error::{PredRnnError, Result};
    pub use crate::rnn::{
        DeltaMemorySource, InputSource, PredRnn, PredRnnConfig, PredRnnOutput, ScheduledSampling,
    };
}

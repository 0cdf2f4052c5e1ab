//! # Recurrent Cell Implementations
//!
//! Single-timestep cells. The stacked sequence model in [`crate::rnn`]
//! owns one cell per layer and threads the states between them.
//!
//! ## Cell Types
//!
//! | Cell | Description |
//! |------|-------------|
//! | [`SpatioTemporalCell`] | PredRNN v2 spatiotemporal LSTM with decoupled memory increments |
//!
//! ## Tensor Shapes
//!
//! All tensors are 4D feature maps `[batch, channels, height, width]`:
//!
//! | Tensor | Channels | Description |
//! |--------|----------|-------------|
//! | `input` | `in_channels` | Frame (layer 0) or hidden state of the layer below |
//! | `hidden` | `num_hidden` | Hidden state of this layer |
//! | `cell` | `num_hidden` | Cell state of this layer |
//! | `memory` | `memory_channels` | Spatiotemporal memory shared by the stack |
//!
//! Spatial size is fixed at construction and preserved by every projection.
//!
//! ## Example
//!
//! ```rust
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//! use predrnn::cells::SpatioTemporalCellConfig;
//!
//! type Backend = NdArray<f32>;
//! let device = Default::default();
//!
//! let cell = SpatioTemporalCellConfig::new(1, 16, 16, 8, 8)
//!     .init::<Backend>(&device)
//!     .unwrap();
//!
//! let frame = Tensor::<Backend, 4>::zeros([2, 1, 8, 8], &device);
//! let state = Tensor::<Backend, 4>::zeros([2, 16, 8, 8], &device);
//!
//! let out = cell
//!     .forward(frame, state.clone(), state.clone(), state)
//!     .unwrap();
//! assert_eq!(out.hidden.dims(), [2, 16, 8, 8]);
//! ```

pub mod st_lstm_cell;

pub use st_lstm_cell::{CellOutput, SpatioTemporalCell, SpatioTemporalCellConfig, FORGET_BIAS};

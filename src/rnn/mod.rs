//! # Sequence Models
//!
//! Sequence-level wrappers that own a stack of cells and unroll them over time.
//! **These are the primary APIs most users should use.**
//!
//! ## Available Models
//!
//! | Model | Description |
//! |-------|-------------|
//! | [`PredRnn`] | PredRNN v2: stacked spatiotemporal LSTMs with a zigzag memory |
//!
//! ## Quick Start
//!
//! ```rust
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//! use predrnn::rnn::PredRnnConfig;
//!
//! type Backend = NdArray<f32>;
//! let device = Default::default();
//!
//! // Two layers of width 8 over 16x16 single-channel frames
//! let model = PredRnnConfig::new(2, vec![8, 8], [6, 1, 16, 16])
//!     .with_seq_len(6)
//!     .init::<Backend>(&device)
//!     .unwrap();
//!
//! // [batch=2, time=6, channels=1, height=16, width=16]
//! let frames = Tensor::<Backend, 5>::zeros([2, 6, 1, 16, 16], &device);
//! let predicted = model.forward(frames, 0.0).unwrap();
//! assert_eq!(predicted.dims(), [2, 6, 1, 16, 16]);
//! ```
//!
//! ## Tensor Shapes
//!
//! | Tensor | Shape |
//! |--------|-------|
//! | Input sequence | `[batch, time >= seq_len, 1, height, width]` |
//! | Predicted sequence | `[batch, seq_len, 1, height, width]` |
//! | Hidden / cell state of layer `i` | `[batch, num_hidden[i], height, width]` |
//! | Spatiotemporal memory | `[batch, num_hidden[0], height, width]` |
//! | Decoupling feature | `[batch, channels, (height + 2) * (width + 2)]` |
//!
//! ## Scheduled Sampling
//!
//! At each step `t > 0` the bottom layer reads either the ground-truth frame
//! `t` or the prediction made at `t - 1`. The prediction is chosen with
//! probability `ratio`:
//!
//! ```ignore
//! // Teacher forcing
//! let out = model.forward(frames.clone(), 0.0)?;
//! // Fully autoregressive after the first frame
//! let out = model.forward(frames.clone(), 1.0)?;
//! // Reproducible draws
//! let mut rng = StdRng::seed_from_u64(7);
//! let out = model.forward_with_rng(frames, 0.5, &mut rng)?;
//! ```
//!
//! ## Memory Decoupling Features
//!
//! [`PredRnn::forward_with_deltas`] additionally returns, for every step and
//! layer, the cell and memory increments projected through a padded 1x1
//! convolution and L2-normalized over space. A training loop compares the two
//! (e.g. with cosine similarity) to keep the memories apart.

pub mod predrnn;
pub mod sampling;

pub use predrnn::{DeltaMemorySource, PredRnn, PredRnnConfig, PredRnnOutput};
pub use sampling::{InputSource, ScheduledSampling};

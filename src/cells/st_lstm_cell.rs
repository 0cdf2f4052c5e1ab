//! Spatiotemporal LSTM Cell Implementation
//!
//! The cell carries two memories. The cell state `C` recurs along time inside
//! one layer, as in a convolutional LSTM. The spatiotemporal memory `M` zigzags
//! through the stack: it is written by every layer and read by the next one,
//! and the top layer's memory feeds the bottom layer at the following step.
//!
//! ```text
//! i  = σ(i_x  + i_h)        f  = σ(f_x  + f_h + 1)     g  = tanh(g_x  + g_h)
//! ΔC = i ⊙ g                C' = f ⊙ C + ΔC
//! i' = σ(i_x' + i_m)        f' = σ(f_x' + f_m + 1)     g' = σ(g_x' + g_m)
//! ΔM = i' ⊙ g'              M' = f' ⊙ M + ΔM
//! o  = σ(o_x + o_h + W_o * [C', M'])
//! H' = o ⊙ tanh(W_1x1 * [C', M'])
//! ```
//!
//! `g'` uses a sigmoid rather than tanh. The increments `ΔC` and `ΔM` are
//! returned so the caller can build the memory decoupling loss.

use crate::error::{invalid, PredRnnError, Result};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{LayerNorm, LayerNormConfig, PaddingConfig2d};
use burn::tensor::activation;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Constant added to both forget gates before the sigmoid
pub const FORGET_BIAS: f32 = 1.0;

/// Configuration for a [`SpatioTemporalCell`]
#[derive(Config, Debug)]
pub struct SpatioTemporalCellConfig {
    /// Channels of the frame or hidden state fed in from below
    pub in_channels: usize,
    /// Width of this layer's hidden and cell state
    pub num_hidden: usize,
    /// Width of the spatiotemporal memory shared by the whole stack
    pub memory_channels: usize,
    pub height: usize,
    pub width: usize,
    #[config(default = 3)]
    pub kernel_size: usize,
    #[config(default = 1)]
    pub stride: usize,
}

impl SpatioTemporalCellConfig {
    /// Check every dimension and that the gate projections keep the frame size.
    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("in_channels", self.in_channels),
            ("num_hidden", self.num_hidden),
            ("memory_channels", self.memory_channels),
            ("height", self.height),
            ("width", self.width),
            ("kernel_size", self.kernel_size),
            ("stride", self.stride),
        ];
        if let Some((name, _)) = dims.iter().find(|(_, value)| *value == 0) {
            return Err(invalid(format!("{} must be positive", name)));
        }

        let out_height = projected_len(self.height, self.kernel_size, self.stride);
        let out_width = projected_len(self.width, self.kernel_size, self.stride);
        if out_height != self.height || out_width != self.width {
            return Err(PredRnnError::SpatialMismatch {
                kernel_size: self.kernel_size,
                stride: self.stride,
                height: self.height,
                width: self.width,
                out_height,
                out_width,
            });
        }
        Ok(())
    }

    /// Validate the configuration and build the cell
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<SpatioTemporalCell<B>> {
        self.validate()?;

        let hidden = self.num_hidden;
        let memory = self.memory_channels;
        let projection = |in_channels: usize, out_channels: usize| {
            NormedConv2d::new(
                in_channels,
                out_channels,
                self.kernel_size,
                self.stride,
                [self.height, self.width],
                device,
            )
        };

        Ok(SpatioTemporalCell {
            conv_x: projection(self.in_channels, 4 * hidden + 3 * memory),
            conv_h: projection(hidden, 4 * hidden),
            conv_m: projection(memory, 3 * memory),
            conv_o: projection(hidden + memory, hidden),
            conv_last: Conv2dConfig::new([hidden + memory, hidden], [1, 1])
                .with_bias(false)
                .init(device),
            in_channels: self.in_channels,
            num_hidden: hidden,
            memory_channels: memory,
            height: self.height,
            width: self.width,
        })
    }
}

/// Spatial extent after a `kernel`/`stride` convolution padded by `kernel / 2`
pub(crate) fn projected_len(len: usize, kernel: usize, stride: usize) -> usize {
    let padded = len + 2 * (kernel / 2);
    padded.saturating_sub(kernel) / stride + 1
}

/// Bias-free convolution followed by layer normalization over `[C, H, W]`
///
/// The feature map is flattened so a single `LayerNorm` of width `C * H * W`
/// normalizes and scales every position of it.
#[derive(Module, Debug)]
pub struct NormedConv2d<B: Backend> {
    pub(crate) conv: Conv2d<B>,
    pub(crate) norm: LayerNorm<B>,
}

impl<B: Backend> NormedConv2d<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        [height, width]: [usize; 2],
        device: &B::Device,
    ) -> Self {
        let padding = kernel_size / 2;
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_bias(false)
            .init(device);

        Self {
            conv,
            norm: LayerNormConfig::new(out_channels * height * width).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let projected = self.conv.forward(x);
        let [batch, channels, height, width] = projected.dims();

        let flat = projected.reshape([batch, channels * height * width]);
        self.norm
            .forward(flat)
            .reshape([batch, channels, height, width])
    }
}

/// Everything one cell step produces
#[derive(Debug, Clone)]
pub struct CellOutput<B: Backend> {
    /// New hidden state `[batch, num_hidden, H, W]`
    pub hidden: Tensor<B, 4>,
    /// New cell state `[batch, num_hidden, H, W]`
    pub cell: Tensor<B, 4>,
    /// New spatiotemporal memory `[batch, memory_channels, H, W]`
    pub memory: Tensor<B, 4>,
    /// Gated cell-state increment `i ⊙ g`
    pub delta_c: Tensor<B, 4>,
    /// Gated memory increment `i' ⊙ g'`
    pub delta_m: Tensor<B, 4>,
}

/// Spatiotemporal LSTM cell (PredRNN v2)
///
/// Processes one time step of one layer. Sequence unrolling and the routing of
/// the spatiotemporal memory between layers live in [`crate::rnn::PredRnn`].
///
/// # Type Parameters
/// * `B` - The backend type
#[derive(Module, Debug)]
pub struct SpatioTemporalCell<B: Backend> {
    /// Input projection: `{i, f, g}` at hidden width, `{i', f', g'}` at memory width, `o`
    pub(crate) conv_x: NormedConv2d<B>,
    /// Hidden projection: `{i, f, g, o}`
    pub(crate) conv_h: NormedConv2d<B>,
    /// Memory projection: `{i', f', g'}`
    pub(crate) conv_m: NormedConv2d<B>,
    /// Output-gate contribution of `[C', M']`
    pub(crate) conv_o: NormedConv2d<B>,
    /// 1x1 fusion of `[C', M']` into the hidden state
    conv_last: Conv2d<B>,
    #[module(skip)]
    in_channels: usize,
    #[module(skip)]
    num_hidden: usize,
    #[module(skip)]
    memory_channels: usize,
    #[module(skip)]
    height: usize,
    #[module(skip)]
    width: usize,
}

impl<B: Backend> SpatioTemporalCell<B> {
    /// Get input channel count
    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    /// Get hidden width
    pub fn num_hidden(&self) -> usize {
        self.num_hidden
    }

    /// Get spatiotemporal memory width
    pub fn memory_channels(&self) -> usize {
        self.memory_channels
    }

    /// Get the `[height, width]` this cell was built for
    pub fn spatial_shape(&self) -> [usize; 2] {
        [self.height, self.width]
    }

    /// Perform one step of the cell
    ///
    /// # Arguments
    /// * `input` - Frame or hidden state from the layer below, `[batch, in_channels, H, W]`
    /// * `hidden` - Previous hidden state, `[batch, num_hidden, H, W]`
    /// * `cell` - Previous cell state, `[batch, num_hidden, H, W]`
    /// * `memory` - Incoming spatiotemporal memory, `[batch, memory_channels, H, W]`
    ///
    /// # Errors
    /// [`PredRnnError::ShapeMismatch`] if any tensor disagrees with the configured
    /// widths, the frame size, or the batch size of `input`.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
        hidden: Tensor<B, 4>,
        cell: Tensor<B, 4>,
        memory: Tensor<B, 4>,
    ) -> Result<CellOutput<B>> {
        let batch = input.dims()[0];
        self.check_shape("input", &input, batch, self.in_channels)?;
        self.check_shape("hidden state", &hidden, batch, self.num_hidden)?;
        self.check_shape("cell state", &cell, batch, self.num_hidden)?;
        self.check_shape("spatiotemporal memory", &memory, batch, self.memory_channels)?;

        let hid = self.num_hidden;
        let mem = self.memory_channels;

        let x_concat = self.conv_x.forward(input);
        let h_concat = self.conv_h.forward(hidden);
        let m_concat = self.conv_m.forward(memory.clone());

        let [i_x, f_x, g_x, i_x_prime, f_x_prime, g_x_prime, o_x] =
            split_channels(x_concat, [hid, hid, hid, mem, mem, mem, hid]);
        let [i_h, f_h, g_h, o_h] = split_channels(h_concat, [hid; 4]);
        let [i_m, f_m, g_m] = split_channels(m_concat, [mem; 3]);

        // Temporal memory
        let i_t = activation::sigmoid(i_x + i_h);
        let f_t = activation::sigmoid(f_x + f_h + FORGET_BIAS);
        let g_t = (g_x + g_h).tanh();

        let delta_c = i_t * g_t;
        let new_cell = f_t * cell + delta_c.clone();

        // Spatiotemporal memory
        let i_t_prime = activation::sigmoid(i_x_prime + i_m);
        let f_t_prime = activation::sigmoid(f_x_prime + f_m + FORGET_BIAS);
        let g_t_prime = activation::sigmoid(g_x_prime + g_m);

        let delta_m = i_t_prime * g_t_prime;
        let new_memory = f_t_prime * memory + delta_m.clone();

        let fused = Tensor::cat(vec![new_cell.clone(), new_memory.clone()], 1);
        let o_t = activation::sigmoid(o_x + o_h + self.conv_o.forward(fused.clone()));
        let new_hidden = o_t * self.conv_last.forward(fused).tanh();

        Ok(CellOutput {
            hidden: new_hidden,
            cell: new_cell,
            memory: new_memory,
            delta_c,
            delta_m,
        })
    }

    fn check_shape(
        &self,
        what: &'static str,
        tensor: &Tensor<B, 4>,
        batch: usize,
        channels: usize,
    ) -> Result<()> {
        let expected = [batch, channels, self.height, self.width];
        let actual = tensor.dims();
        if actual != expected {
            return Err(PredRnnError::ShapeMismatch {
                what,
                expected: expected.to_vec(),
                actual: actual.to_vec(),
            });
        }
        Ok(())
    }
}

/// Split along the channel axis into consecutive slices of the given widths
fn split_channels<B: Backend, const N: usize>(
    tensor: Tensor<B, 4>,
    widths: [usize; N],
) -> [Tensor<B, 4>; N] {
    let mut offset = 0;
    widths.map(|width| {
        let slice = tensor.clone().narrow(1, offset, width);
        offset += width;
        slice
    })
}

//! Stacked PredRNN v2 Predictor
//!
//! Unrolls a stack of spatiotemporal cells over a frame sequence. Hidden and
//! cell states move upward through the stack inside a time step and recur
//! along time inside each layer. The spatiotemporal memory is handed from
//! layer to layer and from the top of the stack at step `t` to the bottom at
//! step `t + 1`.

use crate::cells::{SpatioTemporalCell, SpatioTemporalCellConfig};
use crate::error::{invalid, PredRnnError, Result};
use crate::rnn::sampling::{InputSource, ScheduledSampling};
use burn::config::Config;
use burn::module::{Ignored, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::backend::Backend;
use burn::tensor::linalg::{vector_normalize, Norm};
use burn::tensor::Tensor;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Which increment feeds the memory-side decoupling feature of layers above the first
///
/// Layer 0 always projects `ΔM`. With `Cell`, layers `1..L` project `ΔC` for
/// both features, which leaves the decoupling loss nothing to compare on those
/// layers. `Memory` projects `ΔM` everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaMemorySource {
    /// Reuse `ΔC` for layers above the first
    Cell,
    /// Use `ΔM` on every layer
    Memory,
}

/// Configuration for [`PredRnn`]
#[derive(Config, Debug)]
pub struct PredRnnConfig {
    /// Number of stacked cells
    pub num_layers: usize,
    /// Hidden width of each layer, bottom first
    pub num_hidden: Vec<usize>,
    /// Frame sequence shape `[time, channels, height, width]`
    pub shape: [usize; 4],
    #[config(default = 3)]
    pub kernel_size: usize,
    #[config(default = 1)]
    pub stride: usize,
    /// Number of steps unrolled per forward pass
    #[config(default = 24)]
    pub seq_len: usize,
    #[config(default = "DeltaMemorySource::Cell")]
    pub delta_memory_source: DeltaMemorySource,
}

impl PredRnnConfig {
    /// Length of an input plus forecast window, `2 * seq_len`
    pub fn total_len(&self) -> usize {
        self.seq_len * 2
    }

    /// Validate the whole stack and derive one cell configuration per layer.
    ///
    /// Nothing is allocated here, so every configuration error surfaces
    /// before any tensor exists.
    pub fn cell_configs(&self) -> Result<Vec<SpatioTemporalCellConfig>> {
        if self.num_layers == 0 {
            return Err(invalid("num_layers must be positive"));
        }
        if self.num_hidden.len() != self.num_layers {
            return Err(PredRnnError::LayerCountMismatch {
                layers: self.num_layers,
                widths: self.num_hidden.len(),
            });
        }
        let [_, channels, height, width] = self.shape;
        if channels != 1 {
            return Err(invalid(format!(
                "frames must have a single channel, got {}",
                channels
            )));
        }

        let memory_channels = self.num_hidden[0];
        self.num_hidden
            .iter()
            .enumerate()
            .map(|(layer, &hidden)| {
                let in_channels = if layer == 0 { 1 } else { self.num_hidden[layer - 1] };
                let config = SpatioTemporalCellConfig::new(
                    in_channels,
                    hidden,
                    memory_channels,
                    height,
                    width,
                )
                .with_kernel_size(self.kernel_size)
                .with_stride(self.stride);
                config.validate()?;
                Ok(config)
            })
            .collect()
    }

    /// Validate without building
    pub fn validate(&self) -> Result<()> {
        self.cell_configs().map(|_| ())
    }

    /// Validate the configuration and build the model
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<PredRnn<B>> {
        let cell_configs = self.cell_configs()?;
        let memory_channels = self.num_hidden[0];
        let top = self.num_hidden[self.num_layers - 1];

        let cells = cell_configs
            .iter()
            .map(|config| config.init(device))
            .collect::<Result<Vec<_>>>()?;

        let cell_adapters = self
            .num_hidden
            .iter()
            .map(|&hidden| (hidden != memory_channels).then(|| delta_adapter(hidden, device)))
            .collect();

        let [_, _, height, width] = self.shape;
        log::debug!(
            "built PredRNN: {} layers, hidden {:?}, memory width {}, frame {}x{}, seq_len {}, delta source {:?}",
            self.num_layers,
            self.num_hidden,
            memory_channels,
            height,
            width,
            self.seq_len,
            self.delta_memory_source
        );

        Ok(PredRnn {
            cells,
            conv_last: Conv2dConfig::new([top, 1], [1, 1])
                .with_bias(false)
                .init(device),
            adapter: delta_adapter(memory_channels, device),
            cell_adapters,
            num_hidden: self.num_hidden.clone(),
            height,
            width,
            seq_len: self.seq_len,
            delta_memory_source: Ignored(self.delta_memory_source),
        })
    }
}

/// 1x1 projection padded by one pixel per side, so features grow to `(H+2)x(W+2)`
fn delta_adapter<B: Backend>(channels: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([channels, channels], [1, 1])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
        .init(device)
}

/// Result of [`PredRnn::forward_with_deltas`]
#[derive(Debug, Clone)]
pub struct PredRnnOutput<B: Backend> {
    /// Predicted frames `[batch, seq_len, 1, H, W]`
    pub frames: Tensor<B, 5>,
    /// Decoupling features of `ΔC`, indexed `[step][layer]`, each `[batch, hidden, (H+2)*(W+2)]`
    pub delta_c: Vec<Vec<Tensor<B, 3>>>,
    /// Decoupling features of the memory side, same layout as `delta_c`
    pub delta_m: Vec<Vec<Tensor<B, 3>>>,
}

/// PredRNN v2 sequence predictor
///
/// Owns a stack of [`SpatioTemporalCell`]s plus the 1x1 readout that turns the
/// top hidden state into a single-channel frame.
///
/// # Type Parameters
/// * `B` - The backend type
#[derive(Module, Debug)]
pub struct PredRnn<B: Backend> {
    /// One cell per layer, bottom first
    cells: Vec<SpatioTemporalCell<B>>,
    /// Readout from the top hidden state to one channel
    conv_last: Conv2d<B>,
    /// Delta projection at memory width, shared by every layer
    adapter: Conv2d<B>,
    /// Delta projection for layers whose width differs from the memory width
    cell_adapters: Vec<Option<Conv2d<B>>>,
    #[module(skip)]
    num_hidden: Vec<usize>,
    #[module(skip)]
    height: usize,
    #[module(skip)]
    width: usize,
    #[module(skip)]
    seq_len: usize,
    delta_memory_source: Ignored<DeltaMemorySource>,
}

impl<B: Backend> PredRnn<B> {
    /// Get number of layers
    pub fn num_layers(&self) -> usize {
        self.cells.len()
    }

    /// Get hidden widths, bottom first
    pub fn num_hidden(&self) -> &[usize] {
        &self.num_hidden
    }

    /// Get the spatiotemporal memory width (hidden width of layer 0)
    pub fn memory_channels(&self) -> usize {
        self.num_hidden[0]
    }

    /// Get number of unrolled steps
    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// Get the `[height, width]` of the frames
    pub fn spatial_shape(&self) -> [usize; 2] {
        [self.height, self.width]
    }

    pub fn delta_memory_source(&self) -> DeltaMemorySource {
        self.delta_memory_source.0
    }

    /// Choose which increment feeds the memory-side decoupling feature
    pub fn with_delta_memory_source(mut self, source: DeltaMemorySource) -> Self {
        self.delta_memory_source = Ignored(source);
        self
    }

    /// Set the number of unrolled steps
    pub fn with_seq_len(mut self, seq_len: usize) -> Self {
        self.seq_len = seq_len;
        self
    }

    /// Access the cell of one layer
    pub fn cell(&self, layer: usize) -> Option<&SpatioTemporalCell<B>> {
        self.cells.get(layer)
    }

    /// Predict one frame per step, sampling feedback with the thread-local RNG
    ///
    /// # Arguments
    /// * `frames` - Input sequence `[batch, time >= seq_len, 1, H, W]`
    /// * `ratio` - Probability of feeding back the previous prediction at steps `t > 0`
    ///
    /// # Returns
    /// Predicted sequence `[batch, seq_len, 1, H, W]`
    pub fn forward(&self, frames: Tensor<B, 5>, ratio: f64) -> Result<Tensor<B, 5>> {
        self.forward_with_rng(frames, ratio, &mut rand::thread_rng())
    }

    /// Same as [`forward`](Self::forward) with an explicit random source
    pub fn forward_with_rng<R: Rng + ?Sized>(
        &self,
        frames: Tensor<B, 5>,
        ratio: f64,
        rng: &mut R,
    ) -> Result<Tensor<B, 5>> {
        self.unroll(frames, ratio, rng, false).map(|output| output.frames)
    }

    /// Predict frames and also return the projected, L2-normalized increments
    /// consumed by the memory decoupling loss
    pub fn forward_with_deltas<R: Rng + ?Sized>(
        &self,
        frames: Tensor<B, 5>,
        ratio: f64,
        rng: &mut R,
    ) -> Result<PredRnnOutput<B>> {
        self.unroll(frames, ratio, rng, true)
    }

    fn unroll<R: Rng + ?Sized>(
        &self,
        frames: Tensor<B, 5>,
        ratio: f64,
        rng: &mut R,
        keep_deltas: bool,
    ) -> Result<PredRnnOutput<B>> {
        let sampling = ScheduledSampling::new(ratio)?;
        let [batch, time, channels, height, width] = frames.dims();
        if batch == 0
            || channels != 1
            || height != self.height
            || width != self.width
            || time < self.seq_len
        {
            return Err(PredRnnError::ShapeMismatch {
                what: "input sequence",
                expected: vec![batch.max(1), time.max(self.seq_len), 1, self.height, self.width],
                actual: vec![batch, time, channels, height, width],
            });
        }

        let device = frames.device();
        let mut hidden: Vec<Tensor<B, 4>> = self
            .num_hidden
            .iter()
            .map(|&width_i| Tensor::zeros([batch, width_i, height, width], &device))
            .collect();
        let mut cell = hidden.clone();
        let mut memory = Tensor::zeros([batch, self.memory_channels(), height, width], &device);

        let mut predictions = Vec::with_capacity(self.seq_len);
        let mut delta_c = Vec::new();
        let mut delta_m = Vec::new();
        let mut generated: Option<Tensor<B, 4>> = None;

        for t in 0..self.seq_len {
            let mut input = match generated.take() {
                Some(frame) if sampling.select(t, rng) == InputSource::Generated => {
                    log::trace!("step {}: feeding back previous prediction", t);
                    frame
                }
                _ => frames.clone().narrow(1, t, 1).squeeze::<4>(1),
            };

            let mut step_c = Vec::new();
            let mut step_m = Vec::new();

            for (layer, stage) in self.cells.iter().enumerate() {
                let out = stage.forward(input, hidden[layer].clone(), cell[layer].clone(), memory)?;
                memory = out.memory;

                if keep_deltas {
                    let memory_delta = match self.delta_memory_source.0 {
                        DeltaMemorySource::Cell if layer > 0 => out.delta_c.clone(),
                        _ => out.delta_m,
                    };
                    step_c.push(self.project_delta(layer, out.delta_c));
                    step_m.push(self.project_delta(layer, memory_delta));
                }

                hidden[layer] = out.hidden;
                cell[layer] = out.cell;
                input = hidden[layer].clone();
            }

            let prediction = self.conv_last.forward(input);
            predictions.push(prediction.clone());
            generated = Some(prediction);

            if keep_deltas {
                delta_c.push(step_c);
                delta_m.push(step_m);
            }
        }

        let frames = if predictions.is_empty() {
            Tensor::zeros([batch, 0, 1, height, width], &device)
        } else {
            Tensor::stack(predictions, 1)
        };

        Ok(PredRnnOutput {
            frames,
            delta_c,
            delta_m,
        })
    }

    /// Project an increment through its adapter and L2-normalize each
    /// `(sample, channel)` row over the flattened spatial axis
    fn project_delta(&self, layer: usize, delta: Tensor<B, 4>) -> Tensor<B, 3> {
        let adapter = match &self.cell_adapters[layer] {
            Some(adapter) if delta.dims()[1] != self.memory_channels() => adapter,
            _ => &self.adapter,
        };
        let projected = adapter.forward(delta);
        let [batch, channels, height, width] = projected.dims();
        let flat = projected.reshape([batch, channels, height * width]);
        vector_normalize(flat, Norm::L2, 2, 1e-12)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::backend::Backend as BurnBackend;

    type TestBackend = NdArray<f32>;
    type TestDevice = <TestBackend as BurnBackend>::Device;

    fn get_test_device() -> TestDevice {
        Default::default()
    }

    #[test]
    fn test_predrnn_creation() {
        let device = get_test_device();
        let model = PredRnnConfig::new(3, vec![8, 8, 8], [6, 1, 10, 12])
            .with_seq_len(6)
            .init::<TestBackend>(&device)
            .unwrap();

        assert_eq!(model.num_layers(), 3);
        assert_eq!(model.num_hidden(), &[8, 8, 8]);
        assert_eq!(model.memory_channels(), 8);
        assert_eq!(model.seq_len(), 6);
        assert_eq!(model.spatial_shape(), [10, 12]);
        assert_eq!(model.delta_memory_source(), DeltaMemorySource::Cell);
    }

    #[test]
    fn test_memory_width_follows_first_layer() {
        let device = get_test_device();
        let model = PredRnnConfig::new(3, vec![4, 8, 6], [4, 1, 6, 6])
            .init::<TestBackend>(&device)
            .unwrap();

        for layer in 0..3 {
            assert_eq!(model.cell(layer).unwrap().memory_channels(), 4);
        }
        assert_eq!(model.cell(1).unwrap().in_channels(), 4);
        assert_eq!(model.cell(2).unwrap().in_channels(), 8);
        assert!(model.cell(3).is_none());
    }

    #[test]
    fn test_total_len() {
        let config = PredRnnConfig::new(1, vec![4], [10, 1, 8, 8]).with_seq_len(10);
        assert_eq!(config.total_len(), 20);
    }

    #[test]
    fn test_layer_count_mismatch() {
        let err = PredRnnConfig::new(2, vec![8], [4, 1, 8, 8]).validate().unwrap_err();
        assert_eq!(err, PredRnnError::LayerCountMismatch { layers: 2, widths: 1 });
    }

    #[test]
    fn test_zero_layers_rejected() {
        let err = PredRnnConfig::new(0, vec![], [4, 1, 8, 8]).validate().unwrap_err();
        assert!(matches!(err, PredRnnError::InvalidConfig(_)));
    }

    #[test]
    fn test_multi_channel_frames_rejected() {
        let err = PredRnnConfig::new(1, vec![8], [4, 3, 8, 8]).validate().unwrap_err();
        assert!(matches!(err, PredRnnError::InvalidConfig(_)));
    }

    #[test]
    fn test_delta_source_builder() {
        let device = get_test_device();
        let model = PredRnnConfig::new(1, vec![4], [2, 1, 4, 4])
            .init::<TestBackend>(&device)
            .unwrap()
            .with_delta_memory_source(DeltaMemorySource::Memory);

        assert_eq!(model.delta_memory_source(), DeltaMemorySource::Memory);
    }

    /// Unroll the cells by hand, optionally dropping the memory between steps
    fn unroll_by_hand(
        model: &PredRnn<TestBackend>,
        frames: Tensor<TestBackend, 5>,
        reset_memory_each_step: bool,
    ) -> Tensor<TestBackend, 5> {
        let device = get_test_device();
        let [batch, steps, _, height, width] = frames.dims();
        let zeros = |channels| Tensor::<TestBackend, 4>::zeros([batch, channels, height, width], &device);

        let mut hidden: Vec<_> = model.num_hidden().iter().map(|&w| zeros(w)).collect();
        let mut cell = hidden.clone();
        let mut memory = zeros(model.memory_channels());
        let mut predictions = Vec::new();

        for t in 0..steps {
            if reset_memory_each_step {
                memory = zeros(model.memory_channels());
            }
            let mut input = frames.clone().narrow(1, t, 1).squeeze::<4>(1);
            for layer in 0..model.num_layers() {
                let out = model.cells[layer]
                    .forward(input, hidden[layer].clone(), cell[layer].clone(), memory)
                    .unwrap();
                memory = out.memory;
                hidden[layer] = out.hidden;
                cell[layer] = out.cell;
                input = hidden[layer].clone();
            }
            predictions.push(model.conv_last.forward(input));
        }
        Tensor::stack(predictions, 1)
    }

    fn max_gap(a: Tensor<TestBackend, 5>, b: Tensor<TestBackend, 5>) -> f32 {
        (a - b).abs().max().into_scalar()
    }

    #[test]
    fn test_memory_flows_from_top_layer_to_next_step() {
        let device = get_test_device();
        let model = PredRnnConfig::new(2, vec![4, 4], [3, 1, 6, 6])
            .with_seq_len(3)
            .init::<TestBackend>(&device)
            .unwrap();
        let frames = Tensor::<TestBackend, 5>::random(
            [2, 3, 1, 6, 6],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );

        let predicted = model.forward(frames.clone(), 0.0).unwrap();

        let threaded = unroll_by_hand(&model, frames.clone(), false);
        assert!(max_gap(predicted.clone(), threaded) < 1e-6);

        // Dropping the memory between steps must change the forecast
        let reset = unroll_by_hand(&model, frames, true);
        assert!(max_gap(predicted, reset) > 1e-5);
    }

    #[test]
    fn test_gradients_reach_cell_parameters() {
        use burn::backend::Autodiff;
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        type AutodiffBackend = Autodiff<TestBackend>;

        let device = get_test_device();
        let model = PredRnnConfig::new(2, vec![4, 6], [3, 1, 5, 5])
            .with_seq_len(3)
            .with_delta_memory_source(DeltaMemorySource::Memory)
            .init::<AutodiffBackend>(&device)
            .unwrap();
        let frames = Tensor::<AutodiffBackend, 5>::random(
            [2, 3, 1, 5, 5],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );

        let output = model
            .forward_with_deltas(frames.clone(), 0.0, &mut StdRng::seed_from_u64(0))
            .unwrap();

        // Reconstruction plus |cos(ΔC, ΔM)| on every step and layer
        let mut loss = (output.frames - frames).powf_scalar(2.0).mean();
        for (step_c, step_m) in output.delta_c.into_iter().zip(output.delta_m) {
            for (c, m) in step_c.into_iter().zip(step_m) {
                if c.dims() == m.dims() {
                    loss = loss + (c * m).sum_dim(2).abs().mean();
                }
            }
        }
        let grads = loss.backward();

        let first = &model.cells[0];
        assert!(first.conv_x.norm.gamma.grad(&grads).is_some());
        assert!(first.conv_m.conv.weight.grad(&grads).is_some());
        assert!(model.cells[1].conv_h.conv.weight.grad(&grads).is_some());
        assert!(model.adapter.weight.grad(&grads).is_some());
        assert!(model.conv_last.weight.grad(&grads).is_some());
    }
}

//! Basic usage example of PredRNN
//!
//! Builds a small two-layer predictor, runs it with and without scheduled
//! sampling, and inspects the memory decoupling features.
//!
//! Run with `RUST_LOG=debug cargo run --example basic` to see construction logs.

use burn::backend::NdArray;
use burn::tensor::{Distribution, Tensor};
use predrnn::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn main() -> predrnn::Result<()> {
    env_logger::init();

    println!("=== PredRNN Basic Example ===\n");

    // Use the NdArray backend (CPU)
    type Backend = NdArray<f32>;
    let device = Default::default();

    // Example 1: Teacher-forced prediction
    println!("Example 1: Teacher forcing");
    let config = PredRnnConfig::new(2, vec![16, 16], [8, 1, 24, 24]).with_seq_len(8);
    let model = config.init::<Backend>(&device)?;

    println!("Created PredRNN:");
    println!("  Layers: {}", model.num_layers());
    println!("  Hidden widths: {:?}", model.num_hidden());
    println!("  Memory width: {}", model.memory_channels());
    println!();

    // Input shape: [batch=2, time=8, channels=1, height=24, width=24]
    let frames = Tensor::<Backend, 5>::random(
        [2, 8, 1, 24, 24],
        Distribution::Uniform(0.0, 1.0),
        &device,
    );

    let predicted = model.forward(frames.clone(), 0.0)?;
    println!("  Input shape:  [2, 8, 1, 24, 24]");
    println!("  Output shape: {:?}", predicted.dims());
    println!();

    // Example 2: Reproducible scheduled sampling
    println!("Example 2: Scheduled sampling with ratio 0.5");
    let mut rng = StdRng::seed_from_u64(42);
    let sampled = model.forward_with_rng(frames.clone(), 0.5, &mut rng)?;
    let drift = (sampled - predicted).abs().mean().into_scalar();
    println!("  Mean drift from teacher forcing: {:.6}", drift);
    println!();

    // Example 3: Decoupling features for an auxiliary loss
    println!("Example 3: Memory decoupling features");
    let output = model
        .with_delta_memory_source(DeltaMemorySource::Memory)
        .forward_with_deltas(frames, 0.0, &mut rng)?;

    let c = output.delta_c[0][0].clone();
    let m = output.delta_m[0][0].clone();
    println!("  Feature shape: {:?}", c.dims());
    let similarity = (c * m).sum_dim(2).abs().mean().into_scalar();
    println!("  Mean |cos(ΔC, ΔM)| at step 0, layer 0: {:.6}", similarity);

    Ok(())
}

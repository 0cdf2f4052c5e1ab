//! Integration tests for the spatiotemporal LSTM cell

use burn::backend::NdArray;
use burn::tensor::{Distribution, Tensor};
use predrnn::cells::{SpatioTemporalCell, SpatioTemporalCellConfig};

type Backend = NdArray<f32>;

fn create_test_cell(in_channels: usize, hidden: usize, memory: usize) -> SpatioTemporalCell<Backend> {
    let device = Default::default();
    SpatioTemporalCellConfig::new(in_channels, hidden, memory, 8, 8)
        .init(&device)
        .unwrap()
}

fn random(dims: [usize; 4]) -> Tensor<Backend, 4> {
    Tensor::random(dims, Distribution::Uniform(-2.0, 2.0), &Default::default())
}

fn values(tensor: Tensor<Backend, 4>) -> Vec<f32> {
    tensor.into_data().to_vec().unwrap()
}

#[test]
fn test_output_widths() {
    let cell = create_test_cell(4, 6, 3);

    let out = cell
        .forward(random([2, 4, 8, 8]), random([2, 6, 8, 8]), random([2, 6, 8, 8]), random([2, 3, 8, 8]))
        .unwrap();

    assert_eq!(out.hidden.dims(), [2, 6, 8, 8]);
    assert_eq!(out.cell.dims(), [2, 6, 8, 8]);
    assert_eq!(out.memory.dims(), [2, 3, 8, 8]);
    assert_eq!(out.delta_c.dims(), [2, 6, 8, 8]);
    assert_eq!(out.delta_m.dims(), [2, 3, 8, 8]);
}

#[test]
fn test_gate_products_are_bounded() {
    let cell = create_test_cell(1, 8, 8);

    let out = cell
        .forward(random([2, 1, 8, 8]), random([2, 8, 8, 8]), random([2, 8, 8, 8]), random([2, 8, 8, 8]))
        .unwrap();

    // h = sigmoid * tanh, ΔC = sigmoid * tanh
    for v in values(out.hidden).into_iter().chain(values(out.delta_c)) {
        assert!(v > -1.0 && v < 1.0, "value {} outside (-1, 1)", v);
    }
    // ΔM = sigmoid * sigmoid
    for v in values(out.delta_m) {
        assert!(v > 0.0 && v < 1.0, "value {} outside (0, 1)", v);
    }
}

#[test]
fn test_zero_state_increments() {
    let cell = create_test_cell(1, 4, 4);
    let zeros = |c| Tensor::<Backend, 4>::zeros([1, c, 8, 8], &Default::default());

    let out = cell
        .forward(random([1, 1, 8, 8]), zeros(4), zeros(4), zeros(4))
        .unwrap();

    // With zero previous states the new states are exactly the increments
    let cell_gap = (out.cell - out.delta_c).abs().max().into_scalar();
    let memory_gap = (out.memory - out.delta_m).abs().max().into_scalar();
    assert!(cell_gap < 1e-6);
    assert!(memory_gap < 1e-6);
}

#[test]
fn test_all_zero_inputs() {
    let cell = create_test_cell(1, 4, 4);
    let zeros = |c| Tensor::<Backend, 4>::zeros([1, c, 8, 8], &Default::default());

    let out = cell.forward(zeros(1), zeros(4), zeros(4), zeros(4)).unwrap();

    // Normalized projections of zero are zero, so every gate sits at its bias:
    // i = 0.5, g = tanh(0) = 0, i' = g' = 0.5
    assert!(values(out.delta_c).iter().all(|v| v.abs() < 1e-6));
    assert!(values(out.delta_m).iter().all(|v| (v - 0.25).abs() < 1e-6));
    assert!(values(out.hidden).iter().all(|v| v.is_finite()));
}

#[test]
fn test_forget_gate_retains_cell_state() {
    let cell = create_test_cell(1, 4, 4);
    let device = Default::default();
    let zeros = |c| Tensor::<Backend, 4>::zeros([1, c, 8, 8], &device);
    let previous = Tensor::<Backend, 4>::full([1, 4, 8, 8], 10.0, &device);

    let out = cell
        .forward(zeros(1), zeros(4), previous, zeros(4))
        .unwrap();

    // Zero input and hidden projections leave f = sigmoid(1)
    let retained = 10.0 / (1.0 + (-1.0f32).exp());
    for v in values(out.cell) {
        assert!((v - retained).abs() < 1e-4);
    }
    for v in values(out.memory) {
        assert!((v - 0.25).abs() < 1e-4);
    }
}

#[test]
fn test_rejects_wrong_input_channels() {
    let cell = create_test_cell(1, 4, 4);

    let result = cell.forward(random([1, 2, 8, 8]), random([1, 4, 8, 8]), random([1, 4, 8, 8]), random([1, 4, 8, 8]));
    assert!(result.is_err());
}

#[test]
fn test_rejects_wrong_spatial_size() {
    let cell = create_test_cell(1, 4, 4);

    let result = cell.forward(random([1, 1, 8, 8]), random([1, 4, 8, 8]), random([1, 4, 8, 8]), random([1, 4, 7, 8]));
    assert!(result.is_err());
}

//! Scheduled sampling for autoregressive unrolling
//!
//! At every step after the first, the predictor chooses between the
//! ground-truth frame and its own previous prediction. The choice is an
//! independent Bernoulli draw with success probability `ratio`, taken from a
//! caller-supplied random source so the branch can be forced in tests.

use crate::error::{PredRnnError, Result};
use rand::Rng;

/// Where the input frame of a time step comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    /// The observed frame at this time step
    GroundTruth,
    /// The model's prediction from the previous time step
    Generated,
}

/// Bernoulli input selection with a fixed self-feedback probability
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSampling {
    ratio: f64,
}

impl ScheduledSampling {
    /// Create a sampler.
    ///
    /// `ratio = 0` always feeds ground truth, `ratio = 1` always feeds the
    /// model's own prediction.
    ///
    /// # Errors
    /// [`PredRnnError::InvalidRatio`] if `ratio` is NaN or outside `[0, 1]`.
    pub fn new(ratio: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(PredRnnError::InvalidRatio(ratio));
        }
        Ok(Self { ratio })
    }

    /// Probability of feeding back the generated frame
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Choose the input source for `step`.
    ///
    /// Step 0 has no prediction to feed back and never consumes randomness.
    pub fn select<R: Rng + ?Sized>(&self, step: usize, rng: &mut R) -> InputSource {
        if step == 0 {
            return InputSource::GroundTruth;
        }
        if rng.gen::<f64>() < self.ratio {
            InputSource::Generated
        } else {
            InputSource::GroundTruth
        }
    }
}

impl Default for ScheduledSampling {
    fn default() -> Self {
        Self { ratio: 0.0 }
    }
}

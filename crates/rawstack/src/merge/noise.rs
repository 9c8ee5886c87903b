//! Signal-dependent noise model and the robustness function built on it.

use serde::{Deserialize, Serialize};

/// Shot + read noise in the normalized (black-subtracted) domain:
/// `sigma^2 = read_noise^2 + shot_slope * signal`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, derivative::Derivative)]
#[derivative(Default)]
#[serde(deny_unknown_fields, default)]
pub struct NoiseModel {
    #[derivative(Default(value = "1.0"))]
    pub read_noise: f32,
    #[derivative(Default(value = "0.5"))]
    pub shot_slope: f32,
}

const MIN_SIGMA: f32 = 1e-3;

impl NoiseModel {
    pub fn sigma(&self, signal: f32) -> f32 {
        (self.read_noise * self.read_noise + self.shot_slope * signal.max(0.0))
            .sqrt()
            .max(MIN_SIGMA)
    }

    /// Expected sigma of the difference between the reference and an
    /// alternate whose samples were scaled by `gain` into the reference
    /// exposure.
    pub fn sigma_difference(&self, signal: f32, gain: f32) -> f32 {
        self.sigma(signal) * (1.0 + gain * gain).sqrt()
    }
}

/// Monotonically decreasing weight over the normalized sample distance:
/// full weight inside `threshold` sigmas, a smooth Hermite falloff, and
/// exactly zero at `falloff` sigmas and beyond.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, derivative::Derivative)]
#[derivative(Default)]
#[serde(deny_unknown_fields, default)]
pub struct Robustness {
    #[derivative(Default(value = "2.0"))]
    pub threshold: f32,
    #[derivative(Default(value = "4.0"))]
    pub falloff: f32,
}

impl Robustness {
    pub fn weight(&self, sigmas: f32) -> f32 {
        let falloff = self.falloff.max(self.threshold + f32::EPSILON);
        if sigmas <= self.threshold {
            1.0
        } else if sigmas >= falloff {
            0.0
        } else {
            let t = (falloff - sigmas) / (falloff - self.threshold);
            t * t * (3.0 - 2.0 * t)
        }
    }
}

//! Robust burst merge.
//!
//! Both variants consume the reference, the aligned alternates and their
//! alignment maps, and emit one merged mosaic in the reference's domain:
//! black-subtracted, at the reference exposure, native resolution. With no
//! alternates the output reproduces the reference bitwise once
//! requantized.

use {
    crate::{align::AlignmentMap, burst::Burst, compute::ComputeContext, frame::Frame},
    serde::{Deserialize, Serialize},
};

pub mod frequency;
pub mod noise;
pub mod spatial;

pub use {
    frequency::FrequencyMerge,
    noise::{NoiseModel, Robustness},
    spatial::SpatialMerge,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeVariant {
    #[default]
    Spatial,
    Frequency,
}

#[derive(Debug, Clone, Serialize, Deserialize, derivative::Derivative)]
#[derivative(Default)]
#[serde(deny_unknown_fields, default)]
pub struct MergeOptions {
    pub variant: MergeVariant,
    pub noise: NoiseModel,
    pub robustness: Robustness,
    /// Frequency-variant tile side, a power of two.
    #[derivative(Default(value = "16"))]
    pub tile_size: usize,
    /// Frequency-variant shrinkage constant; larger values trust the
    /// alternates less.
    #[derivative(Default(value = "8.0"))]
    pub shrinkage: f32,
}

/// Merged values plus dimensions; 32-bit storage carries the accumulation
/// headroom until the assembly stage requantizes to 16 bits.
#[derive(Debug, Clone)]
pub struct MergedMosaic {
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
}

/// The two merge implementations behind one capability.
#[derive(Debug)]
pub enum Merger {
    Spatial(SpatialMerge),
    Frequency(FrequencyMerge),
}

impl Merger {
    pub fn from_options(options: &MergeOptions) -> Self {
        match options.variant {
            MergeVariant::Spatial => Self::Spatial(SpatialMerge {
                noise: options.noise,
                robustness: options.robustness,
            }),
            MergeVariant::Frequency => Self::Frequency(FrequencyMerge {
                noise: options.noise,
                tile_size: options.tile_size.next_power_of_two().max(4),
                shrinkage: options.shrinkage,
            }),
        }
    }

    /// `maps` holds one entry per alternate frame, in burst order.
    #[tracing::instrument(skip_all, fields(frames = burst.len()))]
    pub fn merge(&self, ctx: &ComputeContext, burst: &Burst, maps: &[AlignmentMap]) -> MergedMosaic {
        match self {
            Self::Spatial(merge) => merge.merge(ctx, burst, maps),
            Self::Frequency(merge) => merge.merge(ctx, burst, maps),
        }
    }
}

/// The merge input domain: black-subtracted samples scaled into the
/// reference's exposure. The reference itself maps exactly (gain 1.0).
pub(crate) fn normalized_mosaic(frame: &Frame, exposure_gain: f64) -> Vec<f32> {
    let gain = exposure_gain as f32;
    let width = frame.meta.width;
    frame
        .samples()
        .iter()
        .enumerate()
        .map(|(index, sample)| {
            let (col, row) = (index % width, index / width);
            (f32::from(*sample) - frame.meta.black_level_at(col, row)) * gain
        })
        .collect()
}

/// Per-alternate sampling context shared by both variants.
pub(crate) struct AlternateView<'a> {
    pub frame: &'a Frame,
    pub map: &'a AlignmentMap,
    pub gain: f32,
}

pub(crate) fn alternate_views<'a>(burst: &'a Burst, maps: &'a [AlignmentMap]) -> Vec<AlternateView<'a>> {
    burst
        .alternates()
        .zip(maps)
        .map(|((_, frame), map)| AlternateView {
            frame: frame.as_ref(),
            map,
            gain: frame.meta.exposure_gain_to(&burst.reference().meta) as f32,
        })
        .collect()
}

impl AlternateView<'_> {
    /// Black-subtracted, exposure-scaled sample at `(col, row) + d`, or
    /// `None` when the displaced coordinate leaves the frame.
    pub fn sample_displaced(&self, col: usize, row: usize) -> Option<f32> {
        let displacement = self.map.displacement_at(col, row);
        let alt_col = col as i64 + i64::from(displacement.dx);
        let alt_row = row as i64 + i64::from(displacement.dy);
        (alt_col >= 0
            && alt_row >= 0
            && (alt_col as usize) < self.frame.meta.width
            && (alt_row as usize) < self.frame.meta.height)
            .then(|| {
                let (col, row) = (alt_col as usize, alt_row as usize);
                (f32::from(self.frame.sample(col, row)) - self.frame.meta.black_level_at(col, row))
                    * self.gain
            })
    }
}

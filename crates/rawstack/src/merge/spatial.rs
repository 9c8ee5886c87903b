//! Temporal weighted average with per-pixel robustness.

use {
    super::{alternate_views, normalized_mosaic, MergedMosaic, NoiseModel, Robustness},
    crate::{align::AlignmentMap, burst::Burst, compute::ComputeContext},
    rayon::prelude::*,
};

#[derive(Debug, Clone, Copy)]
pub struct SpatialMerge {
    pub noise: NoiseModel,
    pub robustness: Robustness,
}

impl SpatialMerge {
    pub fn merge(&self, ctx: &ComputeContext, burst: &Burst, maps: &[AlignmentMap]) -> MergedMosaic {
        let reference = burst.reference();
        let (width, height) = (reference.meta.width, reference.meta.height);
        let base = normalized_mosaic(reference, 1.0);
        let alternates = alternate_views(burst, maps);

        let mut data = vec![0.0f32; width * height];
        ctx.run(|| {
            data.par_chunks_mut(width)
                .enumerate()
                .for_each(|(row, out_row)| {
                    for (col, out) in out_row.iter_mut().enumerate() {
                        let reference_value = base[row * width + col];
                        let mut accumulated = reference_value;
                        let mut weight_sum = 1.0f32;
                        for alternate in &alternates {
                            let Some(value) = alternate.sample_displaced(col, row) else {
                                continue;
                            };
                            let sigma = self.noise.sigma_difference(reference_value, alternate.gain);
                            let weight = self
                                .robustness
                                .weight((value - reference_value).abs() / sigma);
                            accumulated += weight * value;
                            weight_sum += weight;
                        }
                        *out = accumulated / weight_sum;
                    }
                })
        });
        MergedMosaic { data, width, height }
    }
}

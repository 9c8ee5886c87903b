//! Frequency-domain merge: per-tile DFTs with Wiener-style shrinkage and
//! windowed overlap-add synthesis.

use {
    super::{alternate_views, AlternateView, MergedMosaic, NoiseModel},
    crate::{align::AlignmentMap, burst::Burst, compute::ComputeContext, frame::Frame},
    rayon::prelude::*,
    rustfft::{num_complex::Complex, Fft, FftPlanner},
    std::{f64::consts::PI, sync::Arc},
};

#[derive(Debug, Clone)]
pub struct FrequencyMerge {
    pub noise: NoiseModel,
    /// Tile side, a power of two.
    pub tile_size: usize,
    /// Wiener shrinkage constant `c`; larger trusts the alternates less.
    pub shrinkage: f32,
}

/// One horizontal strip of overlap-add output, `tile_size` rows tall.
struct Band {
    y0: usize,
    rows: usize,
    values: Vec<f64>,
    window_sq: Vec<f64>,
}

struct TileScratch {
    reference: Vec<Complex<f64>>,
    alternate: Vec<Complex<f64>>,
    numerator: Vec<Complex<f64>>,
    denominator: Vec<f64>,
    column: Vec<Complex<f64>>,
    fft: Vec<Complex<f64>>,
}

impl TileScratch {
    fn new(tile_size: usize, fft_scratch: usize) -> Self {
        let cells = tile_size * tile_size;
        Self {
            reference: vec![Complex::default(); cells],
            alternate: vec![Complex::default(); cells],
            numerator: vec![Complex::default(); cells],
            denominator: vec![0.0; cells],
            column: vec![Complex::default(); tile_size],
            fft: vec![Complex::default(); fft_scratch],
        }
    }
}

/// In-place 2-D transform of a square tile: rows, then columns.
fn fft_2d(
    buffer: &mut [Complex<f64>],
    size: usize,
    fft: &Arc<dyn Fft<f64>>,
    column: &mut [Complex<f64>],
    fft_scratch: &mut [Complex<f64>],
) {
    fft.process_with_scratch(buffer, fft_scratch);
    for col in 0..size {
        for row in 0..size {
            column[row] = buffer[row * size + col];
        }
        fft.process_with_scratch(column, fft_scratch);
        for row in 0..size {
            buffer[row * size + col] = column[row];
        }
    }
}

fn normalized_sample(frame: &Frame, col: usize, row: usize, gain: f64) -> f64 {
    (f64::from(frame.sample(col, row)) - f64::from(frame.meta.black_level_at(col, row))) * gain
}

impl FrequencyMerge {
    pub fn merge(&self, ctx: &ComputeContext, burst: &Burst, maps: &[AlignmentMap]) -> MergedMosaic {
        let reference = burst.reference();
        let (width, height) = (reference.meta.width, reference.meta.height);
        let tile = self.tile_size;
        let stride = (tile / 2).max(1);
        let tiles_x = width.div_ceil(stride);
        let tiles_y = height.div_ceil(stride);
        let alternates = alternate_views(burst, maps);

        // offset Hann: strictly positive everywhere, so the window-square
        // sum never vanishes at the image border
        let window: Vec<f64> = (0..tile)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * (i as f64 + 0.5) / tile as f64).cos())
            .collect();
        let window_sq_sum: f64 = window.iter().map(|w| w * w).sum();
        let noise_gain_2d = window_sq_sum * window_sq_sum;

        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(tile);
        let inverse = planner.plan_fft_inverse(tile);
        let fft_scratch = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        let bands: Vec<Band> = ctx.run(|| {
            (0..tiles_y)
                .into_par_iter()
                .map_init(
                    || TileScratch::new(tile, fft_scratch),
                    |scratch, ty| {
                        self.merge_band(
                            ty * stride,
                            reference,
                            &alternates,
                            &window,
                            noise_gain_2d,
                            &forward,
                            &inverse,
                            scratch,
                            stride,
                            tiles_x,
                        )
                    },
                )
                .collect()
        });

        // overlap-add, then divide by the accumulated window square
        let mut values = vec![0.0f64; width * height];
        let mut window_acc = vec![0.0f64; width * height];
        for band in bands {
            for row in 0..band.rows {
                let target = (band.y0 + row) * width;
                for col in 0..width {
                    values[target + col] += band.values[row * width + col];
                    window_acc[target + col] += band.window_sq[row * width + col];
                }
            }
        }
        MergedMosaic {
            data: values
                .iter()
                .zip(&window_acc)
                .map(|(value, weight)| (value / weight) as f32)
                .collect(),
            width,
            height,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn merge_band(
        &self,
        y0: usize,
        reference: &Frame,
        alternates: &[AlternateView<'_>],
        window: &[f64],
        noise_gain_2d: f64,
        forward: &Arc<dyn Fft<f64>>,
        inverse: &Arc<dyn Fft<f64>>,
        scratch: &mut TileScratch,
        stride: usize,
        tiles_x: usize,
    ) -> Band {
        let (width, height) = (reference.meta.width, reference.meta.height);
        let tile = self.tile_size;
        let cells = tile * tile;
        let rows = tile.min(height - y0);
        let mut band = Band {
            y0,
            rows,
            values: vec![0.0; rows * width],
            window_sq: vec![0.0; rows * width],
        };

        for tx in 0..tiles_x {
            let x0 = tx * stride;

            // windowed reference tile, clamp-padded past the image edge
            let mut tile_mean = 0.0f64;
            for i in 0..tile {
                let row = (y0 + i).min(height - 1);
                for j in 0..tile {
                    let col = (x0 + j).min(width - 1);
                    let value = normalized_sample(reference, col, row, 1.0);
                    tile_mean += value;
                    scratch.reference[i * tile + j] = Complex::new(value * window[i] * window[j], 0.0);
                }
            }
            tile_mean /= cells as f64;
            fft_2d(
                &mut scratch.reference,
                tile,
                forward,
                &mut scratch.column,
                &mut scratch.fft,
            );

            scratch.numerator.copy_from_slice(&scratch.reference);
            scratch.denominator.fill(1.0);

            for alternate in alternates {
                let center_col = (x0 + tile / 2).min(width - 1);
                let center_row = (y0 + tile / 2).min(height - 1);
                let displacement = alternate.map.displacement_at(center_col, center_row);
                let gain = f64::from(alternate.gain);
                for i in 0..tile {
                    let row = (y0 as i64 + i as i64 + i64::from(displacement.dy))
                        .clamp(0, height as i64 - 1) as usize;
                    for j in 0..tile {
                        let col = (x0 as i64 + j as i64 + i64::from(displacement.dx))
                            .clamp(0, width as i64 - 1) as usize;
                        scratch.alternate[i * tile + j] = Complex::new(
                            normalized_sample(alternate.frame, col, row, gain) * window[i] * window[j],
                            0.0,
                        );
                    }
                }
                fft_2d(
                    &mut scratch.alternate,
                    tile,
                    forward,
                    &mut scratch.column,
                    &mut scratch.fft,
                );

                let sigma = f64::from(
                    self.noise
                        .sigma_difference(tile_mean as f32, alternate.gain),
                );
                let noise_power =
                    (f64::from(self.shrinkage) * sigma * sigma * noise_gain_2d).max(f64::MIN_POSITIVE);
                for bin in 0..cells {
                    let difference = scratch.reference[bin] - scratch.alternate[bin];
                    let difference_sq = difference.norm_sqr();
                    let shrink = difference_sq / (difference_sq + noise_power);
                    scratch.numerator[bin] += scratch.alternate[bin] * (1.0 - shrink);
                    scratch.denominator[bin] += 1.0 - shrink;
                }
            }

            for bin in 0..cells {
                scratch.alternate[bin] = scratch.numerator[bin] / scratch.denominator[bin];
            }
            fft_2d(
                &mut scratch.alternate,
                tile,
                inverse,
                &mut scratch.column,
                &mut scratch.fft,
            );
            let scale = 1.0 / cells as f64;

            for i in 0..rows {
                for j in 0..tile {
                    let col = x0 + j;
                    if col >= width {
                        break;
                    }
                    let weight = window[i] * window[j];
                    band.values[i * width + col] +=
                        scratch.alternate[i * tile + j].re * scale * weight;
                    band.window_sq[i * width + col] += weight * weight;
                }
            }
        }
        band
    }
}

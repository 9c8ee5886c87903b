//! Hierarchical tile alignment.
//!
//! Coarse-to-fine block matching over the exposure-normalized pyramids:
//! every level partitions the reference into half-overlapping square tiles,
//! seeds each tile with the upsampled displacement of its parent tile and
//! refines it by exhaustive integer search, scored by the sum of absolute
//! differences. Alignment never fails: a textureless tile simply keeps its
//! seed and the merge robustness absorbs the residual.

use {
    crate::{
        burst::Burst,
        compute::ComputeContext,
        pyramid::{normalized_plane, Plane, Pyramid},
    },
    rayon::prelude::*,
    serde::{Deserialize, Serialize},
};

/// Per-level tile sizes and search radii, coarsest level first. The values
/// are tuning, not contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlignSchedule {
    pub tile_sizes: Vec<usize>,
    pub search_radii: Vec<usize>,
}

impl Default for AlignSchedule {
    fn default() -> Self {
        Self {
            tile_sizes: vec![16, 16, 16, 8],
            search_radii: vec![1, 4, 4, 4],
        }
    }
}

impl AlignSchedule {
    pub fn levels(&self) -> usize {
        self.tile_sizes.len().min(self.search_radii.len()).max(1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Displacement {
    pub dx: i32,
    pub dy: i32,
}

impl Displacement {
    fn magnitude_sq(&self) -> i64 {
        i64::from(self.dx) * i64::from(self.dx) + i64::from(self.dy) * i64::from(self.dy)
    }

    fn distance_sq(&self, other: Displacement) -> i64 {
        let dx = i64::from(self.dx) - i64::from(other.dx);
        let dy = i64::from(self.dy) - i64::from(other.dy);
        dx * dx + dy * dy
    }
}

/// Regular partition into square tiles with half-tile overlap. The last
/// tile in each axis is clamped so it stays inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub width: usize,
    pub height: usize,
    pub tile_size: usize,
    pub stride: usize,
    pub tiles_x: usize,
    pub tiles_y: usize,
}

impl TileGrid {
    pub fn new(width: usize, height: usize, tile_size: usize) -> Self {
        let stride = (tile_size / 2).max(1);
        let span = |extent: usize| {
            if extent <= tile_size {
                1
            } else {
                (extent - tile_size).div_ceil(stride) + 1
            }
        };
        Self {
            width,
            height,
            tile_size,
            stride,
            tiles_x: span(width),
            tiles_y: span(height),
        }
    }

    pub fn tile_width(&self) -> usize {
        self.tile_size.min(self.width)
    }

    pub fn tile_height(&self) -> usize {
        self.tile_size.min(self.height)
    }

    pub fn start_x(&self, tx: usize) -> usize {
        (tx * self.stride).min(self.width - self.tile_width())
    }

    pub fn start_y(&self, ty: usize) -> usize {
        (ty * self.stride).min(self.height - self.tile_height())
    }

    /// The tile owning a pixel: the last tile starting at or before it.
    pub fn tile_index_for(&self, col: usize, row: usize) -> usize {
        let tx = (col / self.stride).min(self.tiles_x - 1);
        let ty = (row / self.stride).min(self.tiles_y - 1);
        ty * self.tiles_x + tx
    }
}

/// Per-tile displacements of one alternate frame, in native pixels.
/// Adding a tile's vector to a reference coordinate locates the matching
/// sample in the alternate frame.
#[derive(Debug, Clone)]
pub struct AlignmentMap {
    pub grid: TileGrid,
    pub displacements: Vec<Displacement>,
}

impl AlignmentMap {
    pub fn displacement_at(&self, col: usize, row: usize) -> Displacement {
        self.displacements[self.grid.tile_index_for(col, row)]
    }

    /// A map that sends every tile to the co-located tile.
    pub fn identity(width: usize, height: usize, tile_size: usize) -> Self {
        let grid = TileGrid::new(width, height, tile_size);
        Self {
            displacements: vec![Displacement::default(); grid.tiles_x * grid.tiles_y],
            grid,
        }
    }
}

fn tile_cost(
    reference: &Plane,
    alternate: &Plane,
    start_x: usize,
    start_y: usize,
    tile_w: usize,
    tile_h: usize,
    candidate: Displacement,
) -> f32 {
    let alt_x = (start_x as i32 + candidate.dx) as usize;
    let alt_y = (start_y as i32 + candidate.dy) as usize;
    let mut cost = 0.0f32;
    for row in 0..tile_h {
        let ref_row = (start_y + row) * reference.width + start_x;
        let alt_row = (alt_y + row) * alternate.width + alt_x;
        for col in 0..tile_w {
            cost += (reference.data[ref_row + col] - alternate.data[alt_row + col]).abs();
        }
    }
    cost
}

fn clamp_candidate(
    candidate: Displacement,
    start_x: usize,
    start_y: usize,
    tile_w: usize,
    tile_h: usize,
    alternate: &Plane,
) -> Displacement {
    Displacement {
        dx: candidate.dx.clamp(
            -(start_x as i32),
            (alternate.width - tile_w) as i32 - start_x as i32,
        ),
        dy: candidate.dy.clamp(
            -(start_y as i32),
            (alternate.height - tile_h) as i32 - start_y as i32,
        ),
    }
}

fn search_tile(
    reference: &Plane,
    alternate: &Plane,
    start_x: usize,
    start_y: usize,
    tile_w: usize,
    tile_h: usize,
    init: Displacement,
    radius: i32,
) -> Displacement {
    let init = clamp_candidate(init, start_x, start_y, tile_w, tile_h, alternate);
    let mut best = init;
    let mut best_cost = f32::INFINITY;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let candidate = clamp_candidate(
                Displacement {
                    dx: init.dx + dx,
                    dy: init.dy + dy,
                },
                start_x,
                start_y,
                tile_w,
                tile_h,
                alternate,
            );
            let cost = tile_cost(reference, alternate, start_x, start_y, tile_w, tile_h, candidate);
            let better = cost < best_cost
                || (cost == best_cost
                    && (candidate.distance_sq(init), candidate.magnitude_sq())
                        < (best.distance_sq(init), best.magnitude_sq()));
            if better {
                best = candidate;
                best_cost = cost;
            }
        }
    }
    best
}

/// Matches `alternate` against `reference` level by level and returns the
/// finest-level map scaled to native pixels (all vectors multiples of
/// `mosaic_width`).
pub fn align_frame(
    reference: &Pyramid,
    alternate: &Pyramid,
    schedule: &AlignSchedule,
    mosaic_width: usize,
) -> AlignmentMap {
    let levels = schedule.levels().min(reference.levels.len());
    // coarsest schedule entries drop out when the pyramid is shallower
    let skip = schedule.levels() - levels;
    let mut prev: Option<(TileGrid, Vec<Displacement>)> = None;

    for level_index in 0..levels {
        let level = levels - 1 - level_index;
        let tile_size = schedule.tile_sizes[skip + level_index];
        let radius = schedule.search_radii[skip + level_index] as i32;
        let ref_plane = &reference.levels[level];
        let alt_plane = &alternate.levels[level];
        let grid = TileGrid::new(ref_plane.width, ref_plane.height, tile_size);
        let (tile_w, tile_h) = (grid.tile_width(), grid.tile_height());

        let mut displacements = vec![Displacement::default(); grid.tiles_x * grid.tiles_y];
        for ty in 0..grid.tiles_y {
            for tx in 0..grid.tiles_x {
                let start_x = grid.start_x(tx);
                let start_y = grid.start_y(ty);
                let init = prev
                    .as_ref()
                    .map(|(parent_grid, parent)| {
                        let center_x = (start_x + tile_w / 2) / 2;
                        let center_y = (start_y + tile_h / 2) / 2;
                        let seed = parent[parent_grid.tile_index_for(
                            center_x.min(parent_grid.width.saturating_sub(1)),
                            center_y.min(parent_grid.height.saturating_sub(1)),
                        )];
                        Displacement {
                            dx: seed.dx * 2,
                            dy: seed.dy * 2,
                        }
                    })
                    .unwrap_or_default();
                displacements[ty * grid.tiles_x + tx] =
                    search_tile(ref_plane, alt_plane, start_x, start_y, tile_w, tile_h, init, radius);
            }
        }
        prev = Some((grid, displacements));
    }

    let (grid, displacements) = prev.expect("at least one alignment level");
    let scale = mosaic_width as i32;
    AlignmentMap {
        grid: TileGrid {
            width: grid.width * mosaic_width,
            height: grid.height * mosaic_width,
            tile_size: grid.tile_size * mosaic_width,
            stride: grid.stride * mosaic_width,
            tiles_x: grid.tiles_x,
            tiles_y: grid.tiles_y,
        },
        displacements: displacements
            .into_iter()
            .map(|displacement| Displacement {
                dx: displacement.dx * scale,
                dy: displacement.dy * scale,
            })
            .collect(),
    }
}

/// One map per alternate frame, in burst order with the reference skipped.
#[tracing::instrument(skip_all, fields(frames = burst.len()))]
pub fn align_burst(ctx: &ComputeContext, burst: &Burst, schedule: &AlignSchedule) -> Vec<AlignmentMap> {
    let reference = burst.reference();
    let mosaic_width = reference.meta.mosaic.width();
    ctx.run(|| {
        let ref_pyramid = Pyramid::build(normalized_plane(reference, 1.0), schedule.levels());
        burst
            .alternates()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(_, frame)| {
                let gain = frame.meta.exposure_gain_to(&reference.meta);
                let pyramid = Pyramid::build(normalized_plane(frame, gain), schedule.levels());
                align_frame(&ref_pyramid, &pyramid, schedule, mosaic_width)
            })
            .collect()
    })
}

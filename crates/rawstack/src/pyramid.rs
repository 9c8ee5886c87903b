//! Exposure-normalized planes and the downsample pyramid alignment runs on.
//!
//! The mosaic is first reduced by one M x M block mean per CFA repetition,
//! which removes the pattern and yields a gray plane at 1/M resolution.
//! Displacements found on that plane scale back to native pixels by M, so
//! they are multiples of M by construction and aligned samples keep their
//! CFA channel identity.

use crate::frame::Frame;

#[derive(Debug, Clone)]
pub struct Plane {
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
}

impl Plane {
    pub fn at(&self, col: usize, row: usize) -> f32 {
        self.data[row * self.width + col]
    }

    /// Sample with coordinates clamped to the plane bounds.
    pub fn at_clamped(&self, col: isize, row: isize) -> f32 {
        let col = col.clamp(0, self.width as isize - 1) as usize;
        let row = row.clamp(0, self.height as isize - 1) as usize;
        self.at(col, row)
    }
}

/// Black-subtracted, exposure-equalized gray plane at 1/M resolution.
/// `exposure_gain` maps the frame into the reference's exposure domain.
pub fn normalized_plane(frame: &Frame, exposure_gain: f64) -> Plane {
    let mosaic = frame.meta.mosaic.width();
    let width = frame.meta.width / mosaic;
    let height = frame.meta.height / mosaic;
    let cell_count = (mosaic * mosaic) as f32;
    let gain = exposure_gain as f32;

    let mut data = Vec::with_capacity(width * height);
    for block_row in 0..height {
        for block_col in 0..width {
            let mut sum = 0.0f32;
            for row in block_row * mosaic..(block_row + 1) * mosaic {
                for col in block_col * mosaic..(block_col + 1) * mosaic {
                    sum += f32::from(frame.sample(col, row)) - frame.meta.black_level_at(col, row);
                }
            }
            data.push(sum / cell_count * gain);
        }
    }
    Plane { data, width, height }
}

/// 2x2 box mean, halving the linear resolution (odd trailing samples are
/// folded into the last block).
pub fn downsample_half(plane: &Plane) -> Plane {
    let width = (plane.width / 2).max(1);
    let height = (plane.height / 2).max(1);
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let col2 = (col * 2 + 1).min(plane.width - 1);
            let row2 = (row * 2 + 1).min(plane.height - 1);
            data.push(
                (plane.at(col * 2, row * 2)
                    + plane.at(col2, row * 2)
                    + plane.at(col * 2, row2)
                    + plane.at(col2, row2))
                    / 4.0,
            );
        }
    }
    Plane { data, width, height }
}

/// `levels[0]` is the finest (the input plane), `levels.last()` the
/// coarsest.
#[derive(Debug)]
pub struct Pyramid {
    pub levels: Vec<Plane>,
}

impl Pyramid {
    pub fn build(base: Plane, levels: usize) -> Self {
        let mut pyramid = vec![base];
        while pyramid.len() < levels.max(1) {
            let top = pyramid.last().expect("pyramid starts non-empty");
            if top.width < 2 || top.height < 2 {
                break;
            }
            pyramid.push(downsample_half(top));
        }
        Self { levels: pyramid }
    }
}

//! The immutable frame model: one decoded mosaic plus its capture metadata.

use {
    anyhow::{bail, Context},
    std::sync::Arc,
    wrapped_rawcodec::DecodedRaw,
};

/// Repeating lattice of the color filter array: 2x2 for Bayer, 6x6 for
/// X-Trans. Both are handled uniformly through the cell index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
#[display("{width}x{width}")]
pub struct MosaicPattern {
    width: usize,
}

impl MosaicPattern {
    pub fn new(width: usize) -> anyhow::Result<Self> {
        match width {
            2 | 6 => Ok(Self { width }),
            other => bail!("unsupported mosaic width [{other}]"),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn cells(&self) -> usize {
        self.width * self.width
    }

    /// Index of the CFA cell owning pixel (col, row), phase-stable under
    /// translations that are multiples of the pattern width.
    pub fn cell_index(&self, col: usize, row: usize) -> usize {
        (row % self.width) * self.width + (col % self.width)
    }
}

#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub url: String,
    pub width: usize,
    pub height: usize,
    pub mosaic: MosaicPattern,
    /// One level per CFA cell, recovered from masked areas when the header
    /// omitted them. Fractional because recovery averages sensor samples.
    pub black_levels: Vec<f32>,
    pub white_level: u16,
    /// EV x 100.
    pub exposure_bias: i32,
    pub iso_exposure_time: f64,
    pub color_factors: [f64; 3],
}

impl FrameMetadata {
    pub fn black_level_at(&self, col: usize, row: usize) -> f32 {
        self.black_levels[self.mosaic.cell_index(col, row)]
    }

    /// Linear exposure gain that maps this frame into `reference`'s exposure
    /// domain (1.0 for the reference itself).
    pub fn exposure_gain_to(&self, reference: &FrameMetadata) -> f64 {
        reference.iso_exposure_time / self.iso_exposure_time
    }
}

/// Immutable once loaded; pixel data is shared with the texture cache.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Arc<Vec<u16>>,
    pub meta: FrameMetadata,
}

impl Frame {
    pub fn from_decoded(url: impl Into<String>, decoded: DecodedRaw) -> anyhow::Result<Self> {
        let url = url.into();
        let mosaic = MosaicPattern::new(decoded.mosaic_width)?;
        if decoded.pixels.len() != decoded.width * decoded.height {
            bail!(
                "pixel count [{}] does not match {}x{}",
                decoded.pixels.len(),
                decoded.width,
                decoded.height
            );
        }
        let white_level = u16::try_from(decoded.white_level)
            .ok()
            .filter(|white| *white >= 1)
            .with_context(|| format!("white level [{}] outside [1, 65535]", decoded.white_level))?;
        if decoded.iso_exposure_time <= 0.0 {
            bail!("non-positive iso*exposure [{}]", decoded.iso_exposure_time);
        }
        if decoded.color_factors.iter().any(|factor| *factor <= 0.0) {
            bail!("non-positive color factor in {:?}", decoded.color_factors);
        }

        let black_levels = recover_black_levels(&decoded, mosaic);
        if let Some(level) = black_levels
            .iter()
            .find(|level| **level > f32::from(white_level))
        {
            bail!("black level [{level}] exceeds white level [{white_level}]");
        }

        Ok(Self {
            data: Arc::new(decoded.pixels),
            meta: FrameMetadata {
                url,
                width: decoded.width,
                height: decoded.height,
                mosaic,
                black_levels,
                white_level,
                exposure_bias: decoded.exposure_bias,
                iso_exposure_time: decoded.iso_exposure_time,
                color_factors: decoded.color_factors,
            },
        })
    }

    pub fn samples(&self) -> &[u16] {
        &self.data
    }

    pub fn sample(&self, col: usize, row: usize) -> u16 {
        self.data[row * self.meta.width + col]
    }

    /// GPU-equivalent allocation cost of the decoded texture.
    pub fn byte_cost(&self) -> usize {
        self.data.len() * std::mem::size_of::<u16>()
    }
}

/// Header black levels win when positive; a non-positive level is recovered
/// as the mean of masked-area samples sharing the cell's CFA phase, and a
/// cell no masked rectangle covers defaults to 0.
fn recover_black_levels(decoded: &DecodedRaw, mosaic: MosaicPattern) -> Vec<f32> {
    let mut sums = vec![0.0f64; mosaic.cells()];
    let mut counts = vec![0u64; mosaic.cells()];
    let needs_recovery = decoded.black_levels[..mosaic.cells()]
        .iter()
        .any(|level| *level <= 0);
    if needs_recovery {
        for area in decoded.present_masked_areas() {
            let rows = area.top as usize..(area.bottom as usize).min(decoded.height);
            for row in rows {
                let cols = area.left as usize..(area.right as usize).min(decoded.width);
                for col in cols {
                    let cell = mosaic.cell_index(col, row);
                    sums[cell] += f64::from(decoded.pixels[row * decoded.width + col]);
                    counts[cell] += 1;
                }
            }
        }
    }
    (0..mosaic.cells())
        .map(|cell| match decoded.black_levels[cell] {
            level if level > 0 => level as f32,
            _ if counts[cell] > 0 => (sums[cell] / counts[cell] as f64) as f32,
            _ => 0.0,
        })
        .collect()
}

//! Safe surface over the external raw codec library.
//!
//! The codec is a C library with a return-code-only ABI: it decodes a DNG
//! into a 16-bit mosaic buffer plus capture metadata, and writes a mosaic
//! back into a DNG using an existing file as metadata template. This crate
//! owns the `extern "C"` declarations and exposes the [`RawCodec`] trait as
//! the seam the pipeline programs against, so alternative backends (test
//! fixtures in particular) can stand in for the native library.

use std::path::{Path, PathBuf};

#[cfg(feature = "native")]
pub mod ffi;
#[cfg(feature = "native")]
pub mod native;

#[cfg(feature = "native")]
pub use native::NativeRawCodec;

/// One CFA repetition holds at most 6x6 cells, so the ABI reserves 36 slots.
pub const BLACK_LEVEL_CELLS: usize = 36;
/// The ABI reports at most four masked rectangles.
pub const MAX_MASKED_AREAS: usize = 4;
/// Sentinel for a black level the header did not specify.
pub const BLACK_LEVEL_UNSET: i32 = -1;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("decoder returned status [{code}] for [{path}]")]
    Decode { path: PathBuf, code: i32 },
    #[error("writer returned status [{code}] for [{path}]")]
    Write { path: PathBuf, code: i32 },
    #[error("decoder reported inconsistent metadata for [{path}]: {reason}")]
    Metadata { path: PathBuf, reason: String },
    #[error("raw environment initialization returned status [{code}]")]
    Environment { code: i32 },
    #[error("path [{path}] cannot be passed over the C boundary")]
    PathEncoding { path: PathBuf },
}

/// Optically masked sensor rectangle, `(top, left, bottom, right)` in pixel
/// rows/columns, half-open on the bottom/right edges. A rectangle with any
/// negative coordinate is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskedArea {
    pub top: i32,
    pub left: i32,
    pub bottom: i32,
    pub right: i32,
}

impl MaskedArea {
    pub const ABSENT: Self = Self {
        top: -1,
        left: -1,
        bottom: -1,
        right: -1,
    };

    pub fn is_present(&self) -> bool {
        self.top >= 0 && self.left >= 0 && self.bottom > self.top && self.right > self.left
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.is_present()
            && (self.top as usize..self.bottom as usize).contains(&row)
            && (self.left as usize..self.right as usize).contains(&col)
    }
}

/// Everything the decoder reports for one raw file.
///
/// `black_levels[(row % mosaic_width) * mosaic_width + (col % mosaic_width)]`
/// is the black level of the CFA cell at that phase;
/// [`BLACK_LEVEL_UNSET`] marks cells the header left unspecified.
#[derive(Debug, Clone)]
pub struct DecodedRaw {
    /// Row-major, single channel, mosaic encoded.
    pub pixels: Vec<u16>,
    pub width: usize,
    pub height: usize,
    /// Side length of one CFA repetition (2 for Bayer, 6 for X-Trans).
    pub mosaic_width: usize,
    pub white_level: i32,
    pub black_levels: [i32; BLACK_LEVEL_CELLS],
    pub masked_areas: [MaskedArea; MAX_MASKED_AREAS],
    /// Intentional offset from metered exposure, EV x 100.
    pub exposure_bias: i32,
    /// ISO times exposure time, the frame's effective linear exposure.
    pub iso_exposure_time: f64,
    pub color_factors: [f64; 3],
}

impl DecodedRaw {
    /// Cheap structural sanity check, used by every backend before handing
    /// the result out.
    pub fn validate(self, path: &Path) -> Result<Self, CodecError> {
        let reason = if self.width == 0 || self.height == 0 {
            Some(format!("degenerate dimensions {}x{}", self.width, self.height))
        } else if self.pixels.len() != self.width * self.height {
            Some(format!(
                "pixel count [{}] does not match {}x{}",
                self.pixels.len(),
                self.width,
                self.height
            ))
        } else if !matches!(self.mosaic_width, 2 | 6) {
            Some(format!("unsupported mosaic width [{}]", self.mosaic_width))
        } else if self.white_level < 1 {
            Some(format!("non-positive white level [{}]", self.white_level))
        } else if self.iso_exposure_time <= 0.0 {
            Some(format!(
                "non-positive iso*exposure [{}]",
                self.iso_exposure_time
            ))
        } else if self.color_factors.iter().any(|factor| *factor <= 0.0) {
            Some(format!("non-positive color factor in {:?}", self.color_factors))
        } else {
            None
        };
        match reason {
            Some(reason) => Err(CodecError::Metadata {
                path: path.to_owned(),
                reason,
            }),
            None => Ok(self),
        }
    }

    pub fn present_masked_areas(&self) -> impl Iterator<Item = MaskedArea> + '_ {
        self.masked_areas
            .iter()
            .copied()
            .filter(MaskedArea::is_present)
    }
}

/// The decode/write seam of the pipeline.
///
/// Implementations must be return-code based end to end: nothing may unwind
/// across this boundary.
pub trait RawCodec: Send + Sync {
    fn decode(&self, path: &Path) -> Result<DecodedRaw, CodecError>;

    /// Replaces `template`'s image strip with `pixels` and writes the result
    /// to `out`, preserving all other template metadata bit-for-bit.
    /// `new_white_level <= 0` keeps the template's value.
    fn write(
        &self,
        template: &Path,
        out: &Path,
        pixels: &[u16],
        new_white_level: i32,
    ) -> Result<(), CodecError>;
}

#[cfg(test)]
mod tests {
    use {super::*, pretty_assertions::assert_eq};

    fn decoded(mosaic_width: usize) -> DecodedRaw {
        DecodedRaw {
            pixels: vec![0u16; 16],
            width: 4,
            height: 4,
            mosaic_width,
            white_level: 1023,
            black_levels: [BLACK_LEVEL_UNSET; BLACK_LEVEL_CELLS],
            masked_areas: [MaskedArea::ABSENT; MAX_MASKED_AREAS],
            exposure_bias: 0,
            iso_exposure_time: 100.0,
            color_factors: [2.0, 1.0, 1.5],
        }
    }

    #[test]
    fn validate_accepts_bayer_and_xtrans_widths() {
        for width in [2, 6] {
            assert!(decoded(width).validate(Path::new("a.dng")).is_ok());
        }
    }

    #[test]
    fn validate_rejects_foreign_mosaic_width() {
        let error = decoded(3).validate(Path::new("a.dng")).unwrap_err();
        assert!(matches!(error, CodecError::Metadata { .. }), "{error}");
    }

    #[test]
    fn validate_rejects_short_pixel_buffer() {
        let mut raw = decoded(2);
        raw.pixels.truncate(3);
        assert!(raw.validate(Path::new("a.dng")).is_err());
    }

    #[test]
    fn masked_area_presence() {
        assert!(!MaskedArea::ABSENT.is_present());
        let area = MaskedArea {
            top: 0,
            left: 0,
            bottom: 4,
            right: 2,
        };
        assert!(area.is_present());
        assert!(area.contains(3, 1));
        assert!(!area.contains(4, 1));
    }

    #[test]
    fn present_masked_areas_skips_sentinels() {
        let mut raw = decoded(2);
        raw.masked_areas[2] = MaskedArea {
            top: 0,
            left: 0,
            bottom: 2,
            right: 2,
        };
        assert_eq!(raw.present_masked_areas().count(), 1);
    }
}

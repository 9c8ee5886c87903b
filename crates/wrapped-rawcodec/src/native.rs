//! [`RawCodec`] backed by the native codec shim.

use {
    crate::{
        ffi, CodecError, DecodedRaw, MaskedArea, RawCodec, BLACK_LEVEL_CELLS, BLACK_LEVEL_UNSET,
        MAX_MASKED_AREAS,
    },
    std::{
        ffi::CString,
        path::{Path, PathBuf},
        ptr,
        sync::Arc,
    },
    tap::prelude::*,
};

/// Brackets every codec call between `initialize_env` and `terminate_env`.
/// Cloning the codec shares one environment; the last clone tears it down.
#[derive(Debug)]
struct RawEnv;

impl RawEnv {
    fn acquire() -> Result<Self, CodecError> {
        // SAFETY: no arguments, status-code contract.
        match unsafe { ffi::initialize_env() } {
            0 => Ok(Self),
            code => Err(CodecError::Environment { code }),
        }
    }
}

impl Drop for RawEnv {
    fn drop(&mut self) {
        // SAFETY: paired with the successful initialize_env in acquire().
        unsafe { ffi::terminate_env() };
    }
}

#[derive(Debug, Clone)]
pub struct NativeRawCodec {
    _env: Arc<RawEnv>,
}

impl NativeRawCodec {
    pub fn new() -> Result<Self, CodecError> {
        RawEnv::acquire().map(|env| Self { _env: Arc::new(env) })
    }
}

fn c_path(path: &Path) -> Result<CString, CodecError> {
    path.to_str()
        .and_then(|path| CString::new(path).ok())
        .ok_or_else(|| CodecError::PathEncoding {
            path: path.to_owned(),
        })
}

fn check_exists(file: &Path) -> Result<&Path, CodecError> {
    file.try_exists()
        .ok()
        .filter(|exists| *exists)
        .map(|_| file)
        .ok_or_else(|| CodecError::Decode {
            path: file.to_owned(),
            code: -1,
        })
        .tap_err(|error| tracing::warn!(%error, "input does not exist"))
}

impl RawCodec for NativeRawCodec {
    #[tracing::instrument(skip(self), level = "DEBUG")]
    fn decode(&self, path: &Path) -> Result<DecodedRaw, CodecError> {
        let in_path = check_exists(path).and_then(c_path)?;

        let mut pixel_bytes: *mut u8 = ptr::null_mut();
        let mut width = 0;
        let mut height = 0;
        let mut mosaic_width = 0;
        let mut white_level = 0;
        let mut black_levels = [BLACK_LEVEL_UNSET; BLACK_LEVEL_CELLS];
        let mut masked_areas = [-1i32; MAX_MASKED_AREAS * 4];
        let mut exposure_bias = 0;
        let mut iso_exposure_time = 0.0;
        let mut color_factors = [0.0f64; 3];

        // SAFETY: all out-pointers reference live stack slots sized per the
        // ABI; the shim never retains them past the call.
        let code = unsafe {
            ffi::read_raw(
                in_path.as_ptr(),
                &mut pixel_bytes,
                &mut width,
                &mut height,
                &mut mosaic_width,
                &mut white_level,
                black_levels.as_mut_ptr(),
                masked_areas.as_mut_ptr(),
                &mut exposure_bias,
                &mut iso_exposure_time,
                &mut color_factors[0],
                &mut color_factors[1],
                &mut color_factors[2],
            )
        };
        if code != 0 || pixel_bytes.is_null() {
            return Err(CodecError::Decode {
                path: path.to_owned(),
                code,
            });
        }

        let sample_count = (width.max(0) as usize) * (height.max(0) as usize);
        // SAFETY: on success the shim hands over width*height little-endian
        // u16 samples; copy them out and release the malloc'd buffer.
        let pixels = unsafe {
            let bytes = std::slice::from_raw_parts(pixel_bytes, sample_count * 2);
            let pixels = bytes
                .chunks_exact(2)
                .map(|sample| u16::from_le_bytes([sample[0], sample[1]]))
                .collect::<Vec<u16>>();
            libc::free(pixel_bytes.cast());
            pixels
        };

        DecodedRaw {
            pixels,
            width: width.max(0) as usize,
            height: height.max(0) as usize,
            mosaic_width: mosaic_width.max(0) as usize,
            white_level,
            black_levels,
            masked_areas: std::array::from_fn(|index| MaskedArea {
                top: masked_areas[index * 4],
                left: masked_areas[index * 4 + 1],
                bottom: masked_areas[index * 4 + 2],
                right: masked_areas[index * 4 + 3],
            }),
            exposure_bias,
            iso_exposure_time,
            color_factors,
        }
        .validate(path)
    }

    #[tracing::instrument(skip(self, pixels), level = "DEBUG")]
    fn write(
        &self,
        template: &Path,
        out: &Path,
        pixels: &[u16],
        new_white_level: i32,
    ) -> Result<(), CodecError> {
        let template_path = c_path(template)?;
        let out_path = c_path(out)?;
        let bytes = pixels
            .iter()
            .flat_map(|sample| sample.to_le_bytes())
            .collect::<Vec<u8>>();

        // SAFETY: bytes outlives the call; the shim only reads from it.
        let code = unsafe {
            ffi::write_raw(
                template_path.as_ptr(),
                out_path.as_ptr(),
                bytes.as_ptr(),
                new_white_level,
            )
        };
        match code {
            0 => Ok(()),
            code => Err(CodecError::Write {
                path: PathBuf::from(out),
                code,
            }),
        }
    }
}

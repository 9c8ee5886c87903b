//! Shared test support: a [`RawCodec`] over a trivial on-disk container,
//! with decode-invocation counting for the cache tests.

#![allow(dead_code)]

use {
    std::{
        io::{Error, ErrorKind},
        path::Path,
        sync::atomic::{AtomicUsize, Ordering},
    },
    wrapped_rawcodec::{
        CodecError, DecodedRaw, MaskedArea, RawCodec, BLACK_LEVEL_CELLS, MAX_MASKED_AREAS,
    },
};

const MAGIC: &[u8; 4] = b"RSFX";

pub fn write_fixture(path: &Path, raw: &DecodedRaw) -> std::io::Result<()> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(MAGIC);
    for value in [raw.width as u32, raw.height as u32, raw.mosaic_width as u32] {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    for value in [raw.white_level, raw.exposure_bias] {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    for value in [
        raw.iso_exposure_time,
        raw.color_factors[0],
        raw.color_factors[1],
        raw.color_factors[2],
    ] {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    for level in raw.black_levels {
        bytes.extend_from_slice(&level.to_le_bytes());
    }
    for area in raw.masked_areas {
        for value in [area.top, area.left, area.bottom, area.right] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }
    for sample in &raw.pixels {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    std::fs::write(path, bytes)
}

fn take<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> std::io::Result<&'a [u8]> {
    let slice = bytes
        .get(*cursor..*cursor + len)
        .ok_or_else(|| Error::new(ErrorKind::UnexpectedEof, "fixture truncated"))?;
    *cursor += len;
    Ok(slice)
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> std::io::Result<u32> {
    Ok(u32::from_le_bytes(take(bytes, cursor, 4)?.try_into().unwrap()))
}

fn read_i32(bytes: &[u8], cursor: &mut usize) -> std::io::Result<i32> {
    Ok(i32::from_le_bytes(take(bytes, cursor, 4)?.try_into().unwrap()))
}

fn read_f64(bytes: &[u8], cursor: &mut usize) -> std::io::Result<f64> {
    Ok(f64::from_le_bytes(take(bytes, cursor, 8)?.try_into().unwrap()))
}

pub fn read_fixture(path: &Path) -> std::io::Result<DecodedRaw> {
    let bytes = std::fs::read(path)?;
    let cursor = &mut 0usize;

    if take(&bytes, cursor, 4)? != MAGIC {
        return Err(Error::new(ErrorKind::InvalidData, "bad fixture magic"));
    }
    let width = read_u32(&bytes, cursor)? as usize;
    let height = read_u32(&bytes, cursor)? as usize;
    let mosaic_width = read_u32(&bytes, cursor)? as usize;
    let white_level = read_i32(&bytes, cursor)?;
    let exposure_bias = read_i32(&bytes, cursor)?;
    let iso_exposure_time = read_f64(&bytes, cursor)?;
    let color_factors = [
        read_f64(&bytes, cursor)?,
        read_f64(&bytes, cursor)?,
        read_f64(&bytes, cursor)?,
    ];

    let mut black_levels = [0i32; BLACK_LEVEL_CELLS];
    for level in &mut black_levels {
        *level = read_i32(&bytes, cursor)?;
    }
    let mut masked_areas = [MaskedArea::ABSENT; MAX_MASKED_AREAS];
    for area in &mut masked_areas {
        *area = MaskedArea {
            top: read_i32(&bytes, cursor)?,
            left: read_i32(&bytes, cursor)?,
            bottom: read_i32(&bytes, cursor)?,
            right: read_i32(&bytes, cursor)?,
        };
    }

    let mut pixels = Vec::with_capacity(width * height);
    for _ in 0..width * height {
        pixels.push(u16::from_le_bytes(take(&bytes, cursor, 2)?.try_into().unwrap()));
    }

    Ok(DecodedRaw {
        pixels,
        width,
        height,
        mosaic_width,
        white_level,
        black_levels,
        masked_areas,
        exposure_bias,
        iso_exposure_time,
        color_factors,
    })
}

/// Codec backend over the fixture container; counts decoder invocations.
#[derive(Default)]
pub struct FixtureCodec {
    decode_calls: AtomicUsize,
}

impl FixtureCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode_count(&self) -> usize {
        self.decode_calls.load(Ordering::SeqCst)
    }
}

impl RawCodec for FixtureCodec {
    fn decode(&self, path: &Path) -> Result<DecodedRaw, CodecError> {
        self.decode_calls.fetch_add(1, Ordering::SeqCst);
        read_fixture(path)
            .map_err(|_| CodecError::Decode {
                path: path.to_owned(),
                code: -1,
            })
            .and_then(|decoded| decoded.validate(path))
    }

    fn write(
        &self,
        template: &Path,
        out: &Path,
        pixels: &[u16],
        new_white_level: i32,
    ) -> Result<(), CodecError> {
        let mut decoded = read_fixture(template).map_err(|_| CodecError::Decode {
            path: template.to_owned(),
            code: -1,
        })?;
        if pixels.len() != decoded.pixels.len() {
            return Err(CodecError::Metadata {
                path: out.to_owned(),
                reason: format!(
                    "buffer holds [{}] samples, template expects [{}]",
                    pixels.len(),
                    decoded.pixels.len()
                ),
            });
        }
        decoded.pixels = pixels.to_vec();
        if new_white_level > 0 {
            decoded.white_level = new_white_level;
        }
        write_fixture(out, &decoded).map_err(|_| CodecError::Write {
            path: out.to_owned(),
            code: -1,
        })
    }
}

/// A plain Bayer fixture with explicit black levels and no masked areas.
pub fn plain_raw(
    pixels: Vec<u16>,
    width: usize,
    height: usize,
    black_level: i32,
    iso_exposure_time: f64,
    exposure_bias: i32,
) -> DecodedRaw {
    let mut black_levels = [-1i32; BLACK_LEVEL_CELLS];
    black_levels[..4].fill(black_level);
    DecodedRaw {
        pixels,
        width,
        height,
        mosaic_width: 2,
        white_level: 16383,
        black_levels,
        masked_areas: [MaskedArea::ABSENT; MAX_MASKED_AREAS],
        exposure_bias,
        iso_exposure_time,
        color_factors: [2.0, 1.0, 1.4],
    }
}

/// Deterministic mosaic texture; column-shifted copies are exact
/// translations of each other.
pub fn textured_pixels(width: usize, height: usize, shift_x: i64, black: u16) -> Vec<u16> {
    (0..(width * height) as i64)
        .map(|index| {
            let (col, row) = (index % width as i64, index / width as i64);
            let mut state = ((row * 263 + col + shift_x + 10_007) as u64).wrapping_mul(0x9e37_79b9);
            state ^= state >> 15;
            black + 64 + (state % 1024) as u16
        })
        .collect()
}

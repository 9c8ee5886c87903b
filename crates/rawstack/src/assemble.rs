//! Post-merge radiometric assembly.
//!
//! The merge output is black-subtracted and already equalized to the
//! reference exposure, so what remains is the white-level rescale, the
//! re-addition of the CFA black level (the emitted DNG copies the
//! template's black-level tags, which must stay truthful), the clip and
//! the requantization to 16 bits. With an unchanged white level the chain
//! is exactly identity on a single-frame merge.

use {
    crate::{frame::Frame, merge::MergedMosaic},
    tracing::debug,
};

/// `white_level_out <= 0` keeps the reference's white level.
pub fn assemble(merged: &MergedMosaic, reference: &Frame, white_level_out: i32) -> Vec<u16> {
    let white_out = match white_level_out {
        level if level > 0 => (level.min(i32::from(u16::MAX))) as f32,
        _ => f32::from(reference.meta.white_level),
    };
    let white_in = f32::from(reference.meta.white_level);
    debug!(white_in, white_out, "assembling merged mosaic");

    let width = merged.width;
    merged
        .data
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let (col, row) = (index % width, index / width);
            let black = reference.meta.black_level_at(col, row);
            // the white rescale operates on the black-subtracted signal
            let gain = (white_out - black).max(0.0) / (white_in - black).max(1.0);
            (value * gain + black).clamp(0.0, white_out).round() as u16
        })
        .collect()
}

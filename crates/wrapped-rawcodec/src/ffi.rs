//! Raw declarations of the codec shim ABI.
//!
//! Every function reports failure through its return code; the shim traps
//! any internal unwinding at the C boundary and translates it to a code.

use std::os::raw::{c_char, c_double, c_int, c_uchar};

#[link(name = "rawcodec")]
extern "C" {
    /// Must bracket all other calls. Returns 0 on success.
    pub fn initialize_env() -> c_int;
    pub fn terminate_env();

    /// Decodes `in_path` into an owned `width * height * 2` byte buffer
    /// (16-bit little-endian, row-major) plus metadata. Returns 0 on
    /// success. `black_levels` must hold 36 slots (-1 = unspecified),
    /// `masked_areas` 16 (four rectangles as top,left,bottom,right; -1
    /// entries mark absent rectangles). The pixel buffer is allocated with
    /// malloc and ownership passes to the caller.
    #[allow(clippy::too_many_arguments)]
    pub fn read_raw(
        in_path: *const c_char,
        pixel_bytes: *mut *mut c_uchar,
        width: *mut c_int,
        height: *mut c_int,
        mosaic_width: *mut c_int,
        white_level: *mut c_int,
        black_levels: *mut c_int,
        masked_areas: *mut c_int,
        exposure_bias: *mut c_int,
        iso_exposure_time: *mut c_double,
        color_factor_r: *mut c_double,
        color_factor_g: *mut c_double,
        color_factor_b: *mut c_double,
    ) -> c_int;

    /// Copies `template_path`'s metadata, replaces its image strip with
    /// `pixel_bytes`, and writes the result to `out_path`. A
    /// `new_white_level <= 0` preserves the template's value. Returns 0 on
    /// success.
    pub fn write_raw(
        template_path: *const c_char,
        out_path: *const c_char,
        pixel_bytes: *const c_uchar,
        new_white_level: c_int,
    ) -> c_int;
}

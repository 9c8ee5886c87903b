//! Typed failure kinds of the pipeline.
//!
//! Each stage surfaces its own kind unchanged; stage-internal plumbing uses
//! `anyhow` context chains and converts at the stage boundary. Alignment and
//! merge are infallible by contract; they emit best-effort output whose
//! quality is carried by the robustness weights, never an error.

use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The decoder failed or returned metadata the frame model rejects.
    #[error("loading [{url}]")]
    Load {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    /// Compute-context resource creation or dispatch failed.
    #[error("compute context failure")]
    Compute(#[source] anyhow::Error),

    /// Write-back of the merged result failed.
    #[error("saving [{path}]")]
    Save {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The external converter failed or produced no output.
    #[error("converting [{url}]")]
    ConversionFailed {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    /// Frames within one burst disagree on dimensions or mosaic width.
    #[error(
        "frame [{url}] is {got_width}x{got_height} (mosaic {got_mosaic}), \
         the burst expects {want_width}x{want_height} (mosaic {want_mosaic})"
    )]
    InconsistentResolutions {
        url: String,
        want_width: usize,
        want_height: usize,
        want_mosaic: usize,
        got_width: usize,
        got_height: usize,
        got_mosaic: usize,
    },

    /// Disk-cache enumeration or eviction failed.
    #[error("disk cache at [{dir}]")]
    Cache {
        dir: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The orchestrator observed the cancel flag at a stage boundary.
    #[error("burst processing cancelled")]
    Cancelled,
}

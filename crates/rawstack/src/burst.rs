//! Turning a list of input URLs into a fully decoded [`Burst`].

use {
    crate::{
        compute::ComputeContext,
        error::{Error, Result},
        frame::Frame,
        reference::{select_reference, ReferencePolicy},
        texture_cache::TextureCache,
        utils::canonical_url,
    },
    anyhow::{anyhow, Context},
    itertools::Itertools,
    rayon::prelude::*,
    std::{path::{Path, PathBuf}, sync::Arc},
    tap::prelude::*,
    wrapped_rawcodec::RawCodec,
};

/// Accumulator headroom bounds how many frames one burst may carry.
pub const MAX_BURST_FRAMES: usize = 64;

/// An ordered burst of frames sharing dimensions and mosaic layout, with a
/// chosen reference. Frames are immutable and exclusively owned.
#[derive(Debug, Clone)]
pub struct Burst {
    frames: Vec<Arc<Frame>>,
    reference: usize,
}

impl Burst {
    pub fn new(frames: Vec<Arc<Frame>>, reference: usize) -> Result<Self> {
        let first = frames
            .first()
            .ok_or_else(|| Error::Load {
                url: String::new(),
                source: anyhow!("a burst needs at least one frame"),
            })?
            .meta
            .clone();
        if frames.len() > MAX_BURST_FRAMES {
            return Err(Error::Load {
                url: first.url,
                source: anyhow!(
                    "burst of [{}] frames exceeds the supported maximum of [{MAX_BURST_FRAMES}]",
                    frames.len()
                ),
            });
        }
        for frame in &frames {
            let meta = &frame.meta;
            if (meta.width, meta.height, meta.mosaic) != (first.width, first.height, first.mosaic) {
                return Err(Error::InconsistentResolutions {
                    url: meta.url.clone(),
                    want_width: first.width,
                    want_height: first.height,
                    want_mosaic: first.mosaic.width(),
                    got_width: meta.width,
                    got_height: meta.height,
                    got_mosaic: meta.mosaic.width(),
                });
            }
        }
        if reference >= frames.len() {
            return Err(Error::Load {
                url: first.url,
                source: anyhow!(
                    "reference index [{reference}] outside burst of {}",
                    frames.len()
                ),
            });
        }
        Ok(Self { frames, reference })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Arc<Frame>] {
        &self.frames
    }

    pub fn reference_index(&self) -> usize {
        self.reference
    }

    pub fn reference(&self) -> &Frame {
        &self.frames[self.reference]
    }

    /// Frames other than the reference, in burst order.
    pub fn alternates(&self) -> impl Iterator<Item = (usize, &Arc<Frame>)> + '_ {
        self.frames
            .iter()
            .enumerate()
            .filter(move |(index, _)| *index != self.reference)
    }
}

/// A single directory input expands to its immediate non-hidden children
/// (not recursed); any other list passes through unchanged.
pub fn expand_inputs(urls: &[PathBuf]) -> Result<Vec<PathBuf>> {
    match urls {
        [directory] if directory.is_dir() => walkdir::WalkDir::new(directory)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_ok(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
            .map_ok(|entry| entry.path().to_owned())
            .filter_ok(|path| path.is_file())
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("listing burst directory")
            .map_err(|source| Error::Load {
                url: directory.display().to_string(),
                source,
            }),
        other => Ok(other.to_vec()),
    }
}

fn decode_with_retry(codec: &dyn RawCodec, path: &Path) -> anyhow::Result<Frame> {
    codec
        .decode(path)
        .or_else(|error| {
            tracing::warn!(%error, path = %path.display(), "decode failed, retrying once");
            codec.decode(path)
        })
        .context("decoding raw file")
        .and_then(|decoded| Frame::from_decoded(canonical_url(path), decoded))
}

fn load_one(
    codec: &dyn RawCodec,
    cache: &TextureCache,
    path: &Path,
) -> Result<Arc<Frame>> {
    let url = canonical_url(path);
    if let Some(frame) = cache.get(&url) {
        return Ok(frame);
    }
    decode_with_retry(codec, path)
        .map(Arc::new)
        .map_err(|source| Error::Load {
            url: url.clone(),
            source,
        })
        .tap_ok(|frame| cache.put(url, Arc::clone(frame)))
}

/// Decodes every URL (served from cache where possible) on the compute
/// pool and blocks until all frames are in. Order is preserved.
#[tracing::instrument(skip(ctx, cache, codec), fields(count = urls.len()))]
pub fn load_frames(
    ctx: &ComputeContext,
    urls: &[PathBuf],
    cache: &TextureCache,
    codec: &dyn RawCodec,
) -> Result<Vec<Arc<Frame>>> {
    ctx.run(|| {
        urls.par_iter()
            .map(|path| load_one(codec, cache, path))
            .collect()
    })
}

/// The full load operation: expand, decode, pick the reference, check the
/// burst invariants.
pub fn load_burst(
    ctx: &ComputeContext,
    urls: &[PathBuf],
    cache: &TextureCache,
    codec: &dyn RawCodec,
    policy: ReferencePolicy,
) -> Result<Burst> {
    let urls = expand_inputs(urls)?;
    let frames = load_frames(ctx, &urls, cache, codec)?;
    let reference = select_reference(
        &frames.iter().map(|frame| frame.meta.clone()).collect::<Vec<_>>(),
        policy,
    );
    Burst::new(frames, reference)
}

//! Conversion of non-DNG inputs through the external converter, plus the
//! bounded on-disk cache of converted files.

use {
    crate::{
        error::{Error, Result},
        texture_cache::TextureCache,
        utils::{canonical_url, chunk_into},
    },
    anyhow::{anyhow, Context},
    dngconverter_wrapper::{Compression, DngConverter, Preview},
    rayon::prelude::*,
    std::{
        ops::{Div, Mul},
        path::{Path, PathBuf},
        time::SystemTime,
    },
    tracing::{debug, info},
};

fn is_dng(path: &Path) -> bool {
    path.extension()
        .map(|extension| extension.eq_ignore_ascii_case("dng"))
        .unwrap_or(false)
}

/// True when at least one input needs the external converter.
pub fn needs_conversion(urls: &[PathBuf]) -> bool {
    urls.iter().any(|url| !is_dng(url))
}

fn converted_target(input: &Path, tmp_dir: &Path) -> Result<PathBuf> {
    input
        .file_stem()
        .map(|stem| tmp_dir.join(stem).with_extension("dng"))
        .ok_or_else(|| Error::ConversionFailed {
            url: input.display().to_string(),
            source: anyhow!("input has no file name"),
        })
}

/// Batch width for converter subprocesses: three quarters of the cores,
/// but never more than half the pending inputs plus one.
pub fn converter_worker_count(cores: usize, inputs: usize) -> usize {
    cores
        .mul(3)
        .div(4)
        .min(inputs.div(2) + 1)
        .max(1)
}

/// Maps every input to a DNG path, converting those absent from both the
/// texture cache and `tmp_dir` (all of them under `force`). Output order
/// matches input order.
#[tracing::instrument(skip(urls, cache), fields(inputs = urls.len()))]
pub fn convert_non_dng(
    urls: &[PathBuf],
    converter: &Path,
    tmp_dir: &Path,
    cache: &TextureCache,
    force: bool,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(tmp_dir)
        .with_context(|| format!("creating converter output directory [{}]", tmp_dir.display()))
        .map_err(|source| Error::ConversionFailed {
            url: tmp_dir.display().to_string(),
            source,
        })?;

    let mut outputs = Vec::with_capacity(urls.len());
    let mut pending = Vec::new();
    for url in urls {
        if is_dng(url) {
            outputs.push(url.clone());
            continue;
        }
        let target = converted_target(url, tmp_dir)?;
        let cached = !force && (cache.contains(&canonical_url(&target)) || target.is_file());
        if cached {
            debug!(input = %url.display(), "converted file already cached");
        } else {
            pending.push((url.clone(), target.clone()));
        }
        outputs.push(target);
    }

    if pending.is_empty() {
        return Ok(outputs);
    }

    dngconverter_wrapper::check_exists(converter).map_err(|source| Error::ConversionFailed {
        url: converter.display().to_string(),
        source,
    })?;
    let workers = converter_worker_count(num_cpus::get(), pending.len());
    info!(pending = pending.len(), workers, "invoking external converter");
    chunk_into(pending, workers)
        .into_par_iter()
        .try_for_each(|batch| {
            DngConverter::builder(converter)
                .input_files(batch.iter().map(|(input, _)| input.clone()))
                .compression(Compression::Compressed)
                .preview(Preview::None)
                .output_dir(tmp_dir)
                .build()
                .run()
                .map_err(|source| Error::ConversionFailed {
                    url: batch[0].0.display().to_string(),
                    source,
                })
                .and_then(|_| {
                    batch.iter().try_for_each(|(input, target)| {
                        target
                            .is_file()
                            .then_some(())
                            .ok_or_else(|| Error::ConversionFailed {
                                url: input.display().to_string(),
                                source: anyhow!(
                                    "converter produced no output at [{}]",
                                    target.display()
                                ),
                            })
                    })
                })
        })
        .map(|_| outputs)
}

/// Deletes the oldest files in `dir` (by modification time) until the
/// directory's total size is at most `max_size_gb`.
#[tracing::instrument]
pub fn trim_disk_cache(dir: &Path, max_size_gb: f64) -> Result<()> {
    let cache_error = |source: anyhow::Error| Error::Cache {
        dir: dir.to_owned(),
        source,
    };
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("listing [{}]", dir.display()))
        .map_err(cache_error)?
        .map(|entry| {
            entry
                .context("reading directory entry")
                .and_then(|entry| {
                    let metadata = entry.metadata().context("reading entry metadata")?;
                    Ok((entry.path(), metadata))
                })
        })
        .filter(|entry| {
            entry
                .as_ref()
                .map(|(_, metadata)| metadata.is_file())
                .unwrap_or(true)
        })
        .map(|entry| {
            entry.and_then(|(path, metadata)| {
                let modified = metadata
                    .modified()
                    .context("filesystem does not report modification times")?;
                Ok((path, modified, metadata.len()))
            })
        })
        .collect::<anyhow::Result<Vec<(PathBuf, SystemTime, u64)>>>()
        .map_err(cache_error)?;

    let budget = (max_size_gb.max(0.0) * 1e9) as u64;
    let mut total: u64 = entries.iter().map(|(_, _, size)| size).sum();
    entries.sort_by_key(|(_, modified, _)| *modified);

    for (path, _, size) in &entries {
        if total <= budget {
            break;
        }
        std::fs::remove_file(path)
            .with_context(|| format!("deleting [{}]", path.display()))
            .map_err(cache_error)?;
        info!(path = %path.display(), size, "trimmed cached file");
        total -= size;
    }
    Ok(())
}

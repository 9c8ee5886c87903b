//! The orchestrator. Stages run in strict order (load, align, merge,
//! assemble, write) with cooperative cancellation checks between them.

use {
    crate::{
        align::align_burst,
        assemble::assemble,
        burst::{expand_inputs, load_burst},
        compute::ComputeContext,
        config_file::RawstackConfig,
        convert::{convert_non_dng, needs_conversion, trim_disk_cache},
        error::{Error, Result},
        merge::Merger,
        reference::ReferencePolicy,
        texture_cache::TextureCache,
    },
    anyhow::Context,
    std::{
        path::{Path, PathBuf},
        sync::Arc,
    },
    tracing::info,
    wrapped_rawcodec::RawCodec,
};

pub struct Pipeline {
    config: RawstackConfig,
    codec: Arc<dyn RawCodec>,
    textures: TextureCache,
    compute: ComputeContext,
}

impl Pipeline {
    pub fn new(config: RawstackConfig, codec: Arc<dyn RawCodec>) -> Result<Self> {
        let compute = ComputeContext::new(config.threads)?;
        Ok(Self {
            textures: TextureCache::new(config.cache.texture_budget_mb),
            config,
            codec,
            compute,
        })
    }

    pub fn textures(&self) -> &TextureCache {
        &self.textures
    }

    pub fn compute(&self) -> &ComputeContext {
        &self.compute
    }

    /// Requests cooperative cancellation; the current stage completes, the
    /// next one is not dispatched.
    pub fn cancel(&self) {
        self.compute.cancel();
    }

    fn resolve_converter(&self) -> Result<PathBuf> {
        self.config
            .converter
            .path
            .clone()
            .map(Ok)
            .unwrap_or_else(dngconverter_wrapper::find_converter)
            .map_err(|source| Error::ConversionFailed {
                url: String::from("<converter>"),
                source,
            })
    }

    fn output_path(&self, template: &Path) -> PathBuf {
        let stem = template
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| String::from("burst"));
        let directory = self
            .config
            .output
            .directory
            .clone()
            .or_else(|| template.parent().map(Path::to_owned))
            .unwrap_or_default();
        directory.join(format!("{stem}_merged.dng"))
    }

    /// Runs the whole pipeline over one burst and returns the path of the
    /// written DNG.
    #[tracing::instrument(skip(self), fields(inputs = inputs.len()))]
    pub fn process_burst(&self, inputs: &[PathBuf]) -> Result<PathBuf> {
        let inputs = expand_inputs(inputs)?;

        let inputs = if needs_conversion(&inputs) {
            self.compute.checkpoint()?;
            let converter = self.resolve_converter()?;
            let converted = convert_non_dng(
                &inputs,
                &converter,
                &self.config.cache.converted_dir,
                &self.textures,
                self.config.converter.force,
            )?;
            trim_disk_cache(&self.config.cache.converted_dir, self.config.cache.disk_budget_gb)?;
            converted
        } else {
            inputs
        };

        self.compute.checkpoint()?;
        let burst = load_burst(
            &self.compute,
            &inputs,
            &self.textures,
            self.codec.as_ref(),
            ReferencePolicy::default(),
        )?;
        info!(
            frames = burst.len(),
            reference = burst.reference_index(),
            "burst loaded"
        );

        self.compute.checkpoint()?;
        let maps = align_burst(&self.compute, &burst, &self.config.align);

        self.compute.checkpoint()?;
        let merger = Merger::from_options(&self.config.merge);
        let merged = merger.merge(&self.compute, &burst, &maps);

        self.compute.checkpoint()?;
        let pixels = assemble(&merged, burst.reference(), self.config.output.white_level);

        let template = PathBuf::from(&burst.reference().meta.url);
        let output = self.output_path(&template);
        self.codec
            .write(&template, &output, &pixels, self.config.output.white_level)
            .context("writing merged DNG")
            .map_err(|source| Error::Save {
                path: output.clone(),
                source,
            })?;
        info!(output = %output.display(), "burst merged");
        Ok(output)
    }
}

use {
    crate::{align::AlignSchedule, merge::MergeOptions, utils::PathReadWrite},
    anyhow::{Context, Result},
    serde::{Deserialize, Serialize},
    std::{
        io::Write,
        path::{Path, PathBuf},
    },
    tap::prelude::*,
};

#[derive(Debug, Clone, Serialize, Deserialize, derivative::Derivative)]
#[derivative(Default)]
#[serde(deny_unknown_fields, default)]
pub struct CacheConfig {
    /// Texture-cache budget in megabytes of decoded pixel data.
    #[derivative(Default(value = "4096"))]
    pub texture_budget_mb: usize,
    /// Directory holding converted DNGs.
    #[derivative(Default(value = "PathBuf::from(\"converted\")"))]
    pub converted_dir: PathBuf,
    /// Ceiling for the converted-DNG directory, in gigabytes.
    #[derivative(Default(value = "20.0"))]
    pub disk_budget_gb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct ConverterConfig {
    /// Converter executable; conventional binary names are probed from PATH
    /// when unset.
    pub path: Option<PathBuf>,
    /// Reconvert even when a cached DNG exists.
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct OutputConfig {
    /// Output directory; the reference frame's directory when unset.
    pub directory: Option<PathBuf>,
    /// White level written to the output DNG; 0 keeps the reference's.
    pub white_level: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct RawstackConfig {
    pub cache: CacheConfig,
    pub converter: ConverterConfig,
    pub align: AlignSchedule,
    pub merge: MergeOptions,
    pub output: OutputConfig,
    /// Compute pool width; the machine's core count when unset.
    pub threads: Option<usize>,
}

pub static CONFIG_FILE_NAME: &str = "rawstack.yaml";

impl RawstackConfig {
    pub fn read(path: &Path) -> Result<Self> {
        std::fs::read_to_string(path)
            .with_context(|| format!("reading config at [{}]", path.display()))
            .and_then(|contents| serde_yaml::from_str(&contents).context("parsing config file"))
            .with_context(|| format!("loading [{}]", path.display()))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        self.render()
            .and_then(|config| {
                path.open_file_write()
                    .and_then(|(_, mut file)| file.write_all(config.as_bytes()).context("writing config file"))
            })
            .with_context(|| format!("saving config to [{}]", path.display()))
    }

    pub fn render(&self) -> Result<String> {
        self.pipe_ref(serde_yaml::to_string)
            .context("serialization failed")
            .map(|config| format!("# {CONFIG_FILE_NAME} - edit to your liking\n{config}"))
    }
}

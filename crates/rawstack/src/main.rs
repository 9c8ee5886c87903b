use {
    anyhow::Result,
    clap::{Parser, Subcommand},
    rawstack::{config_file::RawstackConfig, convert::trim_disk_cache, Pipeline},
    std::path::PathBuf,
    tracing::info,
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// pipeline configuration; defaults are used when the file is absent
    #[arg(long, short = 'c', default_value = rawstack::config_file::CONFIG_FILE_NAME)]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// merges a burst of raw frames into a single DNG
    Merge {
        /// input raw files, or a single directory holding the burst
        inputs: Vec<PathBuf>,
    },
    /// trims the converted-DNG cache to the configured ceiling
    TrimCache {
        directory: PathBuf,
        #[arg(long)]
        max_gb: f64,
    },
    /// prints the default config; save it and modify to your liking
    PrintDefaultConfig,
}

fn load_config(path: &PathBuf) -> Result<RawstackConfig> {
    match path.is_file() {
        true => RawstackConfig::read(path),
        false => Ok(RawstackConfig::default()),
    }
}

#[cfg(feature = "native-codec")]
fn codec() -> Result<std::sync::Arc<dyn wrapped_rawcodec::RawCodec>> {
    use anyhow::Context;
    wrapped_rawcodec::NativeRawCodec::new()
        .context("initializing the raw codec environment")
        .map(|codec| std::sync::Arc::new(codec) as _)
}

#[cfg(not(feature = "native-codec"))]
fn codec() -> Result<std::sync::Arc<dyn wrapped_rawcodec::RawCodec>> {
    anyhow::bail!("this build carries no raw codec; rebuild with the native-codec feature")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Merge { inputs } => {
            let config = load_config(&cli.config)?;
            let pipeline = Pipeline::new(config, codec()?)?;
            let output = pipeline.process_burst(&inputs)?;
            info!(output = %output.display(), "done");
            Ok(())
        }
        Commands::TrimCache { directory, max_gb } => {
            trim_disk_cache(&directory, max_gb).map_err(Into::into)
        }
        Commands::PrintDefaultConfig => {
            println!("{}", RawstackConfig::default().render()?);
            Ok(())
        }
    }
}

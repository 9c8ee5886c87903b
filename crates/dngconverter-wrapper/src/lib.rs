//! Builder-style wrapper around the external DNG converter executable.
//!
//! The converter is treated as a black box: it receives a batch of input
//! raw files plus an output directory and emits one DNG per input. The
//! wrapper only assembles argv, spawns the process with captured output and
//! waits for completion; interpreting the resulting files is the caller's
//! job.

pub use which;
use {
    anyhow::{anyhow, Context, Result},
    bon::Builder,
    std::{
        iter::once,
        path::{Path, PathBuf},
        process::{Command, Output, Stdio},
    },
    tap::prelude::*,
};

/// Compression applied to the emitted DNG image data (always lossless).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Compressed,
    Uncompressed,
}

impl Compression {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Compressed => "-c",
            Self::Uncompressed => "-u",
        }
    }
}

/// JPEG preview embedded in the emitted DNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preview {
    None,
    Medium,
    FullSize,
}

impl Preview {
    fn as_str(&self) -> &'static str {
        match self {
            Self::None => "-p0",
            Self::Medium => "-p1",
            Self::FullSize => "-p2",
        }
    }
}

/// DNG specification version the output must stay compatible with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    Dng1_3,
    Dng1_4,
    Dng1_5,
    Dng1_6,
    Dng1_7,
}

impl Compatibility {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Dng1_3 => "-dng1.3",
            Self::Dng1_4 => "-dng1.4",
            Self::Dng1_5 => "-dng1.5",
            Self::Dng1_6 => "-dng1.6",
            Self::Dng1_7 => "-dng1.7",
        }
    }
}

/// Binary names probed when no explicit converter path is configured.
const CONVENTIONAL_BINARIES: &[&str] = &[
    "dnglab",
    "Adobe DNG Converter",
    "dng-converter",
    "dngconverter",
];

pub fn find_converter() -> Result<PathBuf> {
    CONVENTIONAL_BINARIES
        .iter()
        .find_map(|bin| which::which(bin).ok())
        .context("no DNG converter binary on PATH")
}

pub fn check_exists(file: &Path) -> Result<&Path> {
    file.try_exists()
        .context("checking for existence of the converter binary")
        .and_then(|exists| exists.then_some(file).context("converter binary does not exist"))
        .with_context(|| format!("checking if file exists: [{}]", file.display()))
}

#[extension_traits::extension(pub trait CommandOutputExt)]
impl Command {
    fn command_debug(&self) -> String {
        let command = self.get_program().to_string_lossy().to_string();
        self.get_args()
            .map(|arg| arg.to_string_lossy().to_string())
            .pipe(|args| once(command).chain(args).collect::<Vec<_>>())
            .join(" ")
    }

    /// Spawns, captures both streams and performs a non-streaming wait.
    fn wait_ok(mut self) -> Result<String> {
        let debug = self.command_debug();
        self.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .context("spawning converter")
            .and_then(|Output { status, stdout, stderr }| {
                status
                    .success()
                    .then_some(())
                    .ok_or_else(|| status.code().unwrap_or(-1))
                    .map_err(|code| anyhow!("converter exited with status [{code}]"))
                    .with_context(|| String::from_utf8_lossy(&stderr).to_string())
                    .map(|_| String::from_utf8_lossy(&stdout).to_string())
            })
            .with_context(|| format!("when executing [{debug}]"))
    }
}

/// One converter invocation over a batch of input files.
#[derive(Builder, Debug)]
#[builder(derive(Debug))]
pub struct DngConverter {
    /// Path to the converter executable.
    #[builder(start_fn, into)]
    converter_path: PathBuf,

    /// Raw files converted by this invocation, in argv order.
    #[builder(field)]
    input_files: Vec<PathBuf>,

    /// Output directory for the emitted DNGs.
    #[builder(into)]
    output_dir: Option<PathBuf>,

    compression: Option<Compression>,

    preview: Option<Preview>,

    compatibility: Option<Compatibility>,

    /// Overwrite outputs that already exist.
    #[builder(default)]
    overwrite: bool,
}

impl<S: dng_converter_builder::State> DngConverterBuilder<S> {
    pub fn input_file(mut self, input_file: impl Into<PathBuf>) -> Self {
        self.input_files.push(input_file.into());
        self
    }

    pub fn input_files(mut self, input_files: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.input_files
            .extend(input_files.into_iter().map(Into::into));
        self
    }
}

impl DngConverter {
    pub fn command(self) -> Command {
        let mut cmd = Command::new(self.converter_path);

        if let Some(compression) = self.compression {
            cmd.arg(compression.as_str());
        }
        if let Some(preview) = self.preview {
            cmd.arg(preview.as_str());
        }
        if let Some(compatibility) = self.compatibility {
            cmd.arg(compatibility.as_str());
        }
        if self.overwrite {
            cmd.arg("-o");
        }
        if let Some(output_dir) = self.output_dir {
            cmd.arg("-d").arg(output_dir);
        }
        cmd.args(self.input_files);
        cmd
    }

    /// Runs the batch to completion.
    #[tracing::instrument(skip(self), fields(command))]
    pub fn run(self) -> Result<()> {
        let command = self.command();
        tracing::Span::current().record("command", command.command_debug().as_str());
        command
            .wait_ok()
            .map(|stdout| tracing::debug!(%stdout, "converter batch finished"))
    }
}

//! Document conversion backends.
//!
//! The service never looks inside documents itself. A [`DocumentConverter`] takes a path on disk
//! and hands back a [`ConvertedDocument`] that can be exported to Markdown. The production
//! backend, [`DoclingCli`], drives the Docling command line tool in a subprocess.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::config::Config;

const OUTPUT_DIR_PREFIX: &str = "docling-output-";
const MAX_STDERR_BYTES: usize = 4096;
const CONVERT_ARGS: [&str; 6] = [
    "--to",
    "md",
    "--image-export-mode",
    "placeholder",
    "--abort-on-error",
    "--output",
];

/// Errors raised by conversion backends.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The converter process could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying spawn failure.
        #[source]
        source: io::Error,
    },
    /// The converter process ran but reported failure.
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        /// Program that failed.
        program: String,
        /// Exit status reported by the process.
        status: ExitStatus,
        /// Trailing portion of the process's standard error.
        stderr: String,
    },
    /// The converter succeeded but left no Markdown where expected.
    #[error("converter produced no Markdown output at {}", .0.display())]
    MissingOutput(PathBuf),
    /// Markdown export failed on an otherwise converted document.
    #[error("failed to export document to Markdown: {0}")]
    Export(String),
    /// Filesystem error while preparing or collecting conversion output.
    #[error("I/O error during conversion: {0}")]
    Io(#[from] io::Error),
}

/// Result of a conversion, opaque apart from its Markdown export.
pub trait ConvertedDocument: Send {
    /// Serialize the document to Markdown text.
    fn export_to_markdown(&self) -> Result<String, ConversionError>;
}

/// Interface implemented by conversion backends.
///
/// Implementations are shared across concurrent requests and must not rely on per-call mutable
/// state.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Convert the document stored at `source`.
    async fn convert(&self, source: &Path) -> Result<Box<dyn ConvertedDocument>, ConversionError>;
}

/// Document whose Markdown rendering is already known.
#[derive(Debug, Clone)]
pub struct MarkdownDocument {
    markdown: String,
}

impl MarkdownDocument {
    /// Wrap already rendered Markdown.
    pub fn new(markdown: impl Into<String>) -> Self {
        Self {
            markdown: markdown.into(),
        }
    }
}

impl ConvertedDocument for MarkdownDocument {
    fn export_to_markdown(&self) -> Result<String, ConversionError> {
        Ok(self.markdown.clone())
    }
}

/// Converter backed by the `docling` command line tool.
///
/// Each conversion runs `<program> [leading args] <source> --to md --image-export-mode
/// placeholder --abort-on-error --output <dir> [extra args]` and reads `<dir>/<source stem>.md`.
/// Without `--abort-on-error` Docling only logs a failed document and still exits 0. The output
/// directory is private to the call and removed afterwards.
#[derive(Debug, Clone)]
pub struct DoclingCli {
    program: String,
    leading_args: Vec<String>,
    extra_args: Vec<String>,
}

impl DoclingCli {
    /// Build a converter invoking `program` with `leading_args` before every command.
    pub fn new(
        program: impl Into<String>,
        leading_args: Vec<String>,
        extra_args: Vec<String>,
    ) -> Self {
        Self {
            program: program.into(),
            leading_args,
            extra_args,
        }
    }

    /// Build a converter from the `DOCLING_COMMAND` and `DOCLING_ARGS` settings.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.docling_program.clone(),
            config.docling_leading_args.clone(),
            config.docling_extra_args.clone(),
        )
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }

    /// Check that the tool can be started, returning its reported version.
    pub async fn probe(&self) -> Result<String, ConversionError> {
        let output = self
            .command()
            .arg("--version")
            .output()
            .await
            .map_err(|err| self.spawn_error(err))?;
        if !output.status.success() {
            return Err(self.failed(output.status, &output.stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn spawn_error(&self, source: io::Error) -> ConversionError {
        ConversionError::Spawn {
            program: self.program.clone(),
            source,
        }
    }

    fn failed(&self, status: ExitStatus, stderr: &[u8]) -> ConversionError {
        ConversionError::Failed {
            program: self.program.clone(),
            status,
            stderr: stderr_tail(stderr),
        }
    }
}

#[async_trait]
impl DocumentConverter for DoclingCli {
    async fn convert(&self, source: &Path) -> Result<Box<dyn ConvertedDocument>, ConversionError> {
        let output_dir = tempfile::Builder::new()
            .prefix(OUTPUT_DIR_PREFIX)
            .tempdir()?;

        tracing::debug!(
            program = %self.program,
            source = %source.display(),
            output_dir = %output_dir.path().display(),
            "Running docling"
        );
        let output = self
            .command()
            .arg(source)
            .args(CONVERT_ARGS)
            .arg(output_dir.path())
            .args(&self.extra_args)
            .output()
            .await
            .map_err(|err| self.spawn_error(err))?;

        if !output.status.success() {
            return Err(self.failed(output.status, &output.stderr));
        }

        let markdown_path = markdown_output_path(output_dir.path(), source)
            .ok_or_else(|| ConversionError::MissingOutput(output_dir.path().to_path_buf()))?;
        let markdown = match tokio::fs::read_to_string(&markdown_path).await {
            Ok(markdown) => markdown,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ConversionError::MissingOutput(markdown_path));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Box::new(MarkdownDocument::new(markdown)))
    }
}

/// Docling names its Markdown output after the input's file stem.
fn markdown_output_path(output_dir: &Path, source: &Path) -> Option<PathBuf> {
    let mut name = source.file_stem()?.to_os_string();
    name.push(".md");
    Some(output_dir.join(name))
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(MAX_STDERR_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

/// Process-wide converter slot, filled once at startup.
#[derive(Clone)]
pub enum ConverterHandle {
    /// Converter constructed successfully and shared by every request.
    Ready(Arc<dyn DocumentConverter>),
    /// Construction failed; requests are refused without retrying initialization.
    Unavailable {
        /// Why the converter could not be constructed.
        reason: String,
    },
}

impl ConverterHandle {
    /// Wrap a working converter.
    pub fn ready<C>(converter: C) -> Self
    where
        C: DocumentConverter + 'static,
    {
        Self::Ready(Arc::new(converter))
    }

    /// Record a failed construction.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// The converter, when one was constructed.
    pub fn converter(&self) -> Option<&dyn DocumentConverter> {
        match self {
            Self::Ready(converter) => Some(converter.as_ref()),
            Self::Unavailable { .. } => None,
        }
    }

    /// Failure reason recorded at startup, if any.
    pub fn unavailable_reason(&self) -> Option<&str> {
        match self {
            Self::Ready(_) => None,
            Self::Unavailable { reason } => Some(reason),
        }
    }
}

impl std::fmt::Debug for ConverterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(_) => f.write_str("ConverterHandle::Ready"),
            Self::Unavailable { reason } => f
                .debug_struct("ConverterHandle::Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Construct the Docling converter described by `config`.
///
/// A failed probe does not abort the process: the returned handle is `Unavailable` and the
/// service answers every conversion request with 503.
pub async fn init_converter(config: &Config) -> ConverterHandle {
    let cli = DoclingCli::from_config(config);
    match cli.probe().await {
        Ok(version) => {
            tracing::info!(
                program = %config.docling_program,
                version = %version,
                "Docling converter initialized"
            );
            ConverterHandle::ready(cli)
        }
        Err(err) => {
            tracing::error!(
                program = %config.docling_program,
                error = %err,
                "FATAL: Error initializing Docling converter"
            );
            ConverterHandle::unavailable(err.to_string())
        }
    }
}

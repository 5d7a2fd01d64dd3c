//! Upload processing: stage, convert, export.

use std::io;

use thiserror::Error;

use crate::converter::{ConversionError, ConverterHandle, DocumentConverter};
use crate::metrics::{ConversionMetrics, MetricsSnapshot};
use crate::staging::StagingArea;

/// Errors raised while turning an accepted upload into Markdown.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// The upload body could not be read from the request.
    #[error("failed to read uploaded file: {0}")]
    ReadUpload(String),
    /// Writing the staged copy failed.
    #[error("failed to stage upload: {0}")]
    Staging(#[source] io::Error),
    /// The converter or its Markdown export failed.
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// An uploaded document held in memory for the duration of one request.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Name supplied by the client; only its extension is used.
    pub filename: String,
    /// Full file contents.
    pub bytes: Vec<u8>,
}

/// Owns the process-wide converter handle, staging area, and counters.
///
/// Build it once at startup and share it through an `Arc`; nothing in it is mutated afterwards
/// apart from the atomic counters.
pub struct ProcessingService {
    converter: ConverterHandle,
    staging: StagingArea,
    metrics: ConversionMetrics,
}

impl ProcessingService {
    /// Assemble the service from an already constructed converter handle.
    pub fn new(converter: ConverterHandle, staging: StagingArea) -> Self {
        Self {
            converter,
            staging,
            metrics: ConversionMetrics::new(),
        }
    }

    /// Converter handle populated at startup.
    pub fn converter_handle(&self) -> &ConverterHandle {
        &self.converter
    }

    /// The converter, or `None` when it failed to initialize.
    pub fn converter(&self) -> Option<&dyn DocumentConverter> {
        self.converter.converter()
    }

    /// Snapshot of the conversion counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Count a failure that happened before [`ProcessingService::convert_upload`] could run.
    pub fn record_failure(&self) {
        self.metrics.record_failure();
    }

    /// Stage `upload`, run `converter` on it, and return the Markdown export.
    ///
    /// The staged copy is removed before this returns, whatever the outcome.
    pub async fn convert_upload(
        &self,
        converter: &dyn DocumentConverter,
        upload: &Upload,
    ) -> Result<String, ProcessingError> {
        tracing::info!(
            filename = %upload.filename,
            size = upload.bytes.len(),
            "Received file"
        );
        self.metrics.record_upload(upload.bytes.len() as u64);

        match self.stage_and_convert(converter, upload).await {
            Ok(markdown) => {
                self.metrics.record_success();
                Ok(markdown)
            }
            Err(err) => {
                tracing::error!(
                    filename = %upload.filename,
                    error = %err,
                    "Error during docling processing"
                );
                self.metrics.record_failure();
                Err(err)
            }
        }
    }

    async fn stage_and_convert(
        &self,
        converter: &dyn DocumentConverter,
        upload: &Upload,
    ) -> Result<String, ProcessingError> {
        let staged = self
            .staging
            .stage(&upload.filename, &upload.bytes)
            .await
            .map_err(ProcessingError::Staging)?;

        tracing::info!(path = %staged.path().display(), "Processing document with docling");
        let document = converter.convert(staged.path()).await?;
        tracing::info!("Docling conversion successful");

        let markdown = document.export_to_markdown()?;
        tracing::info!(chars = markdown.chars().count(), "Exported document to Markdown");
        Ok(markdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{ConvertedDocument, MarkdownDocument};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingConverter {
        seen: Mutex<Vec<(PathBuf, Vec<u8>)>>,
    }

    #[async_trait]
    impl DocumentConverter for RecordingConverter {
        async fn convert(
            &self,
            source: &Path,
        ) -> Result<Box<dyn ConvertedDocument>, ConversionError> {
            let bytes = std::fs::read(source)?;
            let markdown = format!("# {}", String::from_utf8_lossy(&bytes));
            self.seen
                .lock()
                .expect("lock")
                .push((source.to_path_buf(), bytes));
            Ok(Box::new(MarkdownDocument::new(markdown)))
        }
    }

    struct BrokenExport;

    impl ConvertedDocument for BrokenExport {
        fn export_to_markdown(&self) -> Result<String, ConversionError> {
            Err(ConversionError::Export("table serializer failed".into()))
        }
    }

    struct BrokenExportConverter;

    #[async_trait]
    impl DocumentConverter for BrokenExportConverter {
        async fn convert(
            &self,
            _source: &Path,
        ) -> Result<Box<dyn ConvertedDocument>, ConversionError> {
            Ok(Box::new(BrokenExport))
        }
    }

    fn upload(name: &str, bytes: &[u8]) -> Upload {
        Upload {
            filename: name.into(),
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn converts_staged_copy_and_removes_it() {
        let service = ProcessingService::new(
            ConverterHandle::unavailable("unused"),
            StagingArea::default(),
        );
        let converter = RecordingConverter::default();

        let markdown = service
            .convert_upload(&converter, &upload("memo.pdf", b"Quarterly"))
            .await
            .expect("markdown");

        assert_eq!(markdown, "# Quarterly");
        let seen = converter.seen.lock().expect("lock").clone();
        assert_eq!(seen.len(), 1);
        let (path, bytes) = &seen[0];
        assert_eq!(bytes, b"Quarterly");
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("pdf"));
        assert!(!path.exists());

        let snapshot = service.metrics_snapshot();
        assert_eq!(snapshot.documents_converted, 1);
        assert_eq!(snapshot.bytes_received, 9);
    }

    #[tokio::test]
    async fn export_failure_is_a_processing_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = ProcessingService::new(
            ConverterHandle::ready(BrokenExportConverter),
            StagingArea::new(Some(dir.path().to_path_buf())),
        );
        let converter = service.converter().expect("ready");

        let err = service
            .convert_upload(converter, &upload("deck.pptx", b"slides"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessingError::Conversion(ConversionError::Export(_))));
        assert!(err.to_string().contains("table serializer failed"));
        assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
        assert_eq!(service.metrics_snapshot().conversion_failures, 1);
    }

    #[tokio::test]
    async fn staging_failure_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = ProcessingService::new(
            ConverterHandle::unavailable("unused"),
            StagingArea::new(Some(dir.path().join("missing"))),
        );
        let converter = RecordingConverter::default();

        let err = service
            .convert_upload(&converter, &upload("a.pdf", b"x"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessingError::Staging(_)));
        assert!(converter.seen.lock().expect("lock").is_empty());
    }
}

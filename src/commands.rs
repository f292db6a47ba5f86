//! Operations exposed to the command line.
//!
//! `AppState` owns the one rasterizer (and with it the one PDFium worker)
//! and the analysis store for the life of the process.

use futures::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pdf::{ConversionResult, EngineLoader, PdfPageRasterizer, SourceDocument};
use crate::resume::{self, KvStore, PageError, ResumePage, StoreError};

/// Application state shared by all commands.
pub struct AppState<L: EngineLoader, S: KvStore> {
    rasterizer: PdfPageRasterizer<L>,
    store: S,
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("No resume ID provided")]
    MissingId,

    #[error("Invalid analysis record: {0}")]
    InvalidRecord(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result of converting one input.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertOutcome {
    /// Input name
    pub source: String,
    pub result: ConversionResult,
    /// Where the preview was written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub written_to: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_error: Option<String>,
}

impl ConvertOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_success() && self.write_error.is_none()
    }
}

impl<L: EngineLoader, S: KvStore> AppState<L, S> {
    pub fn new(rasterizer: PdfPageRasterizer<L>, store: S) -> Self {
        Self {
            rasterizer,
            store,
            output_dir: None,
        }
    }

    /// Write previews into `dir` instead of next to their inputs.
    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.output_dir = dir;
        self
    }

    pub fn rasterizer(&self) -> &PdfPageRasterizer<L> {
        &self.rasterizer
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Convert every document concurrently and write the previews.
    pub async fn convert_documents(&self, documents: Vec<SourceDocument>) -> Vec<ConvertOutcome> {
        join_all(documents.iter().map(|doc| self.convert_document(doc))).await
    }

    /// Convert one document and write its preview.
    pub async fn convert_document(&self, document: &SourceDocument) -> ConvertOutcome {
        let result = self.rasterizer.convert(document).await;
        let mut outcome = ConvertOutcome {
            source: document.name().to_string(),
            result,
            written_to: None,
            write_error: None,
        };

        if let Some(file) = outcome.result.file() {
            let dir = self.output_dir_for(document);
            match file.write_to(&dir).await {
                Ok(path) => outcome.written_to = Some(path),
                Err(e) => {
                    tracing::warn!("failed to write preview into {:?}: {}", dir, e);
                    outcome.write_error = Some(e.to_string());
                }
            }
        }
        outcome
    }

    fn output_dir_for(&self, document: &SourceDocument) -> PathBuf {
        if let Some(dir) = &self.output_dir {
            return dir.clone();
        }
        document
            .path()
            .and_then(Path::parent)
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Validate `raw` as an analysis record and store it under `resume:<id>`.
    pub async fn import_resume(&self, id: &str, raw: &str) -> Result<String, CommandError> {
        if id.trim().is_empty() {
            return Err(CommandError::MissingId);
        }
        let record = resume::parse_record(raw).map_err(|e| match e {
            PageError::Malformed(details) => CommandError::InvalidRecord(details),
            other => CommandError::InvalidRecord(other.to_string()),
        })?;

        let key = resume::record_key(id.trim());
        let normalized = serde_json::to_string(&record).map_err(StoreError::from)?;
        self.store.set(&key, normalized).await?;
        tracing::info!(key = %key, "imported analysis record");
        Ok(key)
    }

    /// Load the results page for `id`.
    pub async fn get_resume(&self, id: Option<&str>) -> ResumePage {
        resume::load_resume(&self.store, id).await
    }
}

//! Error types for the cst-studybot library.
//!
//! Two tiers, mirroring how the pipelines treat failures:
//!
//! * [`StudyBotError`]: **Fatal** for the operation that returns it: the
//!   store cannot be opened, the model provider is not configured, pdfium
//!   cannot be bound, a directory cannot be read.
//!
//! * [`PageError`]: **Non-fatal**: one page of one paper failed. Stored in
//!   [`crate::ingest::PageOutcome::Failed`] so the rest of the batch keeps
//!   going and the summary can count it.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the cst-studybot library.
#[derive(Debug, Error)]
pub enum StudyBotError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A directory the pipeline needs to scan does not exist.
    #[error("Directory not found: '{path}'")]
    DirectoryNotFound { path: PathBuf },

    /// Reading a file or directory failed.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// HTTP download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// pdfium could not open the document.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH to the directory containing libpdfium, or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model call failed for a single, non-page unit of work.
    #[error("Model request failed: {0}")]
    Extraction(#[from] crate::pipeline::llm::ExtractionError),

    // ── Store errors ──────────────────────────────────────────────────────
    /// The vector store has never been populated at this path.
    #[error("Collection '{collection}' not found at '{path}'\nRun `studybot ingest` first.")]
    CollectionNotFound { collection: String, path: PathBuf },

    /// SQLite returned an error.
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Embedding the record or query text failed.
    #[error("Embedding failed: {0}")]
    Embedding(String),

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or settings-file validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task join failure and the like).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single exam page.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The page could not be rasterised or encoded.
    #[error("{id}: rasterisation failed: {detail}")]
    RenderFailed { id: String, detail: String },

    /// The model call failed with a non-rate-limit error.
    #[error("{id}: model call failed: {detail}")]
    ExtractionFailed { id: String, detail: String },

    /// The existence check or upsert failed.
    #[error("{id}: store operation failed: {detail}")]
    StoreFailed { id: String, detail: String },
}

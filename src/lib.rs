//! # cst-studybot
//!
//! A study aid for Cambridge Computer Science Tripos (Part IA) exam archives.
//!
//! Exam papers are rasterised page by page and read by a vision model; the
//! extracted text goes into a local vector store. Examiners' reports are
//! analysed once per year into per-question difficulty statistics. A search
//! then retrieves the closest pages for a query, lets the model pick and
//! format the best question with a hint, and joins the examiners' numbers.
//!
//! ## Pipelines
//!
//! ```text
//! scrape   CL archive ──▶ exam_papers/y{YYYY}PAPER{N}.pdf
//! ingest   papers ──▶ pdfium ──▶ VLM ──▶ vector store (SQLite + embeddings)
//! analyze  reports/Report_{YYYY}.pdf ──▶ text ──▶ LLM ──▶ metadata_{YYYY}.json
//! search   query ──▶ store ──▶ LLM selection ──▶ [METADATA]/[QUESTION]/[HINT]
//!                                                  └──▶ examiner statistics
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cst_studybot::{
//!     create_embedder, ExamStore, LlmExtractionClient, SearchOutcome, SearchService,
//!     StatsTable, StudyBotConfig, Topic,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / ...
//!     let config = StudyBotConfig::default();
//!     let store =
//!         ExamStore::open_existing(&config.db_path, &config.collection, create_embedder().await?)
//!             .await?;
//!     let client = Arc::new(LlmExtractionClient::from_config(&config)?);
//!     let stats = StatsTable::load_dir(&config.stats_dir)?;
//!
//!     let search = SearchService::new(&config, store, client, stats);
//!     if let SearchOutcome::Found(result) = search.find("Karnaugh maps", Topic::All).await? {
//!         println!("{}", result.selection.question_markdown);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `studybot` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `local-embeddings` | on | Local `all-MiniLM-L6-v2` embeddings via fastembed |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod scrape;
pub mod search;
pub mod stats;
pub mod store;
pub mod structured;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze_report, run_analysis, truncate_report_pages, AnalysisSummary};
pub use config::{Settings, StudyBotConfig, StudyBotConfigBuilder};
pub use error::{PageError, StudyBotError};
pub use ingest::{ingest_papers, IngestSummary, PageOutcome};
pub use pipeline::llm::{ExtractionClient, ExtractionError, ExtractionRequest, LlmExtractionClient};
pub use pipeline::render::{PageRasterizer, PageTextSource, PdfiumRasterizer};
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use record::{record_id, ExamPageRecord};
pub use search::{parse_selection, SearchOutcome, SearchService, SelectionParse, Topic};
pub use stats::{normalize_question_number, ExaminerStatistic, StatsLookup, StatsTable};
pub use store::{create_embedder, Embedder, ExamStore, ScoredRecord};
pub use structured::{decode_json, Decoded};

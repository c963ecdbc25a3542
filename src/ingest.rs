//! Ingestion pipeline: exam papers → page images → model → vector store.
//!
//! ```text
//! discover ──▶ page tasks ──▶ exists? ──▶ render ──▶ model ──▶ topic ──▶ upsert
//!  (input)    (skip covers)   (skip)     (pdfium)   (VLM)   (course)   (store)
//! ```
//!
//! Every page of every paper becomes one task; tasks run on a bounded pool
//! (`buffer_unordered`) and finish in any order. A task never fails the run:
//! its outcome is counted in the [`IngestSummary`] and reported to the
//! progress callback. Because the record identifier is deterministic and
//! existing identifiers are skipped, a rerun only does the pages the previous
//! run did not finish.

use crate::config::StudyBotConfig;
use crate::error::{PageError, StudyBotError};
use crate::pipeline::input::{check_pdf_magic, discover_papers};
use crate::pipeline::llm::{ExtractionClient, ExtractionError, ExtractionRequest};
use crate::pipeline::render::PageRasterizer;
use crate::prompts::VISION_PROMPT;
use crate::record::{record_id, ExamPageRecord, FALLBACK_TOPIC};
use crate::search::Topic;
use crate::store::ExamStore;
use crate::structured::{decode_json, Decoded, PageExtraction};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What happened to one page task.
#[derive(Debug, Clone)]
pub enum PageOutcome {
    /// Extracted and stored.
    Processed,
    /// Already in the store.
    Skipped,
    /// The model rate-limited the request; left for the next run.
    RateLimited,
    /// Rendering, the model call or the store failed.
    Failed(PageError),
}

impl PageOutcome {
    /// Short label for logs and progress output.
    pub fn label(&self) -> &'static str {
        match self {
            PageOutcome::Processed => "processed",
            PageOutcome::Skipped => "skipped",
            PageOutcome::RateLimited => "rate-limited",
            PageOutcome::Failed(_) => "failed",
        }
    }
}

/// Aggregate counts for one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    /// Papers that contributed at least one page task.
    pub papers: usize,
    pub processed: usize,
    pub skipped: usize,
    pub cover_pages_skipped: usize,
    pub rate_limited: usize,
    pub failed: usize,
    /// Paper files that could not be opened at all.
    pub unreadable_files: usize,
    pub errors: Vec<PageError>,
    pub duration_ms: u64,
}

impl IngestSummary {
    /// Number of page tasks attempted.
    pub fn attempted(&self) -> usize {
        self.processed + self.skipped + self.rate_limited + self.failed
    }

    fn record(&mut self, outcome: PageOutcome) {
        match outcome {
            PageOutcome::Processed => self.processed += 1,
            PageOutcome::Skipped => self.skipped += 1,
            PageOutcome::RateLimited => self.rate_limited += 1,
            PageOutcome::Failed(e) => {
                self.failed += 1;
                self.errors.push(e);
            }
        }
    }
}

/// One page of one paper.
#[derive(Debug, Clone)]
struct PageTask {
    id: String,
    year: u16,
    paper: u8,
    page: usize,
    path: PathBuf,
    source: String,
}

/// Ingest every paper in `config.papers_dir` into `store`.
///
/// # Errors
/// Only when the paper directory cannot be listed. Per-file and per-page
/// failures are counted in the returned summary.
pub async fn ingest_papers(
    config: &StudyBotConfig,
    rasterizer: &dyn PageRasterizer,
    client: &dyn ExtractionClient,
    store: &ExamStore,
) -> Result<IngestSummary, StudyBotError> {
    let start = Instant::now();
    let mut summary = IngestSummary::default();

    // ── Step 1: Build the task list ──────────────────────────────────────
    let papers = discover_papers(&config.papers_dir)?;
    info!(
        "Found {} papers in {}",
        papers.len(),
        config.papers_dir.display()
    );

    let mut tasks = Vec::new();
    for paper in &papers {
        let page_count = match check_pdf_magic(&paper.path) {
            Ok(()) => rasterizer.page_count(&paper.path).await,
            Err(e) => Err(e),
        };
        let page_count = match page_count {
            Ok(n) => n,
            Err(e) => {
                warn!("Skipping {}: {}", paper.file_name, e);
                summary.unreadable_files += 1;
                continue;
            }
        };

        let covers = config.cover_pages.min(page_count);
        summary.cover_pages_skipped += covers;
        if covers < page_count {
            summary.papers += 1;
        }
        for page in covers..page_count {
            tasks.push(PageTask {
                id: record_id(paper.year, paper.paper, page),
                year: paper.year,
                paper: paper.paper,
                page,
                path: paper.path.clone(),
                source: paper.file_name.clone(),
            });
        }
        debug!(
            "{}: {} pages, {} cover pages skipped",
            paper.file_name, page_count, covers
        );
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_ingest_start(summary.papers, tasks.len());
    }
    info!(
        "Ingesting {} pages with concurrency {}",
        tasks.len(),
        config.concurrency
    );

    // ── Step 2: Run the pool ─────────────────────────────────────────────
    let outcomes: Vec<PageOutcome> = stream::iter(tasks.iter().map(|task| async move {
        let outcome = process_page(task, config, rasterizer, client, store).await;
        if let Some(ref cb) = config.progress_callback {
            cb.on_page_complete(&task.id, &outcome);
        }
        outcome
    }))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    // ── Step 3: Aggregate ────────────────────────────────────────────────
    for outcome in outcomes {
        summary.record(outcome);
    }
    summary.duration_ms = start.elapsed().as_millis() as u64;

    info!(
        "Ingestion complete: {} processed, {} skipped, {} rate-limited, {} failed in {}ms",
        summary.processed,
        summary.skipped,
        summary.rate_limited,
        summary.failed,
        summary.duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_ingest_complete(&summary);
    }
    Ok(summary)
}

async fn process_page(
    task: &PageTask,
    config: &StudyBotConfig,
    rasterizer: &dyn PageRasterizer,
    client: &dyn ExtractionClient,
    store: &ExamStore,
) -> PageOutcome {
    match store.exists(&task.id).await {
        Ok(true) => {
            debug!("{}: already stored", task.id);
            return PageOutcome::Skipped;
        }
        Ok(false) => {}
        Err(e) => {
            return PageOutcome::Failed(PageError::StoreFailed {
                id: task.id.clone(),
                detail: e.to_string(),
            })
        }
    }

    let image = match rasterizer.render_page(&task.path, task.page).await {
        Ok(img) => img,
        Err(e) => {
            warn!("{}: render failed: {}", task.id, e);
            return PageOutcome::Failed(PageError::RenderFailed {
                id: task.id.clone(),
                detail: e.to_string(),
            });
        }
    };

    let request = ExtractionRequest::vision(VISION_PROMPT, image, config.max_tokens);
    let text = match client.generate(request).await {
        Ok(text) => text,
        Err(ExtractionError::RateLimited(msg)) => {
            warn!(
                "{}: rate limited ({}), backing off {}s",
                task.id, msg, config.rate_limit_backoff_secs
            );
            tokio::time::sleep(Duration::from_secs(config.rate_limit_backoff_secs)).await;
            return PageOutcome::RateLimited;
        }
        Err(e) => {
            warn!("{}: model call failed: {}", task.id, e);
            return PageOutcome::Failed(PageError::ExtractionFailed {
                id: task.id.clone(),
                detail: e.to_string(),
            });
        }
    };

    let topic = match decode_json::<PageExtraction>(&text) {
        Decoded::Parsed(page) => match Topic::classify(&page.topic) {
            Some(topic) => topic.label().to_string(),
            None => {
                debug!("{}: topic '{}' is not a Part IA course", task.id, page.topic);
                FALLBACK_TOPIC.to_string()
            }
        },
        Decoded::Malformed { reason, .. } => {
            debug!("{}: page payload not decodable ({}), using fallback topic", task.id, reason);
            FALLBACK_TOPIC.to_string()
        }
    };

    let record = ExamPageRecord {
        id: task.id.clone(),
        year: task.year,
        paper: task.paper,
        page: task.page,
        text,
        topic,
        source: task.source.clone(),
    };

    match store.upsert(&record).await {
        Ok(()) => {
            info!("{}: stored ({})", record.id, record.topic);
            PageOutcome::Processed
        }
        Err(e) => PageOutcome::Failed(PageError::StoreFailed {
            id: task.id.clone(),
            detail: e.to_string(),
        }),
    }
}

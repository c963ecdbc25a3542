//! Report analysis: examiners' report PDF → per-question statistics file.
//!
//! Each `Report_{YYYY}.pdf` is reduced to its Part IA portion, sent to the
//! model in one request, and the JSON array that comes back is validated
//! strictly. Invalid output yields zero entries for that year; there is no
//! partial salvage. A failed model request is an error for that report and
//! leaves its existing statistics file untouched. One bad report never stops
//! the others.

use crate::config::StudyBotConfig;
use crate::error::StudyBotError;
use crate::pipeline::input::{check_pdf_magic, discover_reports};
use crate::pipeline::llm::{ExtractionClient, ExtractionError, ExtractionRequest};
use crate::pipeline::render::PageTextSource;
use crate::prompts::report_analysis_prompt;
use crate::stats::{write_year_file, ExaminerStatistic};
use crate::structured::{decode_json, Decoded};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Concatenate page texts, stopping after the first page that mentions
/// "Part IB" without also mentioning "Part IA".
///
/// That page is kept; everything after it belongs to later years of the
/// Tripos.
pub fn truncate_report_pages(pages: &[String]) -> String {
    let mut text = String::new();
    for page in pages {
        text.push_str(page);
        if page.contains("Part IB") && !page.contains("Part IA") {
            debug!("Part IB boundary reached, truncating report text");
            break;
        }
    }
    text
}

/// Ask the model for the statistics of one year's report.
///
/// Output that does not validate yields an empty list (the reason is
/// logged), which the caller persists. A failed request is returned as an
/// error so existing statistics are left alone.
pub async fn analyze_report(
    client: &dyn ExtractionClient,
    year: u16,
    report_text: &str,
    max_tokens: usize,
) -> Result<Vec<ExaminerStatistic>, ExtractionError> {
    let request = ExtractionRequest::text(report_analysis_prompt(year, report_text), max_tokens);
    let raw = client.generate(request).await?;

    match decode_json::<Vec<ExaminerStatistic>>(&raw) {
        Decoded::Parsed(entries) => {
            info!("{year}: found {} Part IA data points", entries.len());
            Ok(entries)
        }
        Decoded::Malformed { reason, raw } => {
            warn!("{year}: analysis output rejected: {reason}");
            debug!("{year}: rejected output was:\n{raw}");
            Ok(Vec::new())
        }
    }
}

/// Outcome for one report file.
#[derive(Debug, Clone, Serialize)]
pub struct ReportOutcome {
    pub year: u16,
    pub file_name: String,
    /// Entries written; 0 when the analysis was rejected.
    pub entries: usize,
    /// Where the statistics were written, if they were.
    pub output: Option<PathBuf>,
    /// Set when the report could not be read, analysed or written.
    pub error: Option<String>,
}

/// Results of [`run_analysis`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisSummary {
    pub reports: Vec<ReportOutcome>,
}

impl AnalysisSummary {
    pub fn total_entries(&self) -> usize {
        self.reports.iter().map(|r| r.entries).sum()
    }

    pub fn failed(&self) -> usize {
        self.reports.iter().filter(|r| r.error.is_some()).count()
    }
}

/// Analyse every report in `config.reports_dir`, writing
/// `metadata_{YYYY}.json` files into `config.stats_dir`.
///
/// # Errors
/// Only when the report directory cannot be listed.
pub async fn run_analysis(
    config: &StudyBotConfig,
    text_source: &dyn PageTextSource,
    client: &dyn ExtractionClient,
) -> Result<AnalysisSummary, StudyBotError> {
    let reports = discover_reports(&config.reports_dir)?;
    info!(
        "Found {} reports in {}",
        reports.len(),
        config.reports_dir.display()
    );

    let mut summary = AnalysisSummary::default();
    for report in reports {
        info!("Analysing {} (filtering for Part IA)", report.file_name);
        let mut outcome = ReportOutcome {
            year: report.year,
            file_name: report.file_name.clone(),
            entries: 0,
            output: None,
            error: None,
        };

        let pages = match check_pdf_magic(&report.path) {
            Ok(()) => text_source.page_texts(&report.path).await,
            Err(e) => Err(e),
        };
        let pages = match pages {
            Ok(pages) => pages,
            Err(e) => {
                warn!("Skipping {}: {}", report.file_name, e);
                outcome.error = Some(e.to_string());
                summary.reports.push(outcome);
                continue;
            }
        };

        let text = truncate_report_pages(&pages);
        let entries =
            match analyze_report(client, report.year, &text, config.analysis_max_tokens).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("{}: analysis request failed: {}", report.file_name, e);
                    outcome.error = Some(e.to_string());
                    summary.reports.push(outcome);
                    continue;
                }
            };

        match write_year_file(&config.stats_dir, report.year, &entries).await {
            Ok(path) => {
                info!("Saved {} entries to {}", entries.len(), path.display());
                outcome.entries = entries.len();
                outcome.output = Some(path);
            }
            Err(e) => {
                warn!("{}: {}", report.file_name, e);
                outcome.error = Some(e.to_string());
            }
        }
        summary.reports.push(outcome);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn truncates_after_first_part_ib_only_page() {
        let p = pages(&["Part IA Paper 1 ", "Q3 was hard ", "Part IB Paper 4 ", "Part II "]);
        assert_eq!(
            truncate_report_pages(&p),
            "Part IA Paper 1 Q3 was hard Part IB Paper 4 "
        );
    }

    #[test]
    fn page_naming_both_parts_does_not_truncate() {
        let p = pages(&["Part IA and Part IB overview ", "Part IA Paper 2 "]);
        assert_eq!(
            truncate_report_pages(&p),
            "Part IA and Part IB overview Part IA Paper 2 "
        );
    }

    #[test]
    fn no_boundary_keeps_everything() {
        let p = pages(&["a", "b"]);
        assert_eq!(truncate_report_pages(&p), "ab");
        assert_eq!(truncate_report_pages(&[]), "");
    }
}

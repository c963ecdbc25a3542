//! Archive downloader for Part IA exam papers.
//!
//! Papers live at `{BASE_URL}y{YYYY}PAPER{N}.pdf`. Examiners' reports are
//! not published at a predictable URL and have to be placed in the reports
//! directory by hand.

use crate::error::StudyBotError;
use crate::pipeline::input::paper_filename;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Computer Laboratory past-papers index.
pub const BASE_URL: &str = "https://www.cl.cam.ac.uk/teaching/exams/pastpapers/";

/// Pause between requests to the archive server.
pub const REQUEST_DELAY: Duration = Duration::from_secs(1);

/// One paper to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperLink {
    pub year: u16,
    pub paper: u8,
    pub url: String,
    pub file_name: String,
}

/// Links for papers 1–3 of every year in `from..=to`, in order.
pub fn paper_urls(base_url: &str, from: u16, to: u16) -> Vec<PaperLink> {
    let base = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{base_url}/")
    };
    (from..=to)
        .flat_map(|year| (1..=3u8).map(move |paper| (year, paper)))
        .map(|(year, paper)| {
            let file_name = paper_filename(year, paper);
            PaperLink {
                year,
                paper,
                url: format!("{base}{file_name}"),
                file_name,
            }
        })
        .collect()
}

/// Create the paper and report directories if they are missing.
pub fn setup_directories(papers_dir: &Path, reports_dir: &Path) -> Result<(), StudyBotError> {
    for dir in [papers_dir, reports_dir] {
        std::fs::create_dir_all(dir).map_err(|source| StudyBotError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// What happened to one link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DownloadStatus {
    Downloaded,
    AlreadyPresent,
    Failed(String),
}

/// Per-link results of [`download_papers`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapeSummary {
    pub results: Vec<(String, DownloadStatus)>,
}

impl ScrapeSummary {
    pub fn count(&self, wanted: &DownloadStatus) -> usize {
        self.results
            .iter()
            .filter(|(_, s)| std::mem::discriminant(s) == std::mem::discriminant(wanted))
            .count()
    }
}

/// Download every link into `dest`, skipping files already present.
///
/// Failures are recorded per link; only an unusable HTTP client is fatal.
pub async fn download_papers(
    links: &[PaperLink],
    dest: &Path,
    delay: Duration,
    timeout_secs: u64,
) -> Result<ScrapeSummary, StudyBotError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| StudyBotError::DownloadFailed {
            url: BASE_URL.to_string(),
            reason: e.to_string(),
        })?;

    let mut summary = ScrapeSummary::default();
    for link in links {
        let path = dest.join(&link.file_name);
        if path.exists() {
            info!("Skipping {} (already exists)", link.file_name);
            summary
                .results
                .push((link.file_name.clone(), DownloadStatus::AlreadyPresent));
            continue;
        }

        let status = match fetch_pdf(&client, &link.url, &path).await {
            Ok(()) => {
                info!("Downloaded {}", link.file_name);
                DownloadStatus::Downloaded
            }
            Err(e) => {
                warn!("{}", e);
                DownloadStatus::Failed(e.to_string())
            }
        };
        summary.results.push((link.file_name.clone(), status));
        tokio::time::sleep(delay).await;
    }
    Ok(summary)
}

async fn fetch_pdf(client: &reqwest::Client, url: &str, path: &Path) -> Result<(), StudyBotError> {
    let download_err = |reason: String| StudyBotError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| download_err(e.to_string()))?;
    if !response.status().is_success() {
        return Err(download_err(format!("HTTP {}", response.status())));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| download_err(e.to_string()))?;

    if !bytes.starts_with(b"%PDF") {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(StudyBotError::NotAPdf {
            path: PathBuf::from(url),
            magic,
        });
    }

    // Atomic write: write to temp, then rename
    let write_err = |source| StudyBotError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let tmp_path = path.with_extension("pdf.part");
    tokio::fs::write(&tmp_path, &bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_three_links_per_year() {
        let links = paper_urls(BASE_URL, 2018, 2019);
        assert_eq!(links.len(), 6);
        assert_eq!(links[0].file_name, "y2018PAPER1.pdf");
        assert_eq!(
            links[5].url,
            "https://www.cl.cam.ac.uk/teaching/exams/pastpapers/y2019PAPER3.pdf"
        );
    }

    #[test]
    fn base_url_without_trailing_slash() {
        let links = paper_urls("http://localhost:8080/papers", 2020, 2020);
        assert_eq!(links[0].url, "http://localhost:8080/papers/y2020PAPER1.pdf");
    }

    #[test]
    fn empty_range() {
        assert!(paper_urls(BASE_URL, 2024, 2018).is_empty());
    }

    #[tokio::test]
    async fn existing_files_are_not_fetched() {
        let dir = tempfile::tempdir().unwrap();
        // unroutable base: any request would fail
        let links = paper_urls("http://127.0.0.1:9/", 2021, 2021);
        for l in &links {
            std::fs::write(dir.path().join(&l.file_name), b"%PDF-1.5").unwrap();
        }
        let summary = download_papers(&links, dir.path(), Duration::ZERO, 5)
            .await
            .unwrap();
        assert_eq!(summary.count(&DownloadStatus::AlreadyPresent), 3);
        assert_eq!(summary.count(&DownloadStatus::Downloaded), 0);
    }

    #[test]
    fn setup_creates_both_directories() {
        let dir = tempfile::tempdir().unwrap();
        let papers = dir.path().join("exam_papers");
        let reports = dir.path().join("reports");
        setup_directories(&papers, &reports).unwrap();
        assert!(papers.is_dir() && reports.is_dir());
    }
}

//! Document source: find exam papers and examiners' reports on disk.
//!
//! Papers are named `y{YYYY}PAPER{N}.pdf` and reports `Report_{YYYY}.pdf`.
//! Both are matched with anchored, case-sensitive patterns; anything else in
//! the directory is skipped silently, so stray downloads or notes never break
//! a run. Case variants such as `Y2023paper1.pdf` are skipped too: they would
//! map to the same `(year, paper)` and collide on record identifiers.

use crate::error::StudyBotError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

static RE_PAPER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^y(\d{4})PAPER([1-3])\.pdf$").unwrap());

static RE_REPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Report_(\d{4})\.pdf$").unwrap());

/// One exam paper PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamPaper {
    pub path: PathBuf,
    pub file_name: String,
    pub year: u16,
    pub paper: u8,
}

/// One examiners' report PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamReport {
    pub path: PathBuf,
    pub file_name: String,
    pub year: u16,
}

/// Extract `(year, paper)` from a paper filename such as `y2023PAPER1.pdf`.
pub fn parse_paper_filename(name: &str) -> Option<(u16, u8)> {
    let caps = RE_PAPER.captures(name)?;
    let year = caps[1].parse().ok()?;
    let paper = caps[2].parse().ok()?;
    Some((year, paper))
}

/// Extract the year from a report filename such as `Report_2023.pdf`.
pub fn parse_report_filename(name: &str) -> Option<u16> {
    RE_REPORT.captures(name)?[1].parse().ok()
}

/// Canonical paper filename for a year and paper number.
pub fn paper_filename(year: u16, paper: u8) -> String {
    format!("y{year}PAPER{paper}.pdf")
}

/// List every paper in `dir`, sorted by `(year, paper)`.
pub fn discover_papers(dir: &Path) -> Result<Vec<ExamPaper>, StudyBotError> {
    let mut papers: Vec<ExamPaper> = list_file_names(dir)?
        .into_iter()
        .filter_map(|name| match parse_paper_filename(&name) {
            Some((year, paper)) => Some(ExamPaper {
                path: dir.join(&name),
                file_name: name,
                year,
                paper,
            }),
            None => {
                debug!("Ignoring '{}': not a yYYYYPAPERN.pdf file", name);
                None
            }
        })
        .collect();
    papers.sort_by_key(|p| (p.year, p.paper));
    Ok(papers)
}

/// List every report in `dir`, sorted by year.
pub fn discover_reports(dir: &Path) -> Result<Vec<ExamReport>, StudyBotError> {
    let mut reports: Vec<ExamReport> = list_file_names(dir)?
        .into_iter()
        .filter_map(|name| match parse_report_filename(&name) {
            Some(year) => Some(ExamReport {
                path: dir.join(&name),
                file_name: name,
                year,
            }),
            None => {
                debug!("Ignoring '{}': not a Report_YYYY.pdf file", name);
                None
            }
        })
        .collect();
    reports.sort_by_key(|r| r.year);
    Ok(reports)
}

/// Verify the file starts with the `%PDF` magic bytes.
pub fn check_pdf_magic(path: &Path) -> Result<(), StudyBotError> {
    let mut f = std::fs::File::open(path).map_err(|source| StudyBotError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let mut magic = [0u8; 4];
    if f.read_exact(&mut magic).is_ok() && &magic == b"%PDF" {
        Ok(())
    } else {
        Err(StudyBotError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        })
    }
}

fn list_file_names(dir: &Path) -> Result<Vec<String>, StudyBotError> {
    if !dir.is_dir() {
        return Err(StudyBotError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }
    let entries = std::fs::read_dir(dir).map_err(|source| StudyBotError::ReadFailed {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| StudyBotError::ReadFailed {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_paper_names() {
        assert_eq!(parse_paper_filename("y2023PAPER1.pdf"), Some((2023, 1)));
        assert_eq!(parse_paper_filename("y2018PAPER3.pdf"), Some((2018, 3)));
    }

    #[test]
    fn rejects_names_offsets_would_misparse() {
        // fixed-offset slicing would read year "2023" and paper "1" here
        assert_eq!(parse_paper_filename("y2023PAPER10.pdf"), None);
        assert_eq!(parse_paper_filename("y2023PAPER1_solutions.pdf"), None);
        assert_eq!(parse_paper_filename("xy2023PAPER1.pdf"), None);
        assert_eq!(parse_paper_filename("y2023PAPER4.pdf"), None);
        assert_eq!(parse_paper_filename("y202PAPER1.pdf"), None);
    }

    #[test]
    fn case_variants_are_not_papers() {
        assert_eq!(parse_paper_filename("Y2023paper1.pdf"), None);
        assert_eq!(parse_paper_filename("y2023PAPER1.PDF"), None);
        assert_eq!(parse_report_filename("report_2023.pdf"), None);
    }

    #[test]
    fn case_variant_duplicate_is_ignored_by_discovery() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["y2023PAPER1.pdf", "Y2023paper1.pdf"] {
            std::fs::write(dir.path().join(name), b"%PDF-1.7").unwrap();
        }
        let papers = discover_papers(dir.path()).unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].file_name, "y2023PAPER1.pdf");
    }

    #[test]
    fn parses_report_names() {
        assert_eq!(parse_report_filename("Report_2023.pdf"), Some(2023));
        assert_eq!(parse_report_filename("Report_2023_draft.pdf"), None);
        assert_eq!(parse_report_filename("2023.pdf"), None);
    }

    #[test]
    fn paper_filename_round_trips() {
        assert_eq!(paper_filename(2020, 2), "y2020PAPER2.pdf");
        assert_eq!(parse_paper_filename(&paper_filename(2020, 2)), Some((2020, 2)));
    }

    #[test]
    fn discovery_skips_foreign_files_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["y2021PAPER2.pdf", "y2020PAPER3.pdf", "notes.txt", "y2021PAPER1.pdf"] {
            std::fs::write(dir.path().join(name), b"%PDF-1.7").unwrap();
        }
        std::fs::create_dir(dir.path().join("y2019PAPER1.pdf")).unwrap();

        let papers = discover_papers(dir.path()).unwrap();
        let keys: Vec<_> = papers.iter().map(|p| (p.year, p.paper)).collect();
        assert_eq!(keys, vec![(2020, 3), (2021, 1), (2021, 2)]);
        assert_eq!(papers[0].file_name, "y2020PAPER3.pdf");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = discover_reports(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, StudyBotError::DirectoryNotFound { .. }));
    }

    #[test]
    fn magic_bytes_checked() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.pdf");
        let bad = dir.path().join("b.pdf");
        std::fs::write(&good, b"%PDF-1.4\n").unwrap();
        std::fs::write(&bad, b"<html>").unwrap();
        assert!(check_pdf_magic(&good).is_ok());
        assert!(matches!(
            check_pdf_magic(&bad),
            Err(StudyBotError::NotAPdf { .. })
        ));
    }
}

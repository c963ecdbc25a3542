//! Examiner statistics: per-question difficulty and common mistakes, one
//! `metadata_{YYYY}.json` file per year.
//!
//! Files are written by [`crate::analyze`] and loaded wholesale by search
//! into a [`StatsTable`] keyed by `(year, paper, normalized question)`.

use crate::error::StudyBotError;
use crate::structured::{decode_json, Decoded, Validate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

static RE_STATS_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^metadata_(\d{4})\.json$").unwrap());

/// One analysed question from an examiners' report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExaminerStatistic {
    pub paper: u8,
    /// As written by the examiners, e.g. `"4c"`.
    #[serde(deserialize_with = "string_or_int")]
    pub question_number: String,
    #[serde(default)]
    pub topic: String,
    /// 1 (easy) to 10 (catastrophic failure rate).
    pub difficulty: u8,
    #[serde(default)]
    pub mistakes: String,
    /// 1 to 10, how many candidates attempted it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popularity: Option<u8>,
}

impl Validate for ExaminerStatistic {
    fn validate(&self) -> Result<(), String> {
        if !(1..=3).contains(&self.paper) {
            return Err(format!("paper must be 1-3, got {}", self.paper));
        }
        if self.question_number.trim().is_empty() {
            return Err("question_number is empty".into());
        }
        if !(1..=10).contains(&self.difficulty) {
            return Err(format!("difficulty must be 1-10, got {}", self.difficulty));
        }
        if let Some(p) = self.popularity {
            if !(1..=10).contains(&p) {
                return Err(format!("popularity must be 1-10, got {p}"));
            }
        }
        Ok(())
    }
}

/// Models emit `"question_number": 5` about as often as `"5"`.
fn string_or_int<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrInt {
        Str(String),
        Int(i64),
    }

    Ok(match StringOrInt::deserialize(deserializer)? {
        StringOrInt::Str(s) => s,
        StringOrInt::Int(n) => n.to_string(),
    })
}

/// Strip every non-digit character: `"4c"` → `"4"`.
///
/// Sub-parts of a question therefore share one statistics entry.
pub fn normalize_question_number(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Result of a statistics lookup. None of these is an error.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsLookup {
    Found(ExaminerStatistic),
    /// No statistics were loaded for this year and paper.
    PaperMissing { year: u16, paper: u8 },
    /// The paper is known but not this question; `available` is sorted
    /// numerically.
    QuestionMissing {
        normalized: String,
        available: Vec<String>,
    },
    /// Year, paper or question number could not be extracted.
    Unidentified,
}

/// All loaded statistics.
#[derive(Debug, Default, Clone)]
pub struct StatsTable {
    papers: HashMap<(u16, u8), HashMap<String, ExaminerStatistic>>,
}

impl StatsTable {
    /// Add one year's entries. The first entry for a normalized question
    /// number wins.
    pub fn insert_year(&mut self, year: u16, entries: Vec<ExaminerStatistic>) {
        for entry in entries {
            let key = normalize_question_number(&entry.question_number);
            if key.is_empty() {
                warn!(
                    "Skipping statistic with no digits in question number '{}' ({year} paper {})",
                    entry.question_number, entry.paper
                );
                continue;
            }
            self.papers
                .entry((year, entry.paper))
                .or_default()
                .entry(key)
                .or_insert(entry);
        }
    }

    /// Load every `metadata_{YYYY}.json` in `dir`.
    ///
    /// Unreadable or invalid files are skipped with a warning; a missing
    /// directory yields an empty table.
    pub fn load_dir(dir: &Path) -> Result<Self, StudyBotError> {
        let mut table = Self::default();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Statistics directory '{}' does not exist", dir.display());
                return Ok(table);
            }
            Err(source) => {
                return Err(StudyBotError::ReadFailed {
                    path: dir.to_path_buf(),
                    source,
                })
            }
        };

        let mut files: Vec<(u16, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_str()?.to_string();
                let year = RE_STATS_FILE.captures(&name)?[1].parse().ok()?;
                Some((year, e.path()))
            })
            .collect();
        files.sort();

        for (year, path) in files {
            let text = match std::fs::read_to_string(&path) {
                Ok(t) => t,
                Err(e) => {
                    warn!("Skipping {}: {e}", path.display());
                    continue;
                }
            };
            match decode_json::<Vec<ExaminerStatistic>>(&text) {
                Decoded::Parsed(entries) => {
                    debug!("Loaded {} statistics from {}", entries.len(), path.display());
                    table.insert_year(year, entries);
                }
                Decoded::Malformed { reason, .. } => {
                    warn!("Skipping {}: {reason}", path.display());
                }
            }
        }
        info!("Loaded examiner statistics for {} papers", table.papers.len());
        Ok(table)
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    /// `(year, paper, question count)` for every loaded paper, sorted.
    pub fn overview(&self) -> Vec<(u16, u8, usize)> {
        let mut out: Vec<_> = self
            .papers
            .iter()
            .map(|(&(y, p), qs)| (y, p, qs.len()))
            .collect();
        out.sort();
        out
    }

    /// Look up the statistic for an identified question.
    pub fn lookup(&self, year: Option<u16>, paper: Option<u8>, question: Option<&str>) -> StatsLookup {
        let (Some(year), Some(paper), Some(question)) = (year, paper, question) else {
            return StatsLookup::Unidentified;
        };
        let normalized = normalize_question_number(question);
        if normalized.is_empty() {
            return StatsLookup::Unidentified;
        }

        let Some(questions) = self.papers.get(&(year, paper)) else {
            return StatsLookup::PaperMissing { year, paper };
        };
        match questions.get(&normalized) {
            Some(stat) => StatsLookup::Found(stat.clone()),
            None => {
                let mut available: Vec<String> = questions.keys().cloned().collect();
                available.sort_by_key(|q| (q.parse::<u32>().unwrap_or(u32::MAX), q.clone()));
                StatsLookup::QuestionMissing {
                    normalized,
                    available,
                }
            }
        }
    }
}

/// Path of the statistics file for `year`.
pub fn year_file_path(dir: &Path, year: u16) -> PathBuf {
    dir.join(format!("metadata_{year}.json"))
}

/// Write one year's statistics atomically (temp file + rename).
///
/// An empty slice is written as `[]` so stale data from an earlier run is
/// replaced.
pub async fn write_year_file(
    dir: &Path,
    year: u16,
    entries: &[ExaminerStatistic],
) -> Result<PathBuf, StudyBotError> {
    let path = year_file_path(dir, year);
    let write_err = |source| StudyBotError::OutputWriteFailed {
        path: path.clone(),
        source,
    };

    tokio::fs::create_dir_all(dir).await.map_err(write_err)?;
    let json = serde_json::to_string_pretty(entries)
        .map_err(|e| StudyBotError::Internal(format!("serialise statistics: {e}")))?;

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, &path).await.map_err(write_err)?;
    Ok(path)
}

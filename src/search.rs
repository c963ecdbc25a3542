//! Query/search service: retrieve candidates, let the model pick and format
//! one, parse its answer and join examiner statistics.
//!
//! ```text
//! query ──▶ store.query (top N) ──▶ selection prompt (top K) ──▶ model
//!       ──▶ parse_selection ──▶ stats lookup ──▶ SearchOutcome
//! ```
//!
//! The model must answer in a fixed three-section layout. The parser is
//! strict about the section markers (each exactly once, in order) and
//! lenient inside the metadata line: a field it cannot find is left unknown,
//! which only degrades the statistics join.

use crate::config::StudyBotConfig;
use crate::error::StudyBotError;
use crate::pipeline::llm::{ExtractionClient, ExtractionRequest};
use crate::prompts::{selection_prompt, PromptCandidate};
use crate::stats::{StatsLookup, StatsTable};
use crate::store::{ExamStore, ScoredRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const METADATA_MARKER: &str = "[METADATA]";
pub const QUESTION_MARKER: &str = "[QUESTION]";
pub const HINT_MARKER: &str = "[HINT]";

static RE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"Year:\s*(\d+)").unwrap());
static RE_PAPER: Lazy<Regex> = Lazy::new(|| Regex::new(r"Paper:\s*(\d+)").unwrap());
static RE_QUESTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Question:\s*([0-9a-zA-Z]+)").unwrap());

/// Fields of a well-formed selection response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionFields {
    pub year: Option<u16>,
    pub paper: Option<u8>,
    /// Question number as the model wrote it, e.g. `"5a"`.
    pub question: Option<String>,
    pub question_markdown: String,
    pub hint: String,
}

/// Result of [`parse_selection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionParse {
    Parsed(SelectionFields),
    Malformed(String),
}

/// Parse the `[METADATA]` / `[QUESTION]` / `[HINT]` layout.
///
/// Text before `[METADATA]` is ignored.
pub fn parse_selection(text: &str) -> SelectionParse {
    for marker in [METADATA_MARKER, QUESTION_MARKER, HINT_MARKER] {
        let n = text.matches(marker).count();
        if n != 1 {
            return SelectionParse::Malformed(format!(
                "expected {marker} exactly once, found {n}"
            ));
        }
    }

    // each marker occurs exactly once, so find() cannot miss
    let (Some(m), Some(q), Some(h)) = (
        text.find(METADATA_MARKER),
        text.find(QUESTION_MARKER),
        text.find(HINT_MARKER),
    ) else {
        return SelectionParse::Malformed("section marker missing".into());
    };
    if !(m < q && q < h) {
        return SelectionParse::Malformed(format!(
            "sections out of order: expected {METADATA_MARKER}, {QUESTION_MARKER}, {HINT_MARKER}"
        ));
    }

    let meta = &text[m + METADATA_MARKER.len()..q];
    let question_markdown = text[q + QUESTION_MARKER.len()..h].trim().to_string();
    let hint = text[h + HINT_MARKER.len()..].trim().to_string();

    SelectionParse::Parsed(SelectionFields {
        year: RE_YEAR.captures(meta).and_then(|c| c[1].parse().ok()),
        paper: RE_PAPER.captures(meta).and_then(|c| c[1].parse().ok()),
        question: RE_QUESTION.captures(meta).map(|c| c[1].to_string()),
        question_markdown,
        hint,
    })
}

/// Topic filter offered by the search surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Topic {
    #[default]
    All,
    FoundationsOfComputerScience,
    DiscreteMathematics,
    DigitalElectronics,
    ObjectOrientedProgramming,
    Algorithms,
}

impl Topic {
    pub const ALL: [Topic; 6] = [
        Topic::All,
        Topic::FoundationsOfComputerScience,
        Topic::DiscreteMathematics,
        Topic::DigitalElectronics,
        Topic::ObjectOrientedProgramming,
        Topic::Algorithms,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Topic::All => "All Topics",
            Topic::FoundationsOfComputerScience => "Foundations of Computer Science",
            Topic::DiscreteMathematics => "Discrete Mathematics",
            Topic::DigitalElectronics => "Digital Electronics",
            Topic::ObjectOrientedProgramming => "Object-Oriented Programming",
            Topic::Algorithms => "Algorithms",
        }
    }

    /// Command-line spelling, e.g. `discrete-mathematics`.
    pub fn slug(self) -> &'static str {
        match self {
            Topic::All => "all",
            Topic::FoundationsOfComputerScience => "foundations-of-computer-science",
            Topic::DiscreteMathematics => "discrete-mathematics",
            Topic::DigitalElectronics => "digital-electronics",
            Topic::ObjectOrientedProgramming => "object-oriented-programming",
            Topic::Algorithms => "algorithms",
        }
    }

    /// The store filter for this topic; `None` for [`Topic::All`].
    pub fn filter(self) -> Option<&'static str> {
        match self {
            Topic::All => None,
            other => Some(other.label()),
        }
    }

    /// Map a free-form syllabus label written by the model onto a course.
    ///
    /// Exact labels and slugs match first, then course keywords ("Discrete
    /// Maths", "OCaml", "Java"...). `None` when nothing fits; never
    /// [`Topic::All`].
    pub fn classify(label: &str) -> Option<Topic> {
        match label.parse::<Topic>() {
            Ok(Topic::All) => return None,
            Ok(topic) => return Some(topic),
            Err(_) => {}
        }
        let lower = label.to_lowercase();
        TOPIC_KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map(|(topic, _)| *topic)
    }
}

// Checked in order: electronics before discrete maths, so "logic gates" is
// not read as propositional logic.
const TOPIC_KEYWORDS: [(Topic, &[&str]); 5] = [
    (
        Topic::DigitalElectronics,
        &["digital", "electronic", "logic gate", "karnaugh", "circuit", "boolean"],
    ),
    (
        Topic::FoundationsOfComputerScience,
        &["foundations", "ocaml", "functional"],
    ),
    (
        Topic::DiscreteMathematics,
        &["discrete", "proof", "induction", "logic", "set theory", "relations"],
    ),
    (
        Topic::ObjectOrientedProgramming,
        &["object", "oop", "java", "inheritance"],
    ),
    (
        Topic::Algorithms,
        &["algorithm", "data structure", "sorting", "graph", "complexity"],
    ),
];

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Topic {
    type Err = String;

    /// Accepts the slug or the label, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Topic::ALL
            .into_iter()
            .find(|t| t.slug().eq_ignore_ascii_case(s) || t.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<&str> = Topic::ALL.iter().map(|t| t.slug()).collect();
                format!("unknown topic '{s}' (expected one of: {})", names.join(", "))
            })
    }
}

/// A selected question with its statistics.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub selection: SelectionFields,
    pub stats: StatsLookup,
    /// The records offered to the model, best first.
    pub candidates: Vec<ScoredRecord>,
}

/// Everything a search can end in. Only transport and store failures are
/// errors; the rest are states the caller renders.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// The query was blank.
    EmptyQuery,
    /// Retrieval returned nothing (empty store or no record for the topic).
    NoResults,
    Found(QueryResult),
    /// The model's answer did not follow the section layout.
    Malformed { reason: String, raw: String },
}

/// Search over one store collection with a loaded statistics table.
pub struct SearchService {
    store: ExamStore,
    client: Arc<dyn ExtractionClient>,
    stats: StatsTable,
    retrieval_limit: usize,
    candidate_count: usize,
    max_tokens: usize,
}

impl SearchService {
    pub fn new(
        config: &StudyBotConfig,
        store: ExamStore,
        client: Arc<dyn ExtractionClient>,
        stats: StatsTable,
    ) -> Self {
        Self {
            store,
            client,
            stats,
            retrieval_limit: config.retrieval_limit,
            candidate_count: config.candidate_count,
            max_tokens: config.max_tokens,
        }
    }

    pub fn store(&self) -> &ExamStore {
        &self.store
    }

    pub fn stats(&self) -> &StatsTable {
        &self.stats
    }

    /// Find the best matching question for `query`.
    pub async fn find(&self, query: &str, topic: Topic) -> Result<SearchOutcome, StudyBotError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchOutcome::EmptyQuery);
        }

        let mut hits = self
            .store
            .query(query, self.retrieval_limit, topic.filter())
            .await?;
        if hits.is_empty() {
            info!("No records matched '{}' ({})", query, topic);
            return Ok(SearchOutcome::NoResults);
        }
        hits.truncate(self.candidate_count);
        debug!(
            "Candidates: {}",
            hits.iter()
                .map(|h| format!("{} ({:.3})", h.record.id, h.score))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let prompt_candidates: Vec<PromptCandidate<'_>> = hits
            .iter()
            .map(|h| PromptCandidate {
                year: h.record.year,
                paper: h.record.paper,
                text: &h.record.text,
            })
            .collect();
        let prompt = selection_prompt(query, &prompt_candidates);
        let raw = self
            .client
            .generate(ExtractionRequest::text(prompt, self.max_tokens))
            .await?;

        match parse_selection(&raw) {
            SelectionParse::Parsed(selection) => {
                let stats = self.stats.lookup(
                    selection.year,
                    selection.paper,
                    selection.question.as_deref(),
                );
                Ok(SearchOutcome::Found(QueryResult {
                    selection,
                    stats,
                    candidates: hits,
                }))
            }
            SelectionParse::Malformed(reason) => {
                warn!("Selection response malformed: {}", reason);
                Ok(SearchOutcome::Malformed { reason, raw })
            }
        }
    }
}

//! Prompts sent to the generative model.
//!
//! All three pipelines keep their prompt text here so wording changes never
//! touch request or parsing code, and so tests can check that the layout the
//! parsers expect is the layout the prompts ask for.

use crate::search::{HINT_MARKER, METADATA_MARKER, QUESTION_MARKER};

/// Prompt sent with every exam page image during ingestion.
///
/// The response is stored verbatim; [`crate::structured::PageExtraction`]
/// decodes it only to pick up the topic label, which ingestion maps onto
/// [`crate::search::Topic`].
pub const VISION_PROMPT: &str = r#"Analyze this exam page.
1. Identify distinct Question content.
2. Transcribe text to Markdown (LaTeX for math $...$, Code Blocks for code).
3. Classify Syllabus Topic as exactly one of: "Foundations of Computer Science",
   "Discrete Mathematics", "Digital Electronics", "Object-Oriented Programming",
   "Algorithms" (use "General" for cover or instruction pages).
4. Output JSON: {"topic": "...", "content": "...", "question_id": "..."}"#;

/// Build the whole-report analysis prompt for one year.
///
/// The model is responsible for locating the Part IA sections and ignoring
/// Part IB / Part II commentary; no local filtering happens beyond the
/// truncation in [`crate::analyze::truncate_report_pages`].
pub fn report_analysis_prompt(year: u16, report_text: &str) -> String {
    format!(
        r#"You are an expert Data Analyst for Cambridge Computer Science.

CONTEXT:
The text below is the "Examiners' Report" for Year {year}.
It contains commentary for Part IA, Part IB, and Part II.

TASK:
1. LOCATE the sections specifically for "Part IA" (Papers 1, 2, and 3).
2. IGNORE any text related to Part IB or Part II.
3. For each Part IA question found, extract:
   - "paper": 1, 2, or 3.
   - "question_number": The question number (e.g., "1", "5", "10").
   - "topic": The subject (e.g., "Discrete Maths", "OCaml").
   - "difficulty": Integer 1-10 (10 = catastrophic failure rate).
   - "mistakes": A brief summary of why students lost marks.
   - "popularity": Optional integer 1-10, how many candidates attempted it.

OUTPUT JSON ONLY (List of objects):
[
  {{
    "paper": 1,
    "question_number": "1",
    "topic": "Foundations of CS",
    "difficulty": 4,
    "mistakes": "Students forgot the base case."
  }}
]

REPORT TEXT:
{report_text}
"#
    )
}

/// A retrieved record offered to the model during search.
pub struct PromptCandidate<'a> {
    pub year: u16,
    pub paper: u8,
    pub text: &'a str,
}

/// Build the selection prompt: pick the best candidate, identify it,
/// reformat it and write a hint, in the fixed section layout.
pub fn selection_prompt(query: &str, candidates: &[PromptCandidate<'_>]) -> String {
    let mut context = String::new();
    for (i, c) in candidates.iter().enumerate() {
        context.push_str(&format!(
            "\n--- CANDIDATE {} ({} Paper {}) ---\n{}\n",
            i + 1,
            c.year,
            c.paper,
            c.text
        ));
    }

    format!(
        r#"You are an expert Tutor.
User Query: "{query}"

Candidates:
{context}

TASK:
1. Select the BEST question.
2. Extract the Year, Paper, and Question Number (e.g. "5", "10", "3a").
3. Format the question in Markdown/LaTeX.
4. Write a Hint.

OUTPUT FORMAT (Strict):
{METADATA_MARKER}
Year: 20XX | Paper: X | Question: Y
{QUESTION_MARKER}
(Markdown text)
{HINT_MARKER}
(Hint text)
"#
    )
}

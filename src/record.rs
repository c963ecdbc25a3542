//! The unit stored in the vector store: one extracted exam page.

use serde::{Deserialize, Serialize};

/// Topic label used when the model's page payload could not be decoded or
/// names no Part IA course.
pub const FALLBACK_TOPIC: &str = "General";

/// One page of one exam paper, as extracted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamPageRecord {
    /// `{year}_{paper}_{page}`, see [`record_id`].
    pub id: String,
    pub year: u16,
    pub paper: u8,
    /// 0-based page index within the source PDF.
    pub page: usize,
    /// Raw model response for the page.
    pub text: String,
    pub topic: String,
    /// Source filename, e.g. `y2023PAPER1.pdf`.
    pub source: String,
}

/// Deterministic identifier for a page.
///
/// Papers are unique per `(year, paper)`, so the triple never collides
/// across files.
pub fn record_id(year: u16, paper: u8, page: usize) -> String {
    format!("{year}_{paper}_{page}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn id_is_deterministic() {
        assert_eq!(record_id(2023, 1, 2), "2023_1_2");
        assert_eq!(record_id(2023, 1, 2), record_id(2023, 1, 2));
    }

    #[test]
    fn ids_do_not_collide() {
        let mut seen = HashSet::new();
        for year in 2015..=2024u16 {
            for paper in 1..=3u8 {
                for page in 0..40usize {
                    assert!(seen.insert(record_id(year, paper, page)));
                }
            }
        }
        // page 12 of paper 1 vs page 2 of a hypothetical paper 11
        assert_ne!(record_id(2023, 1, 12), record_id(2023, 11, 2));
    }
}

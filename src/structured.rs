//! Strict decoding of model responses that are supposed to be JSON.
//!
//! Models wrap JSON in ```` ```json ```` fences despite being told not to, and
//! sometimes return prose instead. Every JSON response therefore goes through
//! [`decode_json`] right after it arrives, producing a [`Decoded`] value:
//! either the typed payload or the raw text plus a reason. Nothing downstream
//! ever looks at unvalidated structure.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Result of decoding a model response.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    /// The response matched the expected schema.
    Parsed(T),
    /// The response did not; `raw` is kept for logging and display.
    Malformed { reason: String, raw: String },
}

impl<T> Decoded<T> {
    pub fn is_parsed(&self) -> bool {
        matches!(self, Decoded::Parsed(_))
    }

    /// The payload, discarding the failure details.
    pub fn ok(self) -> Option<T> {
        match self {
            Decoded::Parsed(v) => Some(v),
            Decoded::Malformed { .. } => None,
        }
    }
}

/// Types that carry invariants serde alone cannot express.
pub trait Validate {
    /// Return a human-readable reason when the value is out of range.
    fn validate(&self) -> Result<(), String>;
}

impl<T: Validate> Validate for Vec<T> {
    fn validate(&self) -> Result<(), String> {
        for (i, item) in self.iter().enumerate() {
            item.validate().map_err(|e| format!("entry {i}: {e}"))?;
        }
        Ok(())
    }
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n(.*?)\n?```\s*$").unwrap());

/// Remove a single pair of outer code fences, with or without a language tag.
pub fn strip_code_fences(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().trim(),
        None => trimmed,
    }
}

/// Decode `raw` as JSON of type `T` and run its [`Validate`] checks.
pub fn decode_json<T>(raw: &str) -> Decoded<T>
where
    T: DeserializeOwned + Validate,
{
    let body = strip_code_fences(raw);
    if body.is_empty() {
        return Decoded::Malformed {
            reason: "empty response".into(),
            raw: raw.to_string(),
        };
    }
    match serde_json::from_str::<T>(body) {
        Ok(value) => match value.validate() {
            Ok(()) => Decoded::Parsed(value),
            Err(reason) => Decoded::Malformed {
                reason,
                raw: raw.to_string(),
            },
        },
        Err(e) => Decoded::Malformed {
            reason: e.to_string(),
            raw: raw.to_string(),
        },
    }
}

/// JSON shape requested by [`crate::prompts::VISION_PROMPT`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageExtraction {
    pub topic: String,
    pub content: String,
    #[serde(default)]
    pub question_id: Option<String>,
}

impl Validate for PageExtraction {
    fn validate(&self) -> Result<(), String> {
        if self.topic.trim().is_empty() {
            return Err("topic is empty".into());
        }
        Ok(())
    }
}

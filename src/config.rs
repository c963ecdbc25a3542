//! Configuration for the ingestion, analysis and search pipelines.
//!
//! Every knob lives in [`StudyBotConfig`], built via its
//! [`StudyBotConfigBuilder`]. Values are layered: built-in defaults, then an
//! optional `studybot.toml` [`Settings`] file, then whatever the caller (or
//! the CLI flags) sets on the builder.

use crate::error::StudyBotError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the vector-store collection holding Part IA exam pages.
pub const DEFAULT_COLLECTION: &str = "ia_questions";

/// Default model used when the settings file and CLI are silent.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Configuration shared by all three pipelines.
///
/// # Example
/// ```rust
/// use cst_studybot::StudyBotConfig;
///
/// let config = StudyBotConfig::builder()
///     .concurrency(2)
///     .cover_pages(1)
///     .model("gemini-2.5-flash")
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 2);
/// ```
#[derive(Clone)]
pub struct StudyBotConfig {
    /// LLM model identifier. Default: `gemini-2.5-flash`.
    pub model: String,

    /// LLM provider name (e.g. "gemini", "openai"). If None, auto-detected
    /// from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// SQLite file backing the vector store. Default: `./cst_db/store.sqlite`.
    pub db_path: PathBuf,

    /// Collection name inside the store. Default: `ia_questions`.
    pub collection: String,

    /// Directory of `y{YYYY}PAPER{N}.pdf` files. Default: `exam_papers`.
    pub papers_dir: PathBuf,

    /// Directory of `Report_{YYYY}.pdf` files. Default: `reports`.
    pub reports_dir: PathBuf,

    /// Directory holding `metadata_{YYYY}.json`. Default: `.`.
    pub stats_dir: PathBuf,

    /// Directory containing the pdfium shared library. If None, the system
    /// library is used.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Rendering DPI for page images. Range: 72–400. Default: 100.
    ///
    /// Exam pages are plain typeset text; 100 DPI stays readable for the
    /// model and keeps uploads small.
    pub dpi: u32,

    /// Number of pages processed concurrently during ingestion. Default: 4.
    ///
    /// Bounded by the provider's rate limit rather than local resources.
    pub concurrency: usize,

    /// Leading pages of every paper that are cover/instruction pages and are
    /// never ingested. Default: 2.
    pub cover_pages: usize,

    /// Seconds a worker sleeps after a rate-limit response before giving up
    /// on that page for the current run. Default: 10.
    pub rate_limit_backoff_secs: u64,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum output tokens per page extraction and per search. Default: 4096.
    pub max_tokens: usize,

    /// Maximum output tokens for a whole-report analysis. Default: 16384.
    pub analysis_max_tokens: usize,

    /// Nearest neighbours fetched per search. Default: 5.
    pub retrieval_limit: usize,

    /// How many of the retrieved records are offered to the model. Default: 3.
    pub candidate_count: usize,

    /// Ingestion progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for StudyBotConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            provider: None,
            db_path: PathBuf::from("./cst_db/store.sqlite"),
            collection: DEFAULT_COLLECTION.to_string(),
            papers_dir: PathBuf::from("exam_papers"),
            reports_dir: PathBuf::from("reports"),
            stats_dir: PathBuf::from("."),
            pdfium_lib_path: None,
            dpi: 100,
            concurrency: 4,
            cover_pages: 2,
            rate_limit_backoff_secs: 10,
            temperature: 0.1,
            max_tokens: 4096,
            analysis_max_tokens: 16384,
            retrieval_limit: 5,
            candidate_count: 3,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for StudyBotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StudyBotConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("db_path", &self.db_path)
            .field("collection", &self.collection)
            .field("papers_dir", &self.papers_dir)
            .field("reports_dir", &self.reports_dir)
            .field("stats_dir", &self.stats_dir)
            .field("dpi", &self.dpi)
            .field("concurrency", &self.concurrency)
            .field("cover_pages", &self.cover_pages)
            .field("rate_limit_backoff_secs", &self.rate_limit_backoff_secs)
            .field("retrieval_limit", &self.retrieval_limit)
            .field("candidate_count", &self.candidate_count)
            .finish()
    }
}

impl StudyBotConfig {
    /// Create a new builder seeded with the defaults.
    pub fn builder() -> StudyBotConfigBuilder {
        StudyBotConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`StudyBotConfig`].
pub struct StudyBotConfigBuilder {
    config: StudyBotConfig,
}

impl StudyBotConfigBuilder {
    /// Apply every value present in a settings file.
    pub fn settings(mut self, settings: &Settings) -> Self {
        if let Some(ref p) = settings.provider {
            self.config.provider_name = Some(p.clone());
        }
        if let Some(ref m) = settings.model {
            self.config.model = m.clone();
        }
        if let Some(ref p) = settings.db_path {
            self.config.db_path = p.clone();
        }
        if let Some(ref d) = settings.papers_dir {
            self.config.papers_dir = d.clone();
        }
        if let Some(ref d) = settings.reports_dir {
            self.config.reports_dir = d.clone();
        }
        if let Some(ref d) = settings.stats_dir {
            self.config.stats_dir = d.clone();
        }
        if let Some(ref d) = settings.pdfium_lib_path {
            self.config.pdfium_lib_path = Some(d.clone());
        }
        if let Some(n) = settings.concurrency {
            self = self.concurrency(n);
        }
        if let Some(dpi) = settings.dpi {
            self = self.dpi(dpi);
        }
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = path.into();
        self
    }

    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.config.collection = name.into();
        self
    }

    pub fn papers_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.papers_dir = dir.into();
        self
    }

    pub fn reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.reports_dir = dir.into();
        self
    }

    pub fn stats_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.stats_dir = dir.into();
        self
    }

    pub fn pdfium_lib_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(dir.into());
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn cover_pages(mut self, n: usize) -> Self {
        self.config.cover_pages = n;
        self
    }

    pub fn rate_limit_backoff_secs(mut self, secs: u64) -> Self {
        self.config.rate_limit_backoff_secs = secs;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn analysis_max_tokens(mut self, n: usize) -> Self {
        self.config.analysis_max_tokens = n;
        self
    }

    pub fn retrieval_limit(mut self, n: usize) -> Self {
        self.config.retrieval_limit = n;
        self
    }

    pub fn candidate_count(mut self, n: usize) -> Self {
        self.config.candidate_count = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<StudyBotConfig, StudyBotError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(StudyBotError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(StudyBotError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.retrieval_limit == 0 || c.candidate_count == 0 {
            return Err(StudyBotError::InvalidConfig(
                "retrieval_limit and candidate_count must be ≥ 1".into(),
            ));
        }
        if c.candidate_count > c.retrieval_limit {
            return Err(StudyBotError::InvalidConfig(format!(
                "candidate_count ({}) cannot exceed retrieval_limit ({})",
                c.candidate_count, c.retrieval_limit
            )));
        }
        if c.collection.trim().is_empty() {
            return Err(StudyBotError::InvalidConfig(
                "collection name must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Contents of the optional `studybot.toml` settings file.
///
/// Every key is optional; missing keys keep the built-in default.
///
/// ```toml
/// provider = "gemini"
/// model = "gemini-2.5-flash"
/// db_path = "./cst_db/store.sqlite"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub db_path: Option<PathBuf>,
    pub papers_dir: Option<PathBuf>,
    pub reports_dir: Option<PathBuf>,
    pub stats_dir: Option<PathBuf>,
    pub pdfium_lib_path: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub dpi: Option<u32>,
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, StudyBotError> {
        toml::from_str(text).map_err(|e| StudyBotError::InvalidConfig(e.to_string()))
    }

    /// Load a settings file. A missing file yields the empty settings.
    pub fn load(path: &Path) -> Result<Self, StudyBotError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(StudyBotError::ReadFailed {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_archive_layout() {
        let c = StudyBotConfig::default();
        assert_eq!(c.concurrency, 4);
        assert_eq!(c.cover_pages, 2);
        assert_eq!(c.retrieval_limit, 5);
        assert_eq!(c.candidate_count, 3);
        assert_eq!(c.papers_dir, PathBuf::from("exam_papers"));
        assert_eq!(c.collection, "ia_questions");
    }

    #[test]
    fn builder_clamps_values() {
        let c = StudyBotConfig::builder()
            .dpi(20)
            .concurrency(0)
            .temperature(9.0)
            .build()
            .unwrap();
        assert_eq!(c.dpi, 72);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn builder_rejects_more_candidates_than_retrieved() {
        let err = StudyBotConfig::builder()
            .retrieval_limit(2)
            .candidate_count(3)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("candidate_count"));
    }

    #[test]
    fn settings_file_overrides_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            provider = "openai"
            model = "gpt-4.1-mini"
            db_path = "/tmp/cst.sqlite"
            concurrency = 2
            "#,
        )
        .unwrap();
        let c = StudyBotConfig::builder().settings(&settings).build().unwrap();
        assert_eq!(c.provider_name.as_deref(), Some("openai"));
        assert_eq!(c.model, "gpt-4.1-mini");
        assert_eq!(c.db_path, PathBuf::from("/tmp/cst.sqlite"));
        assert_eq!(c.concurrency, 2);
        // untouched keys keep defaults
        assert_eq!(c.cover_pages, 2);
    }

    #[test]
    fn settings_reject_unknown_keys() {
        assert!(Settings::from_toml_str("api_kye = \"x\"").is_err());
    }

    #[test]
    fn missing_settings_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load(&dir.path().join("studybot.toml")).unwrap();
        assert_eq!(s, Settings::default());
    }
}

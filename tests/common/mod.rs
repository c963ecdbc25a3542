//! In-test fakes for the rasterizer, model client and embedder.

#![allow(dead_code)]

use async_trait::async_trait;
use cst_studybot::{
    Embedder, ExtractionClient, ExtractionError, ExtractionRequest, PageRasterizer,
    PageTextSource, StudyBotError,
};
use edgequake_llm::ImageData;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Rasterizer with scripted page counts and page texts, keyed by file name.
#[derive(Default)]
pub struct FakePdf {
    pub page_counts: HashMap<String, usize>,
    pub page_texts: HashMap<String, Vec<String>>,
    /// `(file name, page index)` pairs whose render fails.
    pub broken_pages: HashSet<(String, usize)>,
    pub renders: AtomicUsize,
}

impl FakePdf {
    pub fn with_pages(mut self, file: &str, pages: usize) -> Self {
        self.page_counts.insert(file.to_string(), pages);
        self
    }

    pub fn with_texts(mut self, file: &str, texts: &[&str]) -> Self {
        self.page_texts
            .insert(file.to_string(), texts.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_broken_page(mut self, file: &str, page: usize) -> Self {
        self.broken_pages.insert((file.to_string(), page));
        self
    }
}

#[async_trait]
impl PageRasterizer for FakePdf {
    async fn page_count(&self, pdf: &Path) -> Result<usize, StudyBotError> {
        self.page_counts
            .get(&file_name(pdf))
            .copied()
            .ok_or_else(|| StudyBotError::CorruptPdf {
                path: pdf.to_path_buf(),
                detail: "no such fake document".into(),
            })
    }

    async fn render_page(&self, pdf: &Path, page_index: usize) -> Result<ImageData, StudyBotError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        if self.broken_pages.contains(&(file_name(pdf), page_index)) {
            return Err(StudyBotError::CorruptPdf {
                path: pdf.to_path_buf(),
                detail: format!("page {page_index} is damaged"),
            });
        }
        Ok(ImageData::new("iVBORw0KGgo=", "image/png"))
    }
}

#[async_trait]
impl PageTextSource for FakePdf {
    async fn page_texts(&self, pdf: &Path) -> Result<Vec<String>, StudyBotError> {
        self.page_texts
            .get(&file_name(pdf))
            .cloned()
            .ok_or_else(|| StudyBotError::CorruptPdf {
                path: pdf.to_path_buf(),
                detail: "no such fake document".into(),
            })
    }
}

type Responder = Box<dyn Fn(&ExtractionRequest) -> Result<String, ExtractionError> + Send + Sync>;

/// Model client answering through a closure and recording every prompt.
pub struct ScriptedClient {
    responder: Responder,
    pub prompts: Mutex<Vec<String>>,
    pub vision_calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ExtractionRequest) -> Result<String, ExtractionError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(f),
            prompts: Mutex::new(Vec::new()),
            vision_calls: AtomicUsize::new(0),
        }
    }

    /// Always answers `text`.
    pub fn constant(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ExtractionClient for ScriptedClient {
    async fn generate(&self, request: ExtractionRequest) -> Result<String, ExtractionError> {
        if request.image.is_some() {
            self.vision_calls.fetch_add(1, Ordering::SeqCst);
        }
        self.prompts.lock().unwrap().push(request.prompt.clone());
        (self.responder)(&request)
    }
}

/// Bag-of-words hashing embedder: texts sharing words land close together.
pub struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-32"
    }

    fn dims(&self) -> usize {
        32
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StudyBotError> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 32];
                for word in t
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    let h = word
                        .bytes()
                        .fold(5381usize, |h, b| h.wrapping_mul(33).wrapping_add(b as usize));
                    v[h % 32] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Write a placeholder file that passes the `%PDF` magic check.
pub fn touch_pdf(dir: &Path, name: &str) {
    std::fs::write(dir.join(name), b"%PDF-1.7\n%fake\n").unwrap();
}

/// Model client that holds every call open for `delay` and records the peak
/// number of calls in flight at once.
pub struct SlowClient {
    response: String,
    delay: std::time::Duration,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
}

impl SlowClient {
    pub fn new(response: &str, delay: std::time::Duration) -> Self {
        Self {
            response: response.to_string(),
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ExtractionClient for SlowClient {
    async fn generate(&self, _request: ExtractionRequest) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

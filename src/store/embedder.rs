//! Text embeddings and the vector helpers the store ranks with.
//!
//! Vectors are stored as little-endian `f32` BLOBs and ranked by brute-force
//! cosine similarity. A Part IA archive is a few thousand pages, well inside
//! what a linear scan handles per query.

use crate::error::StudyBotError;
use async_trait::async_trait;

/// Turns text into fixed-size vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded alongside the collection.
    fn model_name(&self) -> &str;

    /// Vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StudyBotError>;
}

/// Encode a vector as a little-endian `f32` BLOB.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty, mismatched or zero
/// vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(feature = "local-embeddings")]
pub use local::FastEmbedder;

#[cfg(feature = "local-embeddings")]
mod local {
    use super::Embedder;
    use crate::error::StudyBotError;
    use async_trait::async_trait;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::{Arc, Mutex};
    use tracing::info;

    const MODEL_NAME: &str = "all-minilm-l6-v2";
    const DIMS: usize = 384;
    const BATCH_SIZE: usize = 32;

    /// Local ONNX embeddings via fastembed (`all-MiniLM-L6-v2`).
    ///
    /// The model is loaded once; inference needs `&mut`, so it sits behind a
    /// mutex and runs on the blocking pool.
    pub struct FastEmbedder {
        model: Arc<Mutex<TextEmbedding>>,
    }

    impl FastEmbedder {
        /// Load the model, downloading it to the fastembed cache on first use.
        pub async fn load() -> Result<Self, StudyBotError> {
            info!("Loading local embedding model '{}'", MODEL_NAME);
            let model = tokio::task::spawn_blocking(|| {
                TextEmbedding::try_new(
                    InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                        .with_show_download_progress(true),
                )
                .map_err(|e| {
                    StudyBotError::Embedding(format!(
                        "Failed to initialize local embedding model: {e}"
                    ))
                })
            })
            .await
            .map_err(|e| StudyBotError::Internal(format!("Embedding init task panicked: {e}")))??;

            Ok(Self {
                model: Arc::new(Mutex::new(model)),
            })
        }
    }

    #[async_trait]
    impl Embedder for FastEmbedder {
        fn model_name(&self) -> &str {
            MODEL_NAME
        }

        fn dims(&self) -> usize {
            DIMS
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StudyBotError> {
            let model = Arc::clone(&self.model);
            let texts = texts.to_vec();
            tokio::task::spawn_blocking(move || {
                let mut model = model
                    .lock()
                    .map_err(|_| StudyBotError::Embedding("embedding model lock poisoned".into()))?;
                model
                    .embed(texts, Some(BATCH_SIZE))
                    .map_err(|e| StudyBotError::Embedding(format!("Local embedding failed: {e}")))
            })
            .await
            .map_err(|e| StudyBotError::Internal(format!("Embedding task panicked: {e}")))?
        }
    }
}

/// The default embedder for this build.
#[cfg(feature = "local-embeddings")]
pub async fn create_embedder() -> Result<std::sync::Arc<dyn Embedder>, StudyBotError> {
    Ok(std::sync::Arc::new(FastEmbedder::load().await?))
}

/// The default embedder for this build.
#[cfg(not(feature = "local-embeddings"))]
pub async fn create_embedder() -> Result<std::sync::Arc<dyn Embedder>, StudyBotError> {
    Err(StudyBotError::InvalidConfig(
        "No embedding backend compiled in; rebuild with --features local-embeddings".into(),
    ))
}

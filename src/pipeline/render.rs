//! PDF access via pdfium: page counts, page images and page text.
//!
//! pdfium is a C++ library with thread-local state, so every call runs inside
//! `spawn_blocking` and binds its own `Pdfium` handle. The pipelines only see
//! the [`PageRasterizer`] and [`PageTextSource`] traits, which lets tests
//! drive ingestion and analysis without a pdfium shared library.

use crate::error::StudyBotError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Longest edge of a rendered page, whatever the DPI.
const MAX_RENDERED_PIXELS: i32 = 2000;

/// Turns one page of a PDF into an image the model can read.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Number of pages in the document.
    async fn page_count(&self, pdf: &Path) -> Result<usize, StudyBotError>;

    /// Render the page at `page_index` (0-based) as a PNG attachment.
    async fn render_page(&self, pdf: &Path, page_index: usize) -> Result<ImageData, StudyBotError>;
}

/// Extracts the plain text of every page, in order.
#[async_trait]
pub trait PageTextSource: Send + Sync {
    async fn page_texts(&self, pdf: &Path) -> Result<Vec<String>, StudyBotError>;
}

/// pdfium-backed implementation of both traits.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    dpi: u32,
    lib_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// `lib_path` is the directory holding the pdfium shared library; `None`
    /// binds to the system library.
    pub fn new(dpi: u32, lib_path: Option<PathBuf>) -> Self {
        Self { dpi, lib_path }
    }

    /// Check that pdfium can be bound at all, so a missing library fails at
    /// startup rather than once per page.
    pub fn probe(&self) -> Result<(), StudyBotError> {
        bind_pdfium(self.lib_path.as_deref()).map(|_| ())
    }
}

#[async_trait]
impl PageRasterizer for PdfiumRasterizer {
    async fn page_count(&self, pdf: &Path) -> Result<usize, StudyBotError> {
        let path = pdf.to_path_buf();
        let lib = self.lib_path.clone();
        tokio::task::spawn_blocking(move || {
            let pdfium = bind_pdfium(lib.as_deref())?;
            let document = open_document(&pdfium, &path)?;
            Ok(document.pages().len() as usize)
        })
        .await
        .map_err(|e| StudyBotError::Internal(format!("Page-count task panicked: {e}")))?
    }

    async fn render_page(&self, pdf: &Path, page_index: usize) -> Result<ImageData, StudyBotError> {
        let path = pdf.to_path_buf();
        let lib = self.lib_path.clone();
        let dpi = self.dpi;
        let image = tokio::task::spawn_blocking(move || {
            render_page_blocking(lib.as_deref(), &path, page_index, dpi)
        })
        .await
        .map_err(|e| StudyBotError::Internal(format!("Render task panicked: {e}")))??;

        encode_png(&image).map_err(|e| StudyBotError::CorruptPdf {
            path: pdf.to_path_buf(),
            detail: format!("PNG encoding failed for page {page_index}: {e}"),
        })
    }
}

#[async_trait]
impl PageTextSource for PdfiumRasterizer {
    async fn page_texts(&self, pdf: &Path) -> Result<Vec<String>, StudyBotError> {
        let path = pdf.to_path_buf();
        let lib = self.lib_path.clone();
        tokio::task::spawn_blocking(move || {
            let pdfium = bind_pdfium(lib.as_deref())?;
            let document = open_document(&pdfium, &path)?;
            let mut texts = Vec::with_capacity(document.pages().len() as usize);
            for (idx, page) in document.pages().iter().enumerate() {
                let text = page.text().map_err(|e| StudyBotError::CorruptPdf {
                    path: path.clone(),
                    detail: format!("text extraction failed on page {idx}: {e:?}"),
                })?;
                texts.push(text.all());
            }
            debug!("Extracted text from {} pages of {}", texts.len(), path.display());
            Ok(texts)
        })
        .await
        .map_err(|e| StudyBotError::Internal(format!("Text task panicked: {e}")))?
    }
}

fn bind_pdfium(lib_dir: Option<&Path>) -> Result<Pdfium, StudyBotError> {
    let bindings = match lib_dir {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| StudyBotError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

fn open_document<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, StudyBotError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| StudyBotError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })
}

fn render_page_blocking(
    lib_dir: Option<&Path>,
    path: &Path,
    page_index: usize,
    dpi: u32,
) -> Result<DynamicImage, StudyBotError> {
    let pdfium = bind_pdfium(lib_dir)?;
    let document = open_document(&pdfium, path)?;
    let pages = document.pages();

    let page = pages
        .get(page_index as u16)
        .map_err(|e| StudyBotError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("page {page_index}: {e:?}"),
        })?;

    // PDF user space is 72 units per inch.
    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(MAX_RENDERED_PIXELS)
        .set_maximum_height(MAX_RENDERED_PIXELS);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| StudyBotError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("render page {page_index}: {e:?}"),
        })?;

    let image = bitmap.as_image();
    debug!(
        "Rendered {} page {} → {}x{} px",
        path.display(),
        page_index,
        image.width(),
        image.height()
    );
    Ok(image)
}

/// Encode a rendered page as a base64 PNG attachment.
///
/// PNG keeps glyph edges crisp; JPEG artefacts on small maths notation
/// noticeably hurt transcription.
pub fn encode_png(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(ImageData::new(STANDARD.encode(&buf), "image/png").with_detail("high"))
}

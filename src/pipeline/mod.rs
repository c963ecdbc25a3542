//! Per-page building blocks shared by ingestion and report analysis.
//!
//! ```text
//! input ──▶ render ──▶ llm
//! (discover)  (pdfium)   (model call)
//! ```
//!
//! 1. [`input`] : find `y{YYYY}PAPER{N}.pdf` papers and `Report_{YYYY}.pdf`
//!    reports by explicit filename pattern
//! 2. [`render`]: page counts, page images and page text; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`llm`]   : one prompt (plus optional image) to the model; the only
//!    stage with network I/O

pub mod input;
pub mod llm;
pub mod render;

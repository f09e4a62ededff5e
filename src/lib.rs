//! fwtrace - static classification of Cortex-M firmware images
//!
//! This library loads a raw firmware image as little-endian 16-bit words,
//! reconstructs the exception/interrupt vector table, and walks every
//! handler to classify each reachable location as code or literal data.
//!
//! # Pipeline
//!
//! - **Loading** ([`loader`]): bytes to 16-bit words, odd tail kept
//! - **Memory image** ([`memory`]): one cell per word, monotonic kinds
//! - **Vector table** ([`vectors`]): the fixed 48-entry Cortex-M layout
//! - **Tracing** ([`classifier`]): worklist walk driven by the [`decoder`]
//! - **Reporting** ([`report`]): deterministic text or JSON dump
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use fwtrace::{analyze_file, render_report};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = analyze_file("firmware.bin")?;
//!     print!("{}", render_report(&image));
//!     Ok(())
//! }
//! ```
//!
//! Any conflicting classification or unsupported encoding aborts the run;
//! there is no partial report.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod classifier;
pub mod decoder;
pub mod error;
pub mod loader;
pub mod memory;
pub mod report;
pub mod types;
pub mod vectors;

pub use classifier::Classifier;
pub use error::{AnalyzerError, Result};
pub use memory::MemoryImage;
pub use report::{JsonFormatter, ReportFormatter, TextFormatter};
pub use types::{AnalyzerOptions, Cell, CellKind, ImpliedReference, Instruction, KindSummary};

use std::path::Path;
use tracing::info;

/// Analyze a firmware file by path with default options.
///
/// # Example
///
/// ```rust,no_run
/// use fwtrace::analyze_file;
///
/// let image = analyze_file("firmware.bin")?;
/// println!("{}", image.summary());
/// # Ok::<(), fwtrace::AnalyzerError>(())
/// ```
pub fn analyze_file<P: AsRef<Path>>(path: P) -> Result<MemoryImage> {
    analyze_file_with_options(path, &AnalyzerOptions::new())
}

/// Analyze a firmware file by path with custom options.
pub fn analyze_file_with_options<P: AsRef<Path>>(
    path: P,
    options: &AnalyzerOptions,
) -> Result<MemoryImage> {
    let data = std::fs::read(path)?;
    analyze_bytes_with_options(&data, options)
}

/// Analyze an in-memory firmware image with default options.
pub fn analyze_bytes(data: &[u8]) -> Result<MemoryImage> {
    analyze_bytes_with_options(data, &AnalyzerOptions::new())
}

/// Analyze an in-memory firmware image with custom options.
///
/// # Example
///
/// ```rust
/// use fwtrace::{analyze_bytes_with_options, AnalyzerOptions, CellKind};
///
/// let image = analyze_bytes_with_options(&[0u8; 0xC0], &AnalyzerOptions::vectors_only())?;
/// assert!(image.cells().all(|c| c.kind == CellKind::VectorTable));
/// # Ok::<(), fwtrace::AnalyzerError>(())
/// ```
pub fn analyze_bytes_with_options(data: &[u8], options: &AnalyzerOptions) -> Result<MemoryImage> {
    let words = loader::load_words(data)?;
    // An odd tail byte would otherwise complete a truncated last vector.
    if data.len() < vectors::TABLE_SIZE as usize {
        return Err(AnalyzerError::MalformedInput {
            message: format!(
                "image of {} bytes is shorter than the {}-byte vector table",
                data.len(),
                vectors::TABLE_SIZE
            ),
        });
    }

    let mut image = MemoryImage::from_words(&words);
    let vectors = vectors::analyze(&mut image)?;
    if options.trace_code {
        classifier::classify(&mut image, &vectors, options)?;
    }
    info!(words = image.len(), summary = %image.summary(), "analysis complete");
    Ok(image)
}

/// Render the text report of a classified image.
pub fn render_report(image: &MemoryImage) -> String {
    TextFormatter::new().format_report(image)
}

/// Get version information for this library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

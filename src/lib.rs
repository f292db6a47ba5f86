// Resume Analyzer - native preview and results backend
//
// This crate renders the first page of an uploaded resume into a PNG preview
// using PDFium, and loads stored analysis records for the results page.

pub mod commands;
pub mod config;
pub mod pdf;
pub mod resume;

pub use commands::{AppState, CommandError, ConvertOutcome};
pub use config::{AppConfig, ConfigError};
pub use pdf::{
    convert_pdf_to_image, ConversionError, ConversionResult, ImageFile, PdfPageRasterizer,
    PdfiumLoader, SourceDocument,
};
pub use resume::{load_resume, FileStore, KvStore, MemoryStore, ResumePage};

use std::path::PathBuf;

/// Check if a name looks like a PDF (extension check only).
pub fn looks_like_pdf(name: &str) -> bool {
    name.to_lowercase().ends_with(".pdf")
}

/// Resolve a command-line input to an existing file.
///
/// Accepts plain paths, `file://` URLs and percent-encoded paths
/// (e.g., spaces as %20).
pub fn resolve_input(arg: &str) -> Option<PathBuf> {
    // First try as a direct file path
    let direct = PathBuf::from(arg);
    if direct.is_file() {
        return Some(direct);
    }

    // Handle file:// URLs
    if arg.starts_with("file://") {
        if let Ok(url) = url::Url::parse(arg) {
            if let Ok(path) = url.to_file_path() {
                if path.is_file() {
                    return Some(path);
                }
            }
        }
    }

    // Handle URL-encoded paths
    if let Ok(decoded) = urlencoding::decode(arg) {
        if decoded != arg {
            let decoded = PathBuf::from(decoded.into_owned());
            if decoded.is_file() {
                return Some(decoded);
            }
        }
    }

    None
}

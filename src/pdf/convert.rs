//! First-page PDF to PNG conversion.
//!
//! [`PdfPageRasterizer::convert`] never fails with an `Err` or a panic from
//! the engine: every outcome is packaged into a [`ConversionResult`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use serde::{Serialize, Serializer};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

use super::engine::{EngineCell, EngineLoader, RenderEngine, RenderRequest, RenderSurface};
use super::renderer::{PdfError, PdfiumLoader};

pub const PDF_MEDIA_TYPE: &str = "application/pdf";
pub const PNG_MEDIA_TYPE: &str = "image/png";

/// Errors surfaced in [`ConversionResult::error`].
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Invalid file type. Please provide a PDF file.")]
    InvalidFileType,

    #[error("Failed to convert PDF: Failed to load PDF processing library")]
    EngineUnavailable {
        #[source]
        cause: PdfError,
    },

    #[error("Failed to get canvas context")]
    SurfaceUnavailable,

    #[error("Failed to create image blob")]
    EmptyImage,

    #[error("Failed to convert PDF: {0}")]
    Failed(String),
}

impl From<PdfError> for ConversionError {
    fn from(e: PdfError) -> Self {
        match e {
            PdfError::SurfaceUnavailable { .. } => ConversionError::SurfaceUnavailable,
            other => ConversionError::Failed(other.to_string()),
        }
    }
}

impl Serialize for ConversionError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Where the document's bytes come from.
#[derive(Debug, Clone)]
enum DocumentContent {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

/// A user-supplied document awaiting conversion.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    name: String,
    media_type: String,
    content: DocumentContent,
}

impl SourceDocument {
    /// An in-memory document with an explicit media type.
    pub fn from_bytes(
        name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            content: DocumentContent::Bytes(bytes),
        }
    }

    /// A document on disk. The media type comes from the extension and the
    /// bytes are only read when the document is converted.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let media_type = if crate::looks_like_pdf(&name) {
            PDF_MEDIA_TYPE
        } else {
            "application/octet-stream"
        };
        Self {
            name,
            media_type: media_type.to_string(),
            content: DocumentContent::Path(path),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn is_pdf(&self) -> bool {
        self.media_type == PDF_MEDIA_TYPE
    }

    /// The on-disk location, for path-backed documents.
    pub fn path(&self) -> Option<&Path> {
        match &self.content {
            DocumentContent::Path(path) => Some(path),
            DocumentContent::Bytes(_) => None,
        }
    }

    /// Read the full content.
    pub async fn read(&self) -> io::Result<Vec<u8>> {
        match &self.content {
            DocumentContent::Bytes(bytes) => Ok(bytes.clone()),
            DocumentContent::Path(path) => tokio::fs::read(path).await,
        }
    }
}

/// An encoded preview image.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFile {
    name: String,
    media_type: String,
    #[serde(rename = "size", serialize_with = "serialize_len")]
    bytes: Vec<u8>,
}

fn serialize_len<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(bytes.len() as u64)
}

impl ImageFile {
    pub fn png(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: PNG_MEDIA_TYPE.to_string(),
            bytes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write the image into `dir` under its own name.
    pub async fn write_to(&self, dir: &Path) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&self.name);
        tokio::fs::write(&path, &self.bytes).await?;
        Ok(path)
    }
}

/// Outcome of one conversion.
///
/// Either `image_url` and `file` are set and `error` is absent, or
/// `image_url` is empty, `file` is absent and `error` is set.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    image_url: String,
    file: Option<ImageFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ConversionError>,
}

impl ConversionResult {
    fn success(file: ImageFile) -> Self {
        Self {
            image_url: data_url(file.bytes()),
            file: Some(file),
            error: None,
        }
    }

    fn failure(error: ConversionError) -> Self {
        Self {
            image_url: String::new(),
            file: None,
            error: Some(error),
        }
    }

    /// Displayable `data:` URL of the preview, empty on failure.
    pub fn image_url(&self) -> &str {
        &self.image_url
    }

    pub fn file(&self) -> Option<&ImageFile> {
        self.file.as_ref()
    }

    pub fn error(&self) -> Option<&ConversionError> {
        self.error.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<ImageFile, ConversionError> {
        match (self.file, self.error) {
            (_, Some(error)) => Err(error),
            (Some(file), None) => Ok(file),
            (None, None) => Err(ConversionError::EmptyImage),
        }
    }
}

fn data_url(bytes: &[u8]) -> String {
    format!("data:{};base64,{}", PNG_MEDIA_TYPE, STANDARD.encode(bytes))
}

/// Name of the preview for a document: a trailing `.pdf` (any case) is
/// replaced with `.png`.
pub fn output_file_name(name: &str) -> String {
    let stem = name
        .len()
        .checked_sub(4)
        .filter(|&split| name.is_char_boundary(split))
        .filter(|&split| name[split..].eq_ignore_ascii_case(".pdf"))
        .map_or(name, |split| &name[..split]);
    format!("{}.png", stem)
}

/// Turns a rendered surface into image bytes.
pub trait SurfaceEncoder: Send + Sync {
    fn encode(&self, surface: &RenderSurface) -> Result<Vec<u8>, image::ImageError>;
}

/// Lossless PNG at the highest compression setting.
#[derive(Debug, Default, Clone, Copy)]
pub struct PngSurfaceEncoder;

impl SurfaceEncoder for PngSurfaceEncoder {
    fn encode(&self, surface: &RenderSurface) -> Result<Vec<u8>, image::ImageError> {
        let mut png_bytes = Vec::new();
        let encoder =
            PngEncoder::new_with_quality(&mut png_bytes, CompressionType::Best, FilterType::Adaptive);
        surface.as_image().write_with_encoder(encoder)?;
        Ok(png_bytes)
    }
}

/// Renders the first page of PDF documents into PNG previews.
pub struct PdfPageRasterizer<L: EngineLoader> {
    engine: EngineCell<L>,
    encoder: Box<dyn SurfaceEncoder>,
}

impl<L: EngineLoader> PdfPageRasterizer<L> {
    pub fn new(loader: L) -> Self {
        Self {
            engine: EngineCell::new(loader),
            encoder: Box::new(PngSurfaceEncoder),
        }
    }

    /// Replace the PNG encoder.
    pub fn with_encoder(mut self, encoder: impl SurfaceEncoder + 'static) -> Self {
        self.encoder = Box::new(encoder);
        self
    }

    /// Whether the rendering engine has been loaded.
    pub fn engine_ready(&self) -> bool {
        self.engine.is_ready()
    }

    pub fn loader(&self) -> &L {
        self.engine.loader()
    }

    /// Convert the first page of `file` into a PNG preview.
    pub async fn convert(&self, file: &SourceDocument) -> ConversionResult {
        match self.rasterize(file).await {
            Ok(image) => {
                tracing::info!(
                    source = file.name(),
                    output = image.name(),
                    bytes = image.len(),
                    "converted first page"
                );
                ConversionResult::success(image)
            }
            Err(e) => {
                tracing::warn!(source = file.name(), "conversion failed: {}", e);
                ConversionResult::failure(e)
            }
        }
    }

    async fn rasterize(&self, file: &SourceDocument) -> Result<ImageFile, ConversionError> {
        if !file.is_pdf() {
            return Err(ConversionError::InvalidFileType);
        }

        let engine = self
            .engine
            .acquire()
            .await
            .map_err(|cause| ConversionError::EngineUnavailable { cause })?;

        let bytes = file
            .read()
            .await
            .map_err(|e| ConversionError::Failed(e.to_string()))?;

        let surface = engine
            .render_page(bytes, RenderRequest::first_page())
            .await?;

        let png_bytes = self
            .encoder
            .encode(&surface)
            .map_err(|e| ConversionError::Failed(e.to_string()))?;
        drop(surface);

        if png_bytes.is_empty() {
            return Err(ConversionError::EmptyImage);
        }

        Ok(ImageFile::png(output_file_name(file.name()), png_bytes))
    }
}

static SHARED: OnceLock<PdfPageRasterizer<PdfiumLoader>> = OnceLock::new();

/// Process-wide rasterizer; PDFium is located through `PDFIUM_LIBRARY_PATH`.
pub fn shared_rasterizer() -> &'static PdfPageRasterizer<PdfiumLoader> {
    SHARED.get_or_init(|| PdfPageRasterizer::new(PdfiumLoader::from_env()))
}

/// Convert through [`shared_rasterizer`].
pub async fn convert_pdf_to_image(file: &SourceDocument) -> ConversionResult {
    shared_rasterizer().convert(file).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::engine::Viewport;

    #[test]
    fn test_output_name_strips_pdf_extension() {
        assert_eq!(output_file_name("resume.pdf"), "resume.png");
        assert_eq!(output_file_name("Report.PDF"), "Report.png");
        assert_eq!(output_file_name("cv.Pdf"), "cv.png");
    }

    #[test]
    fn test_output_name_without_pdf_extension() {
        assert_eq!(output_file_name("resume"), "resume.png");
        assert_eq!(output_file_name("resume.pdf.bak"), "resume.pdf.bak.png");
        assert_eq!(output_file_name(".pdf"), ".png");
        assert_eq!(output_file_name("pdf"), "pdf.png");
    }

    #[test]
    fn test_output_name_with_multibyte_characters() {
        assert_eq!(output_file_name("résumé.pdf"), "résumé.png");
        assert_eq!(output_file_name("履歴書"), "履歴書.png");
    }

    #[test]
    fn test_from_path_infers_media_type() {
        let pdf = SourceDocument::from_path("/tmp/Jane Doe.PDF");
        assert_eq!(pdf.name(), "Jane Doe.PDF");
        assert!(pdf.is_pdf());

        let docx = SourceDocument::from_path("/tmp/resume.docx");
        assert_eq!(docx.media_type(), "application/octet-stream");
        assert!(!docx.is_pdf());
    }

    #[test]
    fn test_png_encoder_writes_png_signature() {
        let viewport = Viewport::from_points(3.0, 2.0, 1.0);
        let surface = RenderSurface::allocate(&viewport).unwrap();
        let bytes = PngSurfaceEncoder.encode(&surface).unwrap();
        assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn test_data_url_prefix() {
        let url = data_url(&[1, 2, 3]);
        assert_eq!(url, "data:image/png;base64,AQID");
    }

    #[test]
    fn test_failure_result_serializes_error_message() {
        let result = ConversionResult::failure(ConversionError::InvalidFileType);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["imageUrl"], "");
        assert!(json["file"].is_null());
        assert_eq!(json["error"], "Invalid file type. Please provide a PDF file.");
    }

    #[test]
    fn test_success_result_serializes_file_size() {
        let result = ConversionResult::success(ImageFile::png("a.png", vec![0; 5]));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["file"]["name"], "a.png");
        assert_eq!(json["file"]["mediaType"], "image/png");
        assert_eq!(json["file"]["size"], 5);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_engine_error_keeps_conversion_prefix() {
        let error = ConversionError::EngineUnavailable {
            cause: PdfError::InitError("missing".into()),
        };
        assert_eq!(
            error.to_string(),
            "Failed to convert PDF: Failed to load PDF processing library"
        );
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_surface_error_maps_to_canvas_message() {
        let error = ConversionError::from(PdfError::SurfaceUnavailable {
            width: 0.0,
            height: 0.0,
        });
        assert_eq!(error.to_string(), "Failed to get canvas context");
    }

    #[tokio::test]
    async fn test_shared_rasterizer_rejects_non_pdf_without_loading() {
        let doc = SourceDocument::from_bytes("notes.txt", "text/plain", b"hello".to_vec());
        let result = convert_pdf_to_image(&doc).await;
        assert_eq!(
            result.error().map(|e| e.to_string()).as_deref(),
            Some("Invalid file type. Please provide a PDF file.")
        );
        assert!(result.file().is_none());
        assert!(result.image_url().is_empty());
        assert!(!shared_rasterizer().engine_ready());
    }
}

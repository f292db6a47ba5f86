//! Conversion pipeline tests against a scripted engine.

use image::{Rgba, RgbaImage};
use resume_analyzer::pdf::{
    ConversionError, EngineLoader, PdfError, PdfPageRasterizer, RenderEngine, RenderRequest,
    RenderSurface, SurfaceEncoder, Viewport,
};
use resume_analyzer::{AppState, MemoryStore, SourceDocument};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Renders a letter-sized page for anything that starts with `%PDF-`.
struct FakeEngine {
    renders: Arc<AtomicUsize>,
}

impl RenderEngine for FakeEngine {
    async fn render_page(
        &self,
        bytes: Vec<u8>,
        request: RenderRequest,
    ) -> Result<RenderSurface, PdfError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if !bytes.starts_with(b"%PDF-") {
            return Err(PdfError::LoadError("Invalid PDF structure".into()));
        }
        assert_eq!(request.page_index, 0);
        let viewport = Viewport::from_points(61.2, 79.2, request.scale);
        let mut surface = RenderSurface::allocate(&viewport).ok_or(PdfError::SurfaceUnavailable {
            width: viewport.width,
            height: viewport.height,
        })?;
        let (w, h) = (surface.width(), surface.height());
        surface.draw(RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255])));
        Ok(surface)
    }
}

#[derive(Default)]
struct FakeLoader {
    loads: AtomicUsize,
    failures_left: AtomicUsize,
    renders: Arc<AtomicUsize>,
}

impl FakeLoader {
    fn failing(times: usize) -> Self {
        let loader = Self::default();
        loader.failures_left.store(times, Ordering::SeqCst);
        loader
    }
}

impl EngineLoader for FakeLoader {
    type Engine = FakeEngine;

    async fn load(&self) -> Result<FakeEngine, PdfError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(PdfError::InitError("libpdfium.so: cannot open shared object".into()));
        }
        Ok(FakeEngine {
            renders: self.renders.clone(),
        })
    }
}

struct EmptyEncoder;

impl SurfaceEncoder for EmptyEncoder {
    fn encode(&self, _surface: &RenderSurface) -> Result<Vec<u8>, image::ImageError> {
        Ok(Vec::new())
    }
}

fn pdf(name: &str) -> SourceDocument {
    SourceDocument::from_bytes(name, "application/pdf", b"%PDF-1.7\n...".to_vec())
}

#[tokio::test]
async fn test_non_pdf_rejected_without_loading_engine() {
    let rasterizer = PdfPageRasterizer::new(FakeLoader::default());
    let doc = SourceDocument::from_bytes("resume.docx", "application/msword", b"PK".to_vec());

    let result = rasterizer.convert(&doc).await;

    assert_eq!(
        result.error().unwrap().to_string(),
        "Invalid file type. Please provide a PDF file."
    );
    assert!(result.image_url().is_empty());
    assert!(result.file().is_none());
    assert_eq!(rasterizer.loader().loads.load(Ordering::SeqCst), 0);
    assert!(!rasterizer.engine_ready());
}

#[tokio::test]
async fn test_pdf_extension_with_wrong_media_type_is_rejected() {
    let rasterizer = PdfPageRasterizer::new(FakeLoader::default());
    let doc = SourceDocument::from_bytes("resume.pdf", "application/octet-stream", b"%PDF-".to_vec());

    let result = rasterizer.convert(&doc).await;
    assert!(matches!(result.error(), Some(ConversionError::InvalidFileType)));
}

#[tokio::test]
async fn test_well_formed_pdf_produces_png() {
    let rasterizer = PdfPageRasterizer::new(FakeLoader::default());

    let result = rasterizer.convert(&pdf("Jane Doe.pdf")).await;

    assert!(result.error().is_none());
    assert!(result.image_url().starts_with("data:image/png;base64,"));
    let file = result.file().unwrap();
    assert_eq!(file.name(), "Jane Doe.png");
    assert_eq!(file.media_type(), "image/png");
    assert!(file.len() > 0);

    let decoded = image::load_from_memory(file.bytes()).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (122, 158));
}

#[tokio::test]
async fn test_uppercase_extension_is_stripped() {
    let rasterizer = PdfPageRasterizer::new(FakeLoader::default());
    let result = rasterizer.convert(&pdf("Report.PDF")).await;
    assert_eq!(result.into_result().unwrap().name(), "Report.png");
}

#[tokio::test]
async fn test_concurrent_conversions_share_one_engine_load() {
    let rasterizer = PdfPageRasterizer::new(FakeLoader::default());
    let good = pdf("good.pdf");
    let broken = SourceDocument::from_bytes("broken.pdf", "application/pdf", b"garbage".to_vec());

    let (a, b) = tokio::join!(rasterizer.convert(&good), rasterizer.convert(&broken));

    assert_eq!(rasterizer.loader().loads.load(Ordering::SeqCst), 1);
    assert_eq!(rasterizer.loader().renders.load(Ordering::SeqCst), 2);
    assert!(a.is_success());
    assert!(!b.is_success());
}

#[tokio::test]
async fn test_malformed_document_reports_details() {
    let rasterizer = PdfPageRasterizer::new(FakeLoader::default());
    let doc = SourceDocument::from_bytes("broken.pdf", "application/pdf", b"not a pdf".to_vec());

    let result = rasterizer.convert(&doc).await;

    let message = result.error().unwrap().to_string();
    assert!(message.starts_with("Failed to convert PDF:"));
    assert!(message.contains("Invalid PDF structure"));
    assert!(result.file().is_none());
    assert!(result.image_url().is_empty());
}

#[tokio::test]
async fn test_empty_encoding_reports_blob_failure() {
    let rasterizer = PdfPageRasterizer::new(FakeLoader::default()).with_encoder(EmptyEncoder);

    let result = rasterizer.convert(&pdf("resume.pdf")).await;

    assert_eq!(result.error().unwrap().to_string(), "Failed to create image blob");
    assert!(result.file().is_none());
    assert!(result.image_url().is_empty());
}

#[tokio::test]
async fn test_engine_load_failure_is_wrapped_and_retried() {
    let rasterizer = PdfPageRasterizer::new(FakeLoader::failing(1));

    let first = rasterizer.convert(&pdf("resume.pdf")).await;
    let error = first.error().unwrap();
    assert_eq!(
        error.to_string(),
        "Failed to convert PDF: Failed to load PDF processing library"
    );
    let cause = std::error::Error::source(error).unwrap().to_string();
    assert!(cause.contains("cannot open shared object"));
    assert!(!rasterizer.engine_ready());

    let second = rasterizer.convert(&pdf("resume.pdf")).await;
    assert!(second.is_success());
    assert_eq!(rasterizer.loader().loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_conversions_racing_a_failed_load_share_it() {
    let rasterizer = PdfPageRasterizer::new(FakeLoader::failing(1));
    let doc = pdf("resume.pdf");

    let (a, b, c) = tokio::join!(
        rasterizer.convert(&doc),
        rasterizer.convert(&doc),
        rasterizer.convert(&doc)
    );

    for result in [&a, &b, &c] {
        assert!(matches!(
            result.error(),
            Some(ConversionError::EngineUnavailable { .. })
        ));
    }
    assert_eq!(rasterizer.loader().loads.load(Ordering::SeqCst), 1);
    assert_eq!(rasterizer.loader().renders.load(Ordering::SeqCst), 0);

    assert!(rasterizer.convert(&doc).await.is_success());
    assert_eq!(rasterizer.loader().loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_path_backed_document_is_read_on_convert() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cv.pdf");
    std::fs::write(&path, b"%PDF-1.4 on disk").unwrap();

    let rasterizer = PdfPageRasterizer::new(FakeLoader::default());
    let result = rasterizer.convert(&SourceDocument::from_path(&path)).await;
    assert!(result.is_success());

    std::fs::remove_file(&path).unwrap();
    let missing = rasterizer.convert(&SourceDocument::from_path(&path)).await;
    assert!(missing
        .error()
        .unwrap()
        .to_string()
        .starts_with("Failed to convert PDF:"));
}

#[tokio::test]
async fn test_app_state_writes_previews_next_to_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("Resume.PDF");
    std::fs::write(&input, b"%PDF-1.4").unwrap();
    let broken = dir.path().join("broken.pdf");
    std::fs::write(&broken, b"junk").unwrap();

    let state = AppState::new(PdfPageRasterizer::new(FakeLoader::default()), MemoryStore::new());
    let outcomes = state
        .convert_documents(vec![
            SourceDocument::from_path(&input),
            SourceDocument::from_path(&broken),
        ])
        .await;

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].is_success());
    assert_eq!(outcomes[0].written_to, Some(dir.path().join("Resume.png")));
    assert!(dir.path().join("Resume.png").is_file());
    assert!(!outcomes[1].is_success());
    assert!(outcomes[1].written_to.is_none());
}

#[tokio::test]
async fn test_app_state_honours_output_dir() {
    let input_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let input = input_dir.path().join("resume.pdf");
    std::fs::write(&input, b"%PDF-1.4").unwrap();

    let state = AppState::new(PdfPageRasterizer::new(FakeLoader::default()), MemoryStore::new())
        .with_output_dir(Some(out_dir.path().join("previews")));
    let outcome = state.convert_document(&SourceDocument::from_path(&input)).await;

    assert_eq!(
        outcome.written_to,
        Some(out_dir.path().join("previews").join("resume.png"))
    );
}

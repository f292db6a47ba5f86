//! PDFium-backed rendering engine.
//!
//! Note: pdfium-render's Pdfium struct is not Send+Sync, so it never leaves
//! the worker thread that bound it. The engine handle only carries a channel
//! to that thread.

use pdfium_render::prelude::*;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use super::engine::{EngineLoader, RenderEngine, RenderRequest, RenderSurface, Viewport};

/// Environment variable naming the PDFium library (file or directory).
pub const PDFIUM_LIBRARY_ENV: &str = "PDFIUM_LIBRARY_PATH";

const WORKER_NAME: &str = "pdf-render-worker";

/// Errors that can occur during PDF operations.
#[derive(Error, Debug, Clone)]
pub enum PdfError {
    #[error("Failed to initialize PDFium: {0}")]
    InitError(String),

    #[error("Failed to load PDF: {0}")]
    LoadError(String),

    #[error("Invalid page index: {0}")]
    InvalidPage(u16),

    #[error("Rendering failed: {0}")]
    RenderError(String),

    #[error("Cannot allocate a {width}x{height} render surface")]
    SurfaceUnavailable { width: f32, height: f32 },

    #[error("Render worker stopped")]
    WorkerGone,
}

impl Serialize for PdfError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Where the PDFium library was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibrarySource {
    Path(PathBuf),
    System,
}

/// Loads PDFium on a dedicated worker thread.
#[derive(Debug, Clone, Default)]
pub struct PdfiumLoader {
    library_path: Option<PathBuf>,
}

impl PdfiumLoader {
    /// Bind to the library at `library_path` first, if given.
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    /// Read the library location from `PDFIUM_LIBRARY_PATH`.
    pub fn from_env() -> Self {
        let library_path = std::env::var_os(PDFIUM_LIBRARY_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Self::new(library_path)
    }

    pub fn library_path(&self) -> Option<&Path> {
        self.library_path.as_deref()
    }
}

impl EngineLoader for PdfiumLoader {
    type Engine = PdfiumEngine;

    async fn load(&self) -> Result<PdfiumEngine, PdfError> {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel::<RenderJob>();
        let (ready_tx, ready_rx) = oneshot::channel();
        let library_path = self.library_path.clone();

        thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || run_worker(library_path, jobs_rx, ready_tx))
            .map_err(|e| PdfError::InitError(e.to_string()))?;

        let source = ready_rx.await.map_err(|_| PdfError::WorkerGone)??;
        tracing::info!(?source, "PDFium render worker ready");

        Ok(PdfiumEngine {
            jobs: jobs_tx,
            source,
        })
    }
}

/// Handle to the render worker. Cheap to share across tasks.
#[derive(Debug)]
pub struct PdfiumEngine {
    jobs: mpsc::UnboundedSender<RenderJob>,
    source: LibrarySource,
}

impl PdfiumEngine {
    pub fn source(&self) -> &LibrarySource {
        &self.source
    }
}

impl RenderEngine for PdfiumEngine {
    async fn render_page(
        &self,
        bytes: Vec<u8>,
        request: RenderRequest,
    ) -> Result<RenderSurface, PdfError> {
        let (reply, response) = oneshot::channel();
        self.jobs
            .send(RenderJob {
                bytes,
                request,
                reply,
            })
            .map_err(|_| PdfError::WorkerGone)?;
        response.await.map_err(|_| PdfError::WorkerGone)?
    }
}

struct RenderJob {
    bytes: Vec<u8>,
    request: RenderRequest,
    reply: oneshot::Sender<Result<RenderSurface, PdfError>>,
}

fn run_worker(
    library_path: Option<PathBuf>,
    mut jobs: mpsc::UnboundedReceiver<RenderJob>,
    ready: oneshot::Sender<Result<LibrarySource, PdfError>>,
) {
    let (pdfium, source) = match bind_pdfium(library_path.as_deref()) {
        Ok(bound) => bound,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(source)).is_err() {
        return;
    }

    while let Some(job) = jobs.blocking_recv() {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            render_page_with(&pdfium, &job.bytes, &job.request)
        }))
        .unwrap_or_else(|_| Err(PdfError::RenderError("PDFium panicked while rendering".into())));
        // The caller may have gone away; nothing to do then.
        let _ = job.reply.send(result);
    }
    tracing::debug!("render worker shutting down");
}

/// Bind to PDFium, trying the configured path, the executable's directory
/// and finally the system library.
fn bind_pdfium(library_path: Option<&Path>) -> Result<(Pdfium, LibrarySource), PdfError> {
    let mut candidates = Vec::new();

    // Strategy 1: explicitly configured file or directory
    if let Some(path) = library_path {
        if path.is_dir() {
            candidates.push(platform_library_at(path));
        } else {
            candidates.push(path.to_path_buf());
        }
    }

    // Strategy 2: library shipped next to the executable
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let bundled = platform_library_at(exe_dir);
            if bundled.exists() {
                candidates.push(bundled);
            }
        }
    }

    for candidate in candidates {
        match Pdfium::bind_to_library(&candidate) {
            Ok(bindings) => {
                tracing::debug!("bound PDFium library at {:?}", candidate);
                return Ok((Pdfium::new(bindings), LibrarySource::Path(candidate)));
            }
            Err(e) => {
                tracing::warn!("failed to bind PDFium at {:?}: {:?}", candidate, e);
            }
        }
    }

    // Strategy 3: system library (for development)
    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok((Pdfium::new(bindings), LibrarySource::System)),
        Err(e) => Err(PdfError::InitError(format!(
            "could not load the PDFium library (set {} to its location): {:?}",
            PDFIUM_LIBRARY_ENV, e
        ))),
    }
}

/// `libpdfium.so`, `libpdfium.dylib` or `pdfium.dll` inside `dir`.
fn platform_library_at(dir: &Path) -> PathBuf {
    dir.join(format!(
        "{}pdfium{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    ))
}

/// Open `bytes`, render the requested page, and return the filled surface.
fn render_page_with(
    pdfium: &Pdfium,
    bytes: &[u8],
    request: &RenderRequest,
) -> Result<RenderSurface, PdfError> {
    let doc = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| PdfError::LoadError(e.to_string()))?;

    let page = doc
        .pages()
        .get(request.page_index)
        .map_err(|_| PdfError::InvalidPage(request.page_index))?;

    let viewport = Viewport::from_points(page.width().value, page.height().value, request.scale);
    let mut surface =
        RenderSurface::allocate(&viewport).ok_or(PdfError::SurfaceUnavailable {
            width: viewport.width,
            height: viewport.height,
        })?;

    // Configure high-quality rendering
    let config = PdfRenderConfig::new()
        .set_target_width(surface.width() as i32)
        .set_target_height(surface.height() as i32)
        .set_text_smoothing(request.smoothing)
        .set_image_smoothing(request.smoothing)
        .set_path_smoothing(request.smoothing)
        .render_form_data(true)
        .render_annotations(true);

    let bitmap = page
        .render_with_config(&config)
        .map_err(|e| PdfError::RenderError(e.to_string()))?;

    surface.draw(bitmap.as_image().to_rgba8());
    Ok(surface)
}

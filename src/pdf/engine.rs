//! Rendering engine seam.
//!
//! The rasterizer never talks to PDFium directly. It asks an [`EngineLoader`]
//! for a [`RenderEngine`] once, caches it in an [`EngineCell`], and sends
//! every page render through it.

use futures::future::{BoxFuture, FutureExt, Shared};
use image::RgbaImage;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use super::renderer::PdfError;

/// Fixed render scale. 2.0 doubles the page's native size for legibility.
pub const RENDER_SCALE: f32 = 2.0;

/// Largest surface side we are willing to allocate, in pixels.
pub const MAX_SURFACE_SIDE: u32 = 16_384;

/// What to render and how.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    /// Page index (0-based)
    pub page_index: u16,
    /// Render scale (1.0 = 72 DPI, 2.0 = 144 DPI, etc.)
    pub scale: f32,
    /// Anti-alias text, images and paths
    pub smoothing: bool,
}

impl RenderRequest {
    /// The first page at the fixed scale with high-quality smoothing.
    pub fn first_page() -> Self {
        Self {
            page_index: 0,
            scale: RENDER_SCALE,
            smoothing: true,
        }
    }
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self::first_page()
    }
}

/// Page size mapped to output pixels at a given scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

impl Viewport {
    /// Build a viewport from a page size in PDF points.
    pub fn from_points(width: f32, height: f32, scale: f32) -> Self {
        Self {
            width: width * scale,
            height: height * scale,
            scale,
        }
    }

    /// Width and height snapped to the integer pixel grid.
    pub fn pixel_size(&self) -> (u32, u32) {
        (snap(self.width), snap(self.height))
    }
}

fn snap(value: f32) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.floor() as u32
    } else {
        0
    }
}

/// In-memory bitmap a single page is rendered into.
#[derive(Debug, Clone)]
pub struct RenderSurface {
    pixels: RgbaImage,
}

impl RenderSurface {
    /// Allocate a blank surface for `viewport`.
    ///
    /// Returns `None` when the viewport is empty or larger than
    /// [`MAX_SURFACE_SIDE`] on either side.
    pub fn allocate(viewport: &Viewport) -> Option<Self> {
        let (width, height) = viewport.pixel_size();
        if width == 0 || height == 0 || width > MAX_SURFACE_SIDE || height > MAX_SURFACE_SIDE {
            return None;
        }
        Some(Self {
            pixels: RgbaImage::new(width, height),
        })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Replace the surface contents with a rendered bitmap of the same size.
    ///
    /// Bitmaps of a different size are resized to fit.
    pub fn draw(&mut self, rendered: RgbaImage) {
        if rendered.dimensions() == self.pixels.dimensions() {
            self.pixels = rendered;
        } else {
            self.pixels = image::imageops::resize(
                &rendered,
                self.pixels.width(),
                self.pixels.height(),
                image::imageops::FilterType::Lanczos3,
            );
        }
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.pixels
    }
}

/// A loaded PDF rendering capability.
pub trait RenderEngine: Send + Sync + 'static {
    /// Open `bytes` as a PDF and render one page of it.
    fn render_page(
        &self,
        bytes: Vec<u8>,
        request: RenderRequest,
    ) -> impl Future<Output = Result<RenderSurface, PdfError>> + Send;
}

/// Produces a [`RenderEngine`]. Called at most once per successful load.
pub trait EngineLoader: Send + Sync + 'static {
    type Engine: RenderEngine;

    fn load(&self) -> impl Future<Output = Result<Self::Engine, PdfError>> + Send;
}

type LoadAttempt<E> = Shared<BoxFuture<'static, Result<Arc<E>, PdfError>>>;

struct PendingLoad<E> {
    attempt: u64,
    load: LoadAttempt<E>,
}

/// Lazily initialised engine shared by all conversions.
///
/// Callers that arrive while a load is in flight await that same load, and
/// all of them see its outcome. A failed load is forgotten once it settles,
/// so only later callers retry.
pub struct EngineCell<L: EngineLoader> {
    loader: Arc<L>,
    engine: OnceLock<Arc<L::Engine>>,
    pending: Mutex<Option<PendingLoad<L::Engine>>>,
    attempts: AtomicU64,
}

impl<L: EngineLoader> EngineCell<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader: Arc::new(loader),
            engine: OnceLock::new(),
            pending: Mutex::new(None),
            attempts: AtomicU64::new(0),
        }
    }

    /// Return the engine, loading it on first use.
    pub async fn acquire(&self) -> Result<&L::Engine, PdfError> {
        if let Some(engine) = self.engine.get() {
            return Ok(Arc::as_ref(engine));
        }

        let (attempt, load) = self.join_or_start_load();
        let outcome = load.await;
        self.settle(attempt);

        let engine = outcome?;
        Ok(Arc::as_ref(self.engine.get_or_init(|| engine)))
    }

    fn join_or_start_load(&self) -> (u64, LoadAttempt<L::Engine>) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = pending.as_ref() {
            return (current.attempt, current.load.clone());
        }

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let loader = Arc::clone(&self.loader);
        let load = async move {
            tracing::debug!(attempt, "loading PDF rendering engine");
            match loader.load().await {
                Ok(engine) => Ok(Arc::new(engine)),
                Err(e) => {
                    tracing::warn!(attempt, "PDF rendering engine failed to load: {}", e);
                    Err(e)
                }
            }
        }
        .boxed()
        .shared();

        *pending = Some(PendingLoad {
            attempt,
            load: load.clone(),
        });
        (attempt, load)
    }

    /// Drop the finished attempt so a failure is not replayed to later callers.
    fn settle(&self, attempt: u64) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.as_ref().is_some_and(|current| current.attempt == attempt) {
            *pending = None;
        }
    }

    /// Whether an engine has been loaded.
    pub fn is_ready(&self) -> bool {
        self.engine.get().is_some()
    }

    /// Number of load attempts started so far.
    pub fn load_attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }
}

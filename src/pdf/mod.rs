//! PDF preview rendering using pdfium-render.
//!
//! This module provides:
//! - A lazily loaded, shared rendering engine
//! - First-page rasterization at 2x scale
//! - PNG packaging of the rendered page

mod convert;
mod engine;
mod renderer;

pub use convert::*;
pub use engine::*;
pub use renderer::*;

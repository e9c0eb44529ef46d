//! PDF loading, page geometry and rasterization.
//!
//! [`Document::open`] parses a byte buffer with lopdf and snapshots each
//! page's box, rotation and content stream so the document can be shared
//! across rasterization tasks. [`compute_viewport`] derives the pixel-space
//! transform for a page at a scale, and [`ContentRasterizer`] paints pages
//! with tiny-skia.

mod document;
mod geometry;
mod raster;
mod viewport;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub use document::{Document, DocumentError, DocumentId, Page, PageContent, Rotation};
pub use geometry::Transform;
pub use raster::{
    image_to_pixmap, pixmap_to_image, ContentRasterizer, Rasterizer, RenderError, RenderedPage,
    YIELD_EVERY,
};
pub use viewport::{compute_viewport, fit_page_scale, fit_width_scale, Viewport};

pub use image::RgbaImage;
pub use slipview_scheduler::CancellationToken;

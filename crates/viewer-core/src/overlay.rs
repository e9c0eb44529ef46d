//! Per-page highlight overlays.

use doc_model::AnnotationBox;
use image::RgbaImage;
use pdf_engine::{image_to_pixmap, pixmap_to_image, RenderedPage, Transform};
use serde::{Deserialize, Serialize};
use tiny_skia::{Color, Paint, PathBuilder, Rect, Stroke};

use crate::mapper::{map_rect, HighlightRect};

/// A mapped annotation ready for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Highlight<'a> {
    pub rect: HighlightRect,
    pub label: &'a str,
}

/// Highlights of one page, computed lazily from the annotation set.
///
/// Iterating does not consume the value; every call to [`iter`](Self::iter)
/// starts from the first matching box again.
#[derive(Debug, Clone, Copy)]
pub struct PageOverlays<'a> {
    boxes: &'a [AnnotationBox],
    page: u32,
    transform: Transform,
}

impl<'a> PageOverlays<'a> {
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn iter(&self) -> Overlays<'a> {
        Overlays { boxes: self.boxes.iter(), page: self.page, transform: self.transform }
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl<'a> IntoIterator for &PageOverlays<'a> {
    type Item = Highlight<'a>;
    type IntoIter = Overlays<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct Overlays<'a> {
    boxes: std::slice::Iter<'a, AnnotationBox>,
    page: u32,
    transform: Transform,
}

impl<'a> Iterator for Overlays<'a> {
    type Item = Highlight<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let page = self.page;
        let annotation = self.boxes.by_ref().find(|annotation| annotation.page == page)?;

        Some(Highlight {
            rect: map_rect(annotation.bbox, &self.transform),
            label: annotation.label.as_str(),
        })
    }
}

/// Selects the boxes on `page` and maps them through `transform`, in the
/// order they appear in `boxes`.
pub fn overlays_for_page<'a>(
    boxes: &'a [AnnotationBox],
    page: u32,
    transform: &Transform,
) -> PageOverlays<'a> {
    PageOverlays { boxes, page, transform: *transform }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightStyle {
    /// Straight-alpha RGBA.
    pub fill: [u8; 4],
    pub stroke: [u8; 4],
    pub stroke_width: f32,
}

impl Default for HighlightStyle {
    fn default() -> Self {
        Self { fill: [255, 214, 0, 72], stroke: [232, 93, 4, 255], stroke_width: 2.0 }
    }
}

/// Draws `highlights` over a copy of the rendered frame.
pub fn composite<'a>(
    frame: &RenderedPage,
    highlights: impl IntoIterator<Item = Highlight<'a>>,
    style: &HighlightStyle,
) -> RgbaImage {
    let Some(mut pixmap) = image_to_pixmap(&frame.image) else {
        return frame.image.clone();
    };

    let fill = paint(style.fill);
    let outline = paint(style.stroke);
    let stroke = Stroke { width: style.stroke_width, ..Stroke::default() };

    for highlight in highlights {
        let HighlightRect { left, top, width, height } = highlight.rect;
        let Some(rect) = Rect::from_xywh(left as f32, top as f32, width as f32, height as f32) else {
            continue;
        };

        pixmap.fill_rect(rect, &fill, tiny_skia::Transform::identity(), None);

        if style.stroke_width > 0.0 {
            let path = PathBuilder::from_rect(rect);
            pixmap.stroke_path(&path, &outline, &stroke, tiny_skia::Transform::identity(), None);
        }
    }

    pixmap_to_image(&pixmap)
}

fn paint([r, g, b, a]: [u8; 4]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(Color::from_rgba8(r, g, b, a));
    paint.anti_alias = false;
    paint
}

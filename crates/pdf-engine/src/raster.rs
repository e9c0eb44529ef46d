//! Page rasterization.
//!
//! [`ContentRasterizer`] paints the vector subset of a page's content stream
//! with tiny-skia: graphics state, device colours and path construction and
//! painting. Text, images, shadings and clipping are skipped. It suspends every
//! [`YIELD_EVERY`] operators so sibling pages make progress on a
//! single-threaded executor, and stops early once its token is cancelled.

use image::{Rgba, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::Object;
use slipview_scheduler::CancellationToken;
use std::future::Future;
use tiny_skia::{
    Color, ColorU8, FillRule, Paint, Path, PathBuilder, Pixmap, Rect, Stroke, Transform,
};

use crate::document::{DocumentId, Page, PageContent};
use crate::viewport::Viewport;

/// Operators interpreted between two suspension points.
pub const YIELD_EVERY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("page {page}: content could not be decoded: {reason}")]
    DecodeFailed { page: u32, reason: String },
    #[error("cannot allocate a {width}x{height} surface")]
    Surface { width: u32, height: u32 },
    #[error("rasterization cancelled")]
    Cancelled,
}

/// Pixels of one page at one viewport.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub document: DocumentId,
    pub page: u32,
    pub viewport: Viewport,
    pub image: RgbaImage,
}

/// Produces the pixels of a page at a viewport.
///
/// Implementations may suspend while decoding and should return
/// [`RenderError::Cancelled`] promptly once `cancel` fires.
pub trait Rasterizer: Send + Sync + 'static {
    fn rasterize(
        &self,
        document: DocumentId,
        page: &Page,
        viewport: &Viewport,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<RenderedPage, RenderError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRasterizer {
    background: [u8; 4],
}

impl ContentRasterizer {
    pub fn new() -> Self {
        Self { background: [255, 255, 255, 255] }
    }

    pub fn with_background(background: [u8; 4]) -> Self {
        Self { background }
    }

    pub fn background(&self) -> [u8; 4] {
        self.background
    }
}

impl Default for ContentRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Rasterizer for ContentRasterizer {
    async fn rasterize(
        &self,
        document: DocumentId,
        page: &Page,
        viewport: &Viewport,
        cancel: &CancellationToken,
    ) -> Result<RenderedPage, RenderError> {
        let decode_failed =
            |reason: String| RenderError::DecodeFailed { page: page.index(), reason };

        let bytes = match page.content() {
            PageContent::Stream(bytes) => bytes,
            PageContent::Unreadable(reason) => return Err(decode_failed(reason.clone())),
        };

        let content = Content::decode(bytes).map_err(|err| decode_failed(err.to_string()))?;

        let (width, height) = (viewport.pixel_width(), viewport.pixel_height());
        let mut pixmap = Pixmap::new(width, height).ok_or(RenderError::Surface { width, height })?;
        let [r, g, b, a] = self.background;
        pixmap.fill(Color::from_rgba8(r, g, b, a));

        let mut painter = Painter::new(viewport.user_transform.to_skia());

        for (position, operation) in content.operations.iter().enumerate() {
            if position % YIELD_EVERY == 0 {
                if cancel.is_cancelled() {
                    return Err(RenderError::Cancelled);
                }
                tokio::task::yield_now().await;
            }

            painter.apply(&mut pixmap, operation).map_err(decode_failed)?;
        }

        if cancel.is_cancelled() {
            return Err(RenderError::Cancelled);
        }

        Ok(RenderedPage { document, page: page.index(), viewport: *viewport, image: pixmap_to_image(&pixmap) })
    }
}

/// Converts premultiplied tiny-skia pixels into a straight-alpha image.
pub fn pixmap_to_image(pixmap: &Pixmap) -> RgbaImage {
    let mut image = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in image.pixels_mut().zip(pixmap.pixels()) {
        let color = src.demultiply();
        *dst = Rgba([color.red(), color.green(), color.blue(), color.alpha()]);
    }
    image
}

/// Converts a straight-alpha image into a premultiplied pixmap.
pub fn image_to_pixmap(image: &RgbaImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(image.width(), image.height())?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
        let Rgba([r, g, b, a]) = *src;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Some(pixmap)
}

#[derive(Debug, Clone, Copy)]
struct GraphicsState {
    ctm: Transform,
    fill: Color,
    stroke: Color,
    line_width: f32,
}

struct Painter {
    base: Transform,
    state: GraphicsState,
    saved: Vec<GraphicsState>,
    path: PathBuilder,
    current: Option<(f32, f32)>,
}

impl Painter {
    fn new(base: Transform) -> Self {
        Self {
            base,
            state: GraphicsState {
                ctm: Transform::identity(),
                fill: Color::BLACK,
                stroke: Color::BLACK,
                line_width: 1.0,
            },
            saved: Vec::new(),
            path: PathBuilder::new(),
            current: None,
        }
    }

    fn apply(&mut self, pixmap: &mut Pixmap, operation: &Operation) -> Result<(), String> {
        match operation.operator.as_str() {
            "q" => self.saved.push(self.state),
            "Q" => {
                // Unbalanced restores are common in the wild and harmless.
                if let Some(state) = self.saved.pop() {
                    self.state = state;
                }
            }
            "cm" => {
                let [a, b, c, d, e, f] = numbers(operation)?;
                self.state.ctm = self.state.ctm.pre_concat(Transform::from_row(a, b, c, d, e, f));
            }
            "w" => {
                let [width] = numbers(operation)?;
                self.state.line_width = width.max(0.0);
            }
            "g" => self.state.fill = gray(numbers(operation)?),
            "G" => self.state.stroke = gray(numbers(operation)?),
            "rg" => self.state.fill = rgb(numbers(operation)?),
            "RG" => self.state.stroke = rgb(numbers(operation)?),
            "k" => self.state.fill = cmyk(numbers(operation)?),
            "K" => self.state.stroke = cmyk(numbers(operation)?),
            "m" => {
                let [x, y] = numbers(operation)?;
                self.path.move_to(x, y);
                self.current = Some((x, y));
            }
            "l" => {
                let [x, y] = numbers(operation)?;
                self.path.line_to(x, y);
                self.current = Some((x, y));
            }
            "c" => {
                let [x1, y1, x2, y2, x3, y3] = numbers(operation)?;
                self.path.cubic_to(x1, y1, x2, y2, x3, y3);
                self.current = Some((x3, y3));
            }
            "v" => {
                let [x2, y2, x3, y3] = numbers(operation)?;
                if let Some((x1, y1)) = self.current {
                    self.path.cubic_to(x1, y1, x2, y2, x3, y3);
                    self.current = Some((x3, y3));
                }
            }
            "y" => {
                let [x1, y1, x3, y3] = numbers(operation)?;
                self.path.cubic_to(x1, y1, x3, y3, x3, y3);
                self.current = Some((x3, y3));
            }
            "h" => self.path.close(),
            "re" => {
                let [x, y, width, height] = numbers(operation)?;
                let (left, right) = (x.min(x + width), x.max(x + width));
                let (bottom, top) = (y.min(y + height), y.max(y + height));
                if let Some(rect) = Rect::from_ltrb(left, bottom, right, top) {
                    self.path.push_rect(rect);
                }
                self.current = Some((x, y));
            }
            "f" | "F" => self.paint(pixmap, Some(FillRule::Winding), false, false),
            "f*" => self.paint(pixmap, Some(FillRule::EvenOdd), false, false),
            "S" => self.paint(pixmap, None, true, false),
            "s" => self.paint(pixmap, None, true, true),
            "B" => self.paint(pixmap, Some(FillRule::Winding), true, false),
            "B*" => self.paint(pixmap, Some(FillRule::EvenOdd), true, false),
            "b" => self.paint(pixmap, Some(FillRule::Winding), true, true),
            "b*" => self.paint(pixmap, Some(FillRule::EvenOdd), true, true),
            "n" => {
                self.path = PathBuilder::new();
                self.current = None;
            }
            other => log::trace!("skipping operator {other}"),
        }

        Ok(())
    }

    fn paint(&mut self, pixmap: &mut Pixmap, fill: Option<FillRule>, stroke: bool, close: bool) {
        if close {
            self.path.close();
        }

        let builder = std::mem::replace(&mut self.path, PathBuilder::new());
        self.current = None;
        let Some(path) = builder.finish() else {
            return;
        };

        let transform = self.base.pre_concat(self.state.ctm);

        if let Some(rule) = fill {
            pixmap.fill_path(&path, &paint_for(self.state.fill), rule, transform, None);
        }

        if stroke {
            self.stroke(pixmap, &path, transform);
        }
    }

    fn stroke(&self, pixmap: &mut Pixmap, path: &Path, transform: Transform) {
        let stroke = Stroke { width: self.state.line_width, ..Stroke::default() };
        pixmap.stroke_path(path, &paint_for(self.state.stroke), &stroke, transform, None);
    }
}

fn numbers<const N: usize>(operation: &Operation) -> Result<[f32; N], String> {
    if operation.operands.len() != N {
        return Err(format!(
            "operator {} expects {N} operand(s), found {}",
            operation.operator,
            operation.operands.len()
        ));
    }

    let mut values = [0.0; N];
    for (slot, operand) in values.iter_mut().zip(&operation.operands) {
        *slot = number(operand)
            .ok_or_else(|| format!("operator {} has a non-numeric operand", operation.operator))?;
    }
    Ok(values)
}

fn number(operand: &Object) -> Option<f32> {
    let value = operand.as_float().ok()?;
    value.is_finite().then_some(value)
}

fn unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

fn gray([level]: [f32; 1]) -> Color {
    let level = unit(level);
    Color::from_rgba(level, level, level, 1.0).unwrap_or(Color::BLACK)
}

fn rgb([r, g, b]: [f32; 3]) -> Color {
    Color::from_rgba(unit(r), unit(g), unit(b), 1.0).unwrap_or(Color::BLACK)
}

fn cmyk([c, m, y, k]: [f32; 4]) -> Color {
    let k = unit(k);
    let channel = |value: f32| (1.0 - unit(value)) * (1.0 - k);
    Color::from_rgba(channel(c), channel(m), channel(y), 1.0).unwrap_or(Color::BLACK)
}

fn paint_for(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color);
    paint.anti_alias = true;
    paint
}

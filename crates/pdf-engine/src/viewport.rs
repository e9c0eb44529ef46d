use crate::document::{Page, Rotation};
use crate::geometry::Transform;

const MIN_FIT_SCALE: f64 = 0.1;
const MAX_FIT_SCALE: f64 = 16.0;

/// Pixel-space rendering target for one page at one scale.
///
/// `transform` maps document space (top-left origin, y down, unrotated page,
/// points) to pixels. `user_transform` maps native PDF user space
/// (bottom-left origin) to the same pixels and is what content streams are
/// drawn with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scale: f64,
    pub rotation: Rotation,
    pub width: f64,
    pub height: f64,
    pub transform: Transform,
    pub user_transform: Transform,
}

impl Viewport {
    /// Raster width, rounded up so the page is never clipped.
    pub fn pixel_width(&self) -> u32 {
        self.width.ceil().max(1.0) as u32
    }

    pub fn pixel_height(&self) -> u32 {
        self.height.ceil().max(1.0) as u32
    }
}

pub fn compute_viewport(page: &Page, scale: f64) -> Viewport {
    let width = page.width();
    let height = page.height();
    let rotation = page.rotation();

    let rotate = match rotation {
        Rotation::None => Transform::IDENTITY,
        Rotation::Cw90 => Transform::new(0.0, 1.0, -1.0, 0.0, height, 0.0),
        Rotation::Cw180 => Transform::new(-1.0, 0.0, 0.0, -1.0, width, height),
        Rotation::Cw270 => Transform::new(0.0, -1.0, 1.0, 0.0, 0.0, width),
    };
    let transform = rotate.then(&Transform::scale(scale, scale));

    let [x0, _, _, y1] = page.page_box();
    let flip = Transform::new(1.0, 0.0, 0.0, -1.0, -x0, y1);
    let user_transform = flip.then(&transform);

    let (width, height) =
        if rotation.is_quarter_turn() { (height, width) } else { (width, height) };

    Viewport {
        scale,
        rotation,
        width: width * scale,
        height: height * scale,
        transform,
        user_transform,
    }
}

/// Scale at which the rotated page exactly fills `container_width_px`.
pub fn fit_width_scale(container_width_px: f64, page: &Page) -> f64 {
    let displayed = compute_viewport(page, 1.0);
    if container_width_px <= 0.0 || !container_width_px.is_finite() {
        return 1.0;
    }

    (container_width_px / displayed.width).clamp(MIN_FIT_SCALE, MAX_FIT_SCALE)
}

/// Largest scale at which the rotated page fits inside the container.
pub fn fit_page_scale(container_width_px: f64, container_height_px: f64, page: &Page) -> f64 {
    let displayed = compute_viewport(page, 1.0);
    if container_width_px <= 0.0
        || container_height_px <= 0.0
        || !container_width_px.is_finite()
        || !container_height_px.is_finite()
    {
        return 1.0;
    }

    let width = container_width_px / displayed.width;
    let height = container_height_px / displayed.height;

    width.min(height).clamp(MIN_FIT_SCALE, MAX_FIT_SCALE)
}

use pdf_engine::Transform;

/// Axis-aligned rectangle in viewport pixels. Width and height are never
/// negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighlightRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl HighlightRect {
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right() && y >= self.top && y <= self.bottom()
    }
}

/// Maps a document-space bbox `[x0, y0, x1, y1]` into viewport pixels.
///
/// Both corners go through the full transform, so rotation and scale are
/// handled uniformly; the result is then normalized.
pub fn map_rect(bbox: [f64; 4], transform: &Transform) -> HighlightRect {
    let [x0, y0, x1, y1] = bbox;
    let (ax, ay) = transform.apply(x0, y0);
    let (bx, by) = transform.apply(x1, y1);

    HighlightRect {
        left: ax.min(bx),
        top: ay.min(by),
        width: (bx - ax).abs(),
        height: (by - ay).abs(),
    }
}

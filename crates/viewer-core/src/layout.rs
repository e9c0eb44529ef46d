//! Continuous vertical layout of pages.

use std::ops::RangeInclusive;

/// Pages stacked top to bottom with fixed spacing, in pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    page_heights_px: Vec<f64>,
    page_spacing_px: f64,
}

impl PageLayout {
    pub fn new(page_heights_px: Vec<f64>, page_spacing_px: f64) -> Self {
        Self { page_heights_px, page_spacing_px: page_spacing_px.max(0.0) }
    }

    pub fn page_count(&self) -> u32 {
        self.page_heights_px.len() as u32
    }

    pub fn total_height(&self) -> f64 {
        let pages: f64 = self.page_heights_px.iter().sum();
        let gaps = self.page_heights_px.len().saturating_sub(1) as f64;
        pages + gaps * self.page_spacing_px
    }

    /// Offset of the top edge of 1-based `page`.
    pub fn page_offset(&self, page: u32) -> Option<f64> {
        let index = page.checked_sub(1)? as usize;
        if index >= self.page_heights_px.len() {
            return None;
        }

        Some(
            self.page_heights_px[..index]
                .iter()
                .map(|height| height + self.page_spacing_px)
                .sum(),
        )
    }

    /// The 1-based page under `offset_px`. Offsets in the gap after a page
    /// belong to that page; offsets past the end clamp to the last page.
    pub fn page_at_offset(&self, offset_px: f64) -> Option<u32> {
        if self.page_heights_px.is_empty() {
            return None;
        }

        let mut cursor = 0.0;
        for (index, page_height) in self.page_heights_px.iter().enumerate() {
            let page_end = cursor + page_height;
            if offset_px <= page_end {
                return Some(index as u32 + 1);
            }

            cursor = page_end + self.page_spacing_px;
        }

        Some(self.page_count())
    }

    /// Pages intersecting the window `[scroll_offset_px, scroll_offset_px + height_px]`.
    pub fn visible_pages(&self, scroll_offset_px: f64, height_px: f64) -> Option<RangeInclusive<u32>> {
        let start = self.page_at_offset(scroll_offset_px.max(0.0))?;
        let end = self.page_at_offset((scroll_offset_px + height_px.max(0.0)).max(0.0))?;

        Some(start..=end)
    }
}

/// Neighbours of `visible` within `radius` pages, nearest first, alternating
/// above and below.
pub fn prefetch_pages(visible: &RangeInclusive<u32>, page_count: u32, radius: u32) -> Vec<u32> {
    let mut pages = Vec::new();

    for offset in 1..=radius {
        if let Some(lower) = visible.start().checked_sub(offset).filter(|page| *page >= 1) {
            pages.push(lower);
        }

        let upper = visible.end().saturating_add(offset);
        if upper <= page_count {
            pages.push(upper);
        }
    }

    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_pages() -> PageLayout {
        PageLayout::new(vec![1000.0, 1000.0, 1000.0], 100.0)
    }

    #[test]
    fn visible_range_tracks_scroll_window() {
        let layout = three_pages();

        assert_eq!(layout.visible_pages(1100.0, 900.0), Some(2..=2));
        assert_eq!(layout.visible_pages(1500.0, 900.0), Some(2..=3));
        assert_eq!(layout.visible_pages(-50.0, 10.0), Some(1..=1));
    }

    #[test]
    fn scrolling_past_the_end_clamps_to_last_page() {
        let layout = three_pages();

        assert_eq!(layout.page_at_offset(1e9), Some(3));
        assert_eq!(layout.visible_pages(5000.0, 100.0), Some(3..=3));
    }

    #[test]
    fn empty_layout_has_no_pages() {
        let layout = PageLayout::new(Vec::new(), 16.0);

        assert_eq!(layout.visible_pages(0.0, 100.0), None);
        assert_eq!(layout.total_height(), 0.0);
        assert_eq!(layout.page_offset(1), None);
    }

    #[test]
    fn offsets_include_spacing() {
        let layout = three_pages();

        assert_eq!(layout.page_offset(1), Some(0.0));
        assert_eq!(layout.page_offset(3), Some(2200.0));
        assert_eq!(layout.page_offset(0), None);
        assert_eq!(layout.page_offset(4), None);
        assert_eq!(layout.total_height(), 3200.0);
    }

    #[test]
    fn prefetch_neighbors_are_symmetric_and_bounded() {
        assert_eq!(prefetch_pages(&(5..=6), 10, 2), vec![4, 7, 3, 8]);
        assert_eq!(prefetch_pages(&(1..=1), 3, 3), vec![2, 3]);
        assert_eq!(prefetch_pages(&(1..=2), 2, 1), Vec::<u32>::new());
    }
}

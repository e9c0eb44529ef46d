//! Synchronous viewer state: the open document, per-page render status and the
//! annotation set.
//!
//! Every render request is issued as a [`RenderTicket`] stamped with the
//! session it belongs to and the page's generation. Only the completion of the
//! newest ticket of the current session is applied; everything else is
//! discarded, so a slow render at an old scale or of a closed document can
//! never replace a newer frame.

use doc_model::AnnotationBox;
use image::RgbaImage;
use pdf_engine::{
    CancellationToken, Document, DocumentError, RenderError, RenderedPage, Viewport,
};
use slipview_scheduler::CancellationRegistry;
use std::sync::Arc;

use crate::config::ViewerConfig;
use crate::layout::PageLayout;
use crate::overlay::{composite, overlays_for_page, PageOverlays};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ViewerError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("invalid scale {0}: expected a positive finite number")]
    InvalidScale(f64),
    #[error("no document is open")]
    NoDocument,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageStatus {
    Unloaded,
    Loading,
    Ready,
    Failed(RenderError),
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed(_) => "failed",
        }
    }
}

/// Permission to rasterize one page at one viewport.
#[derive(Debug, Clone)]
pub struct RenderTicket {
    pub session: u64,
    pub page: u32,
    pub generation: u64,
    pub viewport: Viewport,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// A newer ticket was issued for the same page.
    Superseded,
    /// The document the ticket was issued for is no longer open.
    SessionEnded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Applied(PageStatus),
    Discarded(DiscardReason),
}

#[derive(Debug)]
struct PageSlot {
    viewport: Viewport,
    status: PageStatus,
    generation: u64,
    frame: Option<Arc<RenderedPage>>,
}

impl PageSlot {
    fn new(viewport: Viewport) -> Self {
        Self { viewport, status: PageStatus::Unloaded, generation: 0, frame: None }
    }
}

/// Read-only view of one page.
#[derive(Debug, Clone)]
pub struct PageView<'a> {
    pub index: u32,
    /// Viewport at the current scale.
    pub viewport: Viewport,
    pub status: &'a PageStatus,
    /// The frame on display. While a re-render is loading this is the
    /// previous frame, produced at an older viewport.
    pub frame: Option<&'a Arc<RenderedPage>>,
    boxes: &'a [AnnotationBox],
}

impl<'a> PageView<'a> {
    /// Whether the displayed frame matches the current viewport.
    pub fn is_current(&self) -> bool {
        self.frame.is_some_and(|frame| frame.viewport == self.viewport)
    }

    /// Viewport of what is on screen: the frame's while one is shown.
    pub fn display_viewport(&self) -> Viewport {
        self.frame.map_or(self.viewport, |frame| frame.viewport)
    }

    /// Highlights aligned with the displayed frame.
    pub fn overlays(&self) -> PageOverlays<'a> {
        overlays_for_page(self.boxes, self.index, &self.display_viewport().transform)
    }
}

#[derive(Debug)]
pub struct ViewerState {
    config: ViewerConfig,
    scale: f64,
    session: u64,
    document: Option<Arc<Document>>,
    slots: Vec<PageSlot>,
    annotations: Arc<[AnnotationBox]>,
    tokens: CancellationRegistry<u32>,
}

impl ViewerState {
    pub fn new(config: ViewerConfig) -> Self {
        let scale = config.clamp_scale(config.default_scale);

        Self {
            config,
            scale,
            session: 0,
            document: None,
            slots: Vec::new(),
            annotations: Arc::from(Vec::new()),
            tokens: CancellationRegistry::new(),
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn document(&self) -> Option<&Arc<Document>> {
        self.document.as_ref()
    }

    pub fn page_count(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Replaces the open document, starting a new session.
    pub fn load(&mut self, document: Arc<Document>) {
        self.end_session();

        self.slots = document.pages().map(|page| PageSlot::new(page.viewport(self.scale))).collect();
        log::info!(
            "session {}: opened document {} with {} page(s) at scale {}",
            self.session,
            document.id().raw(),
            document.page_count(),
            self.scale
        );
        self.document = Some(document);

        let dropped = self.dropped_annotations();
        if dropped > 0 {
            log::debug!("{dropped} annotation(s) reference no page of the new document");
        }
    }

    pub fn close(&mut self) {
        if let Some(document) = &self.document {
            log::info!("session {}: closing document {}", self.session, document.id().raw());
        }

        self.end_session();
    }

    fn end_session(&mut self) {
        let cancelled = self.tokens.cancel_all();
        if cancelled > 0 {
            log::debug!("session {}: cancelled {cancelled} in-flight render(s)", self.session);
        }

        self.session += 1;
        self.document = None;
        self.slots.clear();
    }

    /// Changes the scale and re-requests every page that has been requested
    /// before. Unloaded pages only get new viewports.
    pub fn set_scale(&mut self, scale: f64) -> Result<Vec<RenderTicket>, ViewerError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ViewerError::InvalidScale(scale));
        }

        let scale = self.config.clamp_scale(scale);
        if scale == self.scale {
            return Ok(Vec::new());
        }

        log::debug!("scale {} -> {}", self.scale, scale);
        self.scale = scale;

        let Some(document) = self.document.clone() else {
            return Ok(Vec::new());
        };

        for (slot, page) in self.slots.iter_mut().zip(document.pages()) {
            slot.viewport = page.viewport(scale);
        }

        let requested: Vec<u32> = (1..=self.page_count())
            .filter(|page| self.slots[*page as usize - 1].status != PageStatus::Unloaded)
            .collect();

        Ok(requested.into_iter().map(|page| self.issue(page)).collect())
    }

    /// Issues a ticket for `page` unless it is already loading or has been
    /// attempted at the current scale.
    pub fn request(&mut self, page: u32) -> Result<Option<RenderTicket>, ViewerError> {
        let slot = self.slot_index(page)?;

        match self.slots[slot].status {
            PageStatus::Unloaded => Ok(Some(self.issue(page))),
            _ => Ok(None),
        }
    }

    /// Issues a ticket for `page` unconditionally, superseding any ticket in
    /// flight.
    pub fn refresh(&mut self, page: u32) -> Result<RenderTicket, ViewerError> {
        self.slot_index(page)?;
        Ok(self.issue(page))
    }

    pub fn request_all(&mut self) -> Result<Vec<RenderTicket>, ViewerError> {
        if self.document.is_none() {
            return Err(ViewerError::NoDocument);
        }

        let mut tickets = Vec::new();
        for page in 1..=self.page_count() {
            if let Some(ticket) = self.request(page)? {
                tickets.push(ticket);
            }
        }

        Ok(tickets)
    }

    fn issue(&mut self, page: u32) -> RenderTicket {
        let cancel = self.tokens.replace(page);
        let session = self.session;

        let slot = &mut self.slots[page as usize - 1];
        slot.generation += 1;
        slot.status = PageStatus::Loading;

        log::debug!("session {session}: issued page {page} generation {}", slot.generation);

        RenderTicket { session, page, generation: slot.generation, viewport: slot.viewport, cancel }
    }

    fn slot_index(&self, page: u32) -> Result<usize, ViewerError> {
        let document = self.document.as_ref().ok_or(ViewerError::NoDocument)?;
        document.page(page)?;
        Ok(page as usize - 1)
    }

    /// Applies the outcome of `ticket` if it is still the newest one for its
    /// page.
    pub fn complete(
        &mut self,
        ticket: RenderTicket,
        result: Result<RenderedPage, RenderError>,
    ) -> Completion {
        if ticket.session != self.session {
            log::debug!(
                "discarding page {} from ended session {}",
                ticket.page,
                ticket.session
            );
            return Completion::Discarded(DiscardReason::SessionEnded);
        }

        let Some(slot) = ticket.page.checked_sub(1).and_then(|index| self.slots.get_mut(index as usize))
        else {
            return Completion::Discarded(DiscardReason::SessionEnded);
        };

        if slot.generation != ticket.generation {
            log::debug!(
                "discarding page {} generation {} (current {})",
                ticket.page,
                ticket.generation,
                slot.generation
            );
            return Completion::Discarded(DiscardReason::Superseded);
        }

        self.tokens.release(ticket.page, &ticket.cancel);

        slot.status = match result {
            Ok(frame) => {
                slot.frame = Some(Arc::new(frame));
                PageStatus::Ready
            }
            // Cancelled from outside the viewer; the page can be requested again.
            Err(RenderError::Cancelled) => PageStatus::Unloaded,
            Err(err) => {
                log::warn!("page {} failed to render: {err}", ticket.page);
                slot.frame = None;
                PageStatus::Failed(err)
            }
        };

        Completion::Applied(slot.status.clone())
    }

    /// Replaces the annotation set. Returns how many boxes reference no page
    /// of the open document; those are kept but never displayed.
    pub fn set_annotations(&mut self, boxes: Vec<AnnotationBox>) -> usize {
        self.annotations = Arc::from(boxes);

        let dropped = self.dropped_annotations();
        if dropped > 0 {
            log::debug!("{dropped} annotation(s) reference no page of the open document");
        }
        dropped
    }

    pub fn annotations(&self) -> Arc<[AnnotationBox]> {
        Arc::clone(&self.annotations)
    }

    fn dropped_annotations(&self) -> usize {
        let page_count = self.page_count();
        self.annotations.iter().filter(|annotation| !(1..=page_count).contains(&annotation.page)).count()
    }

    pub fn page(&self, index: u32) -> Result<PageView<'_>, ViewerError> {
        let slot = self.slot_index(index)?;
        Ok(self.view(slot))
    }

    pub fn pages(&self) -> impl Iterator<Item = PageView<'_>> {
        (0..self.slots.len()).map(|slot| self.view(slot))
    }

    fn view(&self, slot: usize) -> PageView<'_> {
        let page = &self.slots[slot];
        PageView {
            index: slot as u32 + 1,
            viewport: page.viewport,
            status: &page.status,
            frame: page.frame.as_ref(),
            boxes: &self.annotations,
        }
    }

    pub fn overlays(&self, index: u32) -> Result<PageOverlays<'_>, ViewerError> {
        Ok(self.page(index)?.overlays())
    }

    /// The displayed frame with its highlights drawn in the configured style.
    /// `None` while the page has no frame.
    pub fn composited(&self, index: u32) -> Result<Option<RgbaImage>, ViewerError> {
        let page = self.page(index)?;
        Ok(page.frame.map(|frame| composite(frame, &page.overlays(), &self.config.highlight)))
    }

    pub fn statuses(&self) -> Vec<PageStatus> {
        self.slots.iter().map(|slot| slot.status.clone()).collect()
    }

    /// Continuous layout of the pages at the current scale.
    pub fn layout(&self) -> PageLayout {
        PageLayout::new(
            self.slots.iter().map(|slot| slot.viewport.height).collect(),
            self.config.page_spacing_px,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::HighlightRect;
    use crate::overlay::HighlightStyle;
    use image::Rgba;
    use pdf_engine::{Page, PageContent, Rotation};

    fn document(pages: u32, rotation: Rotation) -> Arc<Document> {
        let pages = (1..=pages)
            .map(|index| {
                Page::new(index, [0.0, 0.0, 612.0, 792.0], rotation, PageContent::Stream(Vec::new()))
            })
            .collect();
        Arc::new(Document::from_pages(pages).expect("document should build"))
    }

    fn unit_scale_state() -> ViewerState {
        ViewerState::new(ViewerConfig { default_scale: 1.0, ..ViewerConfig::default() })
    }

    fn frame_for(state: &ViewerState, ticket: &RenderTicket) -> RenderedPage {
        RenderedPage {
            document: state.document().expect("document is open").id(),
            page: ticket.page,
            viewport: ticket.viewport,
            image: RgbaImage::new(1, 1),
        }
    }

    #[test]
    fn new_state_starts_at_configured_scale() {
        let state = ViewerState::new(ViewerConfig::default());

        assert_eq!(state.scale(), 1.2);
        assert_eq!(state.page_count(), 0);
        assert!(state.document().is_none());
    }

    #[test]
    fn load_creates_unloaded_slots() {
        let mut state = unit_scale_state();
        state.load(document(3, Rotation::None));

        assert_eq!(state.statuses(), vec![PageStatus::Unloaded; 3]);
        let page = state.page(2).expect("page 2");
        assert_eq!((page.viewport.width, page.viewport.height), (612.0, 792.0));
        assert!(page.frame.is_none());
    }

    #[test]
    fn requests_without_document_fail() {
        let mut state = unit_scale_state();

        assert_eq!(state.request_all().expect_err("no document"), ViewerError::NoDocument);
        assert_eq!(state.request(1).expect_err("no document"), ViewerError::NoDocument);
    }

    #[test]
    fn out_of_range_page_is_reported() {
        let mut state = unit_scale_state();
        state.load(document(2, Rotation::None));

        let err = state.request(3).expect_err("page 3 does not exist");
        assert_eq!(err, ViewerError::Document(DocumentError::PageOutOfRange { page: 3, page_count: 2 }));
    }

    #[test]
    fn invalid_scales_are_rejected() {
        let mut state = unit_scale_state();

        for scale in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = state.set_scale(scale).expect_err("scale should be rejected");
            assert!(matches!(err, ViewerError::InvalidScale(_)));
        }
        assert_eq!(state.scale(), 1.0);
    }

    #[test]
    fn scale_is_clamped_and_unchanged_scale_is_a_no_op() {
        let mut state = unit_scale_state();
        state.load(document(1, Rotation::None));
        state.request_all().expect("request should succeed");

        let tickets = state.set_scale(100.0).expect("scale should be accepted");
        assert_eq!(state.scale(), 8.0);
        assert_eq!(tickets.len(), 1);

        assert!(state.set_scale(8.0).expect("same scale").is_empty());
    }

    #[test]
    fn scale_change_rerequests_only_requested_pages() {
        let mut state = unit_scale_state();
        state.load(document(2, Rotation::None));

        let ticket = state.request(1).expect("request").expect("ticket for unloaded page");
        let frame = frame_for(&state, &ticket);
        assert_eq!(state.complete(ticket, Ok(frame)), Completion::Applied(PageStatus::Ready));

        let tickets = state.set_scale(2.0).expect("scale should be accepted");
        assert_eq!(tickets.iter().map(|ticket| ticket.page).collect::<Vec<_>>(), vec![1]);
        assert_eq!(tickets[0].viewport.width, 1224.0);

        // The old frame stays on display until the new one lands.
        let page = state.page(1).expect("page 1");
        assert_eq!(*page.status, PageStatus::Loading);
        assert!(page.frame.is_some());
        assert!(!page.is_current());
        assert_eq!(page.display_viewport().scale, 1.0);

        assert_eq!(*state.page(2).expect("page 2").status, PageStatus::Unloaded);
        assert_eq!(state.page(2).expect("page 2").viewport.scale, 2.0);
    }

    #[test]
    fn stale_completion_never_replaces_newer_frame() {
        let mut state = unit_scale_state();
        state.load(document(1, Rotation::None));

        let old = state.request(1).expect("request").expect("ticket");
        let new = state.set_scale(3.0).expect("scale").pop().expect("re-request ticket");
        assert!(old.cancel.is_cancelled());
        assert!(!new.cancel.is_cancelled());

        let new_frame = frame_for(&state, &new);
        let old_frame = frame_for(&state, &old);
        assert_eq!(state.complete(new, Ok(new_frame)), Completion::Applied(PageStatus::Ready));
        assert_eq!(
            state.complete(old, Ok(old_frame)),
            Completion::Discarded(DiscardReason::Superseded)
        );

        let page = state.page(1).expect("page 1");
        assert_eq!(page.frame.expect("frame").viewport.scale, 3.0);
        assert!(page.is_current());
    }

    #[test]
    fn completion_after_document_change_is_discarded() {
        let mut state = unit_scale_state();
        state.load(document(2, Rotation::None));
        let ticket = state.request(1).expect("request").expect("ticket");
        let frame = frame_for(&state, &ticket);

        state.load(document(2, Rotation::None));

        assert!(ticket.cancel.is_cancelled());
        assert_eq!(
            state.complete(ticket, Ok(frame)),
            Completion::Discarded(DiscardReason::SessionEnded)
        );
        assert_eq!(state.statuses(), vec![PageStatus::Unloaded; 2]);
    }

    #[test]
    fn failure_is_page_local_and_needs_explicit_refresh() {
        let mut state = unit_scale_state();
        state.load(document(2, Rotation::None));

        let tickets = state.request_all().expect("request should succeed");
        let [first, second] = <[RenderTicket; 2]>::try_from(tickets).expect("two tickets");

        let failure = RenderError::DecodeFailed { page: 2, reason: "bad operand".to_owned() };
        let frame = frame_for(&state, &first);
        state.complete(first, Ok(frame));
        state.complete(second, Err(failure.clone()));

        assert_eq!(state.statuses(), vec![PageStatus::Ready, PageStatus::Failed(failure)]);
        assert!(state.request(2).expect("request").is_none());

        let retry = state.refresh(2).expect("refresh should issue a ticket");
        assert_eq!(retry.page, 2);
        assert_eq!(*state.page(2).expect("page 2").status, PageStatus::Loading);
    }

    #[test]
    fn external_cancellation_returns_page_to_unloaded() {
        let mut state = unit_scale_state();
        state.load(document(1, Rotation::None));
        let ticket = state.request(1).expect("request").expect("ticket");

        assert_eq!(
            state.complete(ticket, Err(RenderError::Cancelled)),
            Completion::Applied(PageStatus::Unloaded)
        );
        assert!(state.request(1).expect("request").is_some());
    }

    #[test]
    fn annotations_on_missing_pages_are_dropped() {
        let mut state = unit_scale_state();
        state.load(document(2, Rotation::None));

        let dropped = state.set_annotations(vec![
            AnnotationBox::new(1, [100.0, 100.0, 200.0, 150.0], "net"),
            AnnotationBox::new(5, [100.0, 100.0, 200.0, 150.0], "ghost"),
        ]);

        assert_eq!(dropped, 1);
        let total: usize = state.pages().map(|page| page.overlays().iter().count()).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn annotation_change_leaves_render_state_alone() {
        let mut state = unit_scale_state();
        state.load(document(1, Rotation::None));
        let ticket = state.request(1).expect("request").expect("ticket");
        let frame = frame_for(&state, &ticket);
        state.complete(ticket, Ok(frame));

        state.set_annotations(vec![AnnotationBox::new(1, [0.0, 0.0, 10.0, 10.0], "a")]);

        assert_eq!(state.statuses(), vec![PageStatus::Ready]);
        assert!(state.request(1).expect("request").is_none());
        assert_eq!(state.overlays(1).expect("overlays").iter().count(), 1);
    }

    #[test]
    fn rotated_page_overlay_lands_on_rotated_position() {
        let mut state = unit_scale_state();
        state.load(document(1, Rotation::Cw90));
        state.set_annotations(vec![AnnotationBox::new(1, [100.0, 100.0, 200.0, 150.0], "net pay")]);

        let page = state.page(1).expect("page 1");
        assert_eq!((page.viewport.width, page.viewport.height), (792.0, 612.0));

        let highlight = state.overlays(1).expect("overlays").iter().next().expect("one highlight");
        assert_eq!(highlight.rect, HighlightRect { left: 642.0, top: 100.0, width: 50.0, height: 100.0 });
        assert_eq!(highlight.label, "net pay");
    }

    #[test]
    fn composited_frame_uses_configured_highlight_style() {
        let style = HighlightStyle { fill: [0, 0, 255, 255], stroke: [0, 0, 0, 255], stroke_width: 0.0 };
        let mut state = ViewerState::new(ViewerConfig {
            default_scale: 1.0,
            highlight: style,
            ..ViewerConfig::default()
        });
        state.load(document(1, Rotation::None));
        state.set_annotations(vec![AnnotationBox::new(1, [100.0, 100.0, 200.0, 150.0], "net")]);

        assert_eq!(state.composited(1).expect("page 1"), None);

        let ticket = state.request(1).expect("request").expect("ticket");
        let frame = RenderedPage {
            image: RgbaImage::from_pixel(612, 792, Rgba([255, 255, 255, 255])),
            ..frame_for(&state, &ticket)
        };
        state.complete(ticket, Ok(frame));

        let image = state.composited(1).expect("page 1").expect("page 1 has a frame");
        assert_eq!(*image.get_pixel(150, 120), Rgba([0, 0, 255, 255]));
        assert_eq!(*image.get_pixel(300, 300), Rgba([255, 255, 255, 255]));
        assert!(state.composited(2).is_err());
    }

    #[test]
    fn close_ends_the_session() {
        let mut state = unit_scale_state();
        state.load(document(1, Rotation::None));
        let session = state.session();
        let ticket = state.request(1).expect("request").expect("ticket");

        state.close();

        assert!(ticket.cancel.is_cancelled());
        assert!(state.session() > session);
        assert_eq!(state.page_count(), 0);
        assert!(state.layout().visible_pages(0.0, 100.0).is_none());
    }

    #[test]
    fn layout_follows_current_scale() {
        let mut state = unit_scale_state();
        state.load(document(2, Rotation::None));
        state.set_scale(0.5).expect("scale should be accepted");

        let layout = state.layout();
        assert_eq!(layout.page_offset(2), Some(396.0 + 16.0));
        assert_eq!(layout.total_height(), 396.0 * 2.0 + 16.0);
    }
}

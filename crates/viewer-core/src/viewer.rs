//! Async driver around [`ViewerState`].
//!
//! Requests are queued by priority and dispatched onto a [`JoinSet`] when the
//! viewer is polled through [`Viewer::next_update`], [`Viewer::pump`] or
//! [`Viewer::settle`]. Closing or replacing the document drops the set, which
//! aborts every task of the previous session. A page's running task is also
//! aborted as soon as a newer ticket supersedes it, so a rasterizer that never
//! returns cannot hold a concurrency slot past the next scale change.

use doc_model::AnnotationBox;
use pdf_engine::{ContentRasterizer, Document, DocumentError, Rasterizer, RenderError, RenderedPage};
use std::collections::{HashMap, VecDeque};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::task::{AbortHandle, JoinError, JoinSet};

use crate::config::ViewerConfig;
use crate::layout::prefetch_pages;
use crate::queue::{RenderPriority, RenderQueue};
use crate::state::{Completion, PageStatus, RenderTicket, ViewerError, ViewerState};

/// A page whose status changed after a render finished.
#[derive(Debug, Clone, PartialEq)]
pub struct PageUpdate {
    pub page: u32,
    pub status: PageStatus,
}

struct Outcome {
    ticket: RenderTicket,
    result: Result<RenderedPage, RenderError>,
}

/// The live task rendering a page.
struct Running {
    generation: u64,
    handle: AbortHandle,
}

pub struct Viewer<R> {
    state: ViewerState,
    rasterizer: Arc<R>,
    queue: RenderQueue,
    tasks: JoinSet<Outcome>,
    running: HashMap<u32, Running>,
    updates: VecDeque<PageUpdate>,
    visible: Option<RangeInclusive<u32>>,
}

impl Viewer<ContentRasterizer> {
    /// A viewer painting with the built-in rasterizer on the configured
    /// background.
    pub fn with_config(config: ViewerConfig) -> Self {
        let rasterizer = ContentRasterizer::with_background(config.background);
        Self::new(rasterizer, config)
    }
}

impl<R: Rasterizer> Viewer<R> {
    pub fn new(rasterizer: R, config: ViewerConfig) -> Self {
        Self {
            state: ViewerState::new(config),
            rasterizer: Arc::new(rasterizer),
            queue: RenderQueue::new(),
            tasks: JoinSet::new(),
            running: HashMap::new(),
            updates: VecDeque::new(),
            visible: None,
        }
    }

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    pub fn rasterizer(&self) -> &R {
        &self.rasterizer
    }

    /// Parses `bytes` off the executor and makes the result the open document.
    ///
    /// The previous document is closed first, whether or not parsing succeeds.
    pub async fn open(&mut self, bytes: Vec<u8>) -> Result<u32, ViewerError> {
        self.close();

        let document = tokio::task::spawn_blocking(move || Document::open(&bytes))
            .await
            .map_err(|err| DocumentError::Corrupt(format!("document parser stopped: {err}")))??;

        let page_count = document.page_count();
        self.load(Arc::new(document));
        Ok(page_count)
    }

    /// Installs an already parsed document.
    pub fn load(&mut self, document: Arc<Document>) {
        self.close();
        self.state.load(document);
    }

    pub fn close(&mut self) {
        drop(std::mem::take(&mut self.tasks));
        self.running.clear();
        self.updates.clear();
        self.queue.clear();
        self.visible = None;
        self.state.close();
    }

    /// Queues every page that has not been requested yet. Returns how many
    /// were queued.
    pub fn request_all(&mut self) -> Result<usize, ViewerError> {
        let tickets = self.state.request_all()?;
        let count = tickets.len();

        for ticket in tickets {
            self.enqueue(ticket, RenderPriority::Visible);
        }

        Ok(count)
    }

    /// Queues the pages inside the scroll window, then their neighbours within
    /// the configured prefetch radius at lower priority.
    pub fn request_visible(
        &mut self,
        scroll_offset_px: f64,
        height_px: f64,
    ) -> Result<RangeInclusive<u32>, ViewerError> {
        let visible = self
            .state
            .layout()
            .visible_pages(scroll_offset_px, height_px)
            .ok_or(ViewerError::NoDocument)?;

        for page in visible.clone() {
            self.request_page(page, RenderPriority::Visible)?;
        }

        let radius = self.state.config().prefetch_radius;
        for page in prefetch_pages(&visible, self.state.page_count(), radius) {
            self.request_page(page, RenderPriority::Prefetch)?;
        }

        self.visible = Some(visible.clone());
        Ok(visible)
    }

    /// Queues a single page at visible priority. Returns `false` when the page
    /// has already been requested.
    pub fn request(&mut self, page: u32) -> Result<bool, ViewerError> {
        match self.state.request(page)? {
            Some(ticket) => {
                self.enqueue(ticket, RenderPriority::Visible);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn request_page(&mut self, page: u32, priority: RenderPriority) -> Result<(), ViewerError> {
        match self.state.request(page)? {
            Some(ticket) => self.enqueue(ticket, priority),
            None => {
                self.queue.promote(page, priority);
            }
        }

        Ok(())
    }

    /// Returns the number of pages queued for re-rendering.
    pub fn set_scale(&mut self, scale: f64) -> Result<usize, ViewerError> {
        let tickets = self.state.set_scale(scale)?;
        let count = tickets.len();

        for ticket in tickets {
            let priority = self.priority_for(ticket.page);
            self.enqueue(ticket, priority);
        }

        Ok(count)
    }

    pub fn refresh(&mut self, page: u32) -> Result<(), ViewerError> {
        let ticket = self.state.refresh(page)?;
        self.enqueue(ticket, RenderPriority::Visible);
        Ok(())
    }

    /// Queues `ticket`, aborting the task still rendering an older ticket of
    /// the same page.
    fn enqueue(&mut self, ticket: RenderTicket, priority: RenderPriority) {
        if let Some(running) = self.running.remove(&ticket.page) {
            log::debug!(
                "aborting page {} generation {} in favour of generation {}",
                ticket.page,
                running.generation,
                ticket.generation
            );
            running.handle.abort();
        }

        self.queue.enqueue(ticket, priority);
    }

    /// Replaces the annotation set without touching any rendered frame.
    pub fn set_annotations(&mut self, boxes: Vec<AnnotationBox>) -> usize {
        self.state.set_annotations(boxes)
    }

    fn priority_for(&self, page: u32) -> RenderPriority {
        match &self.visible {
            Some(visible) if !visible.contains(&page) => RenderPriority::Prefetch,
            _ => RenderPriority::Visible,
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Renders running for the current tickets. Aborted tasks that have not
    /// been reaped yet are not counted.
    pub fn in_flight(&self) -> usize {
        self.running.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.tasks.is_empty() && self.updates.is_empty()
    }

    fn dispatch(&mut self) {
        let Some(document) = self.state.document().cloned() else {
            self.queue.clear();
            return;
        };

        while self.running.len() < self.state.config().max_concurrent_renders {
            let Some((ticket, priority)) = self.queue.pop_next() else {
                break;
            };

            if ticket.cancel.is_cancelled() || ticket.session != self.state.session() {
                log::debug!("dropping cancelled ticket for page {}", ticket.page);
                let page = ticket.page;
                if let Completion::Applied(status) =
                    self.state.complete(ticket, Err(RenderError::Cancelled))
                {
                    self.updates.push_back(PageUpdate { page, status });
                }
                continue;
            }

            log::debug!(
                "rendering page {} generation {} ({priority:?}, {} in flight)",
                ticket.page,
                ticket.generation,
                self.running.len()
            );

            let page = ticket.page;
            let generation = ticket.generation;

            let rasterizer = Arc::clone(&self.rasterizer);
            let document = Arc::clone(&document);
            let handle = self.tasks.spawn(async move {
                let result = match document.page(ticket.page) {
                    Ok(page) => {
                        rasterizer
                            .rasterize(document.id(), page, &ticket.viewport, &ticket.cancel)
                            .await
                    }
                    Err(err) => {
                        Err(RenderError::DecodeFailed { page: ticket.page, reason: err.to_string() })
                    }
                };

                Outcome { ticket, result }
            });
            self.running.insert(page, Running { generation, handle });
        }
    }

    fn handle(&mut self, joined: Result<Outcome, JoinError>) -> Option<PageUpdate> {
        let Outcome { ticket, result } = match joined {
            Ok(outcome) => outcome,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => return None,
        };

        let page = ticket.page;
        if self.running.get(&page).is_some_and(|running| running.generation == ticket.generation) {
            self.running.remove(&page);
        }

        match self.state.complete(ticket, result) {
            Completion::Applied(status) => Some(PageUpdate { page, status }),
            Completion::Discarded(_) => None,
        }
    }

    /// Waits for the next applied render. Returns `None` once nothing is
    /// queued or in flight.
    pub async fn next_update(&mut self) -> Option<PageUpdate> {
        loop {
            self.dispatch();
            if let Some(update) = self.updates.pop_front() {
                return Some(update);
            }

            let joined = self.tasks.join_next().await?;
            if let Some(update) = self.handle(joined) {
                return Some(update);
            }
        }
    }

    /// Dispatches queued work and collects renders that already finished,
    /// without waiting.
    pub fn pump(&mut self) -> Vec<PageUpdate> {
        let mut updates = Vec::new();

        loop {
            self.dispatch();
            updates.extend(self.updates.drain(..));

            let Some(joined) = self.tasks.try_join_next() else {
                break;
            };
            if let Some(update) = self.handle(joined) {
                updates.push(update);
            }
        }

        updates
    }

    /// Runs until every queued and in-flight render has finished.
    pub async fn settle(&mut self) -> Vec<PageUpdate> {
        let mut updates = Vec::new();
        while let Some(update) = self.next_update().await {
            updates.push(update);
        }
        updates
    }
}

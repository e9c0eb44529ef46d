//! Viewer orchestration: maps annotation boxes onto rendered pages and keeps
//! per-page render state consistent across scale and document changes.

mod config;
mod layout;
mod mapper;
mod overlay;
mod queue;
mod state;
mod viewer;

pub use config::{ConfigError, ViewerConfig, ENV_MAX_RENDERS, ENV_PREFETCH_RADIUS, ENV_SCALE};
pub use layout::{prefetch_pages, PageLayout};
pub use mapper::{map_rect, HighlightRect};
pub use overlay::{composite, overlays_for_page, Highlight, HighlightStyle, Overlays, PageOverlays};
pub use queue::{RenderPriority, RenderQueue};
pub use state::{
    Completion, DiscardReason, PageStatus, PageView, RenderTicket, ViewerError, ViewerState,
};
pub use viewer::{PageUpdate, Viewer};

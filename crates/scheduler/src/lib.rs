//! Slipview Scheduler Library
//!
//! Cooperative cancellation for page rasterization.
//!
//! Every in-flight rasterization holds a [`CancellationToken`]. The viewer keeps
//! one token per page in a [`CancellationRegistry`]; superseding a page's
//! request cancels the previous token, and closing a document cancels them all.
//!
//! # Example
//!
//! ```
//! use slipview_scheduler::CancellationRegistry;
//!
//! let mut registry = CancellationRegistry::new();
//!
//! let first = registry.replace(1_u32);
//! let second = registry.replace(1_u32);
//!
//! // The older request for page 1 was superseded
//! assert!(first.is_cancelled());
//! assert!(!second.is_cancelled());
//!
//! // Closing the document
//! registry.cancel_all();
//! assert!(second.is_cancelled());
//! ```

mod cancel;

pub use cancel::{CancellationRegistry, CancellationToken};

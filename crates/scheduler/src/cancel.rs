//! Cancellation token system for rasterization requests
//!
//! Provides cancellation tokens that allow in-flight rasterizations to be
//! cancelled cooperatively. Rasterizers check the token at their suspension
//! points and stop early once it has been cancelled.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token for cooperative cancellation
///
/// Multiple tokens can share the same underlying cancellation state via Arc,
/// so the viewer keeps one clone and hands another to the rasterization task.
///
/// # Example
///
/// ```
/// use slipview_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let task_token = token.clone();
///
/// token.cancel();
/// assert!(task_token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new token in the non-cancelled state
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// Cancel this token
    ///
    /// All clones observe the cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once `cancel()` has been called on this token or any clone
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns `true` if both tokens share the same cancellation state
    pub fn same_as(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of the live cancellation token for each key
///
/// The viewer keys tokens by page index. Only the newest token per key is
/// tracked: [`replace`](Self::replace) cancels the previous one.
#[derive(Debug)]
pub struct CancellationRegistry<K> {
    tokens: HashMap<K, CancellationToken>,
}

impl<K> CancellationRegistry<K>
where
    K: Eq + Hash + Copy,
{
    /// Create a new empty registry
    pub fn new() -> Self {
        Self { tokens: HashMap::new() }
    }

    /// Issue a fresh token for `key`, cancelling the token it replaces
    pub fn replace(&mut self, key: K) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self.tokens.insert(key, token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Cancel the token registered for `key`
    ///
    /// Returns `true` if a token was found. The token stays registered.
    pub fn cancel(&self, key: K) -> bool {
        match self.tokens.get(&key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every registered token and empty the registry
    ///
    /// Returns the number of tokens cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.tokens.len();
        for (_, token) in self.tokens.drain() {
            token.cancel();
        }
        count
    }

    /// Forget the token for `key` if it is still `token`
    ///
    /// Called when a request finishes. A newer token registered for the same
    /// key is left in place.
    pub fn release(&mut self, key: K, token: &CancellationToken) -> bool {
        match self.tokens.get(&key) {
            Some(current) if current.same_as(token) => {
                self.tokens.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Get the live token for `key`
    pub fn get(&self, key: K) -> Option<&CancellationToken> {
        self.tokens.get(&key)
    }

    /// Number of live tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns `true` if no tokens are registered
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl<K> Default for CancellationRegistry<K>
where
    K: Eq + Hash + Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

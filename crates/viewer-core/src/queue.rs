use std::collections::{HashMap, VecDeque};

use crate::state::RenderTicket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderPriority {
    Visible,
    Prefetch,
}

impl RenderPriority {
    fn rank(self) -> u8 {
        match self {
            Self::Visible => 0,
            Self::Prefetch => 1,
        }
    }

    fn higher(self, other: Self) -> Self {
        if other.rank() < self.rank() {
            other
        } else {
            self
        }
    }
}

/// Pending render tickets, at most one per page.
///
/// A page's newest ticket replaces the queued one in place and keeps the
/// higher of the two priorities. Among equal priorities, pages leave the queue
/// in the order they first entered it.
#[derive(Debug, Default)]
pub struct RenderQueue {
    pending: HashMap<u32, (RenderPriority, RenderTicket)>,
    order: VecDeque<u32>,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, ticket: RenderTicket, priority: RenderPriority) {
        let page = ticket.page;

        match self.pending.get_mut(&page) {
            Some((existing_priority, existing_ticket)) => {
                *existing_priority = existing_priority.higher(priority);
                *existing_ticket = ticket;
            }
            None => {
                self.pending.insert(page, (priority, ticket));
                self.order.push_back(page);
            }
        }
    }

    /// Raises the priority of a queued page. Returns `false` if the page is not
    /// queued.
    pub fn promote(&mut self, page: u32, priority: RenderPriority) -> bool {
        match self.pending.get_mut(&page) {
            Some((existing_priority, _)) => {
                *existing_priority = existing_priority.higher(priority);
                true
            }
            None => false,
        }
    }

    pub fn pop_next(&mut self) -> Option<(RenderTicket, RenderPriority)> {
        let mut best: Option<(u32, RenderPriority)> = None;

        for page in &self.order {
            let Some((priority, _)) = self.pending.get(page) else {
                continue;
            };

            match best {
                Some((_, best_priority)) if priority.rank() >= best_priority.rank() => {}
                _ => best = Some((*page, *priority)),
            }

            if matches!(best, Some((_, RenderPriority::Visible))) {
                break;
            }
        }

        let (page, _) = best?;
        let (priority, ticket) = self.pending.remove(&page)?;

        if let Some(index) = self.order.iter().position(|candidate| *candidate == page) {
            let _ = self.order.remove(index);
        }

        Some((ticket, priority))
    }

    pub fn contains(&self, page: u32) -> bool {
        self.pending.contains_key(&page)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

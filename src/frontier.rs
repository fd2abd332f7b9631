use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::types::FrontierEntry;

/// FIFO work queue of `(url, depth)` pairs plus the set of URLs already
/// claimed for processing. The queue order is what makes the traversal
/// breadth-first; the visited set is what makes it terminate.
///
/// A URL enters `visited` at the moment it is claimed (popped for
/// processing), not when it is enqueued. Enqueueing still consults the set so
/// an already-processed page is not queued again; duplicates that slip into
/// the queue before their first processing are dropped at claim time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frontier {
    queue: VecDeque<FrontierEntry>,
    visited: HashSet<String>,
}

impl Frontier {
    pub fn seeded(seed_url: &str) -> Self {
        let mut queue = VecDeque::new();
        queue.push_back(FrontierEntry {
            url: seed_url.into(),
            depth: 0,
        });
        Frontier {
            queue,
            visited: HashSet::new(),
        }
    }

    /// Queue a newly discovered link. Skips URLs that were already processed.
    pub fn enqueue(&mut self, url: &str, depth: u32) {
        if self.visited.contains(url) {
            return;
        }
        self.queue.push_back(FrontierEntry {
            url: url.into(),
            depth,
        });
    }

    pub fn pop(&mut self) -> Option<FrontierEntry> {
        self.queue.pop_front()
    }

    /// Mark a popped URL as visited. Returns false when the URL was already
    /// claimed before, i.e. this entry is a duplicate and must be discarded.
    pub fn claim(&mut self, url: &str) -> bool {
        self.visited.insert(url.to_string())
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

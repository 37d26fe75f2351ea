use std::collections::VecDeque;

use parking_lot::RwLock;

use crate::detection::Verdict;

/// Persistence seam for verdicts the pipeline decided to surface. Hosts plug
/// in their own store; the bundled implementation keeps a bounded in-memory
/// ring.
pub trait DetectionSink: Send + Sync {
    fn record_detection(&self, verdict: &Verdict);
}

pub struct InMemoryHistory {
    cap: usize,
    entries: RwLock<VecDeque<Verdict>>,
}

impl InMemoryHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            entries: RwLock::new(VecDeque::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Most recent first.
    pub fn recent(&self, n: usize) -> Vec<Verdict> {
        self.entries.read().iter().rev().take(n).cloned().collect()
    }
}

impl DetectionSink for InMemoryHistory {
    fn record_detection(&self, verdict: &Verdict) {
        let mut entries = self.entries.write();
        entries.push_back(verdict.clone());
        while entries.len() > self.cap {
            entries.pop_front();
        }
    }
}

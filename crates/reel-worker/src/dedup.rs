//! Job-scoped record of stock media already assigned to a scene.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Stock URLs claimed by scenes of one job.
///
/// Created per pipeline run and shared by clone between its scene tasks.
/// Claims are check-and-insert under one lock, so two scenes can never take
/// the same URL.
#[derive(Debug, Clone, Default)]
pub struct DedupSet {
    used: Arc<Mutex<HashSet<String>>>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `url`. Returns false if another scene already holds it.
    pub fn try_claim(&self, url: &str) -> bool {
        let mut used = self.used.lock().unwrap_or_else(|e| e.into_inner());
        if used.contains(url) {
            return false;
        }
        used.insert(url.to_string());
        true
    }

    pub fn contains(&self, url: &str) -> bool {
        self.used
            .lock()
            .map(|used| used.contains(url))
            .unwrap_or_else(|e| e.into_inner().contains(url))
    }

    pub fn len(&self) -> usize {
        self.used.lock().map(|u| u.len()).unwrap_or_else(|e| e.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

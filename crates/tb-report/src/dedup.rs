// SPDX-License-Identifier: MIT OR Apache-2.0
//! Suppression of repeated reports within a time window.

use crate::model::ReportType;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Default suppression window.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_millis(5000);

/// Remembers when each `(type, message)` pair was last admitted.
#[derive(Debug)]
pub struct DedupCache {
    window: Duration,
    last_sent: HashMap<(ReportType, String), Instant>,
}

impl DedupCache {
    /// Empty cache with the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: HashMap::new(),
        }
    }

    /// Decide whether a report may go out at `now`, recording it if so.
    ///
    /// A key admitted less than one window ago is rejected and its
    /// timestamp left untouched.
    pub fn admit(&mut self, kind: ReportType, message: &str, now: Instant) -> bool {
        self.prune(now);
        let key = (kind, message.to_string());
        if let Some(last) = self.last_sent.get(&key)
            && now.saturating_duration_since(*last) < self.window
        {
            return false;
        }
        self.last_sent.insert(key, now);
        true
    }

    /// Drop entries older than the window.
    fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.last_sent
            .retain(|_, last| now.saturating_duration_since(*last) < window);
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    /// Whether no entries are held.
    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }

    /// Forget every entry.
    pub fn clear(&mut self) {
        self.last_sent.clear();
    }

    /// The suppression window.
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_inside_window_are_rejected() {
        let mut cache = DedupCache::default();
        let t0 = Instant::now();
        assert!(cache.admit(ReportType::Exception, "boom", t0));
        assert!(!cache.admit(ReportType::Exception, "boom", t0 + Duration::from_millis(10)));
        assert!(!cache.admit(ReportType::Exception, "boom", t0 + Duration::from_millis(4999)));
    }

    #[test]
    fn repeats_after_window_are_admitted() {
        let mut cache = DedupCache::default();
        let t0 = Instant::now();
        assert!(cache.admit(ReportType::Exception, "boom", t0));
        assert!(cache.admit(ReportType::Exception, "boom", t0 + Duration::from_millis(5001)));
    }

    #[test]
    fn suppressed_repeat_does_not_extend_window() {
        let mut cache = DedupCache::default();
        let t0 = Instant::now();
        assert!(cache.admit(ReportType::Exception, "boom", t0));
        assert!(!cache.admit(ReportType::Exception, "boom", t0 + Duration::from_millis(3000)));
        assert!(cache.admit(ReportType::Exception, "boom", t0 + Duration::from_millis(5000)));
    }

    #[test]
    fn key_includes_type() {
        let mut cache = DedupCache::default();
        let t0 = Instant::now();
        assert!(cache.admit(ReportType::Exception, "boom", t0));
        assert!(cache.admit(ReportType::Rejection, "boom", t0));
        assert!(cache.admit(ReportType::Exception, "other", t0));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn stale_entries_are_pruned() {
        let mut cache = DedupCache::default();
        let t0 = Instant::now();
        cache.admit(ReportType::Exception, "a", t0);
        cache.admit(ReportType::Exception, "b", t0);
        cache.admit(ReportType::Exception, "c", t0 + Duration::from_secs(6));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}

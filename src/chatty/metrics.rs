//! In-process counters and gauges (§4.10, §4.15).
//!
//! No metrics-exporter crate is in the teacher's dependency stack, so these are plain atomics
//! behind a small facade rather than a Prometheus registry. Wiring an exporter onto `Metrics` is
//! a deployment concern, not a core one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct Metrics {
    active_sessions: AtomicI64,
    sessions_total: AtomicU64,
    sessions_by_code: Mutex<HashMap<&'static str, u64>>,
    events_by_type: Mutex<HashMap<&'static str, u64>>,
    tool_calls: Mutex<HashMap<(String, &'static str), u64>>,
    duration_sum_ms: AtomicU64,
    duration_count: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_started(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
    }

    /// `code` is `"ok"` or a [`super::error::ChattyError::stream_code`] value.
    pub fn session_finished(&self, code: &'static str, duration: Duration) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
        *self.sessions_by_code.lock().unwrap().entry(code).or_insert(0) += 1;
        self.duration_sum_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        self.duration_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_emitted(&self, label: &'static str) {
        *self.events_by_type.lock().unwrap().entry(label).or_insert(0) += 1;
    }

    pub fn tool_call_recorded(&self, name: &str, status: &'static str) {
        *self
            .tool_calls
            .lock()
            .unwrap()
            .entry((name.to_string(), status))
            .or_insert(0) += 1;
    }

    pub fn active_sessions(&self) -> i64 {
        self.active_sessions.load(Ordering::Relaxed)
    }

    pub fn sessions_total(&self) -> u64 {
        self.sessions_total.load(Ordering::Relaxed)
    }

    pub fn mean_duration_ms(&self) -> Option<f64> {
        let count = self.duration_count.load(Ordering::Relaxed);
        if count == 0 {
            return None;
        }
        Some(self.duration_sum_ms.load(Ordering::Relaxed) as f64 / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_sessions_tracks_start_and_finish() {
        let metrics = Metrics::new();
        metrics.session_started();
        metrics.session_started();
        assert_eq!(metrics.active_sessions(), 2);
        metrics.session_finished("ok", Duration::from_millis(100));
        assert_eq!(metrics.active_sessions(), 1);
        assert_eq!(metrics.sessions_total(), 2);
    }

    #[test]
    fn mean_duration_is_none_until_a_session_finishes() {
        let metrics = Metrics::new();
        assert_eq!(metrics.mean_duration_ms(), None);
        metrics.session_finished("ok", Duration::from_millis(200));
        assert_eq!(metrics.mean_duration_ms(), Some(200.0));
    }
}

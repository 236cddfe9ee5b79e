use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use crate::data::TimeCalc;
use crate::pipeline::Admission;

/// Counters shared by the producer side and the worker.
#[derive(Debug, Default)]
pub struct PipelineStats {
    offered: AtomicU64,
    admitted: AtomicU64,
    dropped_busy: AtomicU64,
    dropped_throttled: AtomicU64,
    dropped_not_ready: AtomicU64,
    dropped_closed: AtomicU64,
    processed: AtomicU64,
    invalid_frames: AtomicU64,
    inference_failures: AtomicU64,
    display_updates: AtomicU64,
    announcements: AtomicU64,
    annotate_time: Mutex<TimeCalc>,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub offered: u64,
    pub admitted: u64,
    pub dropped_busy: u64,
    pub dropped_throttled: u64,
    pub dropped_not_ready: u64,
    pub dropped_closed: u64,
    pub processed: u64,
    pub invalid_frames: u64,
    pub inference_failures: u64,
    pub display_updates: u64,
    pub announcements: u64,
    pub avg_annotate_ms: f64,
}

impl StatsSnapshot {
    pub fn dropped(&self) -> u64 {
        self.dropped_busy + self.dropped_throttled + self.dropped_not_ready + self.dropped_closed
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl PipelineStats {
    pub fn record_admission(&self, admission: Admission) {
        bump(&self.offered);
        bump(match admission {
            Admission::Admitted => &self.admitted,
            Admission::Busy => &self.dropped_busy,
            Admission::Throttled => &self.dropped_throttled,
            Admission::NotReady => &self.dropped_not_ready,
            Admission::Closed => &self.dropped_closed,
        });
    }

    pub fn record_processed(&self, elapsed: Duration) {
        bump(&self.processed);
        self.annotate_time.lock().add_or_push(0, elapsed);
    }

    pub fn record_invalid_frame(&self) {
        bump(&self.invalid_frames);
    }

    pub fn record_inference_failure(&self) {
        bump(&self.inference_failures);
    }

    pub fn record_display(&self) {
        bump(&self.display_updates);
    }

    pub fn record_announcement(&self) {
        bump(&self.announcements);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            offered: load(&self.offered),
            admitted: load(&self.admitted),
            dropped_busy: load(&self.dropped_busy),
            dropped_throttled: load(&self.dropped_throttled),
            dropped_not_ready: load(&self.dropped_not_ready),
            dropped_closed: load(&self.dropped_closed),
            processed: load(&self.processed),
            invalid_frames: load(&self.invalid_frames),
            inference_failures: load(&self.inference_failures),
            display_updates: load(&self.display_updates),
            announcements: load(&self.announcements),
            avg_annotate_ms: self.annotate_time.lock().avg().as_secs_f64() * 1000.,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admissions_are_bucketed() {
        let stats = PipelineStats::default();
        for a in [Admission::Admitted, Admission::Busy, Admission::Throttled, Admission::Throttled, Admission::NotReady] {
            stats.record_admission(a);
        }
        stats.record_processed(Duration::from_millis(4));
        stats.record_processed(Duration::from_millis(6));
        let snap = stats.snapshot();
        assert_eq!(snap.offered, 5);
        assert_eq!(snap.admitted, 1);
        assert_eq!(snap.dropped(), 4);
        assert_eq!(snap.dropped_throttled, 2);
        assert_eq!(snap.processed, 2);
        assert!((snap.avg_annotate_ms - 5.).abs() < 1e-6);
        assert!(serde_json::to_string(&snap).unwrap().contains("\"dropped_busy\":1"));
    }
}

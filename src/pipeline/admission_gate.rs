use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use serde::{Deserialize, Serialize};

const NEVER: u64 = u64::MAX;

/// Outcome of offering a frame to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Admission {
    Admitted,
    /// The worker is still on the previous frame.
    Busy,
    /// Too soon after the last admitted frame.
    Throttled,
    /// The model is still loading or failed to load.
    NotReady,
    /// The pipeline is shutting down.
    Closed,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelStatus {
    Loading,
    Ready,
    Unavailable,
}

/// Model readiness published by the worker and read by any producer thread.
#[derive(Debug)]
pub(crate) struct StatusCell(AtomicU8);

impl StatusCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ModelStatus::Loading as u8))
    }

    pub(crate) fn set(&self, status: ModelStatus) {
        self.0.store(status as u8, Ordering::Release);
    }

    pub(crate) fn get(&self) -> ModelStatus {
        match self.0.load(Ordering::Acquire) {
            1 => ModelStatus::Ready,
            2 => ModelStatus::Unavailable,
            _ => ModelStatus::Loading,
        }
    }
}

/// Latest-wins, drop-if-busy admission for a single worker.
///
/// At most one frame holds the busy flag at a time; it is released by the worker once the
/// frame is fully handled.
#[derive(Debug)]
pub struct AdmissionGate {
    origin: Instant,
    min_interval: Duration,
    busy: AtomicBool,
    closed: AtomicBool,
    /// Nanoseconds since `origin`, or `NEVER`.
    last_admitted: AtomicU64,
}

impl AdmissionGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            min_interval,
            busy: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            last_admitted: AtomicU64::new(NEVER),
        }
    }

    fn since_origin(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.origin).as_nanos().min(NEVER as u128 - 1) as u64
    }

    fn throttled(&self, t: u64) -> bool {
        match self.last_admitted.load(Ordering::Acquire) {
            NEVER => false,
            last => (t.saturating_sub(last) as u128) < self.min_interval.as_nanos(),
        }
    }

    /// Decides whether a frame arriving at `now` may enter the pipeline.
    ///
    /// On `Admitted` the caller owns the busy flag and must hand the frame over or call
    /// [`AdmissionGate::release`].
    pub fn try_admit(&self, now: Instant, ready: bool) -> Admission {
        if self.closed.load(Ordering::Acquire) {
            return Admission::Closed;
        }
        if !ready {
            return Admission::NotReady;
        }

        let t = self.since_origin(now);
        if self.throttled(t) {
            return Admission::Throttled;
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Admission::Busy;
        }
        // Another producer may have been admitted between the first check and the claim.
        if self.throttled(t) {
            self.release();
            return Admission::Throttled;
        }

        self.last_admitted.store(t, Ordering::Release);
        Admission::Admitted
    }

    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn frame_inside_throttle_is_dropped() {
        let gate = AdmissionGate::new(Duration::from_millis(1000));
        let t0 = Instant::now();
        assert_eq!(gate.try_admit(t0, true), Admission::Admitted);
        gate.release();
        assert_eq!(gate.try_admit(t0 + Duration::from_millis(50), true), Admission::Throttled);
        assert_eq!(gate.try_admit(t0 + Duration::from_millis(999), true), Admission::Throttled);
        assert_eq!(gate.try_admit(t0 + Duration::from_millis(1000), true), Admission::Admitted);
    }

    #[test]
    fn busy_worker_drops_frames() {
        let gate = AdmissionGate::new(Duration::ZERO);
        let t0 = Instant::now();
        assert_eq!(gate.try_admit(t0, true), Admission::Admitted);
        assert_eq!(gate.try_admit(t0 + Duration::from_millis(10), true), Admission::Busy);
        assert!(gate.is_busy());
        gate.release();
        assert_eq!(gate.try_admit(t0 + Duration::from_millis(20), true), Admission::Admitted);
    }

    #[test]
    fn not_ready_and_closed_win() {
        let gate = AdmissionGate::new(Duration::ZERO);
        let t0 = Instant::now();
        assert_eq!(gate.try_admit(t0, false), Admission::NotReady);
        assert!(!gate.is_busy());
        gate.close();
        assert_eq!(gate.try_admit(t0, true), Admission::Closed);
    }

    #[test]
    fn throttled_frames_do_not_move_the_window() {
        let gate = AdmissionGate::new(Duration::from_millis(100));
        let t0 = Instant::now();
        gate.try_admit(t0, true);
        gate.release();
        for ms in [30, 60, 90] {
            assert_eq!(gate.try_admit(t0 + Duration::from_millis(ms), true), Admission::Throttled);
        }
        assert_eq!(gate.try_admit(t0 + Duration::from_millis(100), true), Admission::Admitted);
    }

    #[test]
    fn only_one_concurrent_producer_wins() {
        let gate = Arc::new(AdmissionGate::new(Duration::ZERO));
        let now = Instant::now();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                std::thread::spawn(move || gate.try_admit(now, true))
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|a| a.is_admitted())
            .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn status_cell_round_trips() {
        let cell = StatusCell::new();
        assert_eq!(cell.get(), ModelStatus::Loading);
        cell.set(ModelStatus::Ready);
        assert_eq!(cell.get(), ModelStatus::Ready);
        cell.set(ModelStatus::Unavailable);
        assert_eq!(cell.get(), ModelStatus::Unavailable);
    }
}

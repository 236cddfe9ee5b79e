use std::time::Duration;

/// Accumulates per-stage durations across frames; stage `i` is one slot with its own sample count.
#[derive(Debug, Default, Clone)]
pub struct TimeCalc {
    duration: Vec<Duration>,
    counts: Vec<usize>,
}

impl TimeCalc {
    /// Timer with `stages` slots already in place.
    pub fn with_stages(stages: usize) -> Self {
        Self {
            duration: vec![Duration::ZERO; stages],
            counts: vec![0; stages],
        }
    }

    pub fn total(&self) -> Duration {
        self.duration.iter().sum::<Duration>()
    }

    /// Most samples recorded in any one slot.
    pub fn n(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    pub fn n_i(&self, i: usize) -> usize {
        self.counts.get(i).copied().unwrap_or(0)
    }

    /// Sum of the per-slot averages.
    pub fn avg(&self) -> Duration {
        (0..self.duration.len()).map(|i| self.avg_i(i)).sum()
    }

    pub fn avg_i(&self, i: usize) -> Duration {
        match (self.duration.get(i), self.n_i(i)) {
            (Some(d), n) if n > 0 => *d / n as u32,
            _ => Duration::ZERO,
        }
    }

    pub fn ts(&self) -> &Vec<Duration> {
        &self.duration
    }

    pub fn add_or_push(&mut self, i: usize, x: Duration) {
        if i >= self.duration.len() {
            self.duration.resize(i + 1, Duration::ZERO);
            self.counts.resize(i + 1, 0);
        }
        self.duration[i] += x;
        self.counts[i] += 1;
    }

    pub fn clear(&mut self) {
        self.duration.clear();
        self.counts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_per_stage() {
        let mut t = TimeCalc::default();
        assert_eq!(t.avg(), Duration::ZERO);
        for _ in 0..2 {
            t.add_or_push(0, Duration::from_millis(2));
            t.add_or_push(1, Duration::from_millis(10));
        }
        assert_eq!(t.n(), 2);
        assert_eq!(t.avg_i(0), Duration::from_millis(2));
        assert_eq!(t.avg_i(1), Duration::from_millis(10));
        assert_eq!(t.avg(), Duration::from_millis(12));
        assert_eq!(t.avg_i(7), Duration::ZERO);
    }

    #[test]
    fn out_of_order_slot_keeps_its_own_time() {
        let mut t = TimeCalc::default();
        t.add_or_push(3, Duration::from_millis(100));
        for i in 0..3 {
            t.add_or_push(i, Duration::from_millis(1));
        }
        assert_eq!(t.ts().len(), 4);
        assert_eq!(t.avg_i(0), Duration::from_millis(1));
        assert_eq!(t.avg_i(3), Duration::from_millis(100));
        assert_eq!(t.n(), 1);
    }

    #[test]
    fn partial_rounds_do_not_skew_other_slots() {
        let mut t = TimeCalc::with_stages(3);
        t.add_or_push(0, Duration::from_millis(4));
        t.add_or_push(1, Duration::from_millis(8));
        // Second round stops after the first stage.
        t.add_or_push(0, Duration::from_millis(4));
        assert_eq!(t.n(), 2);
        assert_eq!(t.n_i(1), 1);
        assert_eq!(t.avg_i(0), Duration::from_millis(4));
        assert_eq!(t.avg_i(1), Duration::from_millis(8));
        assert_eq!(t.avg_i(2), Duration::ZERO);
        assert_eq!(t.avg(), Duration::from_millis(12));
    }
}

//! Progress normalization
//!
//! The toolkit reports a raw fraction per execution. A job may run several
//! executions, so each step gets an equal share of the 0-100 range and the
//! reported percentage never goes backwards.

use serde::Serialize;

/// Progress broadcast to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub job_id: uuid::Uuid,
    pub percent: u8,
}

/// Map a raw fraction to an integer percentage, clamping out-of-range values
pub fn normalize(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    (raw.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Job-scoped, monotonic progress across all steps of a plan
#[derive(Debug)]
pub struct ProgressNormalizer {
    steps: usize,
    current: usize,
    last: u8,
}

impl ProgressNormalizer {
    pub fn new(steps: usize) -> Self {
        Self {
            steps: steps.max(1),
            current: 0,
            last: 0,
        }
    }

    /// Move to step `index`; earlier steps count as complete
    pub fn start_step(&mut self, index: usize) -> Option<u8> {
        self.current = index.min(self.steps - 1);
        self.advance(0.0)
    }

    /// Feed a raw fraction of the current step; returns the new percentage
    /// only when it moved forward
    pub fn observe(&mut self, raw: f64) -> Option<u8> {
        self.advance(raw)
    }

    /// Mark the job finished
    pub fn finish(&mut self) -> u8 {
        self.last = 100;
        self.last
    }

    fn advance(&mut self, raw: f64) -> Option<u8> {
        let fraction = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) };
        let overall = (self.current as f64 + fraction) / self.steps as f64;
        // 100 is reserved for a finished job
        let percent = ((overall * 100.0).floor() as u8).min(99);
        if percent > self.last {
            self.last = percent;
            Some(percent)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_clamps() {
        assert_eq!(normalize(-0.5), 0);
        assert_eq!(normalize(0.421), 42);
        assert_eq!(normalize(1.7), 100);
        assert_eq!(normalize(f64::NAN), 0);
    }

    #[test]
    fn test_single_step() {
        let mut progress = ProgressNormalizer::new(1);
        assert_eq!(progress.start_step(0), None);
        assert_eq!(progress.observe(0.5), Some(50));
        assert_eq!(progress.observe(0.4), None);
        assert_eq!(progress.observe(1.0), Some(99));
        assert_eq!(progress.finish(), 100);
    }

    #[test]
    fn test_steps_share_the_range() {
        let mut progress = ProgressNormalizer::new(4);
        progress.start_step(0);
        assert_eq!(progress.observe(1.0), Some(25));
        assert_eq!(progress.start_step(1), None);
        assert_eq!(progress.observe(0.5), Some(37));
        assert_eq!(progress.start_step(3), Some(75));
        assert_eq!(progress.observe(2.0), Some(99));
    }

    #[test]
    fn test_never_decreases() {
        let mut progress = ProgressNormalizer::new(2);
        let mut seen = vec![0];
        for (step, raws) in [(0, vec![0.3, 0.1, 0.9, -1.0]), (1, vec![0.0, 0.6, 0.2, 1.0])] {
            if let Some(p) = progress.start_step(step) {
                seen.push(p);
            }
            for raw in raws {
                if let Some(p) = progress.observe(raw) {
                    seen.push(p);
                }
            }
        }
        seen.push(progress.finish());
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last(), Some(&100));
    }
}

//! End-of-sequence inference from clustered not-found results.
//!
//! The catalog publishes no upper bound, so the run stops once `capacity` not-found signals are
//! outstanding at the same time. Each successful fetch discounts one outstanding signal, since a
//! later hit means an earlier miss was a gap rather than the end. This is a heuristic: a long run
//! of gaps stops early, and it never proves every existing id was seen.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// Outstanding not-found signals that saturate a run when no threshold is configured.
pub const DEFAULT_THRESHOLD: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Absorbed; probing continues.
    Accumulating(usize),
    /// Capacity reached; the run has been told to stop.
    Saturated,
}

/// Sole owner of the "stop probing" transition. Workers report into it; only it cancels.
#[derive(Debug)]
pub struct SaturationDetector {
    capacity: usize,
    outstanding: AtomicUsize,
    saturated: AtomicBool,
    stop: CancellationToken,
}

impl SaturationDetector {
    pub fn new(capacity: usize, stop: CancellationToken) -> Self {
        Self { capacity: capacity.max(1), outstanding: AtomicUsize::new(0), saturated: AtomicBool::new(false), stop }
    }

    /// Register one not-found observation.
    pub fn not_found(&self) -> Signal {
        let outstanding = self.outstanding.fetch_add(1, Ordering::AcqRel) + 1;
        if outstanding < self.capacity {
            return Signal::Accumulating(outstanding);
        }
        if !self.saturated.swap(true, Ordering::AcqRel) {
            tracing::info!(capacity = self.capacity, "not-found signals saturated, stopping probe");
        }
        // Idempotent: many workers may land here.
        self.stop.cancel();
        Signal::Saturated
    }

    /// Drop one outstanding signal, if any.
    pub fn discount(&self) {
        let _ = self.outstanding.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub fn outstanding(&self) -> usize { self.outstanding.load(Ordering::Acquire) }

    pub fn is_saturated(&self) -> bool { self.saturated.load(Ordering::Acquire) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturates_at_capacity_and_cancels() {
        let token = CancellationToken::new();
        let d = SaturationDetector::new(3, token.clone());
        assert_eq!(d.not_found(), Signal::Accumulating(1));
        assert_eq!(d.not_found(), Signal::Accumulating(2));
        assert!(!token.is_cancelled());
        assert_eq!(d.not_found(), Signal::Saturated);
        assert!(token.is_cancelled());
        assert!(d.is_saturated());
        // later reports stay saturated without panicking
        assert_eq!(d.not_found(), Signal::Saturated);
    }

    #[test]
    fn successes_discount_gaps() {
        let token = CancellationToken::new();
        let d = SaturationDetector::new(2, token.clone());
        for _ in 0..10 {
            assert_eq!(d.not_found(), Signal::Accumulating(1));
            d.discount();
        }
        assert_eq!(d.outstanding(), 0);
        d.discount();
        assert_eq!(d.outstanding(), 0);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let d = SaturationDetector::new(0, CancellationToken::new());
        assert_eq!(d.not_found(), Signal::Saturated);
    }
}

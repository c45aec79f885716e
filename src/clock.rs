//! Time and frame-pacing collaborators injected into the driver.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic time source in milliseconds.
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// Wall-clock backed monotonic time, relative to construction.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1_000.0
    }
}

/// Manually advanced clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        let clock = Self::default();
        clock.set(start_ms);
        clock
    }

    pub fn set(&self, ms: f64) {
        self.bits.store(ms.to_bits(), Ordering::Relaxed);
    }

    pub fn advance(&self, ms: f64) {
        self.set(self.now_ms() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// Token for one outstanding frame request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRequest(pub u64);

/// Schedules one-shot "draw at the next opportunity" callbacks.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameRequest;
    fn cancel_frame(&mut self, request: FrameRequest);
}

/// Frame scheduler that only records requests; frames are driven by hand.
#[derive(Debug, Default)]
pub struct ManualFrames {
    next_id: u64,
    pending: Option<FrameRequest>,
    pub requested: usize,
    pub cancelled: usize,
}

impl ManualFrames {
    pub fn pending(&self) -> Option<FrameRequest> {
        self.pending
    }
}

impl FrameScheduler for ManualFrames {
    fn request_frame(&mut self) -> FrameRequest {
        self.next_id += 1;
        self.requested += 1;
        let request = FrameRequest(self.next_id);
        self.pending = Some(request);
        request
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        if self.pending == Some(request) {
            self.pending = None;
        }
        self.cancelled += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_is_shared_between_clones() {
        let clock = ManualClock::new(10.0);
        let other = clock.clone();
        other.advance(5.5);
        assert_eq!(clock.now_ms(), 15.5);
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a && a >= 0.0);
    }

    #[test]
    fn cancelling_clears_only_the_matching_request() {
        let mut frames = ManualFrames::default();
        let first = frames.request_frame();
        let second = frames.request_frame();
        frames.cancel_frame(first);
        assert_eq!(frames.pending(), Some(second));
        frames.cancel_frame(second);
        assert_eq!(frames.pending(), None);
        assert_eq!((frames.requested, frames.cancelled), (2, 2));
    }
}

//! Periodic timer enforcing per-request, keep-alive, and CGI-class
//! timeouts.
//!
//! Grounded on `MA_TIMER_PERIOD` (1 second) and `MA_KEEP_TIMEOUT` /
//! `MA_CGI_TIMEOUT` in `httpTune.h`; expressed with `tokio_core`'s
//! `Interval`, the way the rest of this crate reaches for its ambient
//! stack instead of a hand-rolled wheel.

use std::time::{Duration, Instant};

/// Tracks the deadlines for one connection; [`Timer::tick`] is called
/// once a second from a `tokio_core::reactor::Interval` stream and
/// returns `true` the first time any deadline has passed.
#[derive(Debug)]
pub struct Timer {
    keep_alive_deadline: Option<Instant>,
    request_deadline: Option<Instant>,
}

impl Timer {
    pub fn new() -> Timer {
        Timer { keep_alive_deadline: None, request_deadline: None }
    }

    /// Arm the keep-alive deadline for an otherwise idle connection.
    pub fn arm_keep_alive(&mut self, timeout: Duration) {
        self.keep_alive_deadline = Some(Instant::now() + timeout);
    }

    /// Arm the per-request deadline once a request starts being parsed
    /// or processed.
    pub fn arm_request(&mut self, timeout: Duration) {
        self.request_deadline = Some(Instant::now() + timeout);
    }

    pub fn disarm(&mut self) {
        self.keep_alive_deadline = None;
        self.request_deadline = None;
    }

    /// Returns `true` if either armed deadline has passed as of `now`.
    pub fn expired(&self, now: Instant) -> bool {
        self.keep_alive_deadline.map_or(false, |d| now >= d)
            || self.request_deadline.map_or(false, |d| now >= d)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unarmed_timer_never_expires() {
        let t = Timer::new();
        assert!(!t.expired(Instant::now()));
    }

    #[test]
    fn keep_alive_deadline_expires() {
        let mut t = Timer::new();
        t.arm_keep_alive(Duration::from_millis(0));
        assert!(t.expired(Instant::now() + Duration::from_millis(1)));
    }

    #[test]
    fn disarm_clears_deadlines() {
        let mut t = Timer::new();
        t.arm_request(Duration::from_millis(0));
        t.disarm();
        assert!(!t.expired(Instant::now() + Duration::from_secs(1)));
    }
}

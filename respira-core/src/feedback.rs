//! Interrupt-boundary feedback counters
//!
//! The home switch, the quadrature-less encoder output and the brushless
//! commutation feedback all fire as edge interrupts. The handlers must not
//! touch the bus or the state machines; they only bump these counters.
//! The control loop reads-and-clears them once per tick, which makes the
//! ISR/loop contract explicit: writers never read, the reader owns reset.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Home-switch edges closer together than this are switch bounce
pub const HOME_DEBOUNCE_MS: u32 = 250;

/// Counters written at the interrupt boundary, drained by the control loop
#[derive(Debug, Default)]
pub struct FeedbackCounters {
    encoder: AtomicU32,
    feedback: AtomicU32,
    home: AtomicBool,
    last_home_ms: AtomicU32,
}

impl FeedbackCounters {
    pub const fn new() -> Self {
        Self {
            encoder: AtomicU32::new(0),
            feedback: AtomicU32::new(0),
            home: AtomicBool::new(false),
            last_home_ms: AtomicU32::new(0),
        }
    }

    /// Called from the encoder edge ISR
    pub fn record_encoder_pulse(&self) {
        self.encoder.fetch_add(1, Ordering::Relaxed);
    }

    /// Called from the shared-pin feedback ISR (brushless commutation)
    pub fn record_feedback_pulse(&self) {
        self.feedback.fetch_add(1, Ordering::Relaxed);
    }

    /// Called from the home-switch edge ISR
    ///
    /// Edges within [`HOME_DEBOUNCE_MS`] of the previous edge are dropped.
    pub fn record_home_edge(&self, now_ms: u32) {
        let last = self.last_home_ms.load(Ordering::Relaxed);
        // now_ms wrapped or the clock was reset; restart the window
        let elapsed = now_ms.wrapping_sub(last);
        if last == 0 || elapsed > HOME_DEBOUNCE_MS {
            self.home.store(true, Ordering::Relaxed);
        }
        self.last_home_ms.store(now_ms, Ordering::Relaxed);
    }

    /// Drain the encoder pulse count
    pub fn take_encoder(&self) -> u32 {
        self.encoder.swap(0, Ordering::Relaxed)
    }

    /// Drain the feedback pulse count
    pub fn take_feedback(&self) -> u32 {
        self.feedback.swap(0, Ordering::Relaxed)
    }

    /// Drain the home-triggered flag
    pub fn take_home(&self) -> bool {
        self.home.swap(false, Ordering::Relaxed)
    }

    /// Reset everything (pin-role changes, start of a detection window)
    pub fn clear(&self) {
        self.encoder.store(0, Ordering::Relaxed);
        self.feedback.store(0, Ordering::Relaxed);
        self.home.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_drains() {
        let c = FeedbackCounters::new();
        c.record_encoder_pulse();
        c.record_encoder_pulse();
        c.record_feedback_pulse();
        assert_eq!(c.take_encoder(), 2);
        assert_eq!(c.take_encoder(), 0);
        assert_eq!(c.take_feedback(), 1);
    }

    #[test]
    fn home_debounce_drops_bounce_edges() {
        let c = FeedbackCounters::new();
        c.record_home_edge(1000);
        assert!(c.take_home());
        // bounce inside the window
        c.record_home_edge(1100);
        assert!(!c.take_home());
        // well clear of the window
        c.record_home_edge(1500);
        assert!(c.take_home());
    }

    #[test]
    fn clear_resets_all() {
        let c = FeedbackCounters::new();
        c.record_encoder_pulse();
        c.record_home_edge(5000);
        c.clear();
        assert_eq!(c.take_encoder(), 0);
        assert!(!c.take_home());
    }
}

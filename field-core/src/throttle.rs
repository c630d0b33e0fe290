//! Leading-edge outbound throttle.
//!
//! At most one send per interval. The first offer in a quiet period is sent
//! immediately; offers inside the interval are coalesced into a single
//! pending item that is flushed when the interval elapses. The caller owns
//! the timer: the throttle only says when it must fire.

use field_types::Payload;
use std::time::{Duration, Instant};

/// Folding a newer item into a pending one.
pub trait Coalesce {
    /// Absorb `newer`; where both carry the same part, `newer` wins.
    fn coalesce(&mut self, newer: Self);
}

/// Payloads merge per key. A key sent twice keeps its latest value and
/// keys sent once are kept.
impl Coalesce for Payload {
    fn coalesce(&mut self, newer: Self) {
        for (key, value) in newer {
            self.insert(key, value);
        }
    }
}

/// Throttle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleState {
    /// No timer running.
    Idle,
    /// A timer is due at `fire_at` and a payload is pending.
    PendingTimer {
        /// When the pending payload may be sent.
        fire_at: Instant,
    },
}

/// Result of [`Throttle::offer`].
#[derive(Debug, Clone, PartialEq)]
pub enum Offer<T> {
    /// Send this now.
    SendNow(T),
    /// Held as the pending payload.
    Deferred {
        /// When the pending payload may be sent.
        fire_at: Instant,
        /// Whether the caller must start a timer (false when one is running).
        start_timer: bool,
    },
}

/// Leading-edge throttle holding at most one pending item.
#[derive(Debug)]
pub struct Throttle<T> {
    interval: Duration,
    state: ThrottleState,
    pending: Option<T>,
    last_sent: Option<Instant>,
}

impl<T: Coalesce> Throttle<T> {
    /// Offer an item at time `now`. Inside the interval it is folded into
    /// the pending item.
    pub fn offer(&mut self, item: T, now: Instant) -> Offer<T> {
        match self.state {
            ThrottleState::PendingTimer { fire_at } => {
                self.hold(item);
                Offer::Deferred {
                    fire_at,
                    start_timer: false,
                }
            }
            ThrottleState::Idle => match self.last_sent {
                Some(last) if now.duration_since(last) < self.interval => {
                    let fire_at = last + self.interval;
                    self.hold(item);
                    self.state = ThrottleState::PendingTimer { fire_at };
                    Offer::Deferred {
                        fire_at,
                        start_timer: true,
                    }
                }
                _ => {
                    self.last_sent = Some(now);
                    Offer::SendNow(item)
                }
            },
        }
    }

    fn hold(&mut self, item: T) {
        match &mut self.pending {
            Some(pending) => pending.coalesce(item),
            None => self.pending = Some(item),
        }
    }
}

impl<T> Throttle<T> {
    /// Create a throttle. A zero interval never defers.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: ThrottleState::Idle,
            pending: None,
            last_sent: None,
        }
    }

    /// The timer fired: release the pending item, if any.
    pub fn on_timer(&mut self, now: Instant) -> Option<T> {
        self.state = ThrottleState::Idle;
        let item = self.pending.take()?;
        self.last_sent = Some(now);
        Some(item)
    }

    /// Drop the pending item and forget the timer.
    pub fn cancel(&mut self) -> Option<T> {
        self.state = ThrottleState::Idle;
        self.pending.take()
    }

    /// Current state.
    pub fn state(&self) -> ThrottleState {
        self.state
    }

    /// When the running timer is due.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            ThrottleState::PendingTimer { fire_at } => Some(fire_at),
            ThrottleState::Idle => None,
        }
    }

    /// Configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    const MS: Duration = Duration::from_millis(1);

    fn p(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn first_offer_goes_immediately() {
        let mut t = Throttle::new(500 * MS);
        assert_eq!(
            t.offer(p(json!({"level": 1})), Instant::now()),
            Offer::SendNow(p(json!({"level": 1})))
        );
        assert_eq!(t.state(), ThrottleState::Idle);
    }

    #[test]
    fn offers_inside_interval_are_coalesced() {
        let start = Instant::now();
        let mut t = Throttle::new(500 * MS);
        t.offer(p(json!({"level": 1})), start);

        let second = t.offer(p(json!({"level": 2})), start + 100 * MS);
        assert_eq!(
            second,
            Offer::Deferred {
                fire_at: start + 500 * MS,
                start_timer: true
            }
        );
        let third = t.offer(p(json!({"level": 3})), start + 200 * MS);
        assert!(matches!(third, Offer::Deferred { start_timer: false, .. }));

        assert_eq!(t.on_timer(start + 500 * MS), Some(p(json!({"level": 3}))));
        assert_eq!(t.state(), ThrottleState::Idle);
    }

    #[test]
    fn coalescing_keeps_every_key() {
        let start = Instant::now();
        let mut t = Throttle::new(500 * MS);
        t.offer(p(json!({"level": 1})), start);
        t.offer(p(json!({"led": true})), start + 10 * MS);
        t.offer(p(json!({"level": 2})), start + 20 * MS);

        assert_eq!(
            t.on_timer(start + 500 * MS),
            Some(p(json!({"led": true, "level": 2})))
        );
    }

    #[test]
    fn flush_restarts_the_interval() {
        let start = Instant::now();
        let mut t = Throttle::new(500 * MS);
        t.offer(p(json!({"a": 1})), start);
        t.offer(p(json!({"a": 2})), start + 10 * MS);
        t.on_timer(start + 500 * MS);

        assert!(matches!(
            t.offer(p(json!({"a": 3})), start + 600 * MS),
            Offer::Deferred { .. }
        ));
        assert_eq!(t.deadline(), Some(start + 1000 * MS));
    }

    #[test]
    fn quiet_period_sends_immediately_again() {
        let start = Instant::now();
        let mut t = Throttle::new(500 * MS);
        t.offer(p(json!({"a": 1})), start);
        assert_eq!(
            t.offer(p(json!({"a": 2})), start + 501 * MS),
            Offer::SendNow(p(json!({"a": 2})))
        );
    }

    #[test]
    fn cancel_drops_pending() {
        let start = Instant::now();
        let mut t = Throttle::new(500 * MS);
        t.offer(p(json!({"a": 1})), start);
        t.offer(p(json!({"a": 2})), start + MS);
        assert_eq!(t.cancel(), Some(p(json!({"a": 2}))));
        assert_eq!(t.on_timer(start + 500 * MS), None);
    }

    #[test]
    fn zero_interval_never_defers() {
        let start = Instant::now();
        let mut t = Throttle::new(Duration::ZERO);
        assert!(matches!(t.offer(p(json!({"a": 1})), start), Offer::SendNow(_)));
        assert!(matches!(t.offer(p(json!({"a": 2})), start), Offer::SendNow(_)));
    }
}

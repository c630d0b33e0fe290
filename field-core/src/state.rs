//! Push session state machine.
//!
//! Pure and side-effect free: the session takes events and returns actions.
//! Opening channels, running timers and delivering payloads are done by the
//! driver in `livefield-client`, which executes the actions.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──opened──▶ Open
//!                       ▲                    │
//!                 timer │                    │ closed
//!                       │                    ▼
//!                    Closed ◀───────── (attempts < max)
//!                                            │
//!                                            ▼ (attempts == max)
//!                                        Exhausted ──connect──▶ Connecting
//! ```
//!
//! Explicit disconnect returns to `Idle` from anywhere and cancels every
//! timer.

use field_types::{Frame, Payload};
use std::time::Duration;

/// Connection phase as reported to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Opening the channel.
    Connecting,
    /// Channel open.
    Open,
    /// Channel closed.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Open => "OPEN",
            ConnectionState::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

/// Internal session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Never connected, or explicitly disconnected.
    Idle,
    /// Connect in flight.
    Connecting,
    /// Channel open.
    Open,
    /// Closed; reconnect timer running.
    Closed,
    /// Closed; reconnect ceiling reached, waiting for an explicit connect.
    Exhausted,
}

impl SessionPhase {
    /// Map to the consumer-facing connection state.
    pub fn connection_state(self) -> ConnectionState {
        match self {
            SessionPhase::Connecting => ConnectionState::Connecting,
            SessionPhase::Open => ConnectionState::Open,
            SessionPhase::Idle | SessionPhase::Closed | SessionPhase::Exhausted => {
                ConnectionState::Closed
            }
        }
    }
}

/// Reconnect ceiling and backoff parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive closes after which auto-reconnect stops.
    pub max_attempts: u32,
    /// Delay for the first reconnect.
    pub base_delay: Duration,
    /// Upper bound for the exponential part of the delay.
    pub max_delay: Duration,
    /// Upper bound for the uniform random jitter.
    pub jitter: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            jitter: Duration::from_millis(500),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based).
    ///
    /// `min(max_delay, base_delay * 2^(attempt-1)) + random(0..=jitter)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff(attempt) + random_jitter(self.jitter)
    }

    /// Backoff without jitter.
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

fn random_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let mut bytes = [0u8; 8];
    // No entropy means no jitter.
    if getrandom::getrandom(&mut bytes).is_err() {
        return Duration::ZERO;
    }
    Duration::from_millis(u64::from_le_bytes(bytes) % (max_ms + 1))
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Consumer mounted, or asked for a reconnect.
    ConnectRequested,
    /// The channel opened.
    Opened,
    /// The channel closed, failed to open, or timed out while opening.
    Closed {
        /// Human-readable cause.
        reason: String,
    },
    /// The reconnect timer fired.
    ReconnectTimer,
    /// A well-formed frame arrived.
    FrameReceived(Frame),
    /// Consumer unmounted or asked to stop.
    DisconnectRequested,
}

/// Work for the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Open the channel.
    Connect,
    /// Close the channel.
    CloseChannel,
    /// Start the reconnect timer.
    StartReconnectTimer {
        /// Delay before firing.
        delay: Duration,
    },
    /// Cancel the reconnect timer, if running.
    CancelReconnect,
    /// Drop any pending throttled send and its timer.
    CancelThrottle,
    /// Forget the last inbound payload.
    ClearPayload,
    /// Hand an inbound payload to consumers.
    Deliver {
        /// Origin identifier from the frame.
        origin_id: String,
        /// Field updates.
        payload: Payload,
        /// Whether this session caused the update.
        echo: bool,
    },
    /// Tell the application something happened.
    Emit(SessionEvent),
}

/// Notifications for the application.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Channel open.
    Connected,
    /// Channel closed.
    Disconnected {
        /// Why.
        reason: String,
        /// Consecutive closes so far.
        attempt: u32,
    },
    /// A reconnect is scheduled.
    ReconnectScheduled {
        /// Attempt number the timer will start.
        attempt: u32,
        /// Delay before it starts.
        delay: Duration,
    },
    /// Reconnect ceiling reached.
    GaveUp {
        /// Consecutive closes.
        attempts: u32,
    },
    /// Identity frame received.
    IdentityChanged {
        /// Connection id assigned by the device.
        client_id: String,
        /// Origin id used on outbound frames.
        origin_id: String,
    },
}

/// Push session state.
#[derive(Debug, Clone, PartialEq)]
pub struct PushSession {
    phase: SessionPhase,
    client_id: Option<String>,
    origin_id: String,
    reconnect_attempts: u32,
    policy: ReconnectPolicy,
}

impl Default for PushSession {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

impl PushSession {
    /// Create an idle session.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            phase: SessionPhase::Idle,
            client_id: None,
            origin_id: String::new(),
            reconnect_attempts: 0,
            policy,
        }
    }

    /// Process an event and return the actions to execute.
    pub fn on_event(&mut self, event: Event) -> Vec<Action> {
        match (self.phase, event) {
            // Mount, or explicit reconnect after exhaustion or disconnect
            (SessionPhase::Idle | SessionPhase::Exhausted, Event::ConnectRequested) => {
                self.reconnect_attempts = 0;
                self.phase = SessionPhase::Connecting;
                vec![Action::Connect]
            }
            // Explicit reconnect while waiting: skip the wait
            (SessionPhase::Closed, Event::ConnectRequested) => {
                self.phase = SessionPhase::Connecting;
                vec![Action::CancelReconnect, Action::Connect]
            }

            (SessionPhase::Connecting, Event::Opened) => {
                self.reconnect_attempts = 0;
                self.phase = SessionPhase::Open;
                vec![Action::Emit(SessionEvent::Connected)]
            }

            (SessionPhase::Connecting | SessionPhase::Open, Event::Closed { reason }) => {
                self.on_closed(reason)
            }

            (SessionPhase::Closed, Event::ReconnectTimer) => {
                self.phase = SessionPhase::Connecting;
                vec![Action::Connect]
            }

            (SessionPhase::Open, Event::FrameReceived(frame)) => self.on_frame(frame),

            (SessionPhase::Idle, Event::DisconnectRequested) => vec![],
            (_, Event::DisconnectRequested) => {
                self.phase = SessionPhase::Idle;
                self.client_id = None;
                vec![
                    Action::CancelReconnect,
                    Action::CancelThrottle,
                    Action::CloseChannel,
                    Action::ClearPayload,
                ]
            }

            // Stale or out-of-order input - stay put
            _ => vec![],
        }
    }

    fn on_closed(&mut self, reason: String) -> Vec<Action> {
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        self.client_id = None;
        let attempt = self.reconnect_attempts;

        let mut actions = vec![
            Action::ClearPayload,
            Action::Emit(SessionEvent::Disconnected { reason, attempt }),
        ];

        if attempt < self.policy.max_attempts {
            let delay = self.policy.backoff(attempt);
            self.phase = SessionPhase::Closed;
            actions.push(Action::StartReconnectTimer { delay });
            actions.push(Action::Emit(SessionEvent::ReconnectScheduled { attempt, delay }));
        } else {
            self.phase = SessionPhase::Exhausted;
            actions.push(Action::Emit(SessionEvent::GaveUp { attempts: attempt }));
        }
        actions
    }

    fn on_frame(&mut self, frame: Frame) -> Vec<Action> {
        match frame {
            Frame::Identity { id, origin_id } => {
                // The device omits origin_id when it equals the connection id
                self.origin_id = origin_id.filter(|o| !o.is_empty()).unwrap_or_else(|| id.clone());
                self.client_id = Some(id.clone());
                vec![Action::Emit(SessionEvent::IdentityChanged {
                    client_id: id,
                    origin_id: self.origin_id.clone(),
                })]
            }
            Frame::Payload { origin_id, payload } => {
                let echo = self.is_echo(&origin_id);
                // Outbound frames follow the origin the device last reported
                if !origin_id.is_empty() {
                    self.origin_id = origin_id.clone();
                }
                vec![Action::Deliver {
                    origin_id,
                    payload,
                    echo,
                }]
            }
        }
    }

    /// Whether a frame with `origin_id` was caused by this session.
    pub fn is_echo(&self, origin_id: &str) -> bool {
        self.client_id.as_deref() == Some(origin_id)
    }

    /// Consumer-facing connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.phase.connection_state()
    }

    /// Internal phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Connection id from the last identity frame, cleared on close.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Origin id stamped on outbound payload frames.
    pub fn origin_id(&self) -> &str {
        &self.origin_id
    }

    /// Consecutive closes since the last open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Whether auto-reconnect has given up.
    pub fn is_exhausted(&self) -> bool {
        self.phase == SessionPhase::Exhausted
    }

    /// Whether the channel is open.
    pub fn is_open(&self) -> bool {
        self.phase == SessionPhase::Open
    }

    /// Reconnect policy in use.
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }
}

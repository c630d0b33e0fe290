//! Mock push transport for testing.
//!
//! Allows injecting inbound frames, dropping the connection and capturing
//! sent frames for verification. Clones share state, so a test keeps one
//! handle while the session owns another.

use super::{PushTransport, TransportError};
use async_trait::async_trait;
use field_types::Frame;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Mock push transport for testing.
#[derive(Debug, Default, Clone)]
pub struct MockPushTransport {
    inner: Arc<Mutex<MockPushInner>>,
    wake: Arc<Notify>,
}

#[derive(Debug, Default)]
struct MockPushInner {
    connected: bool,
    connected_url: Option<String>,
    connect_count: u32,
    sent_frames: Vec<String>,
    inbound: VecDeque<String>,
    fail_connects: u32,
    hang_next_connect: bool,
    fail_next_send: Option<String>,
}

impl MockPushTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a text frame for `recv()`.
    pub fn inject(&self, text: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        inner.inbound.push_back(text.into());
        drop(inner);
        self.wake.notify_one();
    }

    /// Queue a frame for `recv()`.
    pub fn inject_frame(&self, frame: &Frame) {
        let text = frame.to_json().unwrap();
        self.inject(text);
    }

    /// Simulate the peer closing the channel. A pending `recv()` fails.
    pub fn drop_connection(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.connected = false;
        drop(inner);
        self.wake.notify_one();
    }

    /// Cause the next `n` connect() calls to fail.
    pub fn fail_next_connects(&self, n: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_connects = n;
    }

    /// Cause the next connect() to never complete.
    pub fn hang_next_connect(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.hang_next_connect = true;
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_send = Some(error.to_string());
    }

    /// Number of connect() calls so far.
    pub fn connect_count(&self) -> u32 {
        self.inner.lock().unwrap().connect_count
    }

    /// The URL of the last successful connect.
    pub fn connected_url(&self) -> Option<String> {
        self.inner.lock().unwrap().connected_url.clone()
    }

    /// All frames sent so far.
    pub fn sent_frames(&self) -> Vec<String> {
        self.inner.lock().unwrap().sent_frames.clone()
    }

    /// All sent frames, parsed.
    pub fn sent(&self) -> Vec<Frame> {
        self.sent_frames()
            .iter()
            .filter_map(|text| Frame::parse(text).ok())
            .collect()
    }
}

#[async_trait]
impl PushTransport for MockPushTransport {
    async fn connect(&self, url: &str) -> Result<(), TransportError> {
        let hang = {
            let mut inner = self.inner.lock().unwrap();
            inner.connect_count += 1;

            if inner.fail_connects > 0 {
                inner.fail_connects -= 1;
                return Err(TransportError::Connect {
                    url: url.to_string(),
                    reason: "refused".into(),
                });
            }

            std::mem::take(&mut inner.hang_next_connect)
        };

        if hang {
            std::future::pending::<()>().await;
        }

        let mut inner = self.inner.lock().unwrap();
        inner.connected = true;
        inner.connected_url = Some(url.to_string());
        Ok(())
    }

    async fn send(&self, text: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::Write(error));
        }

        inner.sent_frames.push(text.to_string());
        Ok(())
    }

    async fn recv(&self) -> Result<String, TransportError> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if !inner.connected {
                    return Err(TransportError::Closed("dropped by peer".into()));
                }
                if let Some(text) = inner.inbound.pop_front() {
                    return Ok(text);
                }
            }
            self.wake.notified().await;
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().unwrap().connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.connected = false;
        drop(inner);
        self.wake.notify_one();
        Ok(())
    }
}

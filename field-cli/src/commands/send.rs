//! Send field updates over the push channel.

use anyhow::{bail, Context, Result};
use field_client::{Config, PushSessionHandle, SessionConfig, SessionStatus, WsTransport};
use field_core::{ConnectionState, ReconciliationCache};
use field_types::Payload;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// How long to wait for the identity frame once the channel is open.
const IDENTITY_GRACE: Duration = Duration::from_secs(1);

/// Run the send command.
pub async fn run(config: &Config, assignments: &[String]) -> Result<()> {
    let payload = parse_assignments(assignments)?;

    let session_config =
        SessionConfig::from_push_config(&config.push).context("Invalid push configuration")?;
    let open_limit = session_config.connect_timeout;
    let session = PushSessionHandle::spawn(
        session_config,
        WsTransport::new(),
        Arc::new(ReconciliationCache::new()),
    );
    let mut status = session.watch_status();

    let opened = wait_for(&mut status, open_limit, |s| {
        s.state == ConnectionState::Open || s.exhausted
    })
    .await;
    if !opened || session.status().state != ConnectionState::Open {
        session.shutdown().await;
        bail!("Push channel at {} did not open", config.push.url);
    }

    // Frames sent before the identity frame carry an empty origin
    if !wait_for(&mut status, Some(IDENTITY_GRACE), |s| s.client_id.is_some()).await {
        tracing::debug!("No identity frame received, sending without origin");
    }

    let keys: Vec<String> = payload.keys().cloned().collect();
    session.send(payload).context("Push session stopped")?;
    session.shutdown().await;

    println!("Sent {}", keys.join(", "));
    Ok(())
}

/// Parse `key=value` arguments. Values are JSON when they parse as JSON and
/// plain strings otherwise; later assignments to the same key win.
pub(crate) fn parse_assignments(assignments: &[String]) -> Result<Payload> {
    let mut payload = Payload::new();
    for assignment in assignments {
        let (key, raw) = assignment
            .split_once('=')
            .with_context(|| format!("Expected key=value, got '{}'", assignment))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("Missing key in '{}'", assignment);
        }
        let value =
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        payload.insert(key.to_string(), value);
    }
    Ok(payload)
}

/// Wait until `ready` holds for the published status. Returns false on
/// timeout or when the session stops; `None` waits without a limit.
async fn wait_for(
    status: &mut watch::Receiver<SessionStatus>,
    limit: Option<Duration>,
    ready: impl FnMut(&SessionStatus) -> bool,
) -> bool {
    match limit {
        Some(limit) => matches!(
            tokio::time::timeout(limit, status.wait_for(ready)).await,
            Ok(Ok(_))
        ),
        None => status.wait_for(ready).await.is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use field_client::MockPushTransport;
    use field_types::Frame;
    use serde_json::json;

    #[test]
    fn parses_json_values() {
        let payload =
            parse_assignments(&["led=true".into(), "level=80".into(), "mode=\"eco\"".into()])
                .unwrap();
        assert_eq!(payload["led"], json!(true));
        assert_eq!(payload["level"], json!(80));
        assert_eq!(payload["mode"], json!("eco"));
    }

    #[test]
    fn falls_back_to_strings() {
        let payload = parse_assignments(&["name=kitchen light".into(), "empty=".into()]).unwrap();
        assert_eq!(payload["name"], json!("kitchen light"));
        assert_eq!(payload["empty"], json!(""));
    }

    #[test]
    fn keeps_assignment_order_and_last_write() {
        let payload =
            parse_assignments(&["b=1".into(), "a=2".into(), "b=3".into()]).unwrap();
        let keys: Vec<&str> = payload.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(payload["b"], json!(3));
    }

    #[test]
    fn rejects_malformed_assignments() {
        assert!(parse_assignments(&["led".into()]).is_err());
        assert!(parse_assignments(&["=1".into()]).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_sees_open_and_identity() {
        let transport = MockPushTransport::new();
        let config = SessionConfig {
            url: "ws://device/ws".into(),
            throttle: Duration::from_millis(100),
            connect_timeout: Some(Duration::from_secs(5)),
            policy: Default::default(),
        };
        let session = PushSessionHandle::spawn(
            config,
            transport.clone(),
            Arc::new(ReconciliationCache::new()),
        );
        let mut status = session.watch_status();

        assert!(
            wait_for(&mut status, Some(Duration::from_secs(1)), |s| {
                s.state == ConnectionState::Open
            })
            .await
        );
        assert!(
            !wait_for(&mut status, Some(Duration::from_millis(50)), |s| {
                s.client_id.is_some()
            })
            .await
        );

        transport.inject_frame(&Frame::Identity {
            id: "c-1".into(),
            origin_id: None,
        });
        assert!(wait_for(&mut status, None, |s| s.client_id.is_some()).await);

        session.shutdown().await;
    }
}

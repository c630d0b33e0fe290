//! Follow a push session.

use anyhow::{Context, Result};
use field_client::{
    load, Config, HttpStateTransport, InboundPayload, PushSessionHandle, SessionConfig,
    WsTransport,
};
use field_core::{FieldSet, ReconciliationCache, SeriesStore};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

/// Run the watch command until Ctrl-C or until reconnecting gives up.
pub async fn run(config: &Config, form: Option<&str>) -> Result<()> {
    let cache = Arc::new(ReconciliationCache::new());
    let series = SeriesStore::new();

    let mut fields = match form {
        Some(form) => {
            let transport = HttpStateTransport::new(&config.rest, form)
                .context("Failed to create HTTP client")?;
            let set = load(&transport, &cache, &series, config.series.max_points)
                .await
                .with_context(|| format!("Failed to fetch {}", transport.url()))?;
            tracing::info!("Loaded {} fields from {}", set.fields().len(), form);
            Some(set)
        }
        None => None,
    };

    let session_config =
        SessionConfig::from_push_config(&config.push).context("Invalid push configuration")?;
    let session = PushSessionHandle::spawn(session_config, WsTransport::new(), Arc::clone(&cache));
    let mut payloads = session.subscribe();
    let mut status = session.watch_status();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                tracing::debug!("Push channel {}", current.state);
                if current.exhausted {
                    tracing::error!("Push channel unavailable, stopping");
                    break;
                }
            }
            inbound = payloads.recv() => match inbound {
                Ok(inbound) => {
                    let line = match fields.as_mut() {
                        Some(set) => render_routed(set, &inbound, &cache, &series),
                        None => render_raw(&inbound),
                    };
                    println!("{}", serde_json::to_string(&line)?);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Skipped {} payloads", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.shutdown().await;
    Ok(())
}

fn render_raw(inbound: &InboundPayload) -> Value {
    json!({
        "origin": inbound.origin_id,
        "echo": inbound.echo,
        "payload": inbound.payload,
    })
}

/// Apply a payload to the field set and report the reconciled values of the
/// fields it touched.
fn render_routed(
    set: &mut FieldSet,
    inbound: &InboundPayload,
    cache: &ReconciliationCache,
    series: &SeriesStore,
) -> Value {
    set.apply_push(&inbound.payload, cache, series);

    let nested = inbound
        .payload
        .get("status")
        .and_then(|s| s.get("fields"))
        .and_then(Value::as_object);
    let mut values = Map::new();
    for field in set.fields() {
        let name = field.name();
        if !inbound.payload.contains_key(name) && !nested.is_some_and(|n| n.contains_key(name)) {
            continue;
        }
        let value = if field.is_series() {
            json!(series.with(name, |buffer| buffer.latest()).unwrap_or_default())
        } else {
            field.value.clone()
        };
        values.insert(name.to_string(), value);
    }

    json!({
        "origin": inbound.origin_id,
        "echo": inbound.echo,
        "fields": values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use field_types::RawField;

    fn inbound(payload: Value, echo: bool) -> InboundPayload {
        InboundPayload {
            origin_id: "dev-1".into(),
            payload: payload.as_object().cloned().unwrap(),
            echo,
        }
    }

    #[test]
    fn raw_lines_carry_origin_and_echo() {
        let line = render_raw(&inbound(json!({"led": 1}), true));
        assert_eq!(line["origin"], "dev-1");
        assert_eq!(line["echo"], true);
        assert_eq!(line["payload"]["led"], 1);
    }

    #[test]
    fn routed_lines_show_reconciled_values() {
        let cache = ReconciliationCache::new();
        let series = SeriesStore::new();
        let fields = vec![
            RawField::new("led", json!(false), "switch;rw"),
            RawField::new("level", json!(10), "slider;rw"),
            RawField::new("power", json!([]), "trend"),
        ];
        let mut set = FieldSet::from_raw(&fields, &cache, &series);

        let line = render_routed(
            &mut set,
            &inbound(
                json!({
                    "led": 1,
                    "unknown": 5,
                    "status": {"fields": {"power": [{"timestamp": 7, "w": 3}]}}
                }),
                false,
            ),
            &cache,
            &series,
        );

        assert_eq!(line["fields"]["led"], json!(true));
        assert_eq!(line["fields"]["power"]["w"], json!(3.0));
        assert!(line["fields"].get("level").is_none());
        assert!(line["fields"].get("unknown").is_none());
    }
}

//! Fetch a form over the request/response channel.

use anyhow::{Context, Result};
use field_client::{load, Config, HttpStateTransport};
use field_core::{resolve_lines, FieldSet, ReconciliationCache, SeriesStore};
use serde_json::{json, Value};

/// Run the fetch command.
pub async fn run(config: &Config, form: &str) -> Result<()> {
    let transport = HttpStateTransport::new(&config.rest, form)
        .context("Failed to create HTTP client")?;
    tracing::info!("Fetching {}", transport.url());

    let cache = ReconciliationCache::new();
    let series = SeriesStore::new();
    let set = load(&transport, &cache, &series, config.series.max_points)
        .await
        .with_context(|| format!("Failed to fetch {}", transport.url()))?;

    let output = json!({
        "description": set.description(),
        "fields": render_fields(&set, &series),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// One JSON object per field: descriptor, current value and, for series
/// fields, the latest value and line settings of each channel.
pub(crate) fn render_fields(set: &FieldSet, series: &SeriesStore) -> Vec<Value> {
    set.fields()
        .iter()
        .map(|field| {
            let mut row = json!({
                "descriptor": field.descriptor,
                "value": field.value,
            });
            if field.is_series() {
                let configured = field
                    .descriptor
                    .series
                    .as_ref()
                    .map(|options| options.lines.as_slice())
                    .unwrap_or_default();
                let (latest, lines) = series
                    .with(field.name(), |buffer| {
                        (buffer.latest(), resolve_lines(configured, buffer.keys()))
                    })
                    .unwrap_or_default();
                row["latest"] = json!(latest);
                row["lines"] = json!(lines);
            }
            row
        })
        .collect()
}

//! Time-series merge engine.
//!
//! Telemetry arrives as batches of points. Each point is one timestamp plus
//! any number of numeric channels; a device may report different channels for
//! the same timestamp in separate frames. [`SeriesBuffer`] folds those batches
//! into one row per timestamp, kept in ascending order and bounded by a
//! per-field cap. Oldest rows are evicted first.
//!
//! Alongside the rows the buffer keeps a latest-values projection: for each
//! channel, the value from the most recent row that carried it. Snapshot
//! views (bar, pie) render from the projection alone.

use dashmap::DashMap;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Key carrying the timestamp inside an incoming point object.
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Row cap used when a field encoding carries no `maxPoints`.
pub const DEFAULT_MAX_POINTS: i64 = 3000;

/// One timestamped set of numeric channels.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    /// Timestamp in milliseconds.
    pub timestamp: i64,
    /// Channel values.
    pub fields: BTreeMap<String, f64>,
}

impl SeriesPoint {
    /// Create a point with no channels.
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            fields: BTreeMap::new(),
        }
    }

    /// Add a channel value.
    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Read a point from a JSON object.
    ///
    /// Requires an integral numeric `timestamp`. Non-numeric channels are
    /// ignored.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let timestamp = obj.get(TIMESTAMP_KEY).and_then(integral)?;

        let fields = obj
            .iter()
            .filter(|(key, _)| key.as_str() != TIMESTAMP_KEY)
            .filter_map(|(key, v)| v.as_f64().map(|n| (key.clone(), n)))
            .collect();

        Some(Self { timestamp, fields })
    }
}

fn integral(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|n| n.is_finite() && n.fract() == 0.0)
            .map(|n| n as i64)
    })
}

/// What a merge changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Rows created for timestamps not seen before.
    pub inserted: usize,
    /// Existing rows that received channel values.
    pub updated: usize,
    /// Rows dropped to respect the cap.
    pub evicted: usize,
}

impl MergeOutcome {
    /// Whether the buffer was touched at all.
    pub fn changed(&self) -> bool {
        self.inserted + self.updated + self.evicted > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Latest {
    timestamp: i64,
    value: f64,
}

/// Rows keyed by timestamp, ascending, plus the latest-values projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesBuffer {
    rows: BTreeMap<i64, BTreeMap<String, f64>>,
    latest: BTreeMap<String, Latest>,
}

impl SeriesBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `incoming` into the buffer, then evict down to `max_points`.
    ///
    /// Points sharing a timestamp with an existing row overwrite only the
    /// channels they carry. `max_points <= 0` disables eviction.
    pub fn merge(&mut self, incoming: &[SeriesPoint], max_points: i64) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        for point in incoming {
            match self.rows.get_mut(&point.timestamp) {
                Some(row) => {
                    row.extend(point.fields.iter().map(|(k, v)| (k.clone(), *v)));
                    outcome.updated += 1;
                }
                None => {
                    self.rows.insert(point.timestamp, point.fields.clone());
                    outcome.inserted += 1;
                }
            }

            for (key, value) in &point.fields {
                let newer = self
                    .latest
                    .get(key)
                    .map_or(true, |held| point.timestamp >= held.timestamp);
                if newer {
                    self.latest.insert(
                        key.clone(),
                        Latest {
                            timestamp: point.timestamp,
                            value: *value,
                        },
                    );
                }
            }
        }

        if max_points > 0 {
            let cap = max_points as usize;
            while self.rows.len() > cap {
                self.rows.pop_first();
                outcome.evicted += 1;
            }
        }

        outcome
    }

    /// Merge a raw JSON batch.
    ///
    /// A non-array or empty value is a no-op. Elements that are not valid
    /// points are skipped.
    pub fn merge_value(&mut self, incoming: &Value, max_points: i64) -> MergeOutcome {
        let Some(items) = incoming.as_array() else {
            return MergeOutcome::default();
        };
        let points: Vec<SeriesPoint> = items.iter().filter_map(SeriesPoint::from_value).collect();
        if points.is_empty() {
            return MergeOutcome::default();
        }
        self.merge(&points, max_points)
    }

    /// Rows in ascending timestamp order.
    pub fn rows(&self) -> impl Iterator<Item = (i64, &BTreeMap<String, f64>)> + '_ {
        self.rows.iter().map(|(ts, row)| (*ts, row))
    }

    /// The row at `timestamp`.
    pub fn row(&self, timestamp: i64) -> Option<&BTreeMap<String, f64>> {
        self.rows.get(&timestamp)
    }

    /// Timestamps in ascending order.
    pub fn timestamps(&self) -> Vec<i64> {
        self.rows.keys().copied().collect()
    }

    /// Rows as chart-ready objects, the timestamp stored under `x_axis`.
    pub fn to_chart_rows(&self, x_axis: &str) -> Vec<Value> {
        self.rows
            .iter()
            .map(|(ts, row)| {
                let mut obj = Map::new();
                obj.insert(x_axis.to_string(), Value::from(*ts));
                for (key, value) in row {
                    obj.insert(key.clone(), Value::from(*value));
                }
                Value::Object(obj)
            })
            .collect()
    }

    /// Latest value per channel, sorted by channel key.
    pub fn latest(&self) -> BTreeMap<String, f64> {
        self.latest
            .iter()
            .map(|(key, held)| (key.clone(), held.value))
            .collect()
    }

    /// Latest value of one channel.
    pub fn latest_value(&self, key: &str) -> Option<f64> {
        self.latest.get(key).map(|held| held.value)
    }

    /// Every channel key ever merged, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.latest.keys().map(String::as_str)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the buffer holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Value-style merge: consumes `buffer` and returns the merged result.
pub fn merge(mut buffer: SeriesBuffer, incoming: &[SeriesPoint], max_points: i64) -> SeriesBuffer {
    buffer.merge(incoming, max_points);
    buffer
}

/// Series buffers for every series field, keyed by field name.
///
/// Buffers are created on first merge and live as long as the store.
#[derive(Debug, Default)]
pub struct SeriesStore {
    buffers: DashMap<String, SeriesBuffer>,
}

impl SeriesStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge points into the buffer for `field`.
    pub fn merge(&self, field: &str, incoming: &[SeriesPoint], max_points: i64) -> MergeOutcome {
        self.buffers
            .entry(field.to_string())
            .or_default()
            .merge(incoming, max_points)
    }

    /// Merge a raw JSON batch into the buffer for `field`.
    ///
    /// No buffer is created for a batch that carries no points.
    pub fn merge_value(&self, field: &str, incoming: &Value, max_points: i64) -> MergeOutcome {
        let has_points = incoming
            .as_array()
            .is_some_and(|items| items.iter().any(|v| SeriesPoint::from_value(v).is_some()));
        if !has_points {
            return MergeOutcome::default();
        }
        self.buffers
            .entry(field.to_string())
            .or_default()
            .merge_value(incoming, max_points)
    }

    /// Copy of the buffer for `field`.
    pub fn get(&self, field: &str) -> Option<SeriesBuffer> {
        self.buffers.get(field).map(|b| b.clone())
    }

    /// Run `f` against the buffer for `field` without cloning it.
    pub fn with<R>(&self, field: &str, f: impl FnOnce(&SeriesBuffer) -> R) -> Option<R> {
        self.buffers.get(field).map(|b| f(&b))
    }

    /// Names of fields with a buffer.
    pub fn fields(&self) -> Vec<String> {
        let mut names: Vec<String> = self.buffers.iter().map(|e| e.key().clone()).collect();
        names.sort_unstable();
        names
    }
}

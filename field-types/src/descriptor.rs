//! Typed field descriptors produced by the option decoder.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::FieldKind;

/// X axis key used when an encoding does not name one.
pub const DEFAULT_X_AXIS: &str = "timestamp";

/// A decoded field.
///
/// Built fresh from `(name, raw_encoding)` on every fetch of the field
/// collection; never mutated afterwards. Two descriptors decoded from the
/// same pair compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field name as it appears in the collection and in push payloads.
    pub name: String,
    /// Human-facing label derived from the name.
    pub label: String,
    /// Semantic kind resolved from the encoding.
    pub kind: FieldKind,
    /// `r` flag present (and not overridden by a later `rw`).
    pub read_only: bool,
    /// `mn=` lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// `mx=` upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// `st=` step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    /// `f=` display format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// `pl=` placeholder text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// `options=` choices, in wire order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    /// Chart settings; present only for [`FieldKind::Series`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<SeriesOptions>,
    /// The encoding string this descriptor was decoded from.
    pub raw_encoding: String,
}

impl FieldDescriptor {
    /// Cap for this field's series buffer, if the encoding sets one.
    pub fn max_points(&self) -> Option<i64> {
        self.series.as_ref().and_then(|s| s.max_points)
    }
}

/// Settings recognised for series fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesOptions {
    /// Row key plotted on the X axis.
    pub x_axis: String,
    /// Chart style.
    pub mode: ChartMode,
    /// Per-channel line settings from `lines=`.
    pub lines: Vec<LineSpec>,
    /// Show a legend.
    pub legend: bool,
    /// Show a tooltip.
    pub tooltip: bool,
    /// Row cap; `<= 0` means no cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_points: Option<i64>,
    /// Opaque `to=` option, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl Default for SeriesOptions {
    fn default() -> Self {
        Self {
            x_axis: DEFAULT_X_AXIS.to_string(),
            mode: ChartMode::Line,
            lines: Vec::new(),
            legend: false,
            tooltip: false,
            max_points: None,
            to: None,
        }
    }
}

/// One entry of a `lines=` option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSpec {
    /// Channel key inside series rows.
    pub data_key: String,
    /// CSS colour.
    pub color: String,
    /// Curve interpolation name (`monotone`, `step`, ...).
    pub curve: String,
    /// Hidden until toggled on.
    pub hidden: bool,
}

/// Chart style named by `mode=`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChartMode {
    /// `lineChart`: full series.
    Line,
    /// `barChart`: latest values only.
    Bar,
    /// `pieChart`: latest values only.
    Pie,
    /// Anything else, kept verbatim.
    Other(String),
}

impl ChartMode {
    /// Wire spelling.
    pub fn as_str(&self) -> &str {
        match self {
            ChartMode::Line => "lineChart",
            ChartMode::Bar => "barChart",
            ChartMode::Pie => "pieChart",
            ChartMode::Other(s) => s,
        }
    }

    /// Whether the chart renders only the latest-values projection.
    pub fn is_snapshot(&self) -> bool {
        matches!(self, ChartMode::Bar | ChartMode::Pie)
    }
}

impl From<&str> for ChartMode {
    fn from(s: &str) -> Self {
        match s {
            "lineChart" => ChartMode::Line,
            "barChart" => ChartMode::Bar,
            "pieChart" => ChartMode::Pie,
            other => ChartMode::Other(other.to_string()),
        }
    }
}

impl From<String> for ChartMode {
    fn from(s: String) -> Self {
        ChartMode::from(s.as_str())
    }
}

impl From<ChartMode> for String {
    fn from(mode: ChartMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for ChartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_mode_parses_known_and_keeps_unknown() {
        assert_eq!(ChartMode::from("barChart"), ChartMode::Bar);
        assert_eq!(
            ChartMode::from("radar"),
            ChartMode::Other("radar".to_string())
        );
        assert_eq!(ChartMode::from("radar").as_str(), "radar");
        assert!(ChartMode::Pie.is_snapshot());
        assert!(!ChartMode::Line.is_snapshot());
    }

    #[test]
    fn descriptor_skips_absent_options_in_json() {
        let desc = FieldDescriptor {
            name: "ssid".into(),
            label: "Ssid".into(),
            kind: FieldKind::Text,
            read_only: false,
            min: None,
            max: None,
            step: None,
            format: None,
            placeholder: None,
            options: None,
            series: None,
            raw_encoding: String::new(),
        };
        let json = serde_json::to_value(&desc).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("min"));
        assert!(!obj.contains_key("series"));
        assert_eq!(obj["kind"], "text");
    }

    #[test]
    fn series_defaults() {
        let opts = SeriesOptions::default();
        assert_eq!(opts.x_axis, DEFAULT_X_AXIS);
        assert_eq!(opts.mode, ChartMode::Line);
        assert!(opts.lines.is_empty());
    }
}

//! `lines=` option parsing and per-channel line resolution.
//!
//! A `lines=` value lists channel settings separated by `;`:
//!
//! ```text
//! key19:color=#123456,type=step;key20:hidden=true,color=#abc123
//! ```
//!
//! Unset colours come from a fixed palette indexed by position.

use field_types::LineSpec;

/// Colours handed out to channels without an explicit `color=`.
pub const PALETTE: [&str; 21] = [
    "#8884d8", "#FF0000", "#FF00FF", "#00C49F", "#FFBB28", "#FF8042", "#8A2BE2", "#5F9EA0",
    "#D2691E", "#FF7F50", "#6495ED", "#DC143C", "#00FFFF", "#00008B", "#008B8B", "#B8860B",
    "#A9A9A9", "#006400", "#BDB76B", "#8B008B", "#556B2F",
];

/// Curve used when a line does not set `type=`.
pub const DEFAULT_CURVE: &str = "monotone";

/// Palette colour for the `index`-th channel.
pub fn palette_color(index: usize) -> &'static str {
    PALETTE[index % PALETTE.len()]
}

/// Parse a `lines=` value into line specs.
///
/// Entries with an empty channel key are dropped; palette indices still
/// count them so colours stay stable when the producer emits a blank slot.
pub fn parse_lines(value: &str) -> Vec<LineSpec> {
    if value.is_empty() {
        return Vec::new();
    }

    value
        .split(';')
        .enumerate()
        .filter_map(|(index, part)| {
            let mut pieces = part.split(':');
            let data_key = pieces.next().unwrap_or("").trim();
            if data_key.is_empty() {
                return None;
            }

            let mut spec = LineSpec {
                data_key: data_key.to_string(),
                color: palette_color(index).to_string(),
                curve: DEFAULT_CURVE.to_string(),
                hidden: false,
            };

            if let Some(params) = pieces.next() {
                for param in params.split(',') {
                    let mut kv = param.split('=');
                    let (Some(k), Some(v)) = (kv.next(), kv.next()) else {
                        continue;
                    };
                    if k.is_empty() || v.is_empty() {
                        continue;
                    }
                    match (k.trim(), v.trim()) {
                        ("hidden", "true") => spec.hidden = true,
                        ("color", color) => spec.color = color.to_string(),
                        ("type", curve) => spec.curve = curve.to_string(),
                        _ => {}
                    }
                }
            }

            Some(spec)
        })
        .collect()
}

/// Line settings for every channel actually present in a series.
///
/// Channels are returned sorted by key. Configured channels keep their
/// `lines=` settings; others get a palette colour by their sorted position.
pub fn resolve_lines<'a>(
    configured: &[LineSpec],
    keys: impl IntoIterator<Item = &'a str>,
) -> Vec<LineSpec> {
    let mut keys: Vec<&str> = keys.into_iter().collect();
    keys.sort_unstable();
    keys.dedup();

    keys.into_iter()
        .enumerate()
        .map(|(index, key)| {
            configured
                .iter()
                .find(|spec| spec.data_key == key)
                .cloned()
                .unwrap_or_else(|| LineSpec {
                    data_key: key.to_string(),
                    color: palette_color(index).to_string(),
                    curve: DEFAULT_CURVE.to_string(),
                    hidden: false,
                })
        })
        .collect()
}

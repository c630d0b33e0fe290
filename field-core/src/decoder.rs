//! Option string decoder.
//!
//! Turns a field name plus its terse `;`-separated encoding into a typed
//! [`FieldDescriptor`]. Decoding is total and pure: it never fails, and the
//! same `(name, encoding)` pair always yields an equal descriptor.
//!
//! # Grammar
//!
//! ```text
//! encoding := token (';' token)*
//! token    := kind-keyword | key | key '=' value
//! ```
//!
//! - The first token equal to a kind keyword fixes the kind (default `text`).
//! - A token is recognised only when it equals a known key or starts with
//!   `key=`. Each kind accepts a fixed subset of keys; anything else is
//!   dropped so older decoders tolerate newer producers.
//! - `lines=` values contain their own `;`. A following token that is not a
//!   known key and contains `:` continues the previous `lines=` value.

use field_types::{ChartMode, FieldDescriptor, FieldKind, SeriesOptions};

use crate::lines::parse_lines;

/// Option keys understood on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptionKey {
    ReadOnly,
    ReadWrite,
    Min,
    Max,
    Step,
    Format,
    Placeholder,
    Options,
    To,
    XAxis,
    Lines,
    Legend,
    Tooltip,
    MaxPoints,
    Mode,
}

/// Every known key, longest spelling first.
const KNOWN_KEYS: [OptionKey; 15] = [
    OptionKey::MaxPoints,
    OptionKey::Options,
    OptionKey::Tooltip,
    OptionKey::Legend,
    OptionKey::XAxis,
    OptionKey::Lines,
    OptionKey::Mode,
    OptionKey::ReadWrite,
    OptionKey::Placeholder,
    OptionKey::Min,
    OptionKey::Max,
    OptionKey::Step,
    OptionKey::To,
    OptionKey::ReadOnly,
    OptionKey::Format,
];

impl OptionKey {
    fn wire(self) -> &'static str {
        match self {
            OptionKey::ReadOnly => "r",
            OptionKey::ReadWrite => "rw",
            OptionKey::Min => "mn",
            OptionKey::Max => "mx",
            OptionKey::Step => "st",
            OptionKey::Format => "f",
            OptionKey::Placeholder => "pl",
            OptionKey::Options => "options",
            OptionKey::To => "to",
            OptionKey::XAxis => "xAxis",
            OptionKey::Lines => "lines",
            OptionKey::Legend => "legend",
            OptionKey::Tooltip => "tooltip",
            OptionKey::MaxPoints => "maxPoints",
            OptionKey::Mode => "mode",
        }
    }

    /// `token == key` or `token` starts with `key=`.
    fn matches(self, token: &str) -> bool {
        let key = self.wire();
        token == key
            || token
                .strip_prefix(key)
                .is_some_and(|rest| rest.starts_with('='))
    }

    /// Value portion of a token: after `key=`, else after `key`, else empty.
    fn value_of(self, token: &str) -> &str {
        let key = self.wire();
        match token.strip_prefix(key) {
            Some(rest) => rest.strip_prefix('=').unwrap_or(rest),
            None => "",
        }
    }
}

/// Keys each kind accepts.
fn allowed_keys(kind: FieldKind) -> &'static [OptionKey] {
    use OptionKey::*;
    match kind {
        FieldKind::Text
        | FieldKind::Checkbox
        | FieldKind::Button
        | FieldKind::Switch
        | FieldKind::Textarea => &[ReadOnly, ReadWrite, Placeholder],
        FieldKind::Number => &[ReadOnly, ReadWrite, Min, Max, Step, Format, Placeholder],
        FieldKind::Slider => &[ReadOnly, ReadWrite, Min, Max, Step, Placeholder],
        FieldKind::Dropdown | FieldKind::Radio => &[ReadOnly, ReadWrite, Options, Placeholder],
        FieldKind::Series => &[To, XAxis, Lines, Legend, Tooltip, MaxPoints, Mode],
    }
}

fn match_key(token: &str) -> Option<OptionKey> {
    KNOWN_KEYS.into_iter().find(|k| k.matches(token))
}

/// Decode a field's encoding string.
pub fn decode(name: &str, encoding: &str) -> FieldDescriptor {
    let tokens: Vec<&str> = encoding
        .split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    let kind = tokens
        .iter()
        .find_map(|t| FieldKind::from_keyword(t))
        .unwrap_or_default();

    let mut desc = FieldDescriptor {
        name: name.to_string(),
        label: readable_label(name),
        kind,
        read_only: false,
        min: None,
        max: None,
        step: None,
        format: None,
        placeholder: None,
        options: None,
        series: (kind == FieldKind::Series).then(SeriesOptions::default),
        raw_encoding: encoding.to_string(),
    };

    let allowed = allowed_keys(kind);
    for token in rejoin_lines(&tokens) {
        let Some(key) = match_key(&token) else {
            continue;
        };
        if !allowed.contains(&key) {
            continue;
        }
        apply(&mut desc, key, key.value_of(&token));
    }

    desc
}

/// Glue `lines=` continuation segments back onto their `lines=` token.
fn rejoin_lines(tokens: &[&str]) -> Vec<String> {
    let mut merged = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let mut token = tokens[i].to_string();
        if token.starts_with("lines=") {
            while let Some(next) = tokens.get(i + 1) {
                let known = KNOWN_KEYS.iter().any(|k| k.matches(next));
                if known || !next.contains(':') {
                    break;
                }
                token.push(';');
                token.push_str(next);
                i += 1;
            }
        }
        merged.push(token);
        i += 1;
    }
    merged
}

fn apply(desc: &mut FieldDescriptor, key: OptionKey, value: &str) {
    match key {
        OptionKey::ReadOnly => desc.read_only = true,
        OptionKey::ReadWrite => desc.read_only = false,
        OptionKey::Min => desc.min = parse_number(value),
        OptionKey::Max => desc.max = parse_number(value),
        OptionKey::Step => desc.step = parse_number(value),
        OptionKey::Format => desc.format = Some(value.trim().to_string()),
        OptionKey::Placeholder => desc.placeholder = Some(value.trim().to_string()),
        OptionKey::Options => desc.options = Some(parse_list(value)),
        _ => {
            // Remaining keys are series-only and the whitelist guarantees a series kind.
            if let Some(series) = desc.series.as_mut() {
                apply_series(series, key, value);
            }
        }
    }
}

fn apply_series(series: &mut SeriesOptions, key: OptionKey, value: &str) {
    match key {
        OptionKey::To => series.to = Some(value.to_string()),
        OptionKey::XAxis => {
            let value = value.trim();
            if !value.is_empty() {
                series.x_axis = value.to_string();
            }
        }
        OptionKey::Lines => series.lines = parse_lines(value),
        OptionKey::Legend => series.legend = parse_flag(value),
        OptionKey::Tooltip => series.tooltip = parse_flag(value),
        OptionKey::MaxPoints => series.max_points = parse_int(value),
        OptionKey::Mode => {
            let value = value.trim();
            series.mode = if value.is_empty() {
                ChartMode::Line
            } else {
                ChartMode::from(value)
            };
        }
        _ => {}
    }
}

/// Human-facing label: `_` becomes space, each word's first letter upper-cased.
pub fn readable_label(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut word_start = true;
    for ch in name.chars() {
        let ch = if ch == '_' { ' ' } else { ch };
        if ch.is_whitespace() {
            word_start = true;
            out.push(ch);
        } else if word_start {
            word_start = false;
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// `A, B,,C` -> `["A", "B", "C"]`.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Bare flags and `=true` are on; only an explicit `=false` turns one off.
fn parse_flag(value: &str) -> bool {
    value.trim() != "false"
}

/// Locale-tolerant float: leading numeric prefix, `,` accepted as decimal
/// separator. Non-finite or unparseable values are absent.
pub fn parse_number(value: &str) -> Option<f64> {
    let value = value.trim();
    let normalized;
    let value = if value.contains(',') && !value.contains('.') {
        normalized = value.replacen(',', ".", 1);
        normalized.as_str()
    } else {
        value
    };

    let prefix = numeric_prefix(value);
    if prefix.is_empty() {
        return None;
    }
    prefix.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Longest prefix shaped like `[+-]digits[.digits][e[+-]digits]`.
fn numeric_prefix(s: &str) -> &str {
    let bytes = s.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        i += 1;
    }
    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - int_start;
    if i < bytes.len() && bytes[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if digits > 0 || j > frac_start {
            digits += j - frac_start;
            i = j;
        }
    }
    if digits == 0 {
        return "";
    }
    if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+') | Some(b'-')) {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    &s[..i]
}

/// Integer prefix, base 10.
fn parse_int(value: &str) -> Option<i64> {
    let value = value.trim();
    let bytes = value.as_bytes();
    let mut end = usize::from(matches!(bytes.first(), Some(b'+') | Some(b'-')));
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return None;
    }
    value[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use field_types::LineSpec;

    // ===========================================
    // Kind Resolution
    // ===========================================

    #[test]
    fn empty_encoding_is_plain_text() {
        let desc = decode("x", "");
        assert_eq!(desc.kind, FieldKind::Text);
        assert!(desc.options.is_none());
        assert!(desc.series.is_none());
        assert!(!desc.read_only);
    }

    #[test]
    fn unknown_kind_keyword_defaults_to_text() {
        assert_eq!(decode("x", "hologram;r").kind, FieldKind::Text);
    }

    #[test]
    fn first_kind_keyword_wins() {
        assert_eq!(decode("x", "rw;slider;number").kind, FieldKind::Slider);
    }

    #[test]
    fn trend_keyword_is_series_kind() {
        let desc = decode("power", "trend");
        assert_eq!(desc.kind, FieldKind::Series);
        let series = desc.series.unwrap();
        assert_eq!(series.x_axis, "timestamp");
        assert_eq!(series.mode, ChartMode::Line);
    }

    // ===========================================
    // Whitelist Enforcement
    // ===========================================

    #[test]
    fn number_ignores_options_list() {
        let desc = decode("x", "number;options=A,B");
        assert_eq!(desc.kind, FieldKind::Number);
        assert!(desc.options.is_none());
    }

    #[test]
    fn text_ignores_numeric_bounds() {
        let desc = decode("x", "text;mn=1;mx=2;st=1");
        assert_eq!((desc.min, desc.max, desc.step), (None, None, None));
    }

    #[test]
    fn series_ignores_read_only_flag() {
        assert!(!decode("x", "trend;r").read_only);
    }

    #[test]
    fn unknown_tokens_are_dropped() {
        let desc = decode("x", "number;zz=9;mn=1;glow");
        assert_eq!(desc.min, Some(1.0));
    }

    // ===========================================
    // Value Extraction
    // ===========================================

    #[test]
    fn numeric_bounds_and_step() {
        let desc = decode("level", "slider;rw;mn=0;mx=100.5;st=0,5");
        assert_eq!(desc.min, Some(0.0));
        assert_eq!(desc.max, Some(100.5));
        assert_eq!(desc.step, Some(0.5));
    }

    #[test]
    fn unparseable_number_is_absent_not_zero() {
        let desc = decode("x", "number;mn=abc;mx=;st");
        assert_eq!(desc.min, None);
        assert_eq!(desc.max, None);
        assert_eq!(desc.step, None);
    }

    #[test]
    fn read_flags_last_one_wins() {
        assert!(decode("x", "text;r").read_only);
        assert!(!decode("x", "text;r;rw").read_only);
        assert!(decode("x", "text;rw;r").read_only);
    }

    #[test]
    fn placeholder_is_trimmed() {
        let desc = decode("x", "text;pl=  type here ");
        assert_eq!(desc.placeholder.as_deref(), Some("type here"));
    }

    #[test]
    fn placeholder_without_equals_is_not_recognised() {
        assert!(decode("x", "text;plHint").placeholder.is_none());
    }

    #[test]
    fn options_list_is_trimmed_and_compacted() {
        let desc = decode("mode", "dropdown;options= Off, ,Eco,Boost,");
        assert_eq!(
            desc.options.unwrap(),
            vec!["Off".to_string(), "Eco".into(), "Boost".into()]
        );
    }

    #[test]
    fn number_format_is_text() {
        assert_eq!(decode("x", "number;f=%.2f").format.as_deref(), Some("%.2f"));
    }

    #[test]
    fn explicit_false_turns_series_flags_off() {
        let series = decode("p", "trend;legend=false;tooltip=false").series.unwrap();
        assert!(!series.legend);
        assert!(!series.tooltip);
        let series = decode("p", "trend;legend;tooltip=true").series.unwrap();
        assert!(series.legend);
        assert!(series.tooltip);
    }

    #[test]
    fn series_options_are_decoded() {
        let desc = decode(
            "energy",
            "trend;rw;mode=barChart;xAxis=keys;legend=true;tooltip;maxPoints=120;to=5s",
        );
        let series = desc.series.unwrap();
        assert_eq!(series.mode, ChartMode::Bar);
        assert_eq!(series.x_axis, "keys");
        assert!(series.legend);
        assert!(series.tooltip);
        assert_eq!(series.max_points, Some(120));
        assert_eq!(series.to.as_deref(), Some("5s"));
    }

    #[test]
    fn max_points_takes_integer_prefix() {
        let series = decode("x", "trend;maxPoints=50.9").series.unwrap();
        assert_eq!(series.max_points, Some(50));
        let series = decode("x", "trend;maxPoints=lots").series.unwrap();
        assert_eq!(series.max_points, None);
    }

    // ===========================================
    // lines= Continuation
    // ===========================================

    fn line(key: &str, color: &str) -> LineSpec {
        LineSpec {
            data_key: key.into(),
            color: color.into(),
            curve: "monotone".into(),
            hidden: false,
        }
    }

    #[test]
    fn lines_continuation_segments_are_absorbed() {
        let series = decode("x", "trend;lines=k1:color=#fff;k2:color=#000")
            .series
            .unwrap();
        assert_eq!(series.lines, vec![line("k1", "#fff"), line("k2", "#000")]);
    }

    #[test]
    fn lines_continuation_survives_whitespace_and_trailing_options() {
        let a = decode("x", "trend;lines=k1:color=#fff;k2:color=#000").series;
        let b = decode("x", "trend; lines=k1:color=#fff ;k2:color=#000 ;maxPoints=5").series;
        assert_eq!(a.unwrap().lines, b.unwrap().lines);
    }

    #[test]
    fn known_key_stops_continuation() {
        // `mode=a:b` starts with a known key, so it is not absorbed.
        let series = decode("x", "trend;lines=k1:color=#fff;mode=a:b;k2:color=#000")
            .series
            .unwrap();
        assert_eq!(series.lines, vec![line("k1", "#fff")]);
        assert_eq!(series.mode, ChartMode::Other("a:b".into()));
    }

    #[test]
    fn segment_without_colon_stops_continuation() {
        let series = decode("x", "trend;lines=k1:color=#fff;stray;k2:color=#000")
            .series
            .unwrap();
        assert_eq!(series.lines.len(), 1);
    }

    // ===========================================
    // Label and Determinism
    // ===========================================

    #[test]
    fn readable_label_capitalizes_words() {
        assert_eq!(readable_label("led_on_time"), "Led On Time");
        assert_eq!(readable_label("_lead"), " Lead");
        assert_eq!(readable_label("mixedCase name"), "MixedCase Name");
    }

    #[test]
    fn decoding_is_deterministic() {
        let encodings = [
            "",
            "number;rw;mn=0;mx=10",
            "trend;lines=a:color=red,type=step;b:hidden=true;maxPoints=3",
            "radio;options=x,y;r",
        ];
        for enc in encodings {
            assert_eq!(decode("f", enc), decode("f", enc));
        }
    }

    #[test]
    fn raw_encoding_is_kept_verbatim() {
        let desc = decode("x", " number ; mn=1 ");
        assert_eq!(desc.raw_encoding, " number ; mn=1 ");
    }

    // ===========================================
    // Number Parsing
    // ===========================================

    #[test]
    fn number_parsing_is_prefix_based() {
        assert_eq!(parse_number("10.00"), Some(10.0));
        assert_eq!(parse_number("12abc"), Some(12.0));
        assert_eq!(parse_number("-3,25"), Some(-3.25));
        assert_eq!(parse_number(".5"), Some(0.5));
        assert_eq!(parse_number("1e3"), Some(1000.0));
        assert_eq!(parse_number("1e"), Some(1.0));
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("."), None);
        assert_eq!(parse_number("Infinity"), None);
        assert_eq!(parse_number("1e999"), None);
    }
}

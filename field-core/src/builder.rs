//! Encoding string builder.
//!
//! Produces encodings in the device's token order, e.g.
//! `number;rw;mn=0;mx=100` or
//! `trend;rw;mode=lineChart;xAxis=timestamp;lines=a:color=#f00,type=step;legend=true`.

use field_types::{ChartMode, FieldKind, LineSpec};
use std::fmt;

/// Builds an encoding string token by token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingBuilder {
    tokens: Vec<String>,
}

impl EncodingBuilder {
    /// Start an encoding for `kind`, read-write.
    pub fn new(kind: FieldKind) -> Self {
        Self {
            tokens: vec![kind.keyword().to_string(), "rw".to_string()],
        }
    }

    /// Mark the field read-only.
    pub fn read_only(mut self) -> Self {
        if let Some(flag) = self.tokens.get_mut(1) {
            *flag = "r".to_string();
        }
        self
    }

    fn push(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.tokens.push(format!("{key}={value}"));
        self
    }

    /// `mn=`
    pub fn min(self, value: f64) -> Self {
        self.push("mn", value)
    }

    /// `mx=`
    pub fn max(self, value: f64) -> Self {
        self.push("mx", value)
    }

    /// `st=`
    pub fn step(self, value: f64) -> Self {
        self.push("st", value)
    }

    /// `f=`
    pub fn format(self, value: &str) -> Self {
        self.push("f", value)
    }

    /// `pl=`
    pub fn placeholder(self, value: &str) -> Self {
        self.push("pl", value)
    }

    /// `options=a,b,c`; skipped when empty.
    pub fn options<S: AsRef<str>>(self, options: &[S]) -> Self {
        if options.is_empty() {
            return self;
        }
        let joined = options
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(",");
        self.push("options", joined)
    }

    /// `mode=`
    pub fn mode(self, mode: &ChartMode) -> Self {
        self.push("mode", mode.as_str())
    }

    /// `xAxis=`
    pub fn x_axis(self, key: &str) -> Self {
        self.push("xAxis", key)
    }

    /// `lines=key:params;key:params`; skipped when empty.
    pub fn lines(self, lines: &[LineSpec]) -> Self {
        if lines.is_empty() {
            return self;
        }
        let joined = lines.iter().map(line_token).collect::<Vec<_>>().join(";");
        self.push("lines", joined)
    }

    /// `legend=true`; nothing when false.
    pub fn legend(self, on: bool) -> Self {
        if on {
            self.push("legend", true)
        } else {
            self
        }
    }

    /// `tooltip=true`; nothing when false.
    pub fn tooltip(self, on: bool) -> Self {
        if on {
            self.push("tooltip", true)
        } else {
            self
        }
    }

    /// `maxPoints=`
    pub fn max_points(self, cap: i64) -> Self {
        self.push("maxPoints", cap)
    }

    /// `to=`
    pub fn to(self, value: &str) -> Self {
        self.push("to", value)
    }

    /// The encoding string.
    pub fn build(&self) -> String {
        self.tokens.join(";")
    }
}

fn line_token(line: &LineSpec) -> String {
    let mut params = Vec::with_capacity(3);
    if line.hidden {
        params.push("hidden=true".to_string());
    }
    params.push(format!("color={}", line.color));
    params.push(format!("type={}", line.curve));
    format!("{}:{}", line.data_key, params.join(","))
}

impl fmt::Display for EncodingBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build())
    }
}

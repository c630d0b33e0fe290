//! Closed vocabularies: field kinds and value sources.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The semantic type of a field.
///
/// Serialized with the wire keyword the device puts in the option string,
/// so [`FieldKind::Series`] travels as `"trend"`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Free text input (the default kind)
    #[default]
    Text,
    /// Numeric input
    Number,
    /// Numeric slider
    Slider,
    /// Boolean checkbox
    Checkbox,
    /// Momentary boolean button
    Button,
    /// Boolean toggle
    Switch,
    /// Single choice from a list
    Dropdown,
    /// Multi-line text
    Textarea,
    /// Single choice rendered as radio buttons
    Radio,
    /// Time series of numeric channels
    #[serde(rename = "trend")]
    Series,
}

impl FieldKind {
    /// Every kind, in wire declaration order.
    pub const ALL: [FieldKind; 10] = [
        FieldKind::Text,
        FieldKind::Number,
        FieldKind::Slider,
        FieldKind::Checkbox,
        FieldKind::Button,
        FieldKind::Switch,
        FieldKind::Dropdown,
        FieldKind::Textarea,
        FieldKind::Radio,
        FieldKind::Series,
    ];

    /// The keyword used for this kind inside an encoding string.
    pub fn keyword(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Slider => "slider",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Button => "button",
            FieldKind::Switch => "switch",
            FieldKind::Dropdown => "dropdown",
            FieldKind::Textarea => "textarea",
            FieldKind::Radio => "radio",
            FieldKind::Series => "trend",
        }
    }

    /// Look up a kind by its exact wire keyword.
    pub fn from_keyword(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.keyword() == token)
    }

    /// Kinds whose value is a boolean.
    pub fn is_boolean(self) -> bool {
        matches!(
            self,
            FieldKind::Checkbox | FieldKind::Switch | FieldKind::Button
        )
    }

    /// Kinds whose value is a single number.
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldKind::Number | FieldKind::Slider)
    }

    /// Kinds that choose from an `options=` list.
    pub fn is_choice(self) -> bool {
        matches!(self, FieldKind::Dropdown | FieldKind::Radio)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Which channel most recently asserted a field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Continuous push channel (device-reported or optimistic local echo).
    Push,
    /// Request/response channel (confirmed saves, initial fetch).
    Request,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Push => f.write_str("push"),
            Source::Request => f.write_str("request"),
        }
    }
}

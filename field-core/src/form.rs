//! Field set: a decoded field collection plus reconciled values.
//!
//! Built from a fetched [`FormData`]. Scalar values live in the
//! [`ReconciliationCache`]; series values live in the [`SeriesStore`]. The set
//! keeps a per-field view of the current value and collects local edits until
//! they are saved.

use field_types::{FieldDescriptor, FieldKind, FormData, Payload, RawField, Source};
use serde_json::Value;

use crate::cache::ReconciliationCache;
use crate::decoder::decode;
use crate::series::{SeriesStore, DEFAULT_MAX_POINTS};

/// One decoded field and its current value.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Decoded encoding.
    pub descriptor: FieldDescriptor,
    /// Current scalar value. Always `Null` for series fields; read their
    /// data from the [`SeriesStore`].
    pub value: Value,
}

impl Field {
    /// Field name.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Whether values for this field go to the series store.
    pub fn is_series(&self) -> bool {
        self.descriptor.kind == FieldKind::Series
    }
}

/// Counts from [`FieldSet::apply_push`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOutcome {
    /// Scalar writes the cache accepted.
    pub scalars: usize,
    /// Series fields whose buffer changed.
    pub series: usize,
}

/// Coerce an inbound value for a boolean-kind field.
///
/// `true`, non-zero numbers, `"1"` and `"true"` are true; anything else is
/// false.
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => {
            let s = s.trim();
            s == "1" || s.eq_ignore_ascii_case("true")
        }
        _ => false,
    }
}

/// Normalise a value for a field of `kind`.
pub fn coerce_value(kind: FieldKind, value: Value) -> Value {
    if kind.is_boolean() {
        Value::Bool(coerce_bool(&value))
    } else {
        value
    }
}

/// A decoded field collection.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSet {
    description: String,
    fields: Vec<Field>,
    edits: Payload,
    default_max_points: i64,
}

impl FieldSet {
    /// Decode a fetched form.
    pub fn from_form(form: &FormData, cache: &ReconciliationCache, series: &SeriesStore) -> Self {
        Self::from_form_capped(form, cache, series, DEFAULT_MAX_POINTS)
    }

    /// [`FieldSet::from_form`] with an explicit fallback row cap.
    pub fn from_form_capped(
        form: &FormData,
        cache: &ReconciliationCache,
        series: &SeriesStore,
        default_max_points: i64,
    ) -> Self {
        let mut set = Self::from_raw_capped(&form.fields, cache, series, default_max_points);
        set.description = form.description.clone();
        set
    }

    /// Decode raw field entries.
    ///
    /// Scalar fields take the cached value when the cache has one, else the
    /// fetched value. Series fields seed their buffer from the fetched value.
    pub fn from_raw(fields: &[RawField], cache: &ReconciliationCache, series: &SeriesStore) -> Self {
        Self::from_raw_capped(fields, cache, series, DEFAULT_MAX_POINTS)
    }

    /// [`FieldSet::from_raw`] with an explicit fallback row cap.
    pub fn from_raw_capped(
        fields: &[RawField],
        cache: &ReconciliationCache,
        series: &SeriesStore,
        default_max_points: i64,
    ) -> Self {
        let fields = fields
            .iter()
            .map(|raw| {
                let descriptor = decode(&raw.name, &raw.encoding);
                let value = if descriptor.kind == FieldKind::Series {
                    let cap = descriptor.max_points().unwrap_or(default_max_points);
                    series.merge_value(&raw.name, &raw.value, cap);
                    Value::Null
                } else {
                    let current = cache.get(&raw.name).unwrap_or_else(|| raw.value.clone());
                    coerce_value(descriptor.kind, current)
                };
                Field { descriptor, value }
            })
            .collect();

        Self {
            description: String::new(),
            fields,
            edits: Payload::new(),
            default_max_points,
        }
    }

    /// Form description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Fields in display order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Field by name.
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Current value by name.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).map(|f| &f.value)
    }

    /// Route a push payload.
    ///
    /// Each field is looked up in `payload`, falling back to
    /// `payload.status.fields`. Scalars are offered to the cache as
    /// push-sourced; the field then shows whatever the cache holds. Series
    /// batches merge into the store. Keys naming no field are ignored.
    pub fn apply_push(
        &mut self,
        payload: &Payload,
        cache: &ReconciliationCache,
        series: &SeriesStore,
    ) -> PushOutcome {
        let nested = payload
            .get("status")
            .and_then(|s| s.get("fields"))
            .and_then(Value::as_object);

        let mut outcome = PushOutcome::default();
        for field in &mut self.fields {
            let name = field.descriptor.name.as_str();
            let Some(incoming) = payload
                .get(name)
                .or_else(|| nested.and_then(|n| n.get(name)))
            else {
                continue;
            };

            if field.descriptor.kind == FieldKind::Series {
                let cap = field
                    .descriptor
                    .max_points()
                    .unwrap_or(self.default_max_points);
                if series.merge_value(name, incoming, cap).changed() {
                    outcome.series += 1;
                }
                continue;
            }

            let value = coerce_value(field.descriptor.kind, incoming.clone());
            if cache.put(name, value, Source::Push) {
                outcome.scalars += 1;
            }
            if let Some(current) = cache.get(name) {
                field.value = current;
            }
        }
        outcome
    }

    /// Pull reconciled values from the cache. Returns the names that changed.
    pub fn refresh(&mut self, cache: &ReconciliationCache) -> Vec<String> {
        let mut changed = Vec::new();
        for field in self.fields.iter_mut().filter(|f| !f.is_series()) {
            let Some(current) = cache.get(field.name()) else {
                continue;
            };
            let current = coerce_value(field.descriptor.kind, current);
            if current != field.value {
                field.value = current;
                changed.push(field.descriptor.name.clone());
            }
        }
        changed
    }

    /// Record a local edit. Returns the stored value, or `None` for unknown,
    /// read-only or series fields.
    pub fn edit(&mut self, name: &str, value: Value) -> Option<Value> {
        let field = self
            .fields
            .iter_mut()
            .find(|f| f.descriptor.name == name && !f.descriptor.read_only && !f.is_series())?;
        let value = coerce_value(field.descriptor.kind, value);
        field.value = value.clone();
        self.edits.insert(name.to_string(), value.clone());
        Some(value)
    }

    /// Whether edits are waiting to be saved.
    pub fn has_edits(&self) -> bool {
        !self.edits.is_empty()
    }

    /// Take the pending edits as a patch, in edit order.
    pub fn take_edits(&mut self) -> Payload {
        std::mem::take(&mut self.edits)
    }
}

//! Filter state + viewport -> minimal wire payload.
//!
//! Omitting inactive fields is part of the backend contract: a missing key
//! means "no constraint", while a present `false`/`0` is a real constraint.

use std::collections::BTreeMap;

use foundation::bounds::GeoBounds;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::schema::{FieldKind, FilterSchema};
use crate::store::FilterState;
use crate::value::FilterValue;

/// Wire form of the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl From<GeoBounds> for BoundingBox {
    fn from(b: GeoBounds) -> Self {
        Self {
            west: b.west,
            south: b.south,
            east: b.east,
            north: b.north,
        }
    }
}

/// Normalized search request.
///
/// Filters are flattened next to `bbox` when serialized. Keys are sorted, so
/// equal inputs serialize to identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPayload {
    pub bbox: BoundingBox,
    #[serde(flatten)]
    pub filters: BTreeMap<String, Value>,
}

impl QueryPayload {
    pub fn filter(&self, name: &str) -> Option<&Value> {
        self.filters.get(name)
    }
}

pub fn normalize(schema: &FilterSchema, state: &FilterState, viewport: GeoBounds) -> QueryPayload {
    let mut filters = BTreeMap::new();

    for spec in schema.fields() {
        let Some(value) = state.get(&spec.name) else {
            continue;
        };
        if spec.is_default(value) || value.is_empty() {
            continue;
        }
        if let Some(wire) = wire_value(&spec.kind, value) {
            filters.insert(spec.name.clone(), wire);
        }
    }

    QueryPayload {
        bbox: viewport.into(),
        filters,
    }
}

fn wire_value(kind: &FieldKind, value: &FilterValue) -> Option<Value> {
    match (kind, value) {
        (FieldKind::Multi { .. }, FilterValue::Multi(ids)) => Some(Value::Array(
            ids.iter().cloned().map(Value::String).collect(),
        )),
        (FieldKind::Toggle { .. }, FilterValue::Toggle(on)) => Some(Value::Bool(*on)),
        (FieldKind::Range { .. }, FilterValue::Range(range)) => {
            let mut bounds = Map::new();
            if !range.min.is_empty() {
                bounds.insert("min".to_string(), coerce_numeric(&range.min));
            }
            if !range.max.is_empty() {
                bounds.insert("max".to_string(), coerce_numeric(&range.max));
            }
            (!bounds.is_empty()).then_some(Value::Object(bounds))
        }
        (FieldKind::Text { .. }, FilterValue::Text(s)) => Some(coerce_numeric(s)),
        (FieldKind::Enum { .. }, FilterValue::Enum(Some(id))) => Some(coerce_numeric(id)),
        // Store rejects kind mismatches; nothing else reaches here.
        _ => None,
    }
}

/// A string that parses completely as a finite number becomes a JSON number.
pub fn coerce_numeric(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = raw.parse::<f64>()
        && let Some(n) = Number::from_f64(f)
    {
        return Value::Number(n);
    }
    Value::String(raw.to_string())
}

//! Wire types for the property search endpoint.
//!
//! - Request: `POST {base}/properties/filter` with a [`QueryPayload`] body
//!   (`bbox` plus one key per active filter).
//! - Success: `{ "count": n, "properties": [...] }`.
//! - Failure: any non-2xx status; the body text is carried into the error.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub use filters::normalize::{BoundingBox, QueryPayload};

/// Path appended to the configured API base.
pub const FILTER_PATH: &str = "/properties/filter";

/// Backend property identifier. Some deployments send numbers, some strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyId {
    Num(i64),
    Str(String),
}

impl std::fmt::Display for PropertyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyId::Num(n) => write!(f, "{n}"),
            PropertyId::Str(s) => f.write_str(s),
        }
    }
}

/// One property returned by the search.
///
/// Only `id` is interpreted by the core; everything else is passed through to
/// the presentation layer untouched. Decoding is lenient: a record with a
/// missing or unusable id, or oddly typed coordinates, still decodes so one
/// bad row never costs the whole response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    #[serde(default, deserialize_with = "lenient_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<PropertyId>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "lenient_coord", skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_coord", skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl PropertyRecord {
    pub fn new(id: PropertyId) -> Self {
        Self {
            id: Some(id),
            address: None,
            latitude: None,
            longitude: None,
            attributes: Map::new(),
        }
    }
}

/// Integers and strings are ids; null, fractions and anything else are not.
fn lenient_id<'de, D: Deserializer<'de>>(de: D) -> Result<Option<PropertyId>, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Number(n) => n.as_i64().map(PropertyId::Num),
        Value::String(s) if !s.is_empty() => Some(PropertyId::Str(s)),
        _ => None,
    })
}

fn lenient_text<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Accepts numbers and numeric strings such as `"30.27"`.
fn lenient_coord<'de, D: Deserializer<'de>>(de: D) -> Result<Option<f64>, D::Error> {
    let v = match Value::deserialize(de)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(v.filter(|v| v.is_finite()))
}

/// Count and records from a single server response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub count: u64,
    #[serde(default)]
    pub properties: Vec<PropertyRecord>,
}

impl QueryResult {
    /// Ids of the records that carry one, in response order.
    pub fn property_ids(&self) -> Vec<PropertyId> {
        self.properties.iter().filter_map(|p| p.id.clone()).collect()
    }
}

use std::env;
use std::time::Duration;

use filters::schema::{FieldKind, FilterSchema};
use filters::value::{FilterValue, RangeValue};
use foundation::bounds::GeoBounds;
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8787/api";
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("bbox must be `west,south,east,north` with valid coordinates, got `{0}`")]
    InvalidBbox(String),

    #[error("expected `name=value`, got `{0}`")]
    MalformedEdit(String),

    #[error("unknown filter field `{0}`")]
    UnknownField(String),

    #[error("invalid value `{value}` for filter `{field}`: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerConfig {
    pub api_base: String,
    pub debounce: Duration,
    pub request_timeout: Duration,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl ExplorerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Unset or unparsable variables fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api_base: lookup("EXPLORER_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            debounce: Duration::from_millis(var_u64(
                &lookup,
                "EXPLORER_DEBOUNCE_MS",
                DEFAULT_DEBOUNCE_MS,
            )),
            request_timeout: Duration::from_millis(var_u64(
                &lookup,
                "EXPLORER_REQUEST_TIMEOUT_MS",
                DEFAULT_TIMEOUT_MS,
            )),
        }
    }

    /// Command-line flags win over the environment.
    pub fn with_overrides(
        mut self,
        api_base: Option<String>,
        debounce_ms: Option<u64>,
        timeout_ms: Option<u64>,
    ) -> Self {
        if let Some(base) = api_base {
            self.api_base = base;
        }
        if let Some(ms) = debounce_ms {
            self.debounce = Duration::from_millis(ms);
        }
        if let Some(ms) = timeout_ms {
            self.request_timeout = Duration::from_millis(ms);
        }
        self
    }
}

fn var_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

pub fn parse_bbox(raw: &str) -> Result<GeoBounds, ConfigError> {
    GeoBounds::parse_csv(raw).ok_or_else(|| ConfigError::InvalidBbox(raw.to_string()))
}

fn split_edit(raw: &str) -> Result<(&str, &str), ConfigError> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value.trim())),
        _ => Err(ConfigError::MalformedEdit(raw.to_string())),
    }
}

/// Parse `--filter name=value` against the field's declared kind.
///
/// Multi-selects take comma-separated ids, ranges take `min..max` with
/// either side optional, toggles take `true`/`false`.
pub fn parse_filter(schema: &FilterSchema, raw: &str) -> Result<(String, FilterValue), ConfigError> {
    let (name, value) = split_edit(raw)?;
    let spec = schema
        .field(name)
        .ok_or_else(|| ConfigError::UnknownField(name.to_string()))?;
    let invalid = |reason| ConfigError::InvalidValue {
        field: name.to_string(),
        value: value.to_string(),
        reason,
    };

    let parsed = match &spec.kind {
        FieldKind::Multi { .. } => FilterValue::multi(
            value
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty()),
        ),
        FieldKind::Range { .. } => {
            let (min, max) = value
                .split_once("..")
                .ok_or_else(|| invalid("expected `min..max`"))?;
            FilterValue::Range(RangeValue::new(min.trim(), max.trim()))
        }
        FieldKind::Toggle { .. } => match value {
            "true" | "yes" | "1" => FilterValue::Toggle(true),
            "false" | "no" | "0" => FilterValue::Toggle(false),
            _ => return Err(invalid("expected `true` or `false`")),
        },
        FieldKind::Text { .. } => FilterValue::text(value),
        FieldKind::Enum { .. } if value.is_empty() => FilterValue::Enum(None),
        FieldKind::Enum { options, .. } => {
            if !options.iter().any(|o| o.id == value) {
                return Err(invalid("not one of the declared options"));
            }
            FilterValue::choice(value)
        }
    };
    Ok((name.to_string(), parsed))
}

/// Parse `--toggle name=id`.
pub fn parse_toggle(schema: &FilterSchema, raw: &str) -> Result<(String, String), ConfigError> {
    let (name, id) = split_edit(raw)?;
    let spec = schema
        .field(name)
        .ok_or_else(|| ConfigError::UnknownField(name.to_string()))?;
    if !matches!(spec.kind, FieldKind::Multi { .. }) {
        return Err(ConfigError::InvalidValue {
            field: name.to_string(),
            value: id.to_string(),
            reason: "only multi-select fields can be toggled",
        });
    }
    Ok((name.to_string(), id.to_string()))
}

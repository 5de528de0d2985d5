use serde::{Deserialize, Serialize};

/// The kind of a filter field, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Multi,
    Range,
    Toggle,
    Text,
    Enum,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueKind::Multi => "multi-select",
            ValueKind::Range => "range",
            ValueKind::Toggle => "toggle",
            ValueKind::Text => "text",
            ValueKind::Enum => "single-select",
        };
        f.write_str(name)
    }
}

/// Two raw form bounds. An empty string means "unbounded".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeValue {
    #[serde(default)]
    pub min: String,
    #[serde(default)]
    pub max: String,
}

impl RangeValue {
    pub fn new(min: impl Into<String>, max: impl Into<String>) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
        }
    }

    pub fn min(min: impl Into<String>) -> Self {
        Self::new(min, "")
    }

    pub fn max(max: impl Into<String>) -> Self {
        Self::new("", max)
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_empty() && self.max.is_empty()
    }
}

/// Current value of one filter field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FilterValue {
    /// Selected option ids, in the order they were selected.
    Multi(Vec<String>),
    Range(RangeValue),
    Toggle(bool),
    Text(String),
    Enum(Option<String>),
}

impl FilterValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            FilterValue::Multi(_) => ValueKind::Multi,
            FilterValue::Range(_) => ValueKind::Range,
            FilterValue::Toggle(_) => ValueKind::Toggle,
            FilterValue::Text(_) => ValueKind::Text,
            FilterValue::Enum(_) => ValueKind::Enum,
        }
    }

    pub fn multi<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for id in ids {
            let id = id.into();
            if !out.contains(&id) {
                out.push(id);
            }
        }
        FilterValue::Multi(out)
    }

    pub fn text(s: impl Into<String>) -> Self {
        FilterValue::Text(s.into())
    }

    pub fn choice(id: impl Into<String>) -> Self {
        FilterValue::Enum(Some(id.into()))
    }

    /// Holds nothing a query could constrain on.
    pub fn is_empty(&self) -> bool {
        match self {
            FilterValue::Multi(ids) => ids.is_empty(),
            FilterValue::Range(r) => r.is_empty(),
            FilterValue::Toggle(_) => false,
            FilterValue::Text(s) => s.is_empty(),
            FilterValue::Enum(v) => v.is_none(),
        }
    }
}

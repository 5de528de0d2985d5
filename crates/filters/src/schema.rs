//! Declared filter fields, their kinds and defaults.
//!
//! The schema is the single source of truth for "what does inactive mean":
//! a field is active exactly when its current value differs from the default
//! recorded here.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::SchemaError;
use crate::value::{FilterValue, RangeValue, ValueKind};

/// Field names that cannot be used because they share the request object.
const RESERVED_NAMES: &[&str] = &["bbox"];

/// Tab of the filter form a field is rendered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterTab {
    Property,
    Sale,
    Ownership,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOption {
    pub id: String,
    pub label: String,
}

impl FilterOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// Default is always the empty selection.
    Multi { options: Vec<FilterOption> },
    Range { default: RangeValue },
    Toggle { default: bool },
    Text { default: String },
    Enum {
        options: Vec<FilterOption>,
        default: Option<String>,
    },
}

impl FieldKind {
    pub fn value_kind(&self) -> ValueKind {
        match self {
            FieldKind::Multi { .. } => ValueKind::Multi,
            FieldKind::Range { .. } => ValueKind::Range,
            FieldKind::Toggle { .. } => ValueKind::Toggle,
            FieldKind::Text { .. } => ValueKind::Text,
            FieldKind::Enum { .. } => ValueKind::Enum,
        }
    }

    pub fn default_value(&self) -> FilterValue {
        match self {
            FieldKind::Multi { .. } => FilterValue::Multi(Vec::new()),
            FieldKind::Range { default } => FilterValue::Range(default.clone()),
            FieldKind::Toggle { default } => FilterValue::Toggle(*default),
            FieldKind::Text { default } => FilterValue::Text(default.clone()),
            FieldKind::Enum { default, .. } => FilterValue::Enum(default.clone()),
        }
    }

    pub fn options(&self) -> &[FilterOption] {
        match self {
            FieldKind::Multi { options } | FieldKind::Enum { options, .. } => options,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    pub tab: FilterTab,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        tab: FilterTab,
        kind: FieldKind,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            tab,
            kind,
        }
    }

    pub fn multi(name: &str, label: &str, tab: FilterTab, options: &[(&str, &str)]) -> Self {
        Self::new(
            name,
            label,
            tab,
            FieldKind::Multi {
                options: to_options(options),
            },
        )
    }

    pub fn range(name: &str, label: &str, tab: FilterTab) -> Self {
        Self::new(
            name,
            label,
            tab,
            FieldKind::Range {
                default: RangeValue::default(),
            },
        )
    }

    pub fn toggle(name: &str, label: &str, tab: FilterTab, default: bool) -> Self {
        Self::new(name, label, tab, FieldKind::Toggle { default })
    }

    pub fn text(name: &str, label: &str, tab: FilterTab) -> Self {
        Self::new(
            name,
            label,
            tab,
            FieldKind::Text {
                default: String::new(),
            },
        )
    }

    pub fn single(name: &str, label: &str, tab: FilterTab, options: &[(&str, &str)]) -> Self {
        Self::new(
            name,
            label,
            tab,
            FieldKind::Enum {
                options: to_options(options),
                default: None,
            },
        )
    }

    pub fn default_value(&self) -> FilterValue {
        self.kind.default_value()
    }

    pub fn is_default(&self, value: &FilterValue) -> bool {
        *value == self.default_value()
    }
}

fn to_options(options: &[(&str, &str)]) -> Vec<FilterOption> {
    options
        .iter()
        .map(|(id, label)| FilterOption::new(*id, *label))
        .collect()
}

/// Ordered set of declared filter fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterSchema {
    fields: Vec<FieldSpec>,
}

impl FilterSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        let mut seen = BTreeSet::new();
        for field in &fields {
            if RESERVED_NAMES.contains(&field.name.as_str()) {
                return Err(SchemaError::ReservedName(field.name.clone()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields_in(&self, tab: FilterTab) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(move |f| f.tab == tab)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Built-in schema for the commercial property explorer.
pub fn property_schema() -> FilterSchema {
    use FilterTab::*;

    let fields = vec![
        FieldSpec::multi(
            "assetClass",
            "Asset class",
            Property,
            &[
                ("retail", "Retail"),
                ("office", "Office"),
                ("industrial", "Industrial"),
                ("multifamily", "Multifamily"),
                ("hospitality", "Hospitality"),
                ("land", "Land"),
                ("mixed_use", "Mixed use"),
            ],
        ),
        FieldSpec::multi(
            "propertySubtype",
            "Subtype",
            Property,
            &[
                ("strip_center", "Strip center"),
                ("single_tenant", "Single tenant"),
                ("medical_office", "Medical office"),
                ("flex", "Flex"),
                ("warehouse", "Warehouse"),
                ("garden", "Garden apartments"),
                ("mid_rise", "Mid-rise"),
            ],
        ),
        FieldSpec::range("buildingSize", "Building size (sf)", Property),
        FieldSpec::range("lotSize", "Lot size (acres)", Property),
        FieldSpec::range("yearBuilt", "Year built", Property),
        FieldSpec::single(
            "zoning",
            "Zoning",
            Property,
            &[
                ("commercial", "Commercial"),
                ("industrial", "Industrial"),
                ("residential", "Residential"),
                ("mixed", "Mixed"),
            ],
        ),
        FieldSpec::range("salePrice", "Sale price", Sale),
        FieldSpec::range("saleDate", "Sale date", Sale),
        FieldSpec::range("capRate", "Cap rate (%)", Sale),
        FieldSpec::toggle("armsLengthOnly", "Arms-length sales only", Sale, true),
        FieldSpec::toggle("distressedOnly", "Distressed sales only", Sale, false),
        FieldSpec::text("ownerName", "Owner name", Ownership),
        FieldSpec::text("buyerName", "Buyer name", Ownership),
        FieldSpec::single(
            "ownerType",
            "Owner type",
            Ownership,
            &[
                ("individual", "Individual"),
                ("llc", "LLC"),
                ("reit", "REIT"),
                ("institutional", "Institutional"),
                ("government", "Government"),
            ],
        ),
    ];

    // Static table above has unique, unreserved names.
    FilterSchema { fields }
}

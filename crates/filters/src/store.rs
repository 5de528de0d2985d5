use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::InvalidFieldError;
use crate::schema::{FieldSpec, FilterSchema, FilterTab};
use crate::value::{FilterValue, ValueKind};

/// Snapshot of every declared field's current value.
///
/// Every schema field is always present; "no constraint" is expressed by the
/// field holding its default, never by a missing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FilterState {
    values: BTreeMap<String, FilterValue>,
}

impl FilterState {
    /// State with every field at its schema default.
    pub fn defaults(schema: &FilterSchema) -> Self {
        Self {
            values: schema
                .fields()
                .iter()
                .map(|f| (f.name.clone(), f.default_value()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FilterValue> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Holds the current filter values for one coordinator.
#[derive(Debug, Clone)]
pub struct FilterStore {
    schema: Arc<FilterSchema>,
    state: FilterState,
}

impl FilterStore {
    pub fn new(schema: Arc<FilterSchema>) -> Self {
        let state = FilterState::defaults(&schema);
        Self { schema, state }
    }

    pub fn schema(&self) -> &Arc<FilterSchema> {
        &self.schema
    }

    pub fn get(&self) -> &FilterState {
        &self.state
    }

    /// Replace one field's value.
    ///
    /// Returns whether the stored value changed.
    pub fn set_field(&mut self, name: &str, value: FilterValue) -> Result<bool, InvalidFieldError> {
        let spec = self.spec(name)?;
        let expected = spec.kind.value_kind();
        if value.kind() != expected {
            return Err(InvalidFieldError::KindMismatch {
                field: name.to_string(),
                expected,
                actual: value.kind(),
            });
        }
        let value = match value {
            FilterValue::Multi(ids) => FilterValue::multi(ids),
            other => other,
        };
        Ok(self.replace(name, value))
    }

    /// Add `id` to a multi-select field, or remove it if already selected.
    pub fn toggle_set_member(&mut self, name: &str, id: &str) -> Result<(), InvalidFieldError> {
        let spec = self.spec(name)?;
        let expected = spec.kind.value_kind();
        if expected != ValueKind::Multi {
            return Err(InvalidFieldError::KindMismatch {
                field: name.to_string(),
                expected,
                actual: ValueKind::Multi,
            });
        }

        if let Some(FilterValue::Multi(ids)) = self.state.values.get_mut(name) {
            if let Some(pos) = ids.iter().position(|existing| existing == id) {
                ids.remove(pos);
            } else {
                ids.push(id.to_string());
            }
        }
        Ok(())
    }

    /// Restore every field to its default. Returns whether anything changed.
    pub fn clear(&mut self) -> bool {
        let defaults = FilterState::defaults(&self.schema);
        let changed = defaults != self.state;
        self.state = defaults;
        changed
    }

    pub fn has_active_filters(&self) -> bool {
        self.active_fields().next().is_some()
    }

    pub fn is_field_active(&self, name: &str) -> Result<bool, InvalidFieldError> {
        let spec = self.spec(name)?;
        Ok(self
            .state
            .get(name)
            .is_some_and(|value| !spec.is_default(value)))
    }

    /// Number of fields that differ from their default.
    pub fn active_filter_count(&self) -> usize {
        self.active_fields().count()
    }

    pub fn active_filter_count_in(&self, tab: FilterTab) -> usize {
        self.active_fields().filter(|f| f.tab == tab).count()
    }

    fn active_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.schema.fields().iter().filter(|spec| {
            self.state
                .get(&spec.name)
                .is_some_and(|value| !spec.is_default(value))
        })
    }

    fn spec(&self, name: &str) -> Result<&FieldSpec, InvalidFieldError> {
        self.schema
            .field(name)
            .ok_or_else(|| InvalidFieldError::UnknownField(name.to_string()))
    }

    fn replace(&mut self, name: &str, value: FilterValue) -> bool {
        match self.state.values.get_mut(name) {
            Some(slot) if *slot == value => false,
            Some(slot) => {
                *slot = value;
                true
            }
            None => {
                self.state.values.insert(name.to_string(), value);
                true
            }
        }
    }
}

//! Objects - named, numbered property bags instantiating a class.

use crate::property::{Property, PropertyValue};
use crate::ident;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Class name reserved for engine-internal collections, whose values never
/// go through the generic property tables.
pub const INTERNAL_CLASS: &str = "internal";

/// A named, numbered instance of a class, holding concrete property values.
///
/// Identity is the triple (owning document full name, class name, slot
/// number); the numeric id is derived from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataObject {
    /// Full name of the owning document
    pub name: String,
    pub class_name: String,
    /// 0-based slot number within the owning document
    pub number: i32,
    fields: BTreeMap<String, Property>,
    #[serde(skip)]
    fields_to_remove: Vec<String>,
}

impl DataObject {
    pub fn new(class_name: impl Into<String>, name: impl Into<String>, number: i32) -> Self {
        Self {
            name: name.into(),
            class_name: class_name.into(),
            number,
            ..Default::default()
        }
    }

    pub fn id(&self) -> i64 {
        ident::object_id(&self.name, &self.class_name, self.number)
    }

    pub fn set_field(&mut self, property: Property) {
        self.fields.insert(property.name.clone(), property);
    }

    pub fn set_value(&mut self, name: impl Into<String>, value: PropertyValue) {
        let name = name.into();
        self.fields.insert(name.clone(), Property::new(name, value));
    }

    pub fn set_string(&mut self, name: &str, value: impl Into<String>) {
        self.set_value(name, PropertyValue::String(value.into()));
    }

    pub fn set_text(&mut self, name: &str, value: impl Into<String>) {
        self.set_value(name, PropertyValue::Text(value.into()));
    }

    pub fn set_number(&mut self, name: &str, value: f64) {
        self.set_value(name, PropertyValue::Number(value));
    }

    pub fn set_date(&mut self, name: &str, value: DateTime<Utc>) {
        self.set_value(name, PropertyValue::Date(value));
    }

    pub fn set_bool(&mut self, name: &str, value: bool) {
        self.set_value(name, PropertyValue::Boolean(value));
    }

    pub fn set_list(&mut self, name: &str, items: Vec<String>) {
        self.set_value(name, PropertyValue::List(items));
    }

    pub fn field(&self, name: &str) -> Option<&Property> {
        self.fields.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&PropertyValue> {
        self.fields.get(name).map(|p| &p.value)
    }

    pub fn string_value(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(PropertyValue::as_str)
    }

    pub fn number_value(&self, name: &str) -> Option<f64> {
        self.value(name).and_then(PropertyValue::as_number)
    }

    pub fn date_value(&self, name: &str) -> Option<DateTime<Utc>> {
        self.value(name).and_then(PropertyValue::as_date)
    }

    pub fn bool_value(&self, name: &str) -> Option<bool> {
        self.value(name).and_then(PropertyValue::as_bool)
    }

    pub fn list_value(&self, name: &str) -> Option<&[String]> {
        self.value(name).and_then(PropertyValue::as_list)
    }

    /// Stored fields, keyed by property name
    pub fn fields(&self) -> &BTreeMap<String, Property> {
        &self.fields
    }

    /// Remove a field; the orphaned property row is deleted on the next save.
    pub fn remove_field(&mut self, name: &str) {
        if self.fields.remove(name).is_some() {
            self.fields_to_remove.push(name.to_string());
        }
    }

    pub fn fields_to_remove(&self) -> &[String] {
        &self.fields_to_remove
    }

    pub(crate) fn clear_fields_to_remove(&mut self) {
        self.fields_to_remove.clear();
    }
}

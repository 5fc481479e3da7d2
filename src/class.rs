//! Class definitions - named, ordered sets of typed field declarations.
//!
//! A class is owned by the document that defines it, or referenced by name
//! from objects elsewhere. Its serde form (JSON) is the canonical embedded
//! representation stored on the owning document row.

use crate::object::DataObject;
use crate::property::PropertyKind;
use crate::{ident, Result};
use serde::{Deserialize, Serialize};

/// A single typed field declaration inside a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: PropertyKind,
    /// 0-based declaration position
    pub position: i32,
    #[serde(default)]
    pub pretty_name: String,
}

/// A named schema: an ordered set of typed field declarations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    fields: Vec<FieldDef>,
    /// Marker naming an externally-typed instance representation, if any
    #[serde(default)]
    pub custom_class: String,
    /// Administrator-authored table mapping descriptor (TOML), if any
    #[serde(default)]
    pub custom_mapping: Option<String>,
    #[serde(skip)]
    fields_to_remove: Vec<String>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn id(&self) -> i64 {
        ident::class_id(&self.name)
    }

    /// Declare a field at the next position
    pub fn add_field(&mut self, name: impl Into<String>, kind: PropertyKind) {
        let name = name.into();
        let position = self.fields.len() as i32;
        self.fields.push(FieldDef { name, kind, position, pretty_name: String::new() });
    }

    /// Insert a fully built field declaration, keeping position order
    pub fn add_field_def(&mut self, field: FieldDef) {
        self.fields.push(field);
        self.fields.sort_by_key(|f| f.position);
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Remove a field declaration; the removal is applied to the store on
    /// the next class save.
    pub fn remove_field(&mut self, name: &str) {
        if let Some(pos) = self.fields.iter().position(|f| f.name == name) {
            let field = self.fields.remove(pos);
            self.fields_to_remove.push(field.name);
        }
    }

    pub fn fields_to_remove(&self) -> &[String] {
        &self.fields_to_remove
    }

    pub(crate) fn clear_fields_to_remove(&mut self) {
        self.fields_to_remove.clear();
    }

    pub fn has_custom_mapping(&self) -> bool {
        self.custom_mapping.as_deref().is_some_and(|m| !m.trim().is_empty())
    }

    /// Instantiate an object of this class for the given owning document
    pub fn new_instance(&self, doc_full_name: &str) -> DataObject {
        DataObject::new(&self.name, doc_full_name, 0)
    }

    /// Canonical serialized form, stored on the owning document row
    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_canonical_json(json: &str) -> Result<ClassDef> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice_class() -> ClassDef {
        let mut class = ClassDef::new("Invoice");
        class.add_field("amount", PropertyKind::Number);
        class.add_field("issued", PropertyKind::Date);
        class.add_field("notes", PropertyKind::Text);
        class
    }

    #[test]
    fn test_field_order() {
        let class = invoice_class();
        let names: Vec<&str> = class.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["amount", "issued", "notes"]);
        assert_eq!(class.field("issued").unwrap().position, 1);
    }

    #[test]
    fn test_remove_field() {
        let mut class = invoice_class();
        class.remove_field("issued");
        assert!(class.field("issued").is_none());
        assert_eq!(class.fields_to_remove(), ["issued"]);
    }

    #[test]
    fn test_canonical_roundtrip() {
        let mut class = invoice_class();
        class.custom_mapping = Some("[[column]]\nproperty = \"amount\"".to_string());
        let json = class.to_canonical_json().unwrap();
        let back = ClassDef::from_canonical_json(&json).unwrap();
        assert_eq!(back, class);
        assert!(back.has_custom_mapping());
    }
}

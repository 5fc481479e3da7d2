//! Documents - top-level persisted content units.
//!
//! A document owns versioned text content, an embedded class definition,
//! a map of class name to numbered object slots, and an attachment list.
//! Content and metadata dirty flags drive the versioning decision at save.

use crate::attachment::Attachment;
use crate::class::ClassDef;
use crate::ident;
use crate::object::DataObject;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// A top-level persisted content unit, identified by space + name within a
/// wiki scope, with an optional language variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub space: String,
    pub name: String,
    pub wiki: String,
    pub language: String,
    pub parent: String,
    pub author: String,
    pub content_author: String,
    content: String,
    pub creation_date: DateTime<Utc>,
    pub date: DateTime<Utc>,
    pub content_update_date: DateTime<Utc>,
    version: u32,
    class: ClassDef,
    objects: BTreeMap<String, Vec<Option<DataObject>>>,
    pub attachments: Vec<Attachment>,
    #[serde(skip)]
    objects_to_remove: Vec<DataObject>,
    #[serde(skip)]
    archive: Option<String>,
    #[serde(skip)]
    content_dirty: bool,
    #[serde(skip)]
    metadata_dirty: bool,
    #[serde(skip)]
    has_attachments: bool,
    #[serde(skip)]
    has_objects: bool,
    #[serde(skip)]
    is_new: bool,
    #[serde(skip)]
    store_bound: bool,
}

impl Document {
    pub fn new(space: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        let space = space.into();
        let name = name.into();
        let class = ClassDef::new(format!("{}.{}", space, name));
        Self {
            space,
            name,
            wiki: String::new(),
            language: String::new(),
            parent: String::new(),
            author: String::new(),
            content_author: String::new(),
            content: String::new(),
            creation_date: now,
            date: now,
            content_update_date: now,
            version: 0,
            class,
            objects: BTreeMap::new(),
            attachments: Vec::new(),
            objects_to_remove: Vec::new(),
            archive: None,
            content_dirty: false,
            metadata_dirty: false,
            has_attachments: false,
            has_objects: false,
            is_new: true,
            store_bound: false,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.space, self.name)
    }

    pub fn id(&self) -> i64 {
        ident::document_id(&self.full_name(), &self.language)
    }

    // ---- content and metadata ----

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        let content = content.into();
        if content != self.content {
            self.content = content;
            self.content_dirty = true;
        }
    }

    pub(crate) fn set_content_loaded(&mut self, content: String) {
        self.content = content;
    }

    pub fn set_author(&mut self, author: impl Into<String>) {
        self.author = author.into();
        self.metadata_dirty = true;
    }

    pub fn set_parent(&mut self, parent: impl Into<String>) {
        self.parent = parent.into();
        self.metadata_dirty = true;
    }

    pub fn is_content_dirty(&self) -> bool {
        self.content_dirty
    }

    pub fn is_metadata_dirty(&self) -> bool {
        self.metadata_dirty
    }

    pub fn set_content_dirty(&mut self, dirty: bool) {
        self.content_dirty = dirty;
    }

    pub fn set_metadata_dirty(&mut self, dirty: bool) {
        self.metadata_dirty = dirty;
    }

    // ---- versioning ----

    pub fn version(&self) -> u32 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    pub(crate) fn increment_version(&mut self) {
        self.version += 1;
    }

    pub fn archive(&self) -> Option<&str> {
        self.archive.as_deref()
    }

    pub fn set_archive(&mut self, archive: Option<String>) {
        self.archive = archive;
    }

    /// Serialized snapshot handed to the archive collaborator.
    pub fn snapshot_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    // ---- embedded class ----

    pub fn class(&self) -> &ClassDef {
        &self.class
    }

    pub fn class_mut(&mut self) -> &mut ClassDef {
        self.metadata_dirty = true;
        &mut self.class
    }

    pub fn set_class(&mut self, class: ClassDef) {
        self.class = class;
        self.metadata_dirty = true;
    }

    pub(crate) fn replace_class(&mut self, class: ClassDef) {
        self.class = class;
    }

    // ---- objects ----

    /// Object at a given class/slot, if present
    pub fn object(&self, class_name: &str, number: i32) -> Option<&DataObject> {
        self.objects
            .get(class_name)
            .and_then(|slots| slots.get(number as usize))
            .and_then(|slot| slot.as_ref())
    }

    pub fn object_mut(&mut self, class_name: &str, number: i32) -> Option<&mut DataObject> {
        self.objects
            .get_mut(class_name)
            .and_then(|slots| slots.get_mut(number as usize))
            .and_then(|slot| slot.as_mut())
    }

    /// Place an object at a specific slot, growing the slot list as needed
    pub fn set_object(&mut self, class_name: &str, number: i32, object: DataObject) {
        let slots = self.objects.entry(class_name.to_string()).or_default();
        let index = number as usize;
        if slots.len() <= index {
            slots.resize(index + 1, None);
        }
        slots[index] = Some(object);
        self.has_objects = true;
        self.metadata_dirty = true;
    }

    /// Append an object at the next free slot of its class; returns the
    /// assigned number.
    pub fn add_object(&mut self, mut object: DataObject) -> i32 {
        let class_name = object.class_name.clone();
        let number = self.objects.get(&class_name).map_or(0, |slots| slots.len()) as i32;
        object.number = number;
        object.name = self.full_name();
        self.set_object(&class_name, number, object);
        number
    }

    pub fn objects_of(&self, class_name: &str) -> &[Option<DataObject>] {
        self.objects.get(class_name).map_or(&[], |slots| slots.as_slice())
    }

    pub fn objects(&self) -> &BTreeMap<String, Vec<Option<DataObject>>> {
        &self.objects
    }

    pub(crate) fn objects_mut(&mut self) -> &mut BTreeMap<String, Vec<Option<DataObject>>> {
        &mut self.objects
    }

    /// Detach an object; its rows are deleted on the next save.
    pub fn remove_object(&mut self, class_name: &str, number: i32) -> bool {
        let Some(slots) = self.objects.get_mut(class_name) else {
            return false;
        };
        let Some(slot) = slots.get_mut(number as usize) else {
            return false;
        };
        match slot.take() {
            Some(object) => {
                self.objects_to_remove.push(object);
                self.metadata_dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn objects_to_remove(&self) -> &[DataObject] {
        &self.objects_to_remove
    }

    pub(crate) fn take_objects_to_remove(&mut self) -> Vec<DataObject> {
        std::mem::take(&mut self.objects_to_remove)
    }

    // ---- attachments ----

    pub fn add_attachment(&mut self, mut attachment: Attachment) {
        attachment.doc_full_name = self.full_name();
        self.attachments.push(attachment);
        self.has_attachments = true;
        self.metadata_dirty = true;
    }

    pub fn attachment(&self, filename: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.filename == filename)
    }

    // ---- cached lookup flags ----

    pub fn has_attachments(&self) -> bool {
        self.has_attachments
    }

    pub fn has_objects(&self) -> bool {
        self.has_objects
    }

    /// Recompute the cached flags from the current in-memory state
    pub(crate) fn refresh_element_flags(&mut self) {
        self.has_attachments = !self.attachments.is_empty();
        self.has_objects = self.objects.values().any(|slots| slots.iter().any(Option::is_some));
    }

    pub(crate) fn set_element_flags(&mut self, has_attachments: bool, has_objects: bool) {
        self.has_attachments = has_attachments;
        self.has_objects = has_objects;
    }

    // ---- lifecycle ----

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub(crate) fn set_new(&mut self, is_new: bool) {
        self.is_new = is_new;
    }

    pub fn is_store_bound(&self) -> bool {
        self.store_bound
    }

    pub(crate) fn bind_store(&mut self) {
        self.store_bound = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyKind;

    #[test]
    fn test_full_name_and_id() {
        let doc = Document::new("Ledger", "001");
        assert_eq!(doc.full_name(), "Ledger.001");

        let mut translated = Document::new("Ledger", "001");
        translated.language = "fr".to_string();
        assert_ne!(doc.id(), translated.id());
    }

    #[test]
    fn test_dirty_flags() {
        let mut doc = Document::new("Ledger", "001");
        assert!(!doc.is_content_dirty());
        doc.set_content("hello");
        assert!(doc.is_content_dirty());
        doc.set_content_dirty(false);
        // unchanged content does not re-dirty
        doc.set_content("hello");
        assert!(!doc.is_content_dirty());
        doc.set_author("alice");
        assert!(doc.is_metadata_dirty());
    }

    #[test]
    fn test_object_slots() {
        let mut doc = Document::new("Ledger", "001");
        let first = doc.add_object(DataObject::new("Invoice", "", 0));
        let second = doc.add_object(DataObject::new("Invoice", "", 0));
        assert_eq!((first, second), (0, 1));
        assert_eq!(doc.object("Invoice", 1).unwrap().name, "Ledger.001");

        assert!(doc.remove_object("Invoice", 0));
        assert!(doc.object("Invoice", 0).is_none());
        assert!(doc.object("Invoice", 1).is_some());
        assert_eq!(doc.objects_to_remove().len(), 1);
        // slot stays reserved
        assert_eq!(doc.objects_of("Invoice").len(), 2);
    }

    #[test]
    fn test_element_flags_refresh() {
        let mut doc = Document::new("Ledger", "001");
        doc.refresh_element_flags();
        assert!(!doc.has_objects() && !doc.has_attachments());

        doc.add_object(DataObject::new("Invoice", "", 0));
        doc.add_attachment(Attachment::new("scan.png", vec![0xff]));
        doc.refresh_element_flags();
        assert!(doc.has_objects() && doc.has_attachments());

        doc.remove_object("Invoice", 0);
        doc.refresh_element_flags();
        assert!(!doc.has_objects());
    }

    #[test]
    fn test_class_mut_marks_dirty() {
        let mut doc = Document::new("Ledger", "001");
        doc.class_mut().add_field("amount", PropertyKind::Number);
        assert!(doc.is_metadata_dirty());
        assert_eq!(doc.class().name, "Ledger.001");
    }
}

//! Document repository - the entry point of the persistence engine.
//!
//! Saving a document fans out to the attachment list, the embedded class,
//! every embedded object and the link graph, all inside one unit of work;
//! nothing becomes visible until the top-level scope commits.

use crate::class::ClassDef;
use crate::document::Document;
use crate::object::{DataObject, INTERNAL_CLASS};
use crate::storage::store::{DocumentStore, Scope};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::debug;

/// Class whose instances are group membership rows; they load through a
/// single denormalized projection instead of one query per object.
pub const GROUP_CLASS: &str = "System.Groups";

/// The membership field of [`GROUP_CLASS`] objects.
pub const GROUP_MEMBER_FIELD: &str = "member";

impl DocumentStore {
    // ========== Document Operations ==========

    /// Check whether a document with this full name is stored
    pub fn exists(&self, full_name: &str) -> Result<bool> {
        self.with_read_scope(|_scope| {
            let mut stmt =
                self.conn.prepare("SELECT full_name FROM documents WHERE full_name = ?1")?;
            let names = stmt.query_map([full_name], |row| row.get::<_, String>(0))?;
            for name in names {
                // the backing engine may have matched case-insensitively
                if name? == full_name {
                    return Ok(true);
                }
            }
            Ok(false)
        })
        .map_err(|e| Error::exists_check(full_name, e))
    }

    /// Save a document and everything embedded in it
    pub fn save_document(&self, doc: &mut Document) -> Result<()> {
        let full_name = doc.full_name();
        // custom mappings must be in place before the write scope opens
        self.inject_custom_mappings(doc)
            .map_err(|e| Error::document_save(&full_name, e))?;
        self.with_scope(|scope| self.save_document_in(doc, scope))
            .map_err(|e| Error::document_save(&full_name, e))
    }

    pub(crate) fn save_document_in(&self, doc: &mut Document, scope: &Scope) -> Result<()> {
        doc.wiki = self.config.wiki.clone();
        doc.bind_store();
        let full_name = doc.full_name();

        // these flags let loading skip attachment and object lookups
        doc.refresh_element_flags();

        // the embedded class always carries the document's own name
        if doc.class().name != full_name {
            let mut class = doc.class().clone();
            class.name = full_name.clone();
            doc.replace_class(class);
        }
        let class_json =
            if doc.class().is_empty() { None } else { Some(doc.class().to_canonical_json()?) };

        if doc.has_attachments() {
            self.save_attachment_list_in(doc, scope)?;
        }

        // versioning decision
        if doc.is_content_dirty() || doc.is_metadata_dirty() {
            let now = Utc::now();
            doc.date = now;
            if doc.is_content_dirty() {
                doc.content_update_date = now;
                doc.content_author = doc.author.clone();
            }
            doc.increment_version();
            if self.versioning.has_versioning(&full_name) {
                let snapshot = doc.snapshot_json()?;
                self.versioning.update_archive(doc, &snapshot, false)?;
            }
            doc.set_content_dirty(false);
            doc.set_metadata_dirty(false);
        } else if let Some(archive) = doc.archive().map(str::to_string) {
            if self.versioning.has_versioning(&full_name) {
                self.versioning.save_archive(&full_name, &archive, false)?;
            }
        } else if self.versioning.has_versioning(&full_name) {
            // archive presence is best-effort
            match self.versioning.load_archive(doc) {
                Ok(archive) => doc.set_archive(archive),
                Err(e) => {
                    debug!(document = %full_name, error = %e, "archive materialization failed")
                }
            }
        }

        self.upsert_document_row(doc, class_json.as_deref())?;

        // objects detached from the document go first
        for removed in doc.take_objects_to_remove() {
            self.delete_object_in(&removed, Some(doc), true, scope)?;
        }

        if !doc.class().is_empty() && self.config.class_tables_write {
            let mut class = doc.class().clone();
            self.save_class_in(&mut class, scope)?;
            doc.replace_class(class);
        }

        // every embedded object, across all classes, in document order
        let mut objects = std::mem::take(doc.objects_mut());
        let saved = (|| -> Result<()> {
            for slots in objects.values_mut() {
                for object in slots.iter_mut().flatten() {
                    object.name = full_name.clone();
                    self.save_object_in(object, Some(&*doc), scope)?;
                }
            }
            Ok(())
        })();
        *doc.objects_mut() = objects;
        saved?;

        if self.config.backlinks {
            self.save_links_in(doc, scope)?;
        }

        doc.set_new(false);
        Ok(())
    }

    fn upsert_document_row(&self, doc: &Document, class_json: Option<&str>) -> Result<()> {
        let id = doc.id();
        let existing: Option<i64> = self
            .conn
            .query_row("SELECT id FROM documents WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        if existing.is_none() {
            self.conn.execute(
                "INSERT INTO documents (id, full_name, space, name, wiki, language, parent, \
                 content, author, content_author, creation_date, date, content_update_date, \
                 version, class_json, has_attachments, has_objects) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    id,
                    doc.full_name(),
                    doc.space,
                    doc.name,
                    doc.wiki,
                    doc.language,
                    doc.parent,
                    doc.content(),
                    doc.author,
                    doc.content_author,
                    doc.creation_date,
                    doc.date,
                    doc.content_update_date,
                    doc.version(),
                    class_json,
                    doc.has_attachments(),
                    doc.has_objects(),
                ],
            )?;
        } else {
            self.conn.execute(
                "UPDATE documents SET full_name = ?2, space = ?3, name = ?4, wiki = ?5, \
                 language = ?6, parent = ?7, content = ?8, author = ?9, content_author = ?10, \
                 creation_date = ?11, date = ?12, content_update_date = ?13, version = ?14, \
                 class_json = ?15, has_attachments = ?16, has_objects = ?17 WHERE id = ?1",
                params![
                    id,
                    doc.full_name(),
                    doc.space,
                    doc.name,
                    doc.wiki,
                    doc.language,
                    doc.parent,
                    doc.content(),
                    doc.author,
                    doc.content_author,
                    doc.creation_date,
                    doc.date,
                    doc.content_update_date,
                    doc.version(),
                    class_json,
                    doc.has_attachments(),
                    doc.has_objects(),
                ],
            )?;
        }
        Ok(())
    }

    /// Load a document by its id. A missing row is not an error: the
    /// document is marked new and returned untouched.
    pub fn load_document(&self, doc: &mut Document) -> Result<()> {
        let full_name = doc.full_name();
        self.inject_custom_mappings(doc)
            .map_err(|e| Error::document_load(&full_name, e))?;
        self.with_read_scope(|scope| self.load_document_in(doc, scope))
            .map_err(|e| Error::document_load(&full_name, e))
    }

    pub(crate) fn load_document_in(&self, doc: &mut Document, scope: &Scope) -> Result<()> {
        doc.bind_store();
        let full_name = doc.full_name();

        type DocRow = (
            String,
            String,
            String,
            String,
            String,
            String,
            DateTime<Utc>,
            DateTime<Utc>,
            DateTime<Utc>,
            u32,
            Option<String>,
            bool,
            bool,
        );
        let row: Option<DocRow> = self
            .conn
            .query_row(
                "SELECT wiki, language, parent, content, author, content_author, \
                 creation_date, date, content_update_date, version, class_json, \
                 has_attachments, has_objects FROM documents WHERE id = ?1",
                [doc.id()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                        row.get(10)?,
                        row.get(11)?,
                        row.get(12)?,
                    ))
                },
            )
            .optional()?;
        let Some((
            wiki,
            language,
            parent,
            content,
            author,
            content_author,
            creation_date,
            date,
            content_update_date,
            version,
            class_json,
            has_attachments,
            has_objects,
        )) = row
        else {
            doc.set_new(true);
            return Ok(());
        };

        doc.wiki = wiki;
        doc.language = language;
        doc.parent = parent;
        doc.set_content_loaded(content);
        doc.author = author;
        doc.content_author = content_author;
        doc.creation_date = creation_date;
        doc.date = date;
        doc.content_update_date = content_update_date;
        doc.set_version(version);
        doc.set_element_flags(has_attachments, has_objects);
        doc.set_new(false);

        if doc.has_attachments() {
            self.load_attachment_list_in(doc, scope)?;
        }

        // embedded class: the canonical form on the row wins, the class
        // tables are the fallback under read mode
        match class_json {
            Some(json) if !json.is_empty() => {
                let mut class = ClassDef::from_canonical_json(&json)?;
                class.name = full_name.clone();
                doc.replace_class(class);
            }
            _ if self.config.class_tables_read => {
                let mut class = ClassDef::new(full_name.clone());
                self.load_class_in(&mut class, scope)?;
                doc.replace_class(class);
            }
            _ => {}
        }

        if doc.has_objects() {
            let mut stmt = self.conn.prepare(
                "SELECT name, class_name, number FROM objects WHERE name = ?1 ORDER BY number",
            )?;
            let rows: Vec<(String, String, i32)> = stmt
                .query_map([&full_name], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<std::result::Result<_, _>>()?;
            drop(stmt);

            let mut has_groups = false;
            for (name, class_name, number) in rows {
                if class_name.is_empty() || class_name == INTERNAL_CLASS {
                    continue;
                }
                if class_name == GROUP_CLASS {
                    has_groups = true;
                    continue;
                }
                // the name probe may have matched case-insensitively; an
                // object that doesn't really belong here would break loading
                if name != full_name {
                    continue;
                }

                let mut object = if class_name == full_name {
                    doc.class().new_instance(&name)
                } else {
                    DataObject::new(&class_name, &name, number)
                };
                object.number = number;
                self.load_object_in(&mut object, Some(doc), scope)?;
                doc.set_object(&class_name, number, object);
            }

            if has_groups {
                let mut stmt = self.conn.prepare(
                    "SELECT o.number, sp.value FROM objects o \
                     JOIN string_properties sp ON sp.id = o.id AND sp.name = ?3 \
                     WHERE o.name = ?1 AND o.class_name = ?2 ORDER BY o.number",
                )?;
                let members: Vec<(i32, String)> = stmt
                    .query_map(params![full_name, GROUP_CLASS, GROUP_MEMBER_FIELD], |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })?
                    .collect::<std::result::Result<_, _>>()?;
                drop(stmt);

                for (number, member) in members {
                    let mut object = DataObject::new(GROUP_CLASS, &full_name, number);
                    object.set_string(GROUP_MEMBER_FIELD, member);
                    doc.set_object(GROUP_CLASS, number, object);
                }
            }
        }

        doc.set_content_dirty(false);
        doc.set_metadata_dirty(false);
        Ok(())
    }

    /// Delete a document and everything that cascades from it. Fails with
    /// [`Error::StoreNotBound`] when the document never went through a store.
    pub fn delete_document(&self, doc: &mut Document) -> Result<()> {
        let full_name = doc.full_name();
        if !doc.is_store_bound() {
            return Err(Error::StoreNotBound(full_name));
        }
        self.inject_custom_mappings(doc)
            .map_err(|e| Error::document_delete(&full_name, e))?;
        self.with_scope(|scope| self.delete_document_in(doc, scope))
            .map_err(|e| Error::document_delete(&full_name, e))
    }

    pub(crate) fn delete_document_in(&self, doc: &mut Document, scope: &Scope) -> Result<()> {
        for attachment in doc.attachments.clone() {
            self.delete_attachment_in(&attachment, scope)?;
        }

        if self.config.backlinks {
            self.delete_links_in(doc.id(), scope)?;
        }

        if !doc.class().is_empty() && self.config.class_tables_write {
            let mut class = doc.class().clone();
            class.name = doc.full_name();
            self.delete_class_in(&class, scope)?;
        }

        for removed in doc.take_objects_to_remove() {
            self.delete_object_in(&removed, Some(doc), true, scope)?;
        }
        let objects = std::mem::take(doc.objects_mut());
        let deleted = (|| -> Result<()> {
            for slots in objects.values() {
                for object in slots.iter().flatten() {
                    self.delete_object_in(object, Some(&*doc), true, scope)?;
                }
            }
            Ok(())
        })();
        *doc.objects_mut() = objects;
        deleted?;

        self.delete_lock_in(doc.id(), scope)?;
        self.conn.execute("DELETE FROM documents WHERE id = ?1", [doc.id()])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::property::{PropertyKind, PropertyValue};
    use crate::services::InMemoryVersioning;
    use chrono::TimeZone;

    fn store() -> DocumentStore {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        DocumentStore::open_in_memory(StoreConfig::default()).unwrap()
    }

    fn ledger_doc() -> Document {
        let mut doc = Document::new("Ledger", "001");
        doc.set_content("invoice ledger for [[Billing.Overview]]");
        doc.set_author("alice");
        doc.class_mut().add_field("amount", PropertyKind::Number);
        doc.class_mut().add_field("issued", PropertyKind::Date);

        let mut invoice = DataObject::new("Ledger.001", "", 0);
        invoice.set_number("amount", 42.5);
        invoice.set_date("issued", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        doc.add_object(invoice);
        doc
    }

    #[test]
    fn test_exists() {
        let store = store();
        let mut doc = ledger_doc();
        assert!(!store.exists("Ledger.001").unwrap());
        store.save_document(&mut doc).unwrap();
        assert!(store.exists("Ledger.001").unwrap());
        assert!(!store.exists("ledger.001").unwrap());
    }

    #[test]
    fn test_document_roundtrip() {
        let store = store();
        let mut doc = ledger_doc();
        store.save_document(&mut doc).unwrap();
        assert!(!doc.is_new());

        let mut loaded = Document::new("Ledger", "001");
        store.load_document(&mut loaded).unwrap();
        assert!(!loaded.is_new());
        assert_eq!(loaded.content(), doc.content());
        assert_eq!(loaded.author, "alice");
        assert_eq!(loaded.class().fields().len(), 2);

        let invoice = loaded.object("Ledger.001", 0).unwrap();
        assert_eq!(invoice.number_value("amount"), Some(42.5));
        assert_eq!(
            invoice.date_value("issued"),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_load_missing_marks_new() {
        let store = store();
        let mut doc = Document::new("Ledger", "404");
        store.load_document(&mut doc).unwrap();
        assert!(doc.is_new());
    }

    #[test]
    fn test_version_semantics() {
        let store = store();
        let mut doc = ledger_doc();
        store.save_document(&mut doc).unwrap();
        assert_eq!(doc.version(), 1);

        // an unmodified save leaves the version alone
        store.save_document(&mut doc).unwrap();
        assert_eq!(doc.version(), 1);

        doc.set_content("revised ledger");
        store.save_document(&mut doc).unwrap();
        assert_eq!(doc.version(), 2);

        let mut loaded = Document::new("Ledger", "001");
        store.load_document(&mut loaded).unwrap();
        assert_eq!(loaded.version(), 2);
    }

    #[test]
    fn test_content_dirty_updates_content_author() {
        let store = store();
        let mut doc = Document::new("Ledger", "001");
        doc.set_author("bob");
        doc.set_content("text");
        store.save_document(&mut doc).unwrap();
        assert_eq!(doc.content_author, "bob");
    }

    #[test]
    fn test_versioning_receives_new_revisions() {
        let store = store().with_versioning(Box::new(InMemoryVersioning::new()));
        let mut doc = ledger_doc();
        store.save_document(&mut doc).unwrap();

        let archive = store.versioning.load_archive(&doc).unwrap();
        assert!(archive.is_some());
    }

    #[test]
    fn test_delete_document_cascades() {
        let store = store();
        let mut doc = ledger_doc();
        doc.add_attachment(crate::attachment::Attachment::new("scan.png", vec![1, 2]));
        store.save_document(&mut doc).unwrap();
        store.save_lock(&crate::lock::Lock::new(doc.id(), "alice")).unwrap();

        store.delete_document(&mut doc).unwrap();

        assert!(!store.exists("Ledger.001").unwrap());
        let mut reloaded = Document::new("Ledger", "001");
        store.load_document(&mut reloaded).unwrap();
        assert!(reloaded.is_new());
        for table in ["objects", "properties", "links", "attachments", "locks"] {
            let count: i64 = store
                .conn
                .query_row(&format!("SELECT count(*) FROM {}", table), [], |row| row.get(0))
                .unwrap();
            assert_eq!(count, 0, "stale rows in {}", table);
        }
    }

    #[test]
    fn test_delete_unloaded_document_fails() {
        let store = store();
        let mut doc = Document::new("Ledger", "001");
        assert!(matches!(store.delete_document(&mut doc), Err(Error::StoreNotBound(_))));
    }

    #[test]
    fn test_object_removal_on_save() {
        let store = store();
        let mut doc = ledger_doc();
        let mut second = DataObject::new("Ledger.001", "", 0);
        second.set_number("amount", 7.0);
        doc.add_object(second);
        store.save_document(&mut doc).unwrap();

        doc.remove_object("Ledger.001", 0);
        store.save_document(&mut doc).unwrap();

        let mut loaded = Document::new("Ledger", "001");
        store.load_document(&mut loaded).unwrap();
        assert!(loaded.object("Ledger.001", 0).is_none());
        assert_eq!(loaded.object("Ledger.001", 1).unwrap().number_value("amount"), Some(7.0));
    }

    #[test]
    fn test_case_mismatched_object_rows_are_skipped() {
        let store = store();
        let mut doc = ledger_doc();
        store.save_document(&mut doc).unwrap();

        // a row that matches the document only case-insensitively
        store
            .conn
            .execute(
                "INSERT INTO objects (id, name, class_name, number) VALUES (999, 'LEDGER.001', 'Other', 0)",
                [],
            )
            .unwrap();

        let mut loaded = Document::new("Ledger", "001");
        store.load_document(&mut loaded).unwrap();
        assert!(loaded.objects_of("Other").is_empty());
    }

    #[test]
    fn test_group_objects_load_via_projection() {
        let store = store();
        let mut doc = Document::new("Teams", "Admins");
        doc.set_content("admin group");
        for (i, member) in ["alice", "bob"].iter().enumerate() {
            let mut group = DataObject::new(GROUP_CLASS, "", 0);
            group.set_string(GROUP_MEMBER_FIELD, *member);
            let number = doc.add_object(group);
            assert_eq!(number, i as i32);
        }
        store.save_document(&mut doc).unwrap();

        let mut loaded = Document::new("Teams", "Admins");
        store.load_document(&mut loaded).unwrap();
        let members: Vec<&str> = loaded
            .objects_of(GROUP_CLASS)
            .iter()
            .flatten()
            .filter_map(|o| o.string_value(GROUP_MEMBER_FIELD))
            .collect();
        assert_eq!(members, ["alice", "bob"]);
    }

    #[test]
    fn test_class_tables_write_mode_persists_class() {
        let config = StoreConfig { class_tables_write: true, ..Default::default() };
        let store = DocumentStore::open_in_memory(config).unwrap();
        let mut doc = ledger_doc();
        store.save_document(&mut doc).unwrap();

        let mut class = ClassDef::new("Ledger.001");
        assert!(store.load_class(&mut class).unwrap());
        assert_eq!(class.fields().len(), 2);
    }

    #[test]
    fn test_invoice_scenario() {
        // create class Invoice, instantiate it on Ledger.001, reload
        let store = store();

        let mut class_doc = Document::new("Billing", "Invoice");
        class_doc.class_mut().add_field("amount", PropertyKind::Number);
        class_doc.class_mut().add_field("issued", PropertyKind::Date);
        store.save_document(&mut class_doc).unwrap();

        let mut doc = Document::new("Ledger", "001");
        let mut invoice = DataObject::new("Billing.Invoice", "", 0);
        invoice.set_number("amount", 42.5);
        invoice.set_date("issued", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        doc.add_object(invoice);
        store.save_document(&mut doc).unwrap();

        let mut loaded = Document::new("Ledger", "001");
        store.load_document(&mut loaded).unwrap();
        let invoice = loaded.object("Billing.Invoice", 0).unwrap();
        assert_eq!(invoice.number_value("amount"), Some(42.5));
        assert_eq!(
            invoice.value("issued"),
            Some(&PropertyValue::Date(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()))
        );
    }
}

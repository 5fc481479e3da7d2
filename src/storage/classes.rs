//! Class repository - persistence of schema definitions.
//!
//! A field declaration spans two tables (base row + meta row). Each field
//! upsert runs under a savepoint; when the two halves end up out of step the
//! upsert is retried once after clearing both. That repair is best-effort,
//! not a guarantee.

use crate::class::{ClassDef, FieldDef};
use crate::property::PropertyKind;
use crate::storage::store::{DocumentStore, Scope};
use crate::{Error, Result};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, warn};

impl DocumentStore {
    // ========== Class Operations ==========

    /// Insert or update a class and all of its field declarations
    pub fn save_class(&self, class: &mut ClassDef) -> Result<()> {
        let name = class.name.clone();
        self.with_scope(|scope| self.save_class_in(class, scope))
            .map_err(|e| Error::class_save(&name, e))
    }

    pub(crate) fn save_class_in(&self, class: &mut ClassDef, scope: &Scope) -> Result<()> {
        let id = class.id();

        let existing: Option<i64> = self
            .conn
            .query_row("SELECT id FROM classes WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        if existing.is_none() {
            self.conn.execute(
                "INSERT INTO classes (id, name, custom_class, custom_mapping) VALUES (?1, ?2, ?3, ?4)",
                params![id, class.name, class.custom_class, class.custom_mapping],
            )?;
        } else {
            self.conn.execute(
                "UPDATE classes SET name = ?2, custom_class = ?3, custom_mapping = ?4 WHERE id = ?1",
                params![id, class.name, class.custom_class, class.custom_mapping],
            )?;
        }

        let removals: Vec<String> = class.fields_to_remove().to_vec();
        for name in &removals {
            self.conn.execute(
                "DELETE FROM class_properties WHERE id = ?1 AND name = ?2",
                params![id, name],
            )?;
            self.conn.execute(
                "DELETE FROM class_field_meta WHERE id = ?1 AND name = ?2",
                params![id, name],
            )?;
        }
        class.clear_fields_to_remove();

        for field in class.fields() {
            if !field.name.trim().is_empty() {
                self.save_class_field_in(id, &class.name, field, scope)?;
            }
        }
        Ok(())
    }

    fn save_class_field_in(
        &self,
        class_id: i64,
        class_name: &str,
        field: &FieldDef,
        _scope: &Scope,
    ) -> Result<()> {
        self.conn.execute_batch("SAVEPOINT class_field")?;
        match self.upsert_class_field(class_id, field) {
            Ok(()) => {
                self.conn.execute_batch("RELEASE class_field")?;
                Ok(())
            }
            Err(e) => {
                if let Err(release) =
                    self.conn.execute_batch("ROLLBACK TO class_field; RELEASE class_field")
                {
                    debug!(error = %release, "savepoint release failed");
                }
                // the two declaration tables are out of step; clear both
                // halves and retry once
                warn!(class = class_name, field = %field.name, error = %e,
                      "class field upsert failed, repairing");
                let repair = (|| -> Result<()> {
                    self.conn.execute(
                        "DELETE FROM class_properties WHERE id = ?1 AND name = ?2",
                        params![class_id, field.name],
                    )?;
                    self.conn.execute(
                        "DELETE FROM class_field_meta WHERE id = ?1 AND name = ?2",
                        params![class_id, field.name],
                    )?;
                    self.upsert_class_field(class_id, field)
                })();
                match repair {
                    Ok(()) => Ok(()),
                    Err(repair_err) => {
                        debug!(error = %repair_err, "class field repair failed");
                        Err(e)
                    }
                }
            }
        }
    }

    fn upsert_class_field(&self, class_id: i64, field: &FieldDef) -> Result<()> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM class_properties WHERE id = ?1 AND name = ?2",
                params![class_id, field.name],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_none() {
            self.conn.execute(
                "INSERT INTO class_properties (id, name, position, kind) VALUES (?1, ?2, ?3, ?4)",
                params![class_id, field.name, field.position, field.kind.as_str()],
            )?;
            self.conn.execute(
                "INSERT INTO class_field_meta (id, name, pretty_name) VALUES (?1, ?2, ?3)",
                params![class_id, field.name, field.pretty_name],
            )?;
        } else {
            self.conn.execute(
                "UPDATE class_properties SET position = ?3, kind = ?4 WHERE id = ?1 AND name = ?2",
                params![class_id, field.name, field.position, field.kind.as_str()],
            )?;
            let updated = self.conn.execute(
                "UPDATE class_field_meta SET pretty_name = ?3 WHERE id = ?1 AND name = ?2",
                params![class_id, field.name, field.pretty_name],
            )?;
            if updated == 0 {
                // base row present, meta row missing
                return Err(Error::Storage(rusqlite::Error::QueryReturnedNoRows));
            }
        }
        Ok(())
    }

    /// Load a class by the id of its name. A missing class row means "no
    /// fields yet" and returns `false`, not an error. Loading a class that
    /// declares an external custom mapping triggers registry injection.
    pub fn load_class(&self, class: &mut ClassDef) -> Result<bool> {
        let name = class.name.clone();
        let found = self
            .with_read_scope(|scope| self.load_class_in(class, scope))
            .map_err(|e| Error::class_load(&name, e))?;
        if found && class.has_custom_mapping() {
            self.inject_custom_mapping(class).map_err(|e| Error::class_load(&name, e))?;
        }
        Ok(found)
    }

    pub(crate) fn load_class_in(&self, class: &mut ClassDef, _scope: &Scope) -> Result<bool> {
        let id = class.id();

        let row: Option<(String, Option<String>)> = self
            .conn
            .query_row(
                "SELECT custom_class, custom_mapping FROM classes WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((custom_class, custom_mapping)) = row else {
            return Ok(false);
        };
        class.custom_class = custom_class;
        class.custom_mapping = custom_mapping;

        let mut stmt = self.conn.prepare(
            "SELECT name, position, kind FROM class_properties WHERE id = ?1 ORDER BY position",
        )?;
        let rows: Vec<(String, i32, String)> = stmt
            .query_map([id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<_, _>>()?;
        drop(stmt);

        for (name, position, kind_tag) in rows {
            let kind: PropertyKind = kind_tag.parse()?;
            let pretty_name: Option<String> = self
                .conn
                .query_row(
                    "SELECT pretty_name FROM class_field_meta WHERE id = ?1 AND name = ?2",
                    params![id, name],
                    |row| row.get(0),
                )
                .optional()?;
            class.add_field_def(FieldDef {
                name,
                kind,
                position,
                pretty_name: pretty_name.unwrap_or_default(),
            });
        }
        Ok(true)
    }

    /// Delete a class and its field declarations
    pub fn delete_class(&self, class: &ClassDef) -> Result<()> {
        let name = class.name.clone();
        self.with_scope(|scope| self.delete_class_in(class, scope))
            .map_err(|e| Error::object_delete(&name, e))
    }

    pub(crate) fn delete_class_in(&self, class: &ClassDef, _scope: &Scope) -> Result<()> {
        let id = class.id();
        self.conn.execute("DELETE FROM class_properties WHERE id = ?1", [id])?;
        self.conn.execute("DELETE FROM class_field_meta WHERE id = ?1", [id])?;
        self.conn.execute("DELETE FROM classes WHERE id = ?1", [id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    fn store() -> DocumentStore {
        DocumentStore::open_in_memory(StoreConfig::default()).unwrap()
    }

    fn invoice_class() -> ClassDef {
        let mut class = ClassDef::new("Invoice");
        class.add_field("amount", PropertyKind::Number);
        class.add_field("issued", PropertyKind::Date);
        class.add_field("notes", PropertyKind::Text);
        class
    }

    #[test]
    fn test_class_roundtrip() {
        let store = store();
        let mut class = invoice_class();
        store.save_class(&mut class).unwrap();

        let mut loaded = ClassDef::new("Invoice");
        assert!(store.load_class(&mut loaded).unwrap());
        assert_eq!(loaded, class);
    }

    #[test]
    fn test_missing_class_is_no_fields_yet() {
        let store = store();
        let mut loaded = ClassDef::new("Nowhere");
        assert!(!store.load_class(&mut loaded).unwrap());
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_field_removal() {
        let store = store();
        let mut class = invoice_class();
        store.save_class(&mut class).unwrap();

        class.remove_field("notes");
        store.save_class(&mut class).unwrap();

        let mut loaded = ClassDef::new("Invoice");
        store.load_class(&mut loaded).unwrap();
        assert!(loaded.field("notes").is_none());
        assert_eq!(loaded.fields().len(), 2);
    }

    #[test]
    fn test_field_kind_update() {
        let store = store();
        let mut class = invoice_class();
        store.save_class(&mut class).unwrap();

        let mut changed = ClassDef::new("Invoice");
        changed.add_field("amount", PropertyKind::String);
        store.save_class(&mut changed).unwrap();

        let mut loaded = ClassDef::new("Invoice");
        store.load_class(&mut loaded).unwrap();
        assert_eq!(loaded.field("amount").unwrap().kind, PropertyKind::String);
    }

    #[test]
    fn test_mismatched_field_tables_are_repaired() {
        let store = store();
        let mut class = invoice_class();
        store.save_class(&mut class).unwrap();

        // stage the incoherent state: base row without its meta half
        store
            .conn
            .execute(
                "DELETE FROM class_field_meta WHERE id = ?1 AND name = 'amount'",
                [class.id()],
            )
            .unwrap();

        store.save_class(&mut class).unwrap();

        let meta: i64 = store
            .conn
            .query_row(
                "SELECT count(*) FROM class_field_meta WHERE id = ?1 AND name = 'amount'",
                [class.id()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(meta, 1);
    }

    #[test]
    fn test_load_triggers_mapping_injection() {
        let store = store();
        let mut class = invoice_class();
        class.custom_mapping =
            Some("[[column]]\nproperty = \"amount\"\ntype = \"double\"".to_string());
        store.save_class(&mut class).unwrap();

        let mut loaded = ClassDef::new("Invoice");
        assert!(store.load_class(&mut loaded).unwrap());

        let table: i64 = store
            .conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'xcustom_invoice'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(table, 1);
    }

    #[test]
    fn test_delete_class() {
        let store = store();
        let mut class = invoice_class();
        store.save_class(&mut class).unwrap();
        store.delete_class(&class).unwrap();

        let mut loaded = ClassDef::new("Invoice");
        assert!(!store.load_class(&mut loaded).unwrap());
        for table in ["classes", "class_properties", "class_field_meta"] {
            let count: i64 = store
                .conn
                .query_row(&format!("SELECT count(*) FROM {}", table), [], |row| row.get(0))
                .unwrap();
            assert_eq!(count, 0, "stale rows in {}", table);
        }
    }
}

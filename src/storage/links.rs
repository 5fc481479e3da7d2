//! Link graph and lock stores - auxiliary per-document relations.
//!
//! The link graph is regenerated wholesale on every save: existing edges are
//! dropped, the rendering collaborator reports discovered targets into the
//! thread-local accumulator, and one edge is persisted per target. Locks are
//! advisory, at most one per document, held until explicitly released.

use crate::document::Document;
use crate::link::{self, Link};
use crate::lock::Lock;
use crate::storage::store::{DocumentStore, Scope};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::collections::HashSet;
use tracing::debug;

impl DocumentStore {
    // ========== Link Graph Operations ==========

    /// Regenerate the outgoing edges of a document from its content
    pub fn save_links(&self, doc: &Document) -> Result<()> {
        self.with_scope(|scope| self.save_links_in(doc, scope)).map_err(Error::link_graph)
    }

    pub(crate) fn save_links_in(&self, doc: &Document, scope: &Scope) -> Result<()> {
        self.delete_links_in(doc.id(), scope)?;

        link::clear_discovered_links();
        if let Err(e) = self.renderer.render(doc.content(), doc, doc) {
            // the document still saves when link extraction fails
            debug!(document = %doc.full_name(), error = %e, "link extraction failed");
        }

        let full_name = doc.full_name();
        let mut seen = HashSet::new();
        for target in link::take_discovered_links() {
            if seen.insert(target.clone()) {
                self.conn.execute(
                    "INSERT INTO links (doc_id, target, full_name) VALUES (?1, ?2, ?3)",
                    params![doc.id(), target, full_name],
                )?;
            }
        }
        Ok(())
    }

    /// All outgoing edges of a document
    pub fn load_links(&self, doc_id: i64) -> Result<Vec<Link>> {
        self.with_read_scope(|_scope| {
            let mut stmt = self
                .conn
                .prepare("SELECT doc_id, target, full_name FROM links WHERE doc_id = ?1")?;
            let links = stmt
                .query_map([doc_id], |row| {
                    Ok(Link { doc_id: row.get(0)?, target: row.get(1)?, full_name: row.get(2)? })
                })?
                .collect::<std::result::Result<_, _>>()?;
            Ok(links)
        })
        .map_err(Error::link_graph)
    }

    /// Source document names of every edge pointing at a target
    pub fn load_backlinks(&self, target: &str) -> Result<Vec<String>> {
        self.with_read_scope(|_scope| {
            let mut stmt =
                self.conn.prepare("SELECT full_name FROM links WHERE target = ?1")?;
            let names = stmt
                .query_map([target], |row| row.get(0))?
                .collect::<std::result::Result<_, _>>()?;
            Ok(names)
        })
        .map_err(Error::link_graph)
    }

    /// Remove all outgoing edges of a document
    pub fn delete_links(&self, doc_id: i64) -> Result<()> {
        self.with_scope(|scope| self.delete_links_in(doc_id, scope)).map_err(Error::link_graph)
    }

    pub(crate) fn delete_links_in(&self, doc_id: i64, _scope: &Scope) -> Result<()> {
        self.conn.execute("DELETE FROM links WHERE doc_id = ?1", [doc_id])?;
        Ok(())
    }

    // ========== Lock Operations ==========

    /// The lock held on a document, if any; absent means unlocked
    pub fn load_lock(&self, doc_id: i64) -> Result<Option<Lock>> {
        self.with_read_scope(|_scope| {
            let lock: Option<(String, DateTime<Utc>)> = self
                .conn
                .query_row(
                    "SELECT owner, date FROM locks WHERE doc_id = ?1",
                    [doc_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            Ok(lock.map(|(owner, date)| Lock { doc_id, owner, date }))
        })
        .map_err(Error::lock)
    }

    /// Insert or update the lock row for a document
    pub fn save_lock(&self, lock: &Lock) -> Result<()> {
        self.with_scope(|_scope| {
            let existing: Option<i64> = self
                .conn
                .query_row("SELECT doc_id FROM locks WHERE doc_id = ?1", [lock.doc_id], |row| {
                    row.get(0)
                })
                .optional()?;
            if existing.is_none() {
                self.conn.execute(
                    "INSERT INTO locks (doc_id, owner, date) VALUES (?1, ?2, ?3)",
                    params![lock.doc_id, lock.owner, lock.date],
                )?;
            } else {
                self.conn.execute(
                    "UPDATE locks SET owner = ?2, date = ?3 WHERE doc_id = ?1",
                    params![lock.doc_id, lock.owner, lock.date],
                )?;
            }
            Ok(())
        })
        .map_err(Error::lock)
    }

    /// Release the lock on a document
    pub fn delete_lock(&self, doc_id: i64) -> Result<()> {
        self.with_scope(|scope| self.delete_lock_in(doc_id, scope)).map_err(Error::lock)
    }

    pub(crate) fn delete_lock_in(&self, doc_id: i64, _scope: &Scope) -> Result<()> {
        self.conn.execute("DELETE FROM locks WHERE doc_id = ?1", [doc_id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::services::Renderer;

    fn store() -> DocumentStore {
        DocumentStore::open_in_memory(StoreConfig::default()).unwrap()
    }

    #[test]
    fn test_backlinks_scenario() {
        // save A linking to B and C; B's backlinks list A; deleting A
        // empties them
        let store = store();
        let mut doc = Document::new("Space", "A");
        doc.set_content("see [[B]] and [[C]]");
        store.save_document(&mut doc).unwrap();

        assert_eq!(store.load_backlinks("B").unwrap(), ["Space.A"]);
        assert_eq!(store.load_backlinks("C").unwrap(), ["Space.A"]);
        assert_eq!(store.load_links(doc.id()).unwrap().len(), 2);

        store.delete_document(&mut doc).unwrap();
        assert!(store.load_backlinks("B").unwrap().is_empty());
    }

    #[test]
    fn test_links_regenerate_on_save() {
        let store = store();
        let mut doc = Document::new("Space", "A");
        doc.set_content("[[B]]");
        store.save_document(&mut doc).unwrap();

        doc.set_content("[[C]] only now, twice: [[C]]");
        store.save_document(&mut doc).unwrap();

        let links = store.load_links(doc.id()).unwrap();
        let targets: Vec<&str> = links.iter().map(|l| l.target.as_str()).collect();
        assert_eq!(targets, ["C"]);
    }

    #[test]
    fn test_render_failure_is_swallowed() {
        struct FailingRenderer;
        impl Renderer for FailingRenderer {
            fn render(&self, _: &str, _: &Document, _: &Document) -> Result<()> {
                Err(Error::MappingInjection("render exploded".to_string()))
            }
        }

        let store = store().with_renderer(Box::new(FailingRenderer));
        let mut doc = Document::new("Space", "A");
        doc.set_content("[[B]]");
        store.save_document(&mut doc).unwrap();
        assert!(store.load_links(doc.id()).unwrap().is_empty());
    }

    #[test]
    fn test_lock_scenario() {
        let store = store();
        assert!(store.load_lock(7).unwrap().is_none());

        store.save_lock(&Lock::new(7, "alice")).unwrap();
        let lock = store.load_lock(7).unwrap().unwrap();
        assert_eq!(lock.owner, "alice");

        // upsert keeps a single row per document
        store.save_lock(&Lock::new(7, "bob")).unwrap();
        let lock = store.load_lock(7).unwrap().unwrap();
        assert_eq!(lock.owner, "bob");

        store.delete_lock(7).unwrap();
        assert!(store.load_lock(7).unwrap().is_none());
    }
}

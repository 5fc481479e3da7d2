//! Collaborator contracts the persistence engine calls out to.
//!
//! The engine owns none of these concerns; each trait is the narrow seam to
//! an external subsystem, with a minimal default implementation.

use crate::document::Document;
use crate::link::record_link;
use crate::Result;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;

/// Versioning/archive store keeping historical document revisions.
pub trait Versioning: Send {
    fn has_versioning(&self, full_name: &str) -> bool;

    /// Record a new revision from the serialized document snapshot
    fn update_archive(&self, doc: &Document, serialized: &str, minor_edit: bool) -> Result<()>;

    /// Persist an in-memory archive handle as-is
    fn save_archive(&self, full_name: &str, archive: &str, minor_edit: bool) -> Result<()>;

    /// Fetch the current archive for a document, if one exists
    fn load_archive(&self, doc: &Document) -> Result<Option<String>>;
}

/// Versioning disabled: nothing is archived.
pub struct NullVersioning;

impl Versioning for NullVersioning {
    fn has_versioning(&self, _full_name: &str) -> bool {
        false
    }

    fn update_archive(&self, _doc: &Document, _serialized: &str, _minor_edit: bool) -> Result<()> {
        Ok(())
    }

    fn save_archive(&self, _full_name: &str, _archive: &str, _minor_edit: bool) -> Result<()> {
        Ok(())
    }

    fn load_archive(&self, _doc: &Document) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Keeps the latest archive per document in memory. Suitable for tests and
/// single-process deployments without a revision store.
#[derive(Default)]
pub struct InMemoryVersioning {
    archives: Mutex<HashMap<String, String>>,
}

impl InMemoryVersioning {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Versioning for InMemoryVersioning {
    fn has_versioning(&self, _full_name: &str) -> bool {
        true
    }

    fn update_archive(&self, doc: &Document, serialized: &str, _minor_edit: bool) -> Result<()> {
        self.archives
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(doc.full_name(), serialized.to_string());
        Ok(())
    }

    fn save_archive(&self, full_name: &str, archive: &str, _minor_edit: bool) -> Result<()> {
        self.archives
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(full_name.to_string(), archive.to_string());
        Ok(())
    }

    fn load_archive(&self, doc: &Document) -> Result<Option<String>> {
        let archives = self.archives.lock().unwrap_or_else(|e| e.into_inner());
        Ok(archives.get(&doc.full_name()).cloned())
    }
}

/// Rendering engine. Rendering document content reports every outbound link
/// target through [`crate::link::record_link`] as a side effect.
pub trait Renderer: Send {
    fn render(&self, content: &str, doc: &Document, target: &Document) -> Result<()>;
}

/// Default renderer: scans wiki-style links (`[[Target]]`,
/// `[[label>>Target]]`) without evaluating any markup.
pub struct WikiLinkRenderer {
    link_re: Regex,
}

impl WikiLinkRenderer {
    pub fn new() -> Self {
        Self {
            link_re: Regex::new(r"\[\[([^\[\]]+)\]\]").expect("link pattern is valid"),
        }
    }
}

impl Default for WikiLinkRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for WikiLinkRenderer {
    fn render(&self, content: &str, _doc: &Document, _target: &Document) -> Result<()> {
        for capture in self.link_re.captures_iter(content) {
            let inner = capture[1].trim();
            // [[label>>Target]] carries the target after the marker
            let target = inner.rsplit_once(">>").map_or(inner, |(_, t)| t).trim();
            if !target.is_empty() {
                record_link(target);
            }
        }
        Ok(())
    }
}

/// Rights/authorization service consulted when filtering search results.
pub trait Rights: Send {
    fn check_access(&self, action: &str, doc: &Document) -> bool;
}

/// Grants every access.
pub struct AllowAllRights;

impl Rights for AllowAllRights {
    fn check_access(&self, _action: &str, _doc: &Document) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{clear_discovered_links, take_discovered_links};

    #[test]
    fn test_wiki_link_renderer() {
        clear_discovered_links();
        let doc = Document::new("Space", "A");
        let renderer = WikiLinkRenderer::new();
        renderer
            .render("see [[B]] and [[the ledger>>Ledger.001]], not [[ ]]", &doc, &doc)
            .unwrap();
        assert_eq!(take_discovered_links(), ["B", "Ledger.001"]);
    }

    #[test]
    fn test_in_memory_versioning_roundtrip() {
        let versioning = InMemoryVersioning::new();
        let doc = Document::new("Space", "A");
        versioning.update_archive(&doc, "rev-1", false).unwrap();
        assert_eq!(versioning.load_archive(&doc).unwrap().as_deref(), Some("rev-1"));
    }
}

//! Link edges - the outbound reference graph of a document.
//!
//! Edges are regenerated wholesale on every document save. The rendering
//! collaborator reports targets into a thread-local accumulator as a side
//! effect; the link store drains it afterwards.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;

/// A directed edge from a document to a target name.
///
/// `full_name` denormalizes the source document name so backlink queries
/// can answer without a join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub doc_id: i64,
    pub target: String,
    pub full_name: String,
}

impl Link {
    pub fn new(doc_id: i64, target: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self { doc_id, target: target.into(), full_name: full_name.into() }
    }
}

thread_local! {
    static DISCOVERED_LINKS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Report a link target discovered while rendering document content.
/// Called by `Renderer` implementations.
pub fn record_link(target: impl Into<String>) {
    DISCOVERED_LINKS.with(|links| links.borrow_mut().push(target.into()));
}

/// Drop any accumulated targets from a previous rendering pass.
pub fn clear_discovered_links() {
    DISCOVERED_LINKS.with(|links| links.borrow_mut().clear());
}

/// Drain the accumulated targets.
pub fn take_discovered_links() -> Vec<String> {
    DISCOVERED_LINKS.with(|links| links.take())
}

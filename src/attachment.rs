//! Attachments - binary payloads owned by a document.

use crate::ident;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A binary attachment, identified by (owning document, filename).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Full name of the owning document; set when added to a document
    pub doc_full_name: String,
    pub filename: String,
    pub author: String,
    pub date: DateTime<Utc>,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            doc_full_name: String::new(),
            filename: filename.into(),
            author: String::new(),
            date: Utc::now(),
            content,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn id(&self) -> i64 {
        ident::attachment_id(&self.doc_full_name, &self.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_follows_owner() {
        let mut a = Attachment::new("report.pdf", vec![1, 2, 3]);
        a.doc_full_name = "Ledger.001".to_string();
        let mut b = a.clone();
        b.doc_full_name = "Ledger.002".to_string();
        assert_ne!(a.id(), b.id());
    }
}

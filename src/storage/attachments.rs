//! Attachment persistence - the binary payloads owned by documents.

use crate::attachment::Attachment;
use crate::document::Document;
use crate::storage::store::{DocumentStore, Scope};
use crate::{Error, Result};
use rusqlite::{params, OptionalExtension};

impl DocumentStore {
    // ========== Attachment Operations ==========

    pub(crate) fn load_attachment_list_in(&self, doc: &mut Document, _scope: &Scope) -> Result<()> {
        let mut stmt = self.conn.prepare(
            "SELECT filename, author, date, content FROM attachments WHERE doc_id = ?1 ORDER BY filename",
        )?;
        let full_name = doc.full_name();
        let attachments: Vec<Attachment> = stmt
            .query_map([doc.id()], |row| {
                Ok(Attachment {
                    doc_full_name: full_name.clone(),
                    filename: row.get(0)?,
                    author: row.get(1)?,
                    date: row.get(2)?,
                    content: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;
        drop(stmt);
        doc.attachments = attachments;
        Ok(())
    }

    pub(crate) fn save_attachment_list_in(&self, doc: &Document, scope: &Scope) -> Result<()> {
        for attachment in &doc.attachments {
            self.save_attachment_in(attachment, doc.id(), scope)?;
        }
        Ok(())
    }

    pub(crate) fn save_attachment_in(
        &self,
        attachment: &Attachment,
        doc_id: i64,
        _scope: &Scope,
    ) -> Result<()> {
        let id = attachment.id();
        let existing: Option<i64> = self
            .conn
            .query_row("SELECT id FROM attachments WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        if existing.is_none() {
            self.conn.execute(
                "INSERT INTO attachments (id, doc_id, filename, author, date, content) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    doc_id,
                    attachment.filename,
                    attachment.author,
                    attachment.date,
                    attachment.content
                ],
            )?;
        } else {
            self.conn.execute(
                "UPDATE attachments SET doc_id = ?2, filename = ?3, author = ?4, date = ?5, \
                 content = ?6 WHERE id = ?1",
                params![
                    id,
                    doc_id,
                    attachment.filename,
                    attachment.author,
                    attachment.date,
                    attachment.content
                ],
            )?;
        }
        Ok(())
    }

    /// Save one attachment. With `parent_update`, the owning document's
    /// metadata is re-saved in the same unit of work.
    pub fn save_attachment(
        &self,
        attachment: &Attachment,
        doc: &mut Document,
        parent_update: bool,
    ) -> Result<()> {
        let full_name = doc.full_name();
        self.with_scope(|scope| {
            self.save_attachment_in(attachment, doc.id(), scope)?;
            if parent_update {
                self.save_document_in(doc, scope)?;
            }
            Ok(())
        })
        .map_err(|e| Error::document_save(&full_name, e))
    }

    /// Delete one attachment row and detach it from the document
    pub fn delete_attachment(&self, attachment: &Attachment, doc: &mut Document) -> Result<()> {
        let full_name = doc.full_name();
        self.with_scope(|scope| self.delete_attachment_in(attachment, scope))
            .map_err(|e| Error::document_delete(&full_name, e))?;
        doc.attachments.retain(|a| a.filename != attachment.filename);
        Ok(())
    }

    pub(crate) fn delete_attachment_in(
        &self,
        attachment: &Attachment,
        _scope: &Scope,
    ) -> Result<()> {
        self.conn.execute("DELETE FROM attachments WHERE id = ?1", [attachment.id()])?;
        Ok(())
    }
}

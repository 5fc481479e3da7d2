//! Search surface - ad hoc queries delegated to the backing engine through
//! a query-string interface. The engine owns no query planner; callers hand
//! over a where clause against the documents table.

use crate::document::Document;
use crate::storage::store::DocumentStore;
use crate::{Error, Result};

impl DocumentStore {
    // ========== Search Operations ==========

    /// Full names of documents matching a caller-supplied where clause
    pub fn search_documents_names(
        &self,
        where_sql: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<String>> {
        self.with_read_scope(|_scope| {
            let sql = format!(
                "SELECT DISTINCT space, name FROM documents{}{}",
                where_clause(where_sql),
                limit_clause(limit, offset)
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let names = stmt
                .query_map([], |row| {
                    Ok(format!("{}.{}", row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<std::result::Result<_, _>>()?;
            Ok(names)
        })
        .map_err(|e| Error::search(where_sql, e))
    }

    /// Documents matching a caller-supplied where clause, fully loaded.
    ///
    /// With `check_rights`, each hit is filtered through the rights
    /// collaborator's view access. With `with_custom_mappings`, every known
    /// custom mapping is injected first so custom-mapped objects load.
    pub fn search_documents(
        &self,
        where_sql: &str,
        distinct_by_language: bool,
        with_custom_mappings: bool,
        check_rights: bool,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Document>> {
        if with_custom_mappings {
            self.inject_all_custom_mappings().map_err(|e| Error::search(where_sql, e))?;
        }

        let rows: Vec<(String, String, String)> = self
            .with_read_scope(|_scope| {
                let columns = if distinct_by_language {
                    "SELECT DISTINCT space, name, language"
                } else {
                    "SELECT DISTINCT space, name, ''"
                };
                let sql = format!(
                    "{} FROM documents{}{}",
                    columns,
                    where_clause(where_sql),
                    limit_clause(limit, offset)
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                    .collect::<std::result::Result<_, _>>()?;
                Ok(rows)
            })
            .map_err(|e| Error::search(where_sql, e))?;

        let mut documents = Vec::new();
        for (space, name, language) in rows {
            let mut doc = Document::new(space, name);
            if check_rights && !self.rights.check_access("view", &doc) {
                continue;
            }
            doc.language = language;
            self.load_document(&mut doc)?;
            documents.push(doc);
        }
        Ok(documents)
    }

    /// Names of every document that defines a class
    pub fn get_class_list(&self) -> Result<Vec<String>> {
        self.with_read_scope(|_scope| {
            let mut stmt = self.conn.prepare(
                "SELECT full_name FROM documents \
                 WHERE class_json IS NOT NULL AND class_json <> ''",
            )?;
            let mut names: Vec<String> = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<_, _>>()?;
            drop(stmt);

            if self.config.class_tables_read {
                let mut stmt = self.conn.prepare("SELECT name FROM classes")?;
                let table_names: Vec<String> = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<_, _>>()?;
                for name in table_names {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
            Ok(names)
        })
        .map_err(|e| Error::search("class list", e))
    }

    /// Language variants stored for a document
    pub fn get_translation_list(&self, doc: &Document) -> Result<Vec<String>> {
        self.with_read_scope(|_scope| {
            let mut stmt = self.conn.prepare(
                "SELECT language FROM documents \
                 WHERE space = ?1 AND name = ?2 AND language <> ''",
            )?;
            let languages = stmt
                .query_map([&doc.space, &doc.name], |row| row.get(0))?
                .collect::<std::result::Result<_, _>>()?;
            Ok(languages)
        })
        .map_err(|e| Error::search(&doc.full_name(), e))
    }
}

fn where_clause(where_sql: &str) -> String {
    let trimmed = where_sql.trim();
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.to_lowercase().starts_with("where") || trimmed.starts_with(',') {
        format!(" {}", trimmed)
    } else {
        format!(" WHERE {}", trimmed)
    }
}

fn limit_clause(limit: usize, offset: usize) -> String {
    if limit == 0 && offset == 0 {
        String::new()
    } else if limit == 0 {
        format!(" LIMIT -1 OFFSET {}", offset)
    } else {
        format!(" LIMIT {} OFFSET {}", limit, offset)
    }
}

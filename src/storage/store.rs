//! The document store: connection ownership, transaction scopes, collaborator
//! wiring and custom mapping injection.
//!
//! Every repository operation either owns a unit of work (commit on success,
//! rollback on failure, release on every exit path) or borrows the ambient
//! one through a [`Scope`] reference and only executes statements.

use crate::class::ClassDef;
use crate::config::StoreConfig;
use crate::document::Document;
use crate::services::{AllowAllRights, NullVersioning, Renderer, Rights, Versioning, WikiLinkRenderer};
use crate::storage::mapping::{CustomMapping, MappingRegistry};
use crate::storage::schema;
use crate::{Error, Result};
use rusqlite::Connection;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// A unit-of-work handle. Owning scopes were opened by the current
/// operation; ambient scopes borrow an ancestor's open transaction and must
/// never commit or close it.
pub(crate) struct Scope {
    owns: bool,
}

impl Scope {
    /// Borrow the transaction an ancestor operation already holds open
    pub(crate) fn ambient() -> Scope {
        Scope { owns: false }
    }
}

/// Cached identity row of a loaded object.
#[derive(Debug, Clone)]
pub(crate) struct ObjectRow {
    pub name: String,
    pub class_name: String,
    pub number: i32,
}

/// SQLite-backed store for documents, classes, objects and their auxiliary
/// relations.
pub struct DocumentStore {
    pub(crate) conn: Connection,
    pub(crate) config: StoreConfig,
    base_dir: Option<PathBuf>,
    registry: Mutex<MappingRegistry>,
    pub(crate) versioning: Box<dyn Versioning>,
    pub(crate) renderer: Box<dyn Renderer>,
    pub(crate) rights: Box<dyn Rights>,
    object_cache: RefCell<HashMap<i64, ObjectRow>>,
}

impl DocumentStore {
    /// Open a database file (creates if it doesn't exist)
    pub fn open(path: &Path, config: StoreConfig) -> Result<Self> {
        let conn = Connection::open(path)?;
        let base_dir = path.parent().map(Path::to_path_buf);
        Self::build(conn, config, base_dir)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(config: StoreConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::build(conn, config, None)
    }

    fn build(conn: Connection, config: StoreConfig, base_dir: Option<PathBuf>) -> Result<Self> {
        let registry = Mutex::new(MappingRegistry::new(config.dynamic_custom_mappings));
        let store = Self {
            conn,
            config,
            base_dir,
            registry,
            versioning: Box::new(NullVersioning),
            renderer: Box::new(WikiLinkRenderer::new()),
            rights: Box::new(AllowAllRights),
            object_cache: RefCell::new(HashMap::new()),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the base database schema
    fn initialize_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    pub fn with_versioning(mut self, versioning: Box<dyn Versioning>) -> Self {
        self.versioning = versioning;
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_rights(mut self, rights: Box<dyn Rights>) -> Self {
        self.rights = rights;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn wiki(&self) -> &str {
        &self.config.wiki
    }

    // ========== Transaction Coordination ==========

    /// Open an owning unit of work
    pub(crate) fn begin(&self) -> Result<Scope> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Scope { owns: true })
    }

    /// Close an owning scope; ambient scopes pass through untouched
    pub(crate) fn end(&self, scope: Scope, commit: bool) -> Result<()> {
        if !scope.owns {
            return Ok(());
        }
        self.conn.execute_batch(if commit { "COMMIT" } else { "ROLLBACK" })?;
        Ok(())
    }

    /// Best-effort rollback on a failure path. Release failures are logged
    /// and swallowed so they never mask the primary error.
    pub(crate) fn release(&self, scope: Scope) {
        if scope.owns {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                debug!(error = %e, "transaction release failed");
            }
        }
    }

    /// Run a write operation inside its own unit of work
    pub(crate) fn with_scope<T>(&self, op: impl FnOnce(&Scope) -> Result<T>) -> Result<T> {
        let scope = self.begin()?;
        match op(&scope) {
            Ok(value) => {
                self.end(scope, true)?;
                Ok(value)
            }
            Err(e) => {
                self.release(scope);
                Err(e)
            }
        }
    }

    /// Run a read operation inside its own unit of work; nothing commits
    pub(crate) fn with_read_scope<T>(&self, op: impl FnOnce(&Scope) -> Result<T>) -> Result<T> {
        let scope = self.begin()?;
        let result = op(&scope);
        self.release(scope);
        result
    }

    // ========== Object Identity Cache ==========

    pub(crate) fn cache_object_row(&self, id: i64, row: ObjectRow) {
        self.object_cache.borrow_mut().insert(id, row);
    }

    pub(crate) fn cached_object_row(&self, id: i64) -> Option<ObjectRow> {
        self.object_cache.borrow().get(&id).cloned()
    }

    /// Detach cached identity state so it cannot shadow a physical delete
    pub(crate) fn evict_object(&self, id: i64) {
        self.object_cache.borrow_mut().remove(&id);
    }

    // ========== Custom Mapping Injection ==========

    pub(crate) fn registry(&self) -> Result<MutexGuard<'_, MappingRegistry>> {
        self.registry
            .lock()
            .map_err(|_| Error::MappingInjection("mapping registry lock poisoned".to_string()))
    }

    /// Check a candidate mapping descriptor against a class without touching
    /// the registry
    pub fn is_custom_mapping_valid(&self, class: &ClassDef, descriptor: &str) -> bool {
        match CustomMapping::parse(&class.name, descriptor) {
            Ok(mapping) => MappingRegistry::validate(&class.name, &mapping, class),
            Err(_) => false,
        }
    }

    /// Inject one class's custom mapping into the registry and rebuild the
    /// physical schema. Returns whether a new fragment was merged.
    pub fn inject_custom_mapping(&self, class: &ClassDef) -> Result<bool> {
        let mut registry = self.registry()?;
        if !registry.inject(class)? {
            return Ok(false);
        }
        self.rebuild_schema(&registry)?;
        Ok(true)
    }

    /// Inject mappings for every object embedded in a document
    pub fn inject_custom_mappings(&self, doc: &Document) -> Result<bool> {
        if !self.config.dynamic_custom_mappings {
            return Ok(false);
        }

        let mut result = false;
        for slots in doc.objects().values() {
            for object in slots.iter().flatten() {
                let class = self.resolve_class(&object.class_name, Some(doc))?;
                if let Some(class) = class {
                    result |= self.inject_custom_mapping(&class)?;
                }
            }
        }
        Ok(result)
    }

    /// Eagerly inject every custom-mapped class known to the store: classes
    /// embedded in documents, plus the class tables when they are written to.
    pub fn inject_all_custom_mappings(&self) -> Result<bool> {
        if !self.config.dynamic_custom_mappings {
            return Ok(false);
        }

        let mut result = false;
        let mut stmt = self.conn.prepare(
            "SELECT class_json FROM documents WHERE class_json IS NOT NULL AND class_json <> ''",
        )?;
        let class_docs: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        drop(stmt);

        for json in class_docs {
            let class = ClassDef::from_canonical_json(&json)?;
            if !class.is_empty() && class.has_custom_mapping() {
                result |= self.inject_custom_mapping(&class)?;
            }
        }

        if self.config.class_tables_write {
            let mut stmt = self.conn.prepare(
                "SELECT name FROM classes WHERE custom_mapping IS NOT NULL AND custom_mapping <> ''",
            )?;
            let names: Vec<String> = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<_, _>>()?;
            drop(stmt);

            for name in names {
                let mut class = ClassDef::new(name);
                let found = self.with_read_scope(|scope| self.load_class_in(&mut class, scope))?;
                if found {
                    result |= self.inject_custom_mapping(&class)?;
                }
            }
        }
        Ok(result)
    }

    /// Property names handled by a class's custom mapping, if any
    pub fn custom_mapping_property_list(&self, class: &ClassDef) -> Result<Vec<String>> {
        let registry = self.registry()?;
        Ok(registry
            .mapping_for(class)?
            .map(|m| m.handled_properties())
            .unwrap_or_default())
    }

    /// The mapping in effect for a class during object persistence, or
    /// `None` when custom mappings are disabled or the class has none
    pub(crate) fn active_mapping(&self, class: &ClassDef) -> Result<Option<CustomMapping>> {
        if !self.config.custom_mappings {
            return Ok(None);
        }
        let registry = self.registry()?;
        registry.mapping_for(class)
    }

    /// Apply every registered fragment's DDL to the live connection. The
    /// connection itself is carried over; only mapping metadata changes.
    fn rebuild_schema(&self, registry: &MappingRegistry) -> Result<()> {
        for fragment in registry.fragments() {
            self.conn
                .execute(&fragment.create_table_sql(), [])
                .map_err(|e| Error::MappingInjection(e.to_string()))?;
        }
        Ok(())
    }

    // ========== Wiki Databases ==========

    /// Create a new wiki database file next to this store's database and
    /// initialize the default tables.
    pub fn create_wiki(&self, name: &str) -> Result<()> {
        let fail = |reason: String| Error::CreateDatabase { wiki: name.to_string(), reason };

        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(fail("wiki names must be alphanumeric".to_string()));
        }
        let Some(dir) = &self.base_dir else {
            return Err(fail("store has no base directory".to_string()));
        };

        let path = dir.join(format!("{}.db", name));
        let conn = Connection::open(&path).map_err(|e| fail(e.to_string()))?;
        for stmt in schema::all_schema_statements() {
            conn.execute(stmt, []).map_err(|e| fail(e.to_string()))?;
        }
        Ok(())
    }
}

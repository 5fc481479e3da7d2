//! Database schema definitions - the base (static) relational mapping.
//!
//! Custom-mapped class tables (`xcustom_*`) are not listed here; the
//! mapping registry creates them when a mapping is injected.

/// SQL to create the documents table
pub const CREATE_DOCUMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY,
    full_name TEXT NOT NULL,
    space TEXT NOT NULL,
    name TEXT NOT NULL,
    wiki TEXT NOT NULL DEFAULT '',
    language TEXT NOT NULL DEFAULT '',
    parent TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL DEFAULT '',
    author TEXT NOT NULL DEFAULT '',
    content_author TEXT NOT NULL DEFAULT '',
    creation_date TEXT NOT NULL,
    date TEXT NOT NULL,
    content_update_date TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 0,
    class_json TEXT,
    has_attachments INTEGER NOT NULL DEFAULT 0,
    has_objects INTEGER NOT NULL DEFAULT 0
)
"#;

/// SQL to create the objects table.
/// The owner name matches case-insensitively, as the engines this layout
/// came from do; loaders must re-check exact ownership.
pub const CREATE_OBJECTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS objects (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL COLLATE NOCASE,
    class_name TEXT NOT NULL,
    number INTEGER NOT NULL
)
"#;

/// SQL to create the polymorphic property base table.
/// The kind column tags which value table holds the payload.
pub const CREATE_PROPERTIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS properties (
    id INTEGER NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    PRIMARY KEY (id, name)
)
"#;

/// SQL to create the property value tables, one per representation
pub const CREATE_VALUE_TABLES: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS string_properties (
    id INTEGER NOT NULL,
    name TEXT NOT NULL,
    value TEXT,
    PRIMARY KEY (id, name)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS text_properties (
    id INTEGER NOT NULL,
    name TEXT NOT NULL,
    value TEXT,
    PRIMARY KEY (id, name)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS number_properties (
    id INTEGER NOT NULL,
    name TEXT NOT NULL,
    value REAL,
    PRIMARY KEY (id, name)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS date_properties (
    id INTEGER NOT NULL,
    name TEXT NOT NULL,
    value TEXT,
    PRIMARY KEY (id, name)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS boolean_properties (
    id INTEGER NOT NULL,
    name TEXT NOT NULL,
    value INTEGER,
    PRIMARY KEY (id, name)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS list_items (
    id INTEGER NOT NULL,
    name TEXT NOT NULL,
    position INTEGER NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (id, name, position)
)
"#,
];

/// SQL to create the classes table
pub const CREATE_CLASSES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS classes (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    custom_class TEXT NOT NULL DEFAULT '',
    custom_mapping TEXT
)
"#;

/// SQL to create the class field declaration tables.
/// Declarations span a base row and a meta row, the same split the
/// property tables use.
pub const CREATE_CLASS_PROPERTY_TABLES: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS class_properties (
    id INTEGER NOT NULL,
    name TEXT NOT NULL,
    position INTEGER NOT NULL,
    kind TEXT NOT NULL,
    PRIMARY KEY (id, name)
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS class_field_meta (
    id INTEGER NOT NULL,
    name TEXT NOT NULL,
    pretty_name TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (id, name)
)
"#,
];

/// SQL to create the links table
pub const CREATE_LINKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS links (
    doc_id INTEGER NOT NULL,
    target TEXT NOT NULL,
    full_name TEXT NOT NULL,
    PRIMARY KEY (doc_id, target)
)
"#;

/// SQL to create the locks table
pub const CREATE_LOCKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS locks (
    doc_id INTEGER PRIMARY KEY,
    owner TEXT NOT NULL,
    date TEXT NOT NULL
)
"#;

/// SQL to create the attachments table
pub const CREATE_ATTACHMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS attachments (
    id INTEGER PRIMARY KEY,
    doc_id INTEGER NOT NULL,
    filename TEXT NOT NULL,
    author TEXT NOT NULL DEFAULT '',
    date TEXT NOT NULL,
    content BLOB NOT NULL
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_documents_full_name ON documents(full_name)",
    "CREATE INDEX IF NOT EXISTS idx_documents_space ON documents(space, name)",
    "CREATE INDEX IF NOT EXISTS idx_objects_name ON objects(name)",
    "CREATE INDEX IF NOT EXISTS idx_objects_class ON objects(class_name)",
    "CREATE INDEX IF NOT EXISTS idx_links_target ON links(target)",
    "CREATE INDEX IF NOT EXISTS idx_attachments_doc ON attachments(doc_id)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_DOCUMENTS_TABLE,
        CREATE_OBJECTS_TABLE,
        CREATE_PROPERTIES_TABLE,
        CREATE_CLASSES_TABLE,
        CREATE_LINKS_TABLE,
        CREATE_LOCKS_TABLE,
        CREATE_ATTACHMENTS_TABLE,
    ];
    stmts.extend(CREATE_VALUE_TABLES.iter().copied());
    stmts.extend(CREATE_CLASS_PROPERTY_TABLES.iter().copied());
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}

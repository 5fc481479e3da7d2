//! # Folio - Typed Document Persistence Engine
//!
//! Semi-structured documents with user-defined schemas, persisted relationally.
//!
//! Folio provides:
//! - Documents with versioned content, embedded schemas and attachments
//! - Classes (ordered sets of typed field declarations) and objects
//!   (named, numbered property bags instantiating a class)
//! - SQLite-backed repositories with transaction-scoped save/load/delete
//! - Runtime-injectable per-class custom table mappings
//! - Link-graph and lock maintenance per document

pub mod ident;
pub mod property;
pub mod class;
pub mod object;
pub mod document;
pub mod attachment;
pub mod link;
pub mod lock;
pub mod services;
pub mod storage;
pub mod config;

// Re-exports for convenient access
pub use property::{Property, PropertyKind, PropertyValue};
pub use class::{ClassDef, FieldDef};
pub use object::DataObject;
pub use document::Document;
pub use attachment::Attachment;
pub use link::Link;
pub use lock::Lock;
pub use storage::DocumentStore;
pub use config::StoreConfig;

/// Result type alias for Folio operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Folio operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("existence check failed for document {document}: {source}")]
    ExistsCheck {
        document: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to save document {document}: {source}")]
    DocumentSave {
        document: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to load document {document}: {source}")]
    DocumentLoad {
        document: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to delete document {document}: {source}")]
    DocumentDelete {
        document: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to save object {object}: {source}")]
    ObjectSave {
        object: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to load object {object}: {source}")]
    ObjectLoad {
        object: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to delete object {object}: {source}")]
    ObjectDelete {
        object: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to save class {class}: {source}")]
    ClassSave {
        class: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to load class {class}: {source}")]
    ClassLoad {
        class: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to save property {property} of object {object}: {source}")]
    PropertySave {
        object: String,
        property: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to load property {property} of object {object}: {source}")]
    PropertyLoad {
        object: String,
        property: String,
        #[source]
        source: Box<Error>,
    },

    #[error("field {field} in object {object} has an invalid name")]
    InvalidFieldName { field: String, object: String },

    #[error("invalid custom mapping for class {class}: {reason}")]
    InvalidMapping { class: String, reason: String },

    #[error("mapping injection failed: {0}")]
    MappingInjection(String),

    #[error("cannot delete document {0}: it was never loaded through a store")]
    StoreNotBound(String),

    #[error("lock store error: {source}")]
    Lock {
        #[source]
        source: Box<Error>,
    },

    #[error("link graph error: {source}")]
    LinkGraph {
        #[source]
        source: Box<Error>,
    },

    #[error("search failed for query {query}: {source}")]
    Search {
        query: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to create database for wiki {wiki}: {reason}")]
    CreateDatabase { wiki: String, reason: String },

    #[error("unknown property kind: {0}")]
    UnknownKind(String),

    #[error("unknown column type: {0}")]
    UnknownColumnType(String),
}

impl Error {
    pub(crate) fn exists_check(document: &str, source: Error) -> Error {
        Error::ExistsCheck { document: document.to_string(), source: Box::new(source) }
    }

    pub(crate) fn document_save(document: &str, source: Error) -> Error {
        Error::DocumentSave { document: document.to_string(), source: Box::new(source) }
    }

    pub(crate) fn document_load(document: &str, source: Error) -> Error {
        Error::DocumentLoad { document: document.to_string(), source: Box::new(source) }
    }

    pub(crate) fn document_delete(document: &str, source: Error) -> Error {
        Error::DocumentDelete { document: document.to_string(), source: Box::new(source) }
    }

    pub(crate) fn object_save(object: &str, source: Error) -> Error {
        Error::ObjectSave { object: object.to_string(), source: Box::new(source) }
    }

    pub(crate) fn object_load(object: &str, source: Error) -> Error {
        Error::ObjectLoad { object: object.to_string(), source: Box::new(source) }
    }

    pub(crate) fn object_delete(object: &str, source: Error) -> Error {
        Error::ObjectDelete { object: object.to_string(), source: Box::new(source) }
    }

    pub(crate) fn class_save(class: &str, source: Error) -> Error {
        Error::ClassSave { class: class.to_string(), source: Box::new(source) }
    }

    pub(crate) fn class_load(class: &str, source: Error) -> Error {
        Error::ClassLoad { class: class.to_string(), source: Box::new(source) }
    }

    pub(crate) fn property_save(object: &str, property: &str, source: Error) -> Error {
        Error::PropertySave {
            object: object.to_string(),
            property: property.to_string(),
            source: Box::new(source),
        }
    }

    pub(crate) fn property_load(object: &str, property: &str, source: Error) -> Error {
        Error::PropertyLoad {
            object: object.to_string(),
            property: property.to_string(),
            source: Box::new(source),
        }
    }

    pub(crate) fn lock(source: Error) -> Error {
        Error::Lock { source: Box::new(source) }
    }

    pub(crate) fn link_graph(source: Error) -> Error {
        Error::LinkGraph { source: Box::new(source) }
    }

    pub(crate) fn search(query: &str, source: Error) -> Error {
        Error::Search { query: query.to_string(), source: Box::new(source) }
    }
}

//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - documents(id, full_name, space, name, wiki, language, content, dates, version, class_json, flags)
//! - objects(id, name, class_name, number) + properties(id, name, kind) + per-kind value tables
//! - classes(id, name, custom_class, custom_mapping) + class_properties/class_field_meta
//! - links(doc_id, target, full_name), locks(doc_id, owner, date), attachments(id, doc_id, ...)
//! - one xcustom_* table per injected custom class mapping

pub mod schema;
pub mod store;
pub mod mapping;

mod documents;
mod objects;
mod classes;
mod attachments;
mod links;
mod search;

pub use store::DocumentStore;
pub use mapping::{ColumnMapping, ColumnType, CustomMapping, MappingRegistry};
pub use documents::{GROUP_CLASS, GROUP_MEMBER_FIELD};

//! Mapping registry - the base relational schema plus custom per-class
//! mappings injected at runtime.
//!
//! A custom mapping is an administrator-authored TOML descriptor attached to
//! a class. Injection parses the descriptor into a schema fragment named
//! deterministically from the class name, validates it against the class's
//! declared fields, merges it into the registry, and applies the DDL to the
//! live connection. The physical connection is carried over unchanged; only
//! mapping metadata is rebuilt.

use crate::class::ClassDef;
use crate::property::PropertyKind;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Native column types a custom mapping may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Text,
    Clob,
    Integer,
    Long,
    Float,
    Double,
    BigDecimal,
    BigInteger,
    YesNo,
    TrueFalse,
    Date,
    Time,
    Timestamp,
    Boolean,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Text => "text",
            ColumnType::Clob => "clob",
            ColumnType::Integer => "integer",
            ColumnType::Long => "long",
            ColumnType::Float => "float",
            ColumnType::Double => "double",
            ColumnType::BigDecimal => "big_decimal",
            ColumnType::BigInteger => "big_integer",
            ColumnType::YesNo => "yes_no",
            ColumnType::TrueFalse => "true_false",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Boolean => "boolean",
        }
    }

    /// SQLite type affinity used when creating the custom table
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer
            | ColumnType::Long
            | ColumnType::BigInteger
            | ColumnType::Boolean => "INTEGER",
            ColumnType::Float | ColumnType::Double | ColumnType::BigDecimal => "REAL",
            _ => "TEXT",
        }
    }
}

impl FromStr for ColumnType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "string" => Ok(ColumnType::String),
            "text" => Ok(ColumnType::Text),
            "clob" => Ok(ColumnType::Clob),
            "integer" => Ok(ColumnType::Integer),
            "long" => Ok(ColumnType::Long),
            "float" => Ok(ColumnType::Float),
            "double" => Ok(ColumnType::Double),
            "big_decimal" => Ok(ColumnType::BigDecimal),
            "big_integer" => Ok(ColumnType::BigInteger),
            "yes_no" => Ok(ColumnType::YesNo),
            "true_false" => Ok(ColumnType::TrueFalse),
            "date" => Ok(ColumnType::Date),
            "time" => Ok(ColumnType::Time),
            "timestamp" => Ok(ColumnType::Timestamp),
            "boolean" => Ok(ColumnType::Boolean),
            _ => Err(Error::UnknownColumnType(s.to_string())),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Column types acceptable for a given declared field kind.
/// Kinds without an entry are unrestricted.
fn allowed_column_types(kind: PropertyKind) -> Option<&'static [ColumnType]> {
    match kind {
        PropertyKind::String | PropertyKind::Text | PropertyKind::Password => {
            Some(&[ColumnType::String, ColumnType::Text, ColumnType::Clob])
        }
        PropertyKind::Number => Some(&[
            ColumnType::Integer,
            ColumnType::Long,
            ColumnType::Float,
            ColumnType::Double,
            ColumnType::BigDecimal,
            ColumnType::BigInteger,
            ColumnType::YesNo,
            ColumnType::TrueFalse,
        ]),
        PropertyKind::Date => Some(&[ColumnType::Date, ColumnType::Time, ColumnType::Timestamp]),
        PropertyKind::Boolean => Some(&[
            ColumnType::Boolean,
            ColumnType::YesNo,
            ColumnType::TrueFalse,
            ColumnType::Integer,
        ]),
        PropertyKind::List => None,
    }
}

/// One property-to-column mapping inside a custom mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub property: String,
    pub column: String,
    pub column_type: ColumnType,
}

/// A parsed custom mapping: an alternate table layout for one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomMapping {
    pub class_name: String,
    pub table: String,
    pub columns: Vec<ColumnMapping>,
}

#[derive(Deserialize)]
struct MappingDescriptor {
    #[serde(default, rename = "column")]
    columns: Vec<DescriptorColumn>,
}

#[derive(Deserialize)]
struct DescriptorColumn {
    property: String,
    column: Option<String>,
    #[serde(rename = "type")]
    column_type: String,
}

impl CustomMapping {
    /// The schema fragment identity for a class: always derived from the
    /// class name, so the same class maps to the same fragment.
    pub fn table_name(class_name: &str) -> String {
        let sanitized: String = class_name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("xcustom_{}", sanitized)
    }

    /// Parse a TOML mapping descriptor for the given class.
    pub fn parse(class_name: &str, descriptor: &str) -> Result<CustomMapping> {
        let invalid = |reason: String| Error::InvalidMapping {
            class: class_name.to_string(),
            reason,
        };

        let parsed: MappingDescriptor =
            toml::from_str(descriptor).map_err(|e| invalid(e.to_string()))?;
        if parsed.columns.is_empty() {
            return Err(invalid("mapping declares no columns".to_string()));
        }

        let mut columns = Vec::with_capacity(parsed.columns.len());
        for col in parsed.columns {
            let column_type = col
                .column_type
                .parse::<ColumnType>()
                .map_err(|e| invalid(e.to_string()))?;
            let column = col.column.unwrap_or_else(|| col.property.clone());
            columns.push(ColumnMapping { property: col.property, column, column_type });
        }

        Ok(CustomMapping {
            class_name: class_name.to_string(),
            table: Self::table_name(class_name),
            columns,
        })
    }

    /// Property names this mapping handles instead of the generic tables
    pub fn handled_properties(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.property.clone()).collect()
    }

    pub fn column_for(&self, property: &str) -> Option<&ColumnMapping> {
        self.columns.iter().find(|c| c.property == property)
    }

    /// DDL merging this fragment into the physical schema
    pub fn create_table_sql(&self) -> String {
        let mut cols = vec!["id INTEGER PRIMARY KEY".to_string()];
        cols.extend(
            self.columns
                .iter()
                .map(|c| format!("{} {}", c.column, c.column_type.sql_type())),
        );
        format!("CREATE TABLE IF NOT EXISTS {} ({})", self.table, cols.join(", "))
    }
}

/// Registry of injected schema fragments, one per custom-mapped class.
///
/// All mutation is serialised by the store behind a mutex; rebuilding
/// applies fragment DDL over the same live connection.
pub struct MappingRegistry {
    dynamic_enabled: bool,
    fragments: HashMap<String, CustomMapping>,
}

impl MappingRegistry {
    pub fn new(dynamic_enabled: bool) -> Self {
        Self { dynamic_enabled, fragments: HashMap::new() }
    }

    pub fn is_registered(&self, class_name: &str) -> bool {
        self.fragments.contains_key(class_name)
    }

    pub fn fragment(&self, class_name: &str) -> Option<&CustomMapping> {
        self.fragments.get(class_name)
    }

    pub fn fragments(&self) -> impl Iterator<Item = &CustomMapping> {
        self.fragments.values()
    }

    /// The active mapping for a class: the registered fragment, or the
    /// class's own descriptor parsed on the fly.
    pub fn mapping_for(&self, class: &ClassDef) -> Result<Option<CustomMapping>> {
        if let Some(fragment) = self.fragments.get(&class.name) {
            return Ok(Some(fragment.clone()));
        }
        match class.custom_mapping.as_deref() {
            Some(descriptor) if class.has_custom_mapping() => {
                Ok(Some(CustomMapping::parse(&class.name, descriptor)?))
            }
            _ => Ok(None),
        }
    }

    /// Check a candidate mapping against the class's declared fields.
    /// Diagnostics are logged, not thrown; the injection boundary turns a
    /// failed validation into a hard error.
    pub fn validate(class_name: &str, mapping: &CustomMapping, class_def: &ClassDef) -> bool {
        for col in &mapping.columns {
            let Some(field) = class_def.field(&col.property) else {
                warn!(class = class_name, property = %col.property,
                      "mapping contains invalid field name");
                return false;
            };
            if let Some(allowed) = allowed_column_types(field.kind) {
                if !allowed.contains(&col.column_type) {
                    warn!(class = class_name, property = %col.property,
                          column_type = %col.column_type,
                          "mapping contains invalid type in field");
                    return false;
                }
            }
        }
        true
    }

    /// Merge the class's custom mapping into the registry.
    ///
    /// Returns `true` when a new fragment was merged and the physical schema
    /// must be rebuilt; `false` when dynamic mappings are disabled, the class
    /// has no external mapping, or the fragment is already present.
    pub fn inject(&mut self, class: &ClassDef) -> Result<bool> {
        if !self.dynamic_enabled {
            return Ok(false);
        }
        let Some(descriptor) = class.custom_mapping.as_deref() else {
            return Ok(false);
        };
        if !class.has_custom_mapping() {
            return Ok(false);
        }
        if self.fragments.contains_key(&class.name) {
            // already present; nothing to merge
            return Ok(false);
        }

        let mapping = CustomMapping::parse(&class.name, descriptor)?;
        if !Self::validate(&class.name, &mapping, class) {
            return Err(Error::InvalidMapping {
                class: class.name.clone(),
                reason: "mapping references unknown fields or disallowed column types".to_string(),
            });
        }

        self.fragments.insert(class.name.clone(), mapping);
        Ok(true)
    }
}

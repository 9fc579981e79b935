//! Table and index schemas
//!
//! A [`DbSchema`] names every table and, for each table, every index: which
//! record field it reads, what kind of key it extracts, and whether keys are
//! unique. Tables and indexes are held in ordered maps so "the first table"
//! and "the first unique index" are deterministic.
//!
//! Each table needs a primary index. The index named [`ID_INDEX`] is primary
//! when it exists; otherwise the first unique index (by name) is.

use memtab_core::{FieldKind, IndexKind, Record, RecordShape};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Conventional name of the primary index
pub const ID_INDEX: &str = "id";

/// Definition of one index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    /// Index name, unique within its table
    pub name: String,
    /// Declared name of the record field the index reads
    pub field: String,
    /// Extraction kind
    pub kind: IndexKind,
    /// At most one record per key
    #[serde(default)]
    pub unique: bool,
    /// Records without a value for this index are accepted (not for primary indexes)
    #[serde(default)]
    pub allow_missing: bool,
}

impl IndexSchema {
    /// Non-unique index over `field`
    pub fn new(name: impl Into<String>, field: impl Into<String>, kind: IndexKind) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            kind,
            unique: false,
            allow_missing: false,
        }
    }

    /// Set uniqueness
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Set whether records may lack a value for this index
    pub fn allow_missing(mut self, allow: bool) -> Self {
        self.allow_missing = allow;
        self
    }
}

/// Definition of one table
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name
    pub name: String,
    /// Index name -> definition
    #[serde(default)]
    pub indexes: BTreeMap<String, IndexSchema>,
}

impl TableSchema {
    /// Table with no indexes yet
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexes: BTreeMap::new(),
        }
    }

    /// Add an index, keyed by its name
    pub fn with_index(mut self, index: IndexSchema) -> Self {
        self.indexes.insert(index.name.clone(), index);
        self
    }

    /// First index marked unique
    pub fn first_unique_index(&self) -> Option<&IndexSchema> {
        self.indexes.values().find(|idx| idx.unique)
    }

    /// Index that carries record identity
    pub fn primary_index(&self) -> Option<&IndexSchema> {
        match self.indexes.get(ID_INDEX) {
            Some(idx) if idx.unique => Some(idx),
            _ => self.first_unique_index(),
        }
    }
}

/// Definition of a whole store
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DbSchema {
    /// Table name -> definition
    #[serde(default)]
    pub tables: BTreeMap<String, TableSchema>,
}

impl DbSchema {
    /// Schema with no tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table, keyed by its name
    pub fn with_table(mut self, table: TableSchema) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// First table by name
    pub fn first_table(&self) -> Option<&TableSchema> {
        self.tables.values().next()
    }

    /// Check the schema is well formed and that every index can be built
    /// against `R`'s shape.
    pub fn validate<R: Record>(&self, shape: &RecordShape<R>) -> Result<(), SchemaError> {
        if !shape.is_record() {
            return Err(SchemaError::NotARecord {
                type_name: shape.type_name().to_string(),
            });
        }
        if self.tables.is_empty() {
            return Err(SchemaError::NoTables);
        }

        for (key, table) in &self.tables {
            if table.name.is_empty() {
                return Err(SchemaError::EmptyTableName);
            }
            if key != &table.name {
                return Err(SchemaError::TableNameMismatch {
                    key: key.clone(),
                    name: table.name.clone(),
                });
            }
            if table.indexes.is_empty() {
                return Err(SchemaError::NoIndexes {
                    table: table.name.clone(),
                });
            }
            let primary = table
                .primary_index()
                .ok_or_else(|| SchemaError::NoPrimaryIndex {
                    table: table.name.clone(),
                })?;
            if primary.allow_missing {
                return Err(SchemaError::PrimaryAllowsMissing {
                    table: table.name.clone(),
                    index: primary.name.clone(),
                });
            }

            for (ikey, index) in &table.indexes {
                if ikey != &index.name {
                    return Err(SchemaError::IndexNameMismatch {
                        table: table.name.clone(),
                        key: ikey.clone(),
                        name: index.name.clone(),
                    });
                }
                let field =
                    shape
                        .find_field(&index.field)
                        .ok_or_else(|| SchemaError::UnknownField {
                            table: table.name.clone(),
                            index: index.name.clone(),
                            field: index.field.clone(),
                        })?;
                if field.kind() != index.kind.field_kind() {
                    return Err(SchemaError::FieldKindMismatch {
                        table: table.name.clone(),
                        index: index.name.clone(),
                        field: index.field.clone(),
                        expected: index.kind,
                        actual: field.kind(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Reasons a store rejects its schema
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Record shape is not struct-like
    #[error("type {type_name} is not a record")]
    NotARecord {
        /// Offending type
        type_name: String,
    },
    /// Schema has no tables
    #[error("schema has no tables")]
    NoTables,
    /// Table with an empty name
    #[error("table name must not be empty")]
    EmptyTableName,
    /// Map key and table name differ
    #[error("table registered as {key:?} is named {name:?}")]
    TableNameMismatch {
        /// Map key
        key: String,
        /// Declared name
        name: String,
    },
    /// Table has no indexes
    #[error("table {table:?} has no indexes")]
    NoIndexes {
        /// Table name
        table: String,
    },
    /// Table has no unique index to identify records by
    #[error("table {table:?} has no unique index")]
    NoPrimaryIndex {
        /// Table name
        table: String,
    },
    /// Primary index may not allow missing values
    #[error("primary index {index:?} of table {table:?} cannot allow missing values")]
    PrimaryAllowsMissing {
        /// Table name
        table: String,
        /// Index name
        index: String,
    },
    /// Map key and index name differ
    #[error("index registered as {key:?} in table {table:?} is named {name:?}")]
    IndexNameMismatch {
        /// Table name
        table: String,
        /// Map key
        key: String,
        /// Declared name
        name: String,
    },
    /// Index reads a field the record does not have
    #[error("index {index:?} of table {table:?} reads unknown field {field:?}")]
    UnknownField {
        /// Table name
        table: String,
        /// Index name
        index: String,
        /// Field name
        field: String,
    },
    /// Index kind does not fit the field's kind
    #[error("index {index:?} of table {table:?} is a {expected} index but field {field:?} is {actual}")]
    FieldKindMismatch {
        /// Table name
        table: String,
        /// Index name
        index: String,
        /// Field name
        field: String,
        /// Index kind
        expected: IndexKind,
        /// Field kind
        actual: FieldKind,
    },
}

//! In-memory indexed store
//!
//! # Design
//!
//! - One `Table` per schema table. Rows live in a `BTreeMap<RowId, Arc<R>>`.
//! - Each index maps `IndexKey -> BTreeSet<RowId>`, so scans come out in
//!   key order.
//! - The whole table set sits behind one `parking_lot::RwLock`.
//!
//! # Thread Safety
//!
//! - Read transactions share the read guard. Many readers run at once.
//! - A write transaction holds the write guard for its whole life. Writers
//!   serialize against each other and against readers.
//! - Readers therefore never observe a partial write. An aborted write is
//!   rolled back from its undo log before the guard is released.
//!
//! Opening a second transaction on a thread that already holds one on the
//! same store deadlocks.

use crate::schema::{DbSchema, IndexSchema, SchemaError, TableSchema};
use crate::txn::{Txn, TxnError};
use memtab_core::{FieldDescriptor, IndexKey, Record, RecordShape};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub(crate) type RowId = u64;

/// Keys a record produces, per index name
pub(crate) type RecordKeys = BTreeMap<String, Vec<IndexKey>>;

pub(crate) struct Index<R> {
    pub(crate) schema: IndexSchema,
    field: FieldDescriptor<R>,
    pub(crate) entries: BTreeMap<IndexKey, BTreeSet<RowId>>,
}

impl<R: Record> Index<R> {
    fn keys_for(&self, table: &str, record: &R) -> Result<Vec<IndexKey>, TxnError> {
        let value = self.field.value(record);
        let keys = IndexKey::extract(self.schema.kind, &value).ok_or_else(|| {
            TxnError::FieldKindMismatch {
                field: self.schema.field.clone(),
                expected: self.schema.kind,
                actual: value.kind(),
            }
        })?;
        if keys.is_empty() && !self.schema.allow_missing {
            return Err(TxnError::MissingIndexValue {
                table: table.to_string(),
                index: self.schema.name.clone(),
            });
        }
        Ok(keys)
    }
}

pub(crate) struct Table<R> {
    pub(crate) name: String,
    pub(crate) primary: String,
    pub(crate) rows: BTreeMap<RowId, Arc<R>>,
    pub(crate) indexes: BTreeMap<String, Index<R>>,
    next_row: RowId,
}

impl<R: Record> Table<R> {
    fn build(schema: &TableSchema, shape: &RecordShape<R>) -> Result<Self, SchemaError> {
        let primary = schema
            .primary_index()
            .ok_or_else(|| SchemaError::NoPrimaryIndex {
                table: schema.name.clone(),
            })?
            .name
            .clone();

        let mut indexes = BTreeMap::new();
        for (name, index) in &schema.indexes {
            let field = shape
                .find_field(&index.field)
                .ok_or_else(|| SchemaError::UnknownField {
                    table: schema.name.clone(),
                    index: index.name.clone(),
                    field: index.field.clone(),
                })?
                .clone();
            indexes.insert(
                name.clone(),
                Index {
                    schema: index.clone(),
                    field,
                    entries: BTreeMap::new(),
                },
            );
        }

        Ok(Self {
            name: schema.name.clone(),
            primary,
            rows: BTreeMap::new(),
            indexes,
            next_row: 0,
        })
    }

    pub(crate) fn index(&self, name: &str) -> Result<&Index<R>, TxnError> {
        self.indexes.get(name).ok_or_else(|| TxnError::UnknownIndex {
            table: self.name.clone(),
            index: name.to_string(),
        })
    }

    /// Extract keys for every index of this table
    pub(crate) fn record_keys(&self, record: &R) -> Result<RecordKeys, TxnError> {
        let mut keys = BTreeMap::new();
        for (name, index) in &self.indexes {
            keys.insert(name.clone(), index.keys_for(&self.name, record)?);
        }
        Ok(keys)
    }

    /// Row currently holding the identity described by `keys`, if any
    pub(crate) fn find_existing(&self, keys: &RecordKeys) -> Result<Option<RowId>, TxnError> {
        let index = self.index(&self.primary)?;
        let mut found: Option<RowId> = None;
        for key in keys.get(&self.primary).into_iter().flatten() {
            if let Some(ids) = index.entries.get(key) {
                for id in ids {
                    match found {
                        None => found = Some(*id),
                        Some(prev) if prev == *id => {}
                        Some(_) => {
                            return Err(TxnError::UniqueViolation {
                                table: self.name.clone(),
                                index: self.primary.clone(),
                                key: key.clone(),
                            })
                        }
                    }
                }
            }
        }
        Ok(found)
    }

    /// Reject keys that a unique index already holds for a row other than `replacing`
    pub(crate) fn check_unique(
        &self,
        keys: &RecordKeys,
        replacing: Option<RowId>,
    ) -> Result<(), TxnError> {
        for (name, index) in &self.indexes {
            if !index.schema.unique {
                continue;
            }
            for key in keys.get(name).into_iter().flatten() {
                let taken = index
                    .entries
                    .get(key)
                    .map(|ids| ids.iter().any(|id| Some(*id) != replacing))
                    .unwrap_or(false);
                if taken {
                    return Err(TxnError::UniqueViolation {
                        table: self.name.clone(),
                        index: name.clone(),
                        key: key.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn allocate_row(&mut self) -> RowId {
        self.next_row += 1;
        self.next_row
    }

    pub(crate) fn insert_row(&mut self, id: RowId, record: Arc<R>, keys: RecordKeys) {
        for (name, index_keys) in keys {
            if let Some(index) = self.indexes.get_mut(&name) {
                for key in index_keys {
                    index.entries.entry(key).or_default().insert(id);
                }
            }
        }
        self.rows.insert(id, record);
    }

    pub(crate) fn remove_row(&mut self, id: RowId) -> Option<Arc<R>> {
        let record = self.rows.remove(&id)?;
        let table = self.name.clone();
        for index in self.indexes.values_mut() {
            let keys = index.keys_for(&table, &record).unwrap_or_default();
            for key in keys {
                if let Some(ids) = index.entries.get_mut(&key) {
                    ids.remove(&id);
                    if ids.is_empty() {
                        index.entries.remove(&key);
                    }
                }
            }
        }
        Some(record)
    }
}

pub(crate) type Tables<R> = BTreeMap<String, Table<R>>;

/// In-memory store of records of type `R`
///
/// # Example
///
/// ```ignore
/// let store = MemStore::<Person>::new(schema)?;
///
/// let mut txn = store.txn(true);
/// txn.insert("person", person)?;
/// txn.commit();
///
/// let txn = store.txn(false);
/// let found = txn.first("person", "id", &IndexKey::from("john@doe.com"))?;
/// ```
pub struct MemStore<R: Record> {
    schema: DbSchema,
    pub(crate) tables: RwLock<Tables<R>>,
    commits: AtomicU64,
}

impl<R: Record> MemStore<R> {
    /// Build an empty store for `schema`
    ///
    /// Fails when the schema is malformed or does not fit `R`'s shape.
    pub fn new(schema: DbSchema) -> Result<Self, SchemaError> {
        let shape = R::shape();
        schema.validate(&shape)?;

        let mut tables = BTreeMap::new();
        for (name, table) in &schema.tables {
            tables.insert(name.clone(), Table::build(table, &shape)?);
        }

        tracing::debug!(
            record = shape.type_name(),
            tables = tables.len(),
            "Created in-memory store"
        );

        Ok(Self {
            schema,
            tables: RwLock::new(tables),
            commits: AtomicU64::new(0),
        })
    }

    /// Schema the store was built from
    pub fn schema(&self) -> &DbSchema {
        &self.schema
    }

    /// Begin a transaction. `write` selects an exclusive write transaction.
    pub fn txn(&self, write: bool) -> Txn<'_, R> {
        if write {
            Txn::write(self, self.tables.write())
        } else {
            Txn::read(self, self.tables.read())
        }
    }

    /// Number of committed write transactions
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Acquire)
    }

    pub(crate) fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::AcqRel);
    }

    /// Number of records in `table`, 0 for unknown tables
    pub fn len(&self, table: &str) -> usize {
        self.tables
            .read()
            .get(table)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    /// True when `table` holds no records
    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }
}

impl<R: Record> fmt::Debug for MemStore<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemStore")
            .field("tables", &self.schema.tables.keys().collect::<Vec<_>>())
            .field("commits", &self.commit_count())
            .finish()
    }
}

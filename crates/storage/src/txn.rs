//! Transactions over a [`MemStore`]
//!
//! A [`Txn`] is either a shared read transaction or an exclusive write
//! transaction. Writes apply in place and record an undo entry. `commit`
//! keeps them. `abort`, or dropping the transaction uncommitted, replays the
//! undo log in reverse before the lock is released.

use crate::store::{MemStore, RowId, Tables};
use memtab_core::{FieldKind, IndexKey, IndexKind, Record};
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised inside a transaction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxnError {
    /// Table is not in the schema
    #[error("table {0:?} not found")]
    UnknownTable(String),

    /// Index is not defined on the table
    #[error("index {index:?} not found in table {table:?}")]
    UnknownIndex {
        /// Table name
        table: String,
        /// Index name
        index: String,
    },

    /// Record yields no key for an index that requires one
    #[error("record has no value for index {index:?} in table {table:?}")]
    MissingIndexValue {
        /// Table name
        table: String,
        /// Index name
        index: String,
    },

    /// Key already held by another record in a unique index
    #[error("unique index {index:?} in table {table:?} already holds key {key}")]
    UniqueViolation {
        /// Table name
        table: String,
        /// Index name
        index: String,
        /// Conflicting key
        key: IndexKey,
    },

    /// Lookup key does not fit the index kind
    #[error("key {key} cannot be used with {expected} index {index:?}")]
    KeyKindMismatch {
        /// Index name
        index: String,
        /// Index kind
        expected: IndexKind,
        /// Offending key
        key: IndexKey,
    },

    /// Accessor returned a value of the wrong kind
    #[error("field {field:?} produced a {actual} value for a {expected} index")]
    FieldKindMismatch {
        /// Field name
        field: String,
        /// Index kind
        expected: IndexKind,
        /// Kind actually produced
        actual: FieldKind,
    },

    /// Record to delete is not in the table
    #[error("record not found in table {0:?}")]
    NotFound(String),

    /// Write attempted in a read transaction
    #[error("cannot write in a read-only transaction")]
    ReadOnly,
}

enum Guard<'a, R: Record> {
    Read(RwLockReadGuard<'a, Tables<R>>),
    Write(RwLockWriteGuard<'a, Tables<R>>),
}

enum Undo<R> {
    /// Drop a row that this transaction inserted
    Remove { table: String, id: RowId },
    /// Put back a row that this transaction removed
    Restore {
        table: String,
        id: RowId,
        record: Arc<R>,
    },
}

/// A read or write transaction
pub struct Txn<'a, R: Record> {
    store: &'a MemStore<R>,
    guard: Guard<'a, R>,
    undo: Vec<Undo<R>>,
}

impl<'a, R: Record> Txn<'a, R> {
    pub(crate) fn read(store: &'a MemStore<R>, guard: RwLockReadGuard<'a, Tables<R>>) -> Self {
        Self {
            store,
            guard: Guard::Read(guard),
            undo: Vec::new(),
        }
    }

    pub(crate) fn write(store: &'a MemStore<R>, guard: RwLockWriteGuard<'a, Tables<R>>) -> Self {
        Self {
            store,
            guard: Guard::Write(guard),
            undo: Vec::new(),
        }
    }

    /// True for write transactions
    pub fn is_write(&self) -> bool {
        matches!(self.guard, Guard::Write(_))
    }

    fn tables(&self) -> &Tables<R> {
        match &self.guard {
            Guard::Read(g) => &**g,
            Guard::Write(g) => &**g,
        }
    }

    fn tables_mut(&mut self) -> Result<&mut Tables<R>, TxnError> {
        match &mut self.guard {
            Guard::Read(_) => Err(TxnError::ReadOnly),
            Guard::Write(g) => Ok(&mut **g),
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert `record`, replacing any record with the same primary identity
    pub fn insert(&mut self, table: &str, record: R) -> Result<(), TxnError> {
        let tables = self.tables_mut()?;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| TxnError::UnknownTable(table.to_string()))?;

        let keys = t.record_keys(&record)?;
        let existing = t.find_existing(&keys)?;
        t.check_unique(&keys, existing)?;

        let mut undo = Vec::with_capacity(2);
        let id = match existing {
            Some(id) => {
                if let Some(old) = t.remove_row(id) {
                    undo.push(Undo::Restore {
                        table: table.to_string(),
                        id,
                        record: old,
                    });
                }
                id
            }
            None => t.allocate_row(),
        };
        t.insert_row(id, Arc::new(record), keys);
        undo.push(Undo::Remove {
            table: table.to_string(),
            id,
        });

        self.undo.extend(undo);
        Ok(())
    }

    /// Delete the record sharing `record`'s primary identity
    ///
    /// Returns the removed record. Fails with [`TxnError::NotFound`] when no
    /// such record exists.
    pub fn delete(&mut self, table: &str, record: &R) -> Result<Arc<R>, TxnError> {
        let tables = self.tables_mut()?;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| TxnError::UnknownTable(table.to_string()))?;

        let keys = t.record_keys(record)?;
        let id = t
            .find_existing(&keys)?
            .ok_or_else(|| TxnError::NotFound(table.to_string()))?;
        let removed = t
            .remove_row(id)
            .ok_or_else(|| TxnError::NotFound(table.to_string()))?;

        self.undo.push(Undo::Restore {
            table: table.to_string(),
            id,
            record: Arc::clone(&removed),
        });
        Ok(removed)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// First record whose `index` holds `key`
    pub fn first(&self, table: &str, index: &str, key: &IndexKey) -> Result<Option<Arc<R>>, TxnError> {
        let t = self
            .tables()
            .get(table)
            .ok_or_else(|| TxnError::UnknownTable(table.to_string()))?;
        let idx = t.index(index)?;
        if !idx.schema.kind.accepts(key) {
            return Err(TxnError::KeyKindMismatch {
                index: index.to_string(),
                expected: idx.schema.kind,
                key: key.clone(),
            });
        }

        Ok(idx
            .entries
            .get(key)
            .and_then(|ids| ids.iter().next())
            .and_then(|id| t.rows.get(id))
            .cloned())
    }

    /// Every record reachable through `index`, in key order
    ///
    /// A record appears once even when a multi-valued index holds it under
    /// several keys. Records without a value for an `allow_missing` index
    /// are not visited.
    pub fn get<'t>(
        &'t self,
        table: &str,
        index: &str,
    ) -> Result<impl Iterator<Item = Arc<R>> + 't, TxnError> {
        let t = self
            .tables()
            .get(table)
            .ok_or_else(|| TxnError::UnknownTable(table.to_string()))?;
        let idx = t.index(index)?;

        let mut seen = HashSet::new();
        Ok(idx
            .entries
            .values()
            .flat_map(|ids| ids.iter())
            .filter(move |id| seen.insert(**id))
            .filter_map(move |id| t.rows.get(id).cloned()))
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Keep all writes and release the transaction
    pub fn commit(mut self) {
        if self.is_write() {
            self.undo.clear();
            self.store.record_commit();
            tracing::trace!("Committed write transaction");
        }
    }

    /// Discard all writes and release the transaction
    pub fn abort(mut self) {
        self.rollback();
    }

    fn rollback(&mut self) {
        if self.undo.is_empty() {
            return;
        }
        let undo = std::mem::take(&mut self.undo);
        let Guard::Write(tables) = &mut self.guard else {
            return;
        };

        tracing::trace!(entries = undo.len(), "Rolling back write transaction");
        for entry in undo.into_iter().rev() {
            match entry {
                Undo::Remove { table, id } => {
                    if let Some(t) = tables.get_mut(&table) {
                        t.remove_row(id);
                    }
                }
                Undo::Restore { table, id, record } => {
                    if let Some(t) = tables.get_mut(&table) {
                        if let Ok(keys) = t.record_keys(&record) {
                            t.insert_row(id, record, keys);
                        }
                    }
                }
            }
        }
    }
}

impl<R: Record> Drop for Txn<'_, R> {
    fn drop(&mut self) {
        self.rollback();
    }
}

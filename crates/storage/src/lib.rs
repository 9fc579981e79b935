//! In-memory indexed store for Memtab
//!
//! This crate provides:
//! - [`DbSchema`] / [`TableSchema`] / [`IndexSchema`]: table and index definitions
//! - [`MemStore`]: a multi-index record store validated against a record shape
//! - [`Txn`]: read and write transactions with commit/abort
//!
//! The store is deliberately small: one global writer, many readers, undo-log
//! rollback. Callers only see whole records (`Arc<R>`) and typed errors.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod schema;
pub mod store;
pub mod txn;

pub use schema::{DbSchema, IndexSchema, SchemaError, TableSchema, ID_INDEX};
pub use store::MemStore;
pub use txn::{Txn, TxnError};

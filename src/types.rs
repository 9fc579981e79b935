//! Public types for the Memtab API.
//!
//! This module re-exports types from internal crates with a clean public interface.

// ============================================================================
// Record model
// ============================================================================

pub use memtab_core::{canonical_name, FieldKind, FieldValue, IndexKey, IndexKind, Record, RecordShape};

// ============================================================================
// Store schema
// ============================================================================

pub use memtab_storage::{DbSchema, IndexSchema, TableSchema, ID_INDEX};

// ============================================================================
// Pool
// ============================================================================

pub use memtab_pool::{
    Behavior, Condition, ConditionSource, FilterRequest, FilterResult, Handler, Message, Pool,
    PoolConfig, PoolSettings, Reply, ReplyHandle, Request,
};

// Errors from every layer
pub use memtab_pool::{Error, Result};
pub use memtab_storage::{SchemaError, TxnError};

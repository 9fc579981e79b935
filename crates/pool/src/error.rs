//! Error types for the pool
//!
//! Configuration errors come back from [`Pool::start`](crate::Pool::start)
//! and the settings lifecycle. Request errors reach only the caller that sent
//! the request; workers keep running.

use memtab_core::FieldKind;
use memtab_storage::{SchemaError, TxnError};
use thiserror::Error;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pool error
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    /// Schema inference was given a type that is not a record
    #[error("cannot infer a schema from non-record type {type_name}")]
    Shape {
        /// Offending type
        type_name: String,
    },

    /// Pool record type is not a record or has no fields
    #[error("invalid record shape for {type_name}: {reason}")]
    InvalidShape {
        /// Offending type
        type_name: String,
        /// What is wrong with it
        reason: String,
    },

    /// Index field has a kind that cannot be indexed
    #[error("field {field:?} of kind {kind} cannot be indexed")]
    UnsupportedFieldType {
        /// Field name
        field: String,
        /// Field kind
        kind: FieldKind,
    },

    /// No exported field matches the index field
    #[error("index field {field:?} not found in {type_name}")]
    IndexFieldNotFound {
        /// Requested field
        field: String,
        /// Record type
        type_name: String,
    },

    /// First table has no unique index
    #[error("table {table:?} has no unique index")]
    NoUniqueIndex {
        /// Table name
        table: String,
    },

    /// Schema has no tables
    #[error("schema defines no table")]
    NoTableDefined,

    /// Store rejected the schema
    #[error("failed to create store: {0}")]
    StoreCreation(#[from] SchemaError),

    /// Configuration could not be read or parsed
    #[error("invalid configuration: {reason}")]
    Config {
        /// Cause
        reason: String,
    },

    /// Worker thread could not be started
    #[error("failed to spawn worker {worker_id}: {reason}")]
    WorkerSpawn {
        /// Worker index
        worker_id: usize,
        /// OS error message
        reason: String,
    },

    // ========================================================================
    // Requests
    // ========================================================================
    /// Store transaction failed
    #[error("transaction failed: {0}")]
    Transaction(#[from] TxnError),

    /// Filter condition could not be compiled
    #[error("failed to compile condition: {reason}")]
    ConditionCompilation {
        /// Cause
        reason: String,
    },

    /// Store handle has not been connected
    #[error("store is not connected")]
    NotConnected,

    /// Store has been closed
    #[error("store is closed")]
    StoreClosed,

    /// Lifecycle operation not allowed in the current state
    #[error("cannot {operation} a store handle that is {state}")]
    InvalidState {
        /// Attempted operation
        operation: &'static str,
        /// Current state
        state: &'static str,
    },

    /// Pool has been shut down
    #[error("pool is shut down")]
    PoolClosed,

    /// Request addressed to a worker the pool does not have
    #[error("worker {worker_id} does not exist in a pool of {pool_size}")]
    UnknownWorker {
        /// Requested worker
        worker_id: usize,
        /// Number of workers
        pool_size: usize,
    },

    /// Worker finished without sending a reply
    #[error("request was dropped without a reply")]
    NoReply,

    /// Worker replied with a variant the caller did not expect
    #[error("unexpected reply to {request}")]
    UnexpectedReply {
        /// Request kind
        request: &'static str,
    },
}

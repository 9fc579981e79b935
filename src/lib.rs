//! Memtab: a pooled, in-memory, multi-indexed record table
//!
//! Declare a record, start a pool, send requests:
//!
//! ```no_run
//! use memtab::{record_shape, FilterRequest, Pool, PoolSettings};
//!
//! #[derive(Clone, Debug)]
//! struct Person {
//!     email: String,
//!     name: String,
//!     age: i64,
//! }
//!
//! record_shape!(Person { email, name, age });
//!
//! let pool = Pool::start(PoolSettings::<Person>::new())?;
//! pool.create(Person {
//!     email: "john@doe.com".into(),
//!     name: "John Doe".into(),
//!     age: 49,
//! })?;
//!
//! let adults = pool.filter(FilterRequest::new(|p: &Person| p.age >= 18).size(10))?;
//! assert_eq!(adults.count, 1);
//! # Ok::<(), memtab::Error>(())
//! ```
//!
//! The workspace is split into:
//! - `memtab-core`: record shapes and index keys
//! - `memtab-storage`: the indexed store and its transactions
//! - `memtab-pool`: schema inference, handlers and the worker pool

#![warn(missing_docs)]
#![warn(clippy::all)]

mod types;

pub use memtab_core::record_shape;
pub use types::*;

/// Lower-level access to the member crates
pub mod internals {
    pub use memtab_core as core;
    pub use memtab_pool as pool;
    pub use memtab_storage as storage;
}

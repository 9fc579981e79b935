//! Pooled request service over an in-memory record table
//!
//! This crate provides:
//! - Schema inference from a record shape ([`infer_table_schema`])
//! - [`PoolSettings`]: pool options and the store handle lifecycle
//! - [`Handler`] / [`MemStoreHandler`]: CRUD and filter requests as store transactions
//! - [`Pool`]: N worker threads with request/reply, blocking and fire-and-forget submission
//! - [`PoolConfig`]: TOML configuration
//!
//! # Example
//!
//! ```no_run
//! use memtab_core::record_shape;
//! use memtab_pool::{Pool, PoolSettings};
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
//! let pool = Pool::start(PoolSettings::<Person>::new().pool_size(4))?;
//! pool.create(Person {
//!     email: "john@doe.com".into(),
//!     name: "John Doe".into(),
//!     age: 49,
//! })?;
//! let john = pool.read("john@doe.com")?;
//! assert_eq!(john.map(|p| p.age), Some(49));
//! pool.shutdown()?;
//! # Ok::<(), memtab_pool::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod filter;
pub mod handler;
pub mod pool;
pub mod request;
pub mod schema;
pub mod settings;

pub use config::PoolConfig;
pub use error::{Error, Result};
pub use filter::{paginate, CompileError, Condition, ConditionSource, FilterRequest, FilterResult};
pub use handler::{Behavior, BehaviorFactory, Handler, HandlerFactory, MemStoreHandler};
pub use pool::Pool;
pub use request::{Message, Reply, ReplyHandle, Request};
pub use schema::{infer_single_table_schema, infer_table_schema, pick_unique_index};
pub use settings::{HandleState, PoolSettings, DEFAULT_POOL_SIZE};

//! Record model for Memtab
//!
//! This crate defines how a caller's record type is described to the rest
//! of the system:
//! - [`Record`] / [`RecordShape`]: a statically declared field-descriptor table
//! - [`FieldKind`] / [`FieldValue`]: the value kind of each field and its extracted value
//! - [`IndexKind`] / [`IndexKey`]: what an index extracts and what lookups are keyed by
//!
//! Nothing here inspects types at runtime. A record type lists its fields once,
//! usually through [`record_shape!`], and every other layer works from that list.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod naming;
pub mod record;
pub mod value;

pub use naming::canonical_name;
pub use record::{FieldDescriptor, Record, RecordShape, ShapeKind};
pub use value::{FieldKind, FieldType, FieldValue, IndexKey, IndexKind};

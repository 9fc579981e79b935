//! Record shapes
//!
//! A [`RecordShape`] is the explicit, statically declared description of a
//! record type: its name, whether it is struct-like, and an ordered table of
//! field descriptors (name, kind tag, accessor).
//!
//! # Example
//!
//! ```
//! use memtab_core::{record_shape, FieldKind, Record};
//!
//! #[derive(Clone)]
//! struct Person {
//!     email: String,
//!     name: String,
//!     age: i64,
//! }
//!
//! record_shape!(Person { email, name, age });
//!
//! let shape = Person::shape();
//! assert_eq!(shape.type_name(), "Person");
//! assert_eq!(shape.fields()[2].kind(), FieldKind::Int);
//! ```

use crate::value::{FieldKind, FieldType, FieldValue};
use std::fmt;
use std::sync::Arc;

/// A type that can be stored in a table.
///
/// Records are stored and returned as a whole; the system only looks inside
/// a record through the accessors of its shape.
pub trait Record: Clone + Send + Sync + 'static {
    /// Field-descriptor table for this type
    fn shape() -> RecordShape<Self>;
}

/// Whether a shape describes a struct-like type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    /// Named fields
    Record,
    /// Newtypes, enums, scalars: nothing to derive a schema from
    Opaque,
}

type Accessor<R> = Arc<dyn Fn(&R) -> FieldValue + Send + Sync>;

/// One field of a record shape
pub struct FieldDescriptor<R> {
    name: &'static str,
    kind: FieldKind,
    exported: bool,
    accessor: Accessor<R>,
}

impl<R> FieldDescriptor<R> {
    /// Declared field name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Kind tag
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Whether the field takes part in schema derivation
    pub fn is_exported(&self) -> bool {
        self.exported
    }

    /// Read this field out of a record
    pub fn value(&self, record: &R) -> FieldValue {
        (self.accessor)(record)
    }
}

impl<R> Clone for FieldDescriptor<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            kind: self.kind,
            exported: self.exported,
            accessor: Arc::clone(&self.accessor),
        }
    }
}

impl<R> fmt::Debug for FieldDescriptor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("exported", &self.exported)
            .finish()
    }
}

/// Field-descriptor table for a record type
pub struct RecordShape<R> {
    type_name: &'static str,
    kind: ShapeKind,
    fields: Vec<FieldDescriptor<R>>,
}

impl<R: 'static> RecordShape<R> {
    /// Start a struct-like shape with no fields
    pub fn record(type_name: &'static str) -> Self {
        Self {
            type_name,
            kind: ShapeKind::Record,
            fields: Vec::new(),
        }
    }

    /// Shape of a type that has no named fields
    pub fn opaque(type_name: &'static str) -> Self {
        Self {
            type_name,
            kind: ShapeKind::Opaque,
            fields: Vec::new(),
        }
    }

    /// Append an exported field
    ///
    /// The kind tag comes from `T`'s [`FieldType`] implementation. The
    /// accessor's argument type must be written out, as in
    /// `|p: &Person| &p.email`.
    pub fn field<T: FieldType + 'static>(self, name: &'static str, get: fn(&R) -> &T) -> Self {
        self.push_field(name, get, true)
    }

    /// Append a field that is carried but never considered for indexing
    pub fn hidden_field<T: FieldType + 'static>(
        self,
        name: &'static str,
        get: fn(&R) -> &T,
    ) -> Self {
        self.push_field(name, get, false)
    }

    /// Append a field with an explicit kind tag and value accessor
    pub fn field_with(
        mut self,
        name: &'static str,
        kind: FieldKind,
        accessor: impl Fn(&R) -> FieldValue + Send + Sync + 'static,
    ) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            kind,
            exported: true,
            accessor: Arc::new(accessor),
        });
        self
    }

    fn push_field<T: FieldType + 'static>(
        mut self,
        name: &'static str,
        get: fn(&R) -> &T,
        exported: bool,
    ) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            kind: T::KIND,
            exported,
            accessor: Arc::new(move |record: &R| get(record).field_value()),
        });
        self
    }
}

impl<R> RecordShape<R> {
    /// Declared type name
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Shape kind
    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    /// True for struct-like shapes
    pub fn is_record(&self) -> bool {
        self.kind == ShapeKind::Record
    }

    /// All fields in declaration order
    pub fn fields(&self) -> &[FieldDescriptor<R>] {
        &self.fields
    }

    /// First declared field
    pub fn first_field(&self) -> Option<&FieldDescriptor<R>> {
        self.fields.first()
    }

    /// Look up a field by its declared name
    pub fn find_field(&self, name: &str) -> Option<&FieldDescriptor<R>> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl<R> Clone for RecordShape<R> {
    fn clone(&self) -> Self {
        Self {
            type_name: self.type_name,
            kind: self.kind,
            fields: self.fields.clone(),
        }
    }
}

impl<R> fmt::Debug for RecordShape<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordShape")
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Implement [`Record`] for a struct by listing its fields in declaration order.
///
/// Every listed field must implement [`FieldType`].
///
/// ```
/// use memtab_core::{record_shape, Record};
///
/// #[derive(Clone)]
/// struct Tag {
///     id: u32,
///     labels: Vec<String>,
/// }
///
/// record_shape!(Tag { id, labels });
/// assert_eq!(Tag::shape().fields().len(), 2);
/// ```
#[macro_export]
macro_rules! record_shape {
    ($ty:ident { $($field:ident),* $(,)? }) => {
        impl $crate::Record for $ty {
            fn shape() -> $crate::RecordShape<Self> {
                $crate::RecordShape::record(stringify!($ty))
                    $(.field(stringify!($field), |r: &$ty| &r.$field))*
            }
        }
    };
}

//! Field kinds, extracted field values and index keys
//!
//! # Kind mapping
//!
//! | Rust field type                               | FieldKind | IndexKind   |
//! |-----------------------------------------------|-----------|-------------|
//! | `i8`, `i16`, `i32`, `i64`, `isize`            | Int       | Int         |
//! | `u8`, `u16`, `u32`, `u64`, `usize`            | Uint      | Uint        |
//! | `bool`                                        | Bool      | Bool        |
//! | `String`                                      | Str       | String      |
//! | `BTreeMap<String, String>`, `HashMap<..>`     | StrMap    | StringMap   |
//! | `Vec<String>`                                 | StrSeq    | StringSeq   |
//! | `f32`, `f64`, `Vec<u8>`, anything else        | ...       | (none)      |

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// =============================================================================
// FieldKind
// =============================================================================

/// Value kind of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Signed integer family
    Int,
    /// Unsigned integer family
    Uint,
    /// Boolean
    Bool,
    /// UTF-8 string
    Str,
    /// Map of string to string
    StrMap,
    /// Sequence of strings
    StrSeq,
    /// Floating point
    Float,
    /// Raw bytes
    Bytes,
    /// Sequence of anything other than strings
    Seq,
    /// Map that is not string to string
    Map,
    /// Nested struct
    Struct,
    /// Anything else
    Other,
}

impl FieldKind {
    /// Short lowercase name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Int => "int",
            FieldKind::Uint => "uint",
            FieldKind::Bool => "bool",
            FieldKind::Str => "string",
            FieldKind::StrMap => "map<string,string>",
            FieldKind::StrSeq => "seq<string>",
            FieldKind::Float => "float",
            FieldKind::Bytes => "bytes",
            FieldKind::Seq => "seq",
            FieldKind::Map => "map",
            FieldKind::Struct => "struct",
            FieldKind::Other => "other",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// FieldValue
// =============================================================================

/// Value read out of a record field by its accessor
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Signed integer, widened to i64
    Int(i64),
    /// Unsigned integer, widened to u64
    Uint(u64),
    /// Boolean
    Bool(bool),
    /// String
    Str(String),
    /// String map, ordered by key
    StrMap(BTreeMap<String, String>),
    /// String sequence
    StrSeq(Vec<String>),
    /// Float, widened to f64
    Float(f64),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// A value with no structured representation
    Opaque,
}

impl FieldValue {
    /// Kind of this value
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Int(_) => FieldKind::Int,
            FieldValue::Uint(_) => FieldKind::Uint,
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::Str(_) => FieldKind::Str,
            FieldValue::StrMap(_) => FieldKind::StrMap,
            FieldValue::StrSeq(_) => FieldKind::StrSeq,
            FieldValue::Float(_) => FieldKind::Float,
            FieldValue::Bytes(_) => FieldKind::Bytes,
            FieldValue::Opaque => FieldKind::Other,
        }
    }
}

// =============================================================================
// FieldType
// =============================================================================

/// Static kind information for a Rust type used as a record field.
///
/// Implemented for the primitive types in the module table. Implement it for
/// your own field types with `KIND` set to [`FieldKind::Struct`] or
/// [`FieldKind::Other`] so they can appear in a shape; such fields can never
/// carry an index.
pub trait FieldType {
    /// Kind tag of this type
    const KIND: FieldKind;

    /// Extract the value
    fn field_value(&self) -> FieldValue;
}

macro_rules! impl_field_type {
    ($kind:ident, $variant:ident, $wide:ty, [$($t:ty),*]) => {
        $(
            impl FieldType for $t {
                const KIND: FieldKind = FieldKind::$kind;

                #[inline]
                fn field_value(&self) -> FieldValue {
                    FieldValue::$variant(*self as $wide)
                }
            }
        )*
    };
}

impl_field_type!(Int, Int, i64, [i8, i16, i32, i64, isize]);
impl_field_type!(Uint, Uint, u64, [u8, u16, u32, u64, usize]);
impl_field_type!(Float, Float, f64, [f32, f64]);

impl FieldType for bool {
    const KIND: FieldKind = FieldKind::Bool;

    fn field_value(&self) -> FieldValue {
        FieldValue::Bool(*self)
    }
}

impl FieldType for String {
    const KIND: FieldKind = FieldKind::Str;

    fn field_value(&self) -> FieldValue {
        FieldValue::Str(self.clone())
    }
}

impl FieldType for Vec<String> {
    const KIND: FieldKind = FieldKind::StrSeq;

    fn field_value(&self) -> FieldValue {
        FieldValue::StrSeq(self.clone())
    }
}

impl FieldType for Vec<u8> {
    const KIND: FieldKind = FieldKind::Bytes;

    fn field_value(&self) -> FieldValue {
        FieldValue::Bytes(self.clone())
    }
}

impl FieldType for BTreeMap<String, String> {
    const KIND: FieldKind = FieldKind::StrMap;

    fn field_value(&self) -> FieldValue {
        FieldValue::StrMap(self.clone())
    }
}

impl<S: std::hash::BuildHasher> FieldType for HashMap<String, String, S> {
    const KIND: FieldKind = FieldKind::StrMap;

    fn field_value(&self) -> FieldValue {
        FieldValue::StrMap(
            self.iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

// =============================================================================
// IndexKind
// =============================================================================

/// What an index extracts from its field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Signed integer index
    Int,
    /// Unsigned integer index
    Uint,
    /// Boolean index
    Bool,
    /// String index
    String,
    /// One entry per (key, value) pair of a string map
    StringMap,
    /// One entry per element of a string sequence
    StringSeq,
}

impl IndexKind {
    /// Index kind producible for a field kind, if any.
    pub fn for_field(kind: FieldKind) -> Option<IndexKind> {
        match kind {
            FieldKind::Int => Some(IndexKind::Int),
            FieldKind::Uint => Some(IndexKind::Uint),
            FieldKind::Bool => Some(IndexKind::Bool),
            FieldKind::Str => Some(IndexKind::String),
            FieldKind::StrMap => Some(IndexKind::StringMap),
            FieldKind::StrSeq => Some(IndexKind::StringSeq),
            _ => None,
        }
    }

    /// Field kind this index reads
    pub fn field_kind(&self) -> FieldKind {
        match self {
            IndexKind::Int => FieldKind::Int,
            IndexKind::Uint => FieldKind::Uint,
            IndexKind::Bool => FieldKind::Bool,
            IndexKind::String => FieldKind::Str,
            IndexKind::StringMap => FieldKind::StrMap,
            IndexKind::StringSeq => FieldKind::StrSeq,
        }
    }

    /// True when one record may produce several keys
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, IndexKind::StringMap | IndexKind::StringSeq)
    }

    /// Whether `key` has the shape this index is keyed by
    pub fn accepts(&self, key: &IndexKey) -> bool {
        matches!(
            (self, key),
            (IndexKind::Int, IndexKey::Int(_))
                | (IndexKind::Uint, IndexKey::Uint(_))
                | (IndexKind::Bool, IndexKey::Bool(_))
                | (IndexKind::String, IndexKey::Str(_))
                | (IndexKind::StringSeq, IndexKey::Str(_))
                | (IndexKind::StringMap, IndexKey::Pair(_, _))
        )
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexKind::Int => "int",
            IndexKind::Uint => "uint",
            IndexKind::Bool => "bool",
            IndexKind::String => "string",
            IndexKind::StringMap => "string_map",
            IndexKind::StringSeq => "string_seq",
        };
        f.write_str(s)
    }
}

// =============================================================================
// IndexKey
// =============================================================================

/// Lookup key for an index
///
/// String-sequence indexes are keyed by a single element (`Str`),
/// string-map indexes by a `(key, value)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    /// Signed integer key
    Int(i64),
    /// Unsigned integer key
    Uint(u64),
    /// Boolean key
    Bool(bool),
    /// String key
    Str(String),
    /// String map entry key
    Pair(String, String),
}

impl IndexKey {
    /// Keys a field value produces under an index kind.
    ///
    /// Returns `None` when the value's kind does not match the index.
    /// An empty string, sequence or map produces no keys.
    pub fn extract(kind: IndexKind, value: &FieldValue) -> Option<Vec<IndexKey>> {
        match (kind, value) {
            (IndexKind::Int, FieldValue::Int(v)) => Some(vec![IndexKey::Int(*v)]),
            (IndexKind::Uint, FieldValue::Uint(v)) => Some(vec![IndexKey::Uint(*v)]),
            (IndexKind::Bool, FieldValue::Bool(v)) => Some(vec![IndexKey::Bool(*v)]),
            (IndexKind::String, FieldValue::Str(s)) => {
                if s.is_empty() {
                    Some(Vec::new())
                } else {
                    Some(vec![IndexKey::Str(s.clone())])
                }
            }
            (IndexKind::StringSeq, FieldValue::StrSeq(items)) => Some(
                items
                    .iter()
                    .filter(|s| !s.is_empty())
                    .map(|s| IndexKey::Str(s.clone()))
                    .collect(),
            ),
            (IndexKind::StringMap, FieldValue::StrMap(map)) => Some(
                map.iter()
                    .filter(|(k, _)| !k.is_empty())
                    .map(|(k, v)| IndexKey::Pair(k.clone(), v.clone()))
                    .collect(),
            ),
            _ => None,
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Int(v) => write!(f, "{}", v),
            IndexKey::Uint(v) => write!(f, "{}", v),
            IndexKey::Bool(v) => write!(f, "{}", v),
            IndexKey::Str(s) => write!(f, "{:?}", s),
            IndexKey::Pair(k, v) => write!(f, "{:?}={:?}", k, v),
        }
    }
}

macro_rules! impl_index_key_from {
    ($variant:ident, $wide:ty, [$($t:ty),*]) => {
        $(
            impl From<$t> for IndexKey {
                fn from(v: $t) -> Self {
                    IndexKey::$variant(v as $wide)
                }
            }
        )*
    };
}

impl_index_key_from!(Int, i64, [i8, i16, i32, i64, isize]);
impl_index_key_from!(Uint, u64, [u8, u16, u32, u64, usize]);

impl From<bool> for IndexKey {
    fn from(v: bool) -> Self {
        IndexKey::Bool(v)
    }
}

impl From<&str> for IndexKey {
    fn from(s: &str) -> Self {
        IndexKey::Str(s.to_string())
    }
}

impl From<String> for IndexKey {
    fn from(s: String) -> Self {
        IndexKey::Str(s)
    }
}

impl From<(&str, &str)> for IndexKey {
    fn from((k, v): (&str, &str)) -> Self {
        IndexKey::Pair(k.to_string(), v.to_string())
    }
}

impl From<(String, String)> for IndexKey {
    fn from((k, v): (String, String)) -> Self {
        IndexKey::Pair(k, v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_index_kind_for_field() {
        assert_eq!(IndexKind::for_field(FieldKind::Int), Some(IndexKind::Int));
        assert_eq!(IndexKind::for_field(FieldKind::Uint), Some(IndexKind::Uint));
        assert_eq!(IndexKind::for_field(FieldKind::Bool), Some(IndexKind::Bool));
        assert_eq!(IndexKind::for_field(FieldKind::Str), Some(IndexKind::String));
        assert_eq!(
            IndexKind::for_field(FieldKind::StrMap),
            Some(IndexKind::StringMap)
        );
        assert_eq!(
            IndexKind::for_field(FieldKind::StrSeq),
            Some(IndexKind::StringSeq)
        );

        for kind in [
            FieldKind::Float,
            FieldKind::Bytes,
            FieldKind::Seq,
            FieldKind::Map,
            FieldKind::Struct,
            FieldKind::Other,
        ] {
            assert_eq!(IndexKind::for_field(kind), None, "{kind} must not index");
        }
    }

    #[test]
    fn test_field_type_kinds() {
        assert_eq!(<i8 as FieldType>::KIND, FieldKind::Int);
        assert_eq!(<isize as FieldType>::KIND, FieldKind::Int);
        assert_eq!(<u16 as FieldType>::KIND, FieldKind::Uint);
        assert_eq!(<usize as FieldType>::KIND, FieldKind::Uint);
        assert_eq!(<f32 as FieldType>::KIND, FieldKind::Float);
        assert_eq!(<Vec<u8> as FieldType>::KIND, FieldKind::Bytes);
        assert_eq!(<Vec<String> as FieldType>::KIND, FieldKind::StrSeq);
        assert_eq!(<HashMap<String, String> as FieldType>::KIND, FieldKind::StrMap);
    }

    #[test]
    fn test_field_value_widening() {
        assert_eq!((-3i8).field_value(), FieldValue::Int(-3));
        assert_eq!(7u16.field_value(), FieldValue::Uint(7));
        assert_eq!(true.field_value().kind(), FieldKind::Bool);
    }

    #[test]
    fn test_hash_map_value_is_ordered() {
        let mut m = HashMap::new();
        m.insert("b".to_string(), "2".to_string());
        m.insert("a".to_string(), "1".to_string());
        match m.field_value() {
            FieldValue::StrMap(map) => {
                let keys: Vec<_> = map.keys().cloned().collect();
                assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected StrMap, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_skips_empty_values() {
        assert_eq!(
            IndexKey::extract(IndexKind::String, &FieldValue::Str(String::new())),
            Some(vec![])
        );
        let seq = FieldValue::StrSeq(vec!["a".into(), "".into(), "b".into()]);
        assert_eq!(
            IndexKey::extract(IndexKind::StringSeq, &seq),
            Some(vec![IndexKey::from("a"), IndexKey::from("b")])
        );
    }

    #[test]
    fn test_extract_kind_mismatch() {
        assert_eq!(IndexKey::extract(IndexKind::Int, &FieldValue::Uint(1)), None);
        assert_eq!(
            IndexKey::extract(IndexKind::String, &FieldValue::Float(1.0)),
            None
        );
    }

    #[test]
    fn test_accepts() {
        assert!(IndexKind::String.accepts(&IndexKey::from("x")));
        assert!(IndexKind::StringSeq.accepts(&IndexKey::from("x")));
        assert!(IndexKind::StringMap.accepts(&IndexKey::from(("k", "v"))));
        assert!(!IndexKind::Int.accepts(&IndexKey::from(1u32)));
        assert!(!IndexKind::StringMap.accepts(&IndexKey::from("k")));
    }

    proptest! {
        #[test]
        fn prop_int_key_order_matches_value_order(a in any::<i32>(), b in any::<i32>()) {
            let ka = IndexKey::from(a);
            let kb = IndexKey::from(b);
            prop_assert_eq!(ka.cmp(&kb), a.cmp(&b));
        }

        #[test]
        fn prop_int_field_extracts_one_key(v in any::<i64>()) {
            let keys = IndexKey::extract(IndexKind::Int, &v.field_value()).unwrap();
            prop_assert_eq!(keys, vec![IndexKey::Int(v)]);
        }
    }
}

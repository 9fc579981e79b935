//! Schema inference
//!
//! Derives a one-table schema from a record shape. The table is named after
//! the type; a single unique index named `"id"` covers the chosen field.

use crate::error::{Error, Result};
use memtab_core::{canonical_name, IndexKind, Record, RecordShape};
use memtab_storage::{DbSchema, IndexSchema, TableSchema, ID_INDEX};

/// Infer a table schema from `shape`, indexing the field whose canonical name
/// is `index_field`.
pub fn infer_table_schema<R: Record>(
    shape: &RecordShape<R>,
    index_field: &str,
) -> Result<TableSchema> {
    if !shape.is_record() {
        return Err(Error::Shape {
            type_name: shape.type_name().to_string(),
        });
    }

    let field = shape
        .fields()
        .iter()
        .filter(|f| f.is_exported())
        .find(|f| canonical_name(f.name()) == index_field)
        .ok_or_else(|| Error::IndexFieldNotFound {
            field: index_field.to_string(),
            type_name: shape.type_name().to_string(),
        })?;

    let kind = IndexKind::for_field(field.kind()).ok_or_else(|| Error::UnsupportedFieldType {
        field: field.name().to_string(),
        kind: field.kind(),
    })?;

    let index = IndexSchema::new(ID_INDEX, field.name(), kind).unique(true);
    Ok(TableSchema::new(canonical_name(shape.type_name())).with_index(index))
}

/// Infer a schema holding exactly one table
pub fn infer_single_table_schema<R: Record>(
    shape: &RecordShape<R>,
    index_field: &str,
) -> Result<DbSchema> {
    Ok(DbSchema::new().with_table(infer_table_schema(shape, index_field)?))
}

/// Name of the first table and of its first unique index
pub fn pick_unique_index(schema: &DbSchema) -> Result<(String, String)> {
    let table = schema.first_table().ok_or(Error::NoTableDefined)?;
    let index = table
        .first_unique_index()
        .ok_or_else(|| Error::NoUniqueIndex {
            table: table.name.clone(),
        })?;
    Ok((table.name.clone(), index.name.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use memtab_core::{record_shape, FieldKind, FieldValue};
    use std::collections::BTreeMap;

    #[derive(Clone)]
    struct Person {
        email: String,
        name: String,
        age: i64,
    }

    record_shape!(Person { email, name, age });

    #[derive(Clone)]
    struct Reading {
        value: f64,
        sensor: u32,
    }

    record_shape!(Reading { value, sensor });

    #[derive(Clone)]
    #[allow(non_snake_case)]
    struct HTTPRoute {
        Path: String,
    }

    impl Record for HTTPRoute {
        fn shape() -> RecordShape<Self> {
            RecordShape::record("HTTPRoute").field("Path", |r: &HTTPRoute| &r.Path)
        }
    }

    #[test]
    fn test_person_email_index() {
        let table = infer_table_schema(&Person::shape(), "email").unwrap();
        assert_eq!(table.name, "person");
        assert_eq!(table.indexes.len(), 1);

        let id = &table.indexes["id"];
        assert_eq!(id.name, "id");
        assert_eq!(id.field, "email");
        assert_eq!(id.kind, IndexKind::String);
        assert!(id.unique);
        assert!(!id.allow_missing);
    }

    #[test]
    fn test_non_first_field() {
        let table = infer_table_schema(&Person::shape(), "age").unwrap();
        assert_eq!(table.indexes["id"].kind, IndexKind::Int);
        assert_eq!(table.indexes["id"].field, "age");
    }

    #[test]
    fn test_canonical_names() {
        let table = infer_table_schema(&HTTPRoute::shape(), "path").unwrap();
        assert_eq!(table.name, "hTTPRoute");
        assert_eq!(table.indexes["id"].field, "Path");
    }

    #[test]
    fn test_unsupported_kind() {
        let err = infer_table_schema(&Reading::shape(), "value").unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedFieldType {
                kind: FieldKind::Float,
                ..
            }
        ));
        let table = infer_table_schema(&Reading::shape(), "sensor").unwrap();
        assert_eq!(table.indexes["id"].kind, IndexKind::Uint);
    }

    #[test]
    fn test_first_field_inference_by_kind() {
        let cases = [
            (FieldKind::Int, Some(IndexKind::Int)),
            (FieldKind::Uint, Some(IndexKind::Uint)),
            (FieldKind::Bool, Some(IndexKind::Bool)),
            (FieldKind::Str, Some(IndexKind::String)),
            (FieldKind::StrMap, Some(IndexKind::StringMap)),
            (FieldKind::StrSeq, Some(IndexKind::StringSeq)),
            (FieldKind::Float, None),
            (FieldKind::Bytes, None),
            (FieldKind::Seq, None),
            (FieldKind::Map, None),
            (FieldKind::Struct, None),
            (FieldKind::Other, None),
        ];

        for (kind, expected) in cases {
            let shape = RecordShape::<Person>::record("Probe")
                .field_with("first", kind, |_| FieldValue::Opaque)
                .field("email", |p: &Person| &p.email);
            let result = infer_table_schema(&shape, "first");
            match expected {
                Some(index_kind) => {
                    assert_eq!(result.unwrap().indexes["id"].kind, index_kind, "{kind}")
                }
                None => assert!(
                    matches!(result, Err(Error::UnsupportedFieldType { .. })),
                    "{kind}"
                ),
            }
        }
    }

    #[test]
    fn test_field_not_found() {
        let err = infer_table_schema(&Person::shape(), "phone").unwrap_err();
        assert!(matches!(err, Error::IndexFieldNotFound { field, .. } if field == "phone"));
    }

    #[test]
    fn test_hidden_fields_skipped() {
        let shape = RecordShape::<Person>::record("Person")
            .hidden_field("email", |p: &Person| &p.email)
            .field("name", |p: &Person| &p.name);
        assert!(matches!(
            infer_table_schema(&shape, "email"),
            Err(Error::IndexFieldNotFound { .. })
        ));
    }

    #[test]
    fn test_opaque_shape() {
        let shape = RecordShape::<Person>::opaque("Wrapper");
        assert!(matches!(
            infer_table_schema(&shape, "email"),
            Err(Error::Shape { .. })
        ));
    }

    #[test]
    fn test_single_table_schema() {
        let schema = infer_single_table_schema(&Person::shape(), "email").unwrap();
        assert_eq!(schema.tables.len(), 1);
        assert!(schema.tables.contains_key("person"));
        assert_eq!(
            pick_unique_index(&schema).unwrap(),
            ("person".to_string(), "id".to_string())
        );
    }

    #[test]
    fn test_pick_unique_index_errors() {
        assert!(matches!(
            pick_unique_index(&DbSchema::new()),
            Err(Error::NoTableDefined)
        ));

        let schema = DbSchema::new().with_table(
            TableSchema::new("b").with_index(IndexSchema::new("age", "age", IndexKind::Int)),
        );
        assert!(matches!(
            pick_unique_index(&schema),
            Err(Error::NoUniqueIndex { table }) if table == "b"
        ));
    }

    #[test]
    fn test_pick_unique_index_is_ordered() {
        let mut tables = BTreeMap::new();
        for name in ["zeta", "alpha"] {
            tables.insert(
                name.to_string(),
                TableSchema::new(name)
                    .with_index(IndexSchema::new("name", "name", IndexKind::String).unique(true))
                    .with_index(IndexSchema::new("email", "email", IndexKind::String).unique(true)),
            );
        }
        let schema = DbSchema { tables };
        assert_eq!(
            pick_unique_index(&schema).unwrap(),
            ("alpha".to_string(), "email".to_string())
        );
    }
}

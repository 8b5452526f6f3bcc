use mysqlite::errors::Error;
use mysqlite::storage::row::{Row, Value};
use mysqlite::storage::schema::{FieldType, Schema};
use mysqlite::storage::table::Table;

fn schema() -> Schema {
    Schema::new(
        vec![("id", FieldType::Int, 8), ("name", FieldType::Text, 32)],
        0,
    )
    .unwrap()
}

#[test]
fn create_insert_close_reopen_scan() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lifecycle.db");

    {
        let mut table = Table::open(&path, schema()).unwrap();
        for i in 0..500u32 {
            table
                .insert(Row::new(vec![Value::Int(i as i64), Value::Text(format!("row-{i}"))]))
                .unwrap();
        }
        table.close().unwrap();
    }

    let mut reopened = Table::open(&path, schema()).unwrap();

    let row = reopened.find(250).unwrap().unwrap();
    assert_eq!(row.values[1], Value::Text("row-250".into()));

    let rows = reopened.scan().unwrap();
    assert_eq!(rows.len(), 500);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.values[0], Value::Int(i as i64));
    }

    reopened.close().unwrap();
}

#[test]
fn delete_then_reopen_does_not_resurrect_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("delete.db");

    {
        let mut table = Table::open(&path, schema()).unwrap();
        table.insert(Row::new(vec![Value::Int(1), Value::Text("a".into())])).unwrap();
        table.insert(Row::new(vec![Value::Int(2), Value::Text("b".into())])).unwrap();
        table.delete(1).unwrap();
        table.close().unwrap();
    }

    let mut reopened = Table::open(&path, schema()).unwrap();
    assert!(reopened.find(1).unwrap().is_none());
    assert_eq!(reopened.find(2).unwrap().unwrap().values[1], Value::Text("b".into()));
}

#[test]
fn reopen_preserves_schema_even_when_a_different_default_is_passed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.db");

    {
        let table = Table::open(&path, schema()).unwrap();
        table.close().unwrap();
    }

    let other_schema = Schema::new(vec![("only_field", FieldType::Int, 8)], 0).unwrap();
    let reopened = Table::open(&path, other_schema).unwrap();
    assert_eq!(reopened.schema.fields.len(), 2);
    assert_eq!(reopened.schema.fields[1].name, "name");
}

#[test]
fn duplicate_insert_across_many_splits_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dup.db");
    let mut table = Table::open(&path, schema()).unwrap();

    for i in 0..1000u32 {
        table
            .insert(Row::new(vec![Value::Int(i as i64), Value::Text(format!("row-{i}"))]))
            .unwrap();
    }

    let err = table
        .insert(Row::new(vec![Value::Int(500), Value::Text("clash".into())]))
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateKey(500)));
}

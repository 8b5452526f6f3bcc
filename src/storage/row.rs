//! # Row Management
use super::schema::{hash_string, Schema};
use crate::errors::Error;
use bincode::{Decode, Encode};

/// A single column value, matching one of the engine's two field kinds.
#[derive(Debug, Clone, Encode, Decode, PartialEq)]
pub enum Value {
    Int(i64),
    Text(String),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
        }
    }
}

/// A schema-ordered tuple of column values.
#[derive(Debug, Clone)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Row { values }
    }

    /// Retrieves a column's value by name.
    pub fn get_column(&self, schema: &Schema, column: &str) -> Option<&Value> {
        let index = schema.fields.iter().position(|f| f.name == column)?;
        self.values.get(index)
    }

    /// Extracts the B-tree key for this row: the primary key column's integer
    /// value directly, or the DJB2 hash of its text value.
    pub fn get_id(&self, schema: &Schema) -> Result<u32, Error> {
        let value = self
            .values
            .get(schema.primary_key)
            .ok_or_else(|| Error::Schema("row has no value for the primary key column".into()))?;
        match value {
            Value::Int(v) => Ok(*v as u32),
            Value::Text(s) => Ok(hash_string(s)),
        }
    }

    /// Builds a row from schema-ordered string values, parsing each according
    /// to its field type.
    pub fn from_columns(schema: &Schema, columns: &[String], values: &[String]) -> Result<Self, Error> {
        build_row(schema, columns, values)
    }

    /// Checks that this row has exactly one value per schema field.
    pub fn validate(&self, schema: &Schema) -> bool {
        self.values.len() == schema.fields.len()
    }
}

/// Builds a row from column names and values given in arbitrary order,
/// reordering them to match the schema's field order.
pub fn build_row(schema: &Schema, columns: &[String], values: &[String]) -> Result<Row, Error> {
    if columns.len() != values.len() {
        return Err(Error::Schema("columns and values length mismatch".into()));
    }

    let mut row_values = Vec::with_capacity(schema.fields.len());
    for field in &schema.fields {
        let raw = columns
            .iter()
            .position(|c| c == &field.name)
            .map(|idx| &values[idx])
            .ok_or_else(|| Error::Schema(format!("missing value for column: {}", field.name)))?;

        let parsed = match field.type_ {
            super::schema::FieldType::Int => Value::Int(
                raw.parse()
                    .map_err(|_| Error::Schema(format!("invalid INT for '{}': {}", field.name, raw)))?,
            ),
            super::schema::FieldType::Text => Value::Text(raw.clone()),
        };
        row_values.push(parsed);
    }

    Ok(Row { values: row_values })
}

impl std::fmt::Display for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
        write!(f, "Row({})", rendered.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::FieldType;

    fn schema() -> Schema {
        Schema::new(
            vec![("id", FieldType::Int, 8), ("name", FieldType::Text, 32)],
            0,
        )
        .unwrap()
    }

    #[test]
    fn build_row_reorders_to_schema() {
        let schema = schema();
        let row = build_row(
            &schema,
            &["name".into(), "id".into()],
            &["alice".into(), "7".into()],
        )
        .unwrap();
        assert_eq!(row.values[0], Value::Int(7));
        assert_eq!(row.values[1], Value::Text("alice".into()));
    }

    #[test]
    fn get_id_hashes_text_primary_key() {
        let schema = Schema::new(vec![("name", FieldType::Text, 32)], 0).unwrap();
        let row = Row::new(vec![Value::Text("alice".into())]);
        assert_eq!(row.get_id(&schema).unwrap(), hash_string("alice"));
    }
}

//! Row schema: an ordered list of fixed-width fields describing a table's on-disk row layout.
use crate::errors::Error;
use bincode::{Decode, Encode};

pub const MAX_FIELDS: usize = 16;
pub const FIELD_NAME_MAX: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum FieldType {
    Int,
    Text,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Field {
    pub name: String,
    pub type_: FieldType,
    pub size: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Schema {
    pub fields: Vec<Field>,
    pub primary_key: usize,
}

impl Schema {
    /// Builds a schema from `(name, type, size)` triples, computing each field's byte offset
    /// and enforcing the `MAX_FIELDS`/`FIELD_NAME_MAX` bounds the on-disk layout is built around.
    pub fn new(columns: Vec<(&str, FieldType, u32)>, primary_key: usize) -> Result<Self, Error> {
        if columns.is_empty() {
            return Err(Error::Schema("schema must have at least one field".into()));
        }
        if columns.len() > MAX_FIELDS {
            return Err(Error::Schema(format!(
                "schema has {} fields, max is {}",
                columns.len(),
                MAX_FIELDS
            )));
        }
        if primary_key >= columns.len() {
            return Err(Error::Schema("primary key index out of range".into()));
        }

        let mut fields = Vec::with_capacity(columns.len());
        let mut offset = 0u32;
        for (name, type_, size) in columns {
            if name.len() > FIELD_NAME_MAX {
                return Err(Error::Schema(format!(
                    "field name '{}' exceeds FIELD_NAME_MAX ({})",
                    name, FIELD_NAME_MAX
                )));
            }
            fields.push(Field {
                name: name.to_string(),
                type_,
                size,
                offset,
            });
            offset += size;
        }

        Ok(Schema { fields, primary_key })
    }

    pub fn row_size(&self) -> usize {
        self.fields.iter().map(|f| f.size as usize).sum()
    }

    pub fn primary_key_field(&self) -> &Field {
        &self.fields[self.primary_key]
    }

    pub fn field_named(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// DJB2 string hash, used to map a TEXT primary key down to the engine's `u32` B-tree key.
pub fn hash_string(s: &str) -> u32 {
    let mut hash: u32 = 5381;
    for byte in s.as_bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(*byte as u32);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_string_matches_djb2() {
        // hash("") = 5381
        assert_eq!(hash_string(""), 5381);
        assert_eq!(hash_string("a"), 5381u32.wrapping_mul(33).wrapping_add(b'a' as u32));
    }

    #[test]
    fn schema_computes_offsets() {
        let schema = Schema::new(
            vec![("id", FieldType::Int, 8), ("name", FieldType::Text, 32)],
            0,
        )
        .unwrap();
        assert_eq!(schema.fields[0].offset, 0);
        assert_eq!(schema.fields[1].offset, 8);
        assert_eq!(schema.row_size(), 40);
    }

    #[test]
    fn schema_rejects_too_many_fields() {
        let columns: Vec<(&str, FieldType, u32)> = (0..=MAX_FIELDS)
            .map(|_| ("f", FieldType::Int, 4))
            .collect();
        assert!(Schema::new(columns, 0).is_err());
    }
}

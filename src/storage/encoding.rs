//! # Row Codec
//!
//! Fixed-width per-field encode/decode matching the on-disk anchor's
//! field layout: `TEXT` is zero-filled then truncate-copied, `INT` is
//! written as raw little-endian bytes.
use super::row::{Row, Value};
use super::schema::{Field, FieldType, Schema};
use crate::errors::Error;

pub fn serialize_field(field: &Field, value: &Value, dest: &mut [u8]) -> Result<(), Error> {
    let start = field.offset as usize;
    let end = start + field.size as usize;
    if end > dest.len() {
        return Err(err!(Encoding, "field '{}' does not fit in row buffer", field.name));
    }
    let slot = &mut dest[start..end];
    slot.fill(0);

    match (field.type_, value) {
        (FieldType::Text, Value::Text(s)) => {
            let bytes = s.as_bytes();
            let copy_len = bytes.len().min(slot.len().saturating_sub(1));
            slot[..copy_len].copy_from_slice(&bytes[..copy_len]);
        }
        (FieldType::Int, Value::Int(v)) => {
            let bytes = v.to_le_bytes();
            let copy_len = bytes.len().min(slot.len());
            slot[..copy_len].copy_from_slice(&bytes[..copy_len]);
        }
        _ => return Err(err!(Encoding, "value type mismatch for field '{}'", field.name)),
    }
    Ok(())
}

pub fn deserialize_field(field: &Field, src: &[u8]) -> Result<Value, Error> {
    let start = field.offset as usize;
    let end = start + field.size as usize;
    if end > src.len() {
        return Err(err!(Encoding, "field '{}' does not fit in row buffer", field.name));
    }
    let slot = &src[start..end];

    Ok(match field.type_ {
        FieldType::Text => {
            let nul = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
            Value::Text(String::from_utf8_lossy(&slot[..nul]).into_owned())
        }
        FieldType::Int => {
            let mut buf = [0u8; 8];
            let n = slot.len().min(8);
            buf[..n].copy_from_slice(&slot[..n]);
            Value::Int(i64::from_le_bytes(buf))
        }
    })
}

pub fn encode_row(schema: &Schema, row: &Row) -> Result<Vec<u8>, Error> {
    if row.values.len() != schema.fields.len() {
        return Err(err!(
            Encoding,
            "row has {} values, schema has {} fields",
            row.values.len(),
            schema.fields.len()
        ));
    }
    let mut buf = vec![0u8; schema.row_size()];
    for (field, value) in schema.fields.iter().zip(&row.values) {
        serialize_field(field, value, &mut buf)?;
    }
    Ok(buf)
}

pub fn decode_row(schema: &Schema, encoded: &[u8]) -> Result<Row, Error> {
    if encoded.len() != schema.row_size() {
        return Err(err!(
            Encoding,
            "encoded row size mismatch: expected {}, got {}",
            schema.row_size(),
            encoded.len()
        ));
    }
    let mut values = Vec::with_capacity(schema.fields.len());
    for field in &schema.fields {
        values.push(deserialize_field(field, encoded)?);
    }
    Ok(Row { values })
}

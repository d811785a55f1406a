//! Snapshot file format
//!
//! A database file holds a full copy of the catalog:
//!
//! ```text
//! magic "PBSQ" | version u16 | table count u32
//! per table:  schema length u32 | schema JSON | row count u64 | rows
//! per row:    value count u32 | tagged values
//! ```
//!
//! All integers are little-endian. Files are replaced atomically by writing a
//! sibling temporary file and renaming it over the target.

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::table::Table;
use super::tuple::{Tuple, Value};
use crate::catalog::{Catalog, Schema};
use crate::error::{Error, Result};

const MAGIC: &[u8; 4] = b"PBSQ";
const VERSION: u16 = 1;

const TAG_NULL: u8 = 0;
const TAG_INTEGER: u8 = 1;
const TAG_REAL: u8 = 2;
const TAG_TEXT: u8 = 3;
const TAG_BLOB: u8 = 4;

/// Schema record stored ahead of each table's rows
#[derive(Serialize, Deserialize)]
struct TableRecord {
    name: String,
    schema: Schema,
}

/// Encode a catalog into the snapshot format
pub fn encode_catalog(catalog: &Catalog) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_slice(MAGIC);
    buf.put_u16_le(VERSION);
    buf.put_u32_le(catalog.len() as u32);

    for table in catalog.tables() {
        let record = TableRecord {
            name: table.name().to_string(),
            schema: (**table.schema()).clone(),
        };
        let json = serde_json::to_vec(&record)?;
        buf.put_u32_le(json.len() as u32);
        buf.put_slice(&json);

        let rows = table.rows();
        buf.put_u64_le(rows.len() as u64);
        for row in rows.iter() {
            encode_row(&mut buf, row);
        }
    }

    Ok(buf.freeze())
}

fn encode_row(buf: &mut BytesMut, row: &Tuple) {
    buf.put_u32_le(row.len() as u32);
    for value in row.values() {
        match value {
            Value::Null => buf.put_u8(TAG_NULL),
            Value::Integer(i) => {
                buf.put_u8(TAG_INTEGER);
                buf.put_i64_le(*i);
            }
            Value::Real(f) => {
                buf.put_u8(TAG_REAL);
                buf.put_f64_le(*f);
            }
            Value::Text(s) => {
                buf.put_u8(TAG_TEXT);
                buf.put_u32_le(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }
            Value::Blob(b) => {
                buf.put_u8(TAG_BLOB);
                buf.put_u32_le(b.len() as u32);
                buf.put_slice(b);
            }
        }
    }
}

/// Decode a snapshot back into a catalog
pub fn decode_catalog(data: &[u8]) -> Result<Catalog> {
    let mut cursor = Cursor::new(data);

    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic).map_err(truncated)?;
    if &magic != MAGIC {
        return Err(Error::Corrupt("not a database file".to_string()));
    }
    let version = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    if version != VERSION {
        return Err(Error::Corrupt(format!("unsupported format version {}", version)));
    }

    let table_count = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    let mut catalog = Catalog::new();

    for _ in 0..table_count {
        let json = read_chunk(&mut cursor)?;
        let record: TableRecord = serde_json::from_slice(&json)
            .map_err(|e| Error::Corrupt(format!("bad schema record: {}", e)))?;

        let row_count = cursor.read_u64::<LittleEndian>().map_err(truncated)?;
        let mut rows = Vec::new();
        for _ in 0..row_count {
            let row = decode_row(&mut cursor)?;
            if row.len() != record.schema.column_count() {
                return Err(Error::Corrupt(format!(
                    "row width does not match table {}",
                    record.name
                )));
            }
            rows.push(row);
        }

        if catalog.table_exists(&record.name) {
            return Err(Error::Corrupt(format!("duplicate table {}", record.name)));
        }
        catalog.put_table(Table::from_rows(record.name, record.schema, rows));
    }

    if (cursor.position() as usize) != data.len() {
        return Err(Error::Corrupt("trailing bytes after last table".to_string()));
    }
    Ok(catalog)
}

fn decode_row(cursor: &mut Cursor<&[u8]>) -> Result<Tuple> {
    let count = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    let mut values = Vec::new();
    for _ in 0..count {
        let value = match cursor.read_u8().map_err(truncated)? {
            TAG_NULL => Value::Null,
            TAG_INTEGER => Value::Integer(cursor.read_i64::<LittleEndian>().map_err(truncated)?),
            TAG_REAL => Value::Real(cursor.read_f64::<LittleEndian>().map_err(truncated)?),
            TAG_TEXT => {
                let bytes = read_chunk(cursor)?;
                Value::Text(
                    String::from_utf8(bytes)
                        .map_err(|_| Error::Corrupt("text is not valid UTF-8".to_string()))?,
                )
            }
            TAG_BLOB => Value::Blob(read_chunk(cursor)?),
            tag => return Err(Error::Corrupt(format!("unknown value tag {}", tag))),
        };
        values.push(value);
    }
    Ok(Tuple::new(values))
}

/// Read a u32 length prefix followed by that many bytes
fn read_chunk(cursor: &mut Cursor<&[u8]>) -> Result<Vec<u8>> {
    let len = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if len > remaining {
        return Err(truncated(std::io::ErrorKind::UnexpectedEof.into()));
    }
    let mut chunk = vec![0u8; len];
    cursor.read_exact(&mut chunk).map_err(truncated)?;
    Ok(chunk)
}

fn truncated(err: std::io::Error) -> Error {
    Error::Corrupt(format!("truncated file: {}", err))
}

/// Write the catalog to `path`, replacing the previous snapshot
pub fn write_snapshot(path: &Path, catalog: &Catalog) -> Result<()> {
    let data = encode_catalog(catalog)?;
    let tmp = path.with_extension("pbsq-tmp");
    fs::write(&tmp, &data)?;
    fs::rename(&tmp, path)?;
    debug!(path = %path.display(), bytes = data.len(), "snapshot written");
    Ok(())
}

/// Read the snapshot at `path`; `None` when no file exists yet
pub fn read_snapshot(path: &Path) -> Result<Option<Catalog>> {
    match fs::read(path) {
        Ok(data) => decode_catalog(&data).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

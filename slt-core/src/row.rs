//! Row cell codec.
//!
//! Rows travel between client and tablet server as a contiguous,
//! self-delimiting byte encoding: one tag byte per cell (null / present)
//! followed by the value bytes. Fixed-width types encode little-endian;
//! variable-length types carry a u32 length prefix. Given a schema the
//! length of an encoded row can be computed without copying, so a block
//! of rows can be split into zero-copy `Bytes` slices.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{DataType, Result, Schema, SlateError};

const TAG_NULL: u8 = 0x00;
const TAG_PRESENT: u8 = 0x01;

/// A single decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    String(String),
    Binary(Bytes),
}

impl Cell {
    fn data_type(&self) -> DataType {
        match self {
            Cell::Bool(_) => DataType::Bool,
            Cell::Int32(_) => DataType::Int32,
            Cell::Int64(_) => DataType::Int64,
            Cell::UInt32(_) => DataType::UInt32,
            Cell::UInt64(_) => DataType::UInt64,
            Cell::String(_) => DataType::String,
            Cell::Binary(_) => DataType::Binary,
        }
    }
}

/// A partially-set row bound to a schema.
///
/// Setters type-check against the schema. A row is only acceptable for a
/// write once every key column has been set.
#[derive(Debug, Clone)]
pub struct Row {
    schema: Schema,
    cells: Vec<Option<Cell>>,
}

impl Row {
    pub fn new(schema: Schema) -> Self {
        let cells = vec![None; schema.num_columns()];
        Self { schema, cells }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn set_bool(&mut self, column: &str, v: bool) -> Result<()> {
        self.set(column, Cell::Bool(v))
    }

    pub fn set_i32(&mut self, column: &str, v: i32) -> Result<()> {
        self.set(column, Cell::Int32(v))
    }

    pub fn set_i64(&mut self, column: &str, v: i64) -> Result<()> {
        self.set(column, Cell::Int64(v))
    }

    pub fn set_u32(&mut self, column: &str, v: u32) -> Result<()> {
        self.set(column, Cell::UInt32(v))
    }

    pub fn set_u64(&mut self, column: &str, v: u64) -> Result<()> {
        self.set(column, Cell::UInt64(v))
    }

    pub fn set_string(&mut self, column: &str, v: impl Into<String>) -> Result<()> {
        self.set(column, Cell::String(v.into()))
    }

    pub fn set_binary(&mut self, column: &str, v: impl Into<Bytes>) -> Result<()> {
        self.set(column, Cell::Binary(v.into()))
    }

    /// Set a column from an already-typed cell value.
    pub fn set_cell(&mut self, column: &str, cell: Cell) -> Result<()> {
        self.set(column, cell)
    }

    fn set(&mut self, column: &str, cell: Cell) -> Result<()> {
        let idx = self
            .schema
            .column_index(column)
            .ok_or_else(|| SlateError::UnknownColumn(column.to_string()))?;
        let expected = self.schema.column(idx).data_type;
        if cell.data_type() != expected {
            return Err(SlateError::TypeMismatch {
                column: column.to_string(),
                expected,
            });
        }
        self.cells[idx] = Some(cell);
        Ok(())
    }

    pub fn cell(&self, idx: usize) -> Option<&Cell> {
        self.cells.get(idx).and_then(|c| c.as_ref())
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.schema.column_index(column).and_then(|i| self.cell(i))
    }

    /// True iff every key column has been assigned a value.
    pub fn is_key_set(&self) -> bool {
        self.cells[..self.schema.num_key_columns()]
            .iter()
            .all(Option::is_some)
    }

    /// Encode into the wire cell format. Unset nullable columns encode
    /// as null; an unset non-nullable column is an error.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(16 * self.cells.len());
        for (idx, cell) in self.cells.iter().enumerate() {
            let col = self.schema.column(idx);
            match cell {
                None if col.nullable => buf.put_u8(TAG_NULL),
                None => {
                    return Err(SlateError::InvalidRow(format!(
                        "column {} is not nullable and has no value",
                        col.name
                    )))
                }
                Some(cell) => {
                    buf.put_u8(TAG_PRESENT);
                    encode_cell(&mut buf, cell);
                }
            }
        }
        Ok(buf.freeze())
    }

    /// Decode one row of `schema` from the front of `data`.
    pub fn decode(schema: &Schema, data: &Bytes) -> Result<Row> {
        let mut pos = 0usize;
        let mut cells = Vec::with_capacity(schema.num_columns());
        for col in schema.columns() {
            let tag = *data
                .get(pos)
                .ok_or(SlateError::BufferTooSmall {
                    required: pos + 1,
                    available: data.len(),
                })?;
            pos += 1;
            match tag {
                TAG_NULL => cells.push(None),
                TAG_PRESENT => {
                    let (cell, consumed) = decode_cell(col.data_type, &data.slice(pos..))?;
                    pos += consumed;
                    cells.push(Some(cell));
                }
                other => {
                    return Err(SlateError::InvalidRow(format!(
                        "bad cell tag {:#x} for column {}",
                        other, col.name
                    )))
                }
            }
        }
        Ok(Row {
            schema: schema.clone(),
            cells,
        })
    }
}

fn encode_cell(buf: &mut BytesMut, cell: &Cell) {
    match cell {
        Cell::Bool(v) => buf.put_u8(u8::from(*v)),
        Cell::Int32(v) => buf.put_i32_le(*v),
        Cell::Int64(v) => buf.put_i64_le(*v),
        Cell::UInt32(v) => buf.put_u32_le(*v),
        Cell::UInt64(v) => buf.put_u64_le(*v),
        Cell::String(v) => {
            buf.put_u32_le(v.len() as u32);
            buf.put_slice(v.as_bytes());
        }
        Cell::Binary(v) => {
            buf.put_u32_le(v.len() as u32);
            buf.put_slice(v);
        }
    }
}

/// Decode one cell value, returning it with the number of bytes consumed.
pub fn decode_cell(data_type: DataType, data: &Bytes) -> Result<(Cell, usize)> {
    let need = |required: usize| -> Result<()> {
        if data.len() < required {
            Err(SlateError::BufferTooSmall {
                required,
                available: data.len(),
            })
        } else {
            Ok(())
        }
    };

    match data_type {
        DataType::Bool => {
            need(1)?;
            Ok((Cell::Bool(data[0] != 0), 1))
        }
        DataType::Int32 => {
            need(4)?;
            let mut b = [0u8; 4];
            b.copy_from_slice(&data[..4]);
            Ok((Cell::Int32(i32::from_le_bytes(b)), 4))
        }
        DataType::UInt32 => {
            need(4)?;
            let mut b = [0u8; 4];
            b.copy_from_slice(&data[..4]);
            Ok((Cell::UInt32(u32::from_le_bytes(b)), 4))
        }
        DataType::Int64 => {
            need(8)?;
            let mut b = [0u8; 8];
            b.copy_from_slice(&data[..8]);
            Ok((Cell::Int64(i64::from_le_bytes(b)), 8))
        }
        DataType::UInt64 => {
            need(8)?;
            let mut b = [0u8; 8];
            b.copy_from_slice(&data[..8]);
            Ok((Cell::UInt64(u64::from_le_bytes(b)), 8))
        }
        DataType::String | DataType::Binary => {
            need(4)?;
            let mut b = [0u8; 4];
            b.copy_from_slice(&data[..4]);
            let len = u32::from_le_bytes(b) as usize;
            need(4 + len)?;
            let payload = data.slice(4..4 + len);
            let cell = if data_type == DataType::String {
                let s = std::str::from_utf8(&payload)
                    .map_err(|e| SlateError::InvalidRow(format!("invalid utf-8: {}", e)))?
                    .to_string();
                Cell::String(s)
            } else {
                Cell::Binary(payload)
            };
            Ok((cell, 4 + len))
        }
    }
}

/// Length in bytes of the encoded row of `schema` starting at the front
/// of `data`, without materializing the cells.
pub fn encoded_row_len(schema: &Schema, data: &Bytes) -> Result<usize> {
    let mut pos = 0usize;
    for col in schema.columns() {
        let tag = *data.get(pos).ok_or(SlateError::BufferTooSmall {
            required: pos + 1,
            available: data.len(),
        })?;
        pos += 1;
        if tag == TAG_NULL {
            continue;
        }
        if tag != TAG_PRESENT {
            return Err(SlateError::InvalidRow(format!(
                "bad cell tag {:#x} for column {}",
                tag, col.name
            )));
        }
        match col.data_type.fixed_width() {
            Some(w) => pos += w,
            None => {
                if data.len() < pos + 4 {
                    return Err(SlateError::BufferTooSmall {
                        required: pos + 4,
                        available: data.len(),
                    });
                }
                let mut b = [0u8; 4];
                b.copy_from_slice(&data[pos..pos + 4]);
                pos += 4 + u32::from_le_bytes(b) as usize;
            }
        }
    }
    if pos > data.len() {
        return Err(SlateError::BufferTooSmall {
            required: pos,
            available: data.len(),
        });
    }
    Ok(pos)
}

use serde::{Deserialize, Serialize};

use crate::{Result, SlateError};

/// Column value types understood by the tablet store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int32,
    Int64,
    UInt32,
    UInt64,
    String,
    Binary,
}

impl DataType {
    /// Width of the encoded value for fixed-size types, `None` for
    /// variable-length types.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            DataType::Bool => Some(1),
            DataType::Int32 | DataType::UInt32 => Some(4),
            DataType::Int64 | DataType::UInt64 => Some(8),
            DataType::String | DataType::Binary => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    /// Server-assigned column id. Never set on client-built schemas;
    /// stripped from schemas returned by the master.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: false,
            id: None,
        }
    }

    pub fn nullable(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            id: None,
        }
    }
}

/// An ordered set of columns. The first `num_key_columns` columns form
/// the primary key and must be non-nullable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<ColumnSchema>,
    num_key_columns: usize,
}

impl Schema {
    pub fn new(columns: Vec<ColumnSchema>, num_key_columns: usize) -> Result<Self> {
        if num_key_columns == 0 || num_key_columns > columns.len() {
            return Err(SlateError::InvalidSchema(format!(
                "{} key columns out of {} total",
                num_key_columns,
                columns.len()
            )));
        }
        for col in &columns[..num_key_columns] {
            if col.nullable {
                return Err(SlateError::InvalidSchema(format!(
                    "key column {} may not be nullable",
                    col.name
                )));
            }
        }
        Ok(Self {
            columns,
            num_key_columns,
        })
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_key_columns(&self) -> usize {
        self.num_key_columns
    }

    pub fn column(&self, idx: usize) -> &ColumnSchema {
        &self.columns[idx]
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Build a projection schema from a subset of column names, in the
    /// order given. Projections carry no key-column semantics.
    pub fn projection_for(&self, names: &[&str]) -> Result<Schema> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let idx = self
                .column_index(name)
                .ok_or_else(|| SlateError::UnknownColumn((*name).to_string()))?;
            let mut col = self.columns[idx].clone();
            col.id = None;
            columns.push(col);
        }
        Ok(Schema {
            columns,
            num_key_columns: 0,
        })
    }

    /// Return a copy with server-assigned column ids removed.
    pub fn without_ids(&self) -> Schema {
        let columns = self
            .columns
            .iter()
            .map(|c| ColumnSchema {
                id: None,
                ..c.clone()
            })
            .collect();
        Schema {
            columns,
            num_key_columns: self.num_key_columns,
        }
    }

    pub fn has_column_ids(&self) -> bool {
        self.columns.iter().any(|c| c.id.is_some())
    }
}

//! Request/response messages consumed from tablet servers.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use slt_core::{encoded_row_len, Result, Schema};

use crate::WireStatus;

/// A half-open range predicate over a single column. Bound values are
/// encoded cells, opaque at this layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRangePredicate {
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<Bytes>,
}

/// Opens a server-side cursor over one tablet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewScanRequest {
    pub tablet_id: String,
    pub projected_columns: Schema,
    #[serde(default)]
    pub range_predicates: Vec<ColumnRangePredicate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_scan: Option<NewScanRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scanner_id: Option<String>,
    pub batch_size_bytes: u32,
    #[serde(default)]
    pub close_scanner: bool,
}

/// A page of encoded rows. `data` is the concatenation of `num_rows`
/// rows in the cell codec of the projection the scan was opened with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowBlock {
    pub num_rows: u32,
    pub data: Bytes,
}

impl RowBlock {
    pub fn from_rows(rows: &[Bytes]) -> Self {
        let mut data = Vec::with_capacity(rows.iter().map(Bytes::len).sum());
        for row in rows {
            data.extend_from_slice(row);
        }
        Self {
            num_rows: rows.len() as u32,
            data: Bytes::from(data),
        }
    }

    /// Split the block into one zero-copy slice per row, using the
    /// projection to walk row boundaries.
    pub fn extract_rows(&self, projection: &Schema) -> Result<Vec<Bytes>> {
        let mut rows = Vec::with_capacity(self.num_rows as usize);
        let mut pos = 0usize;
        for _ in 0..self.num_rows {
            let remaining = self.data.slice(pos..);
            let len = encoded_row_len(projection, &remaining)?;
            rows.push(self.data.slice(pos..pos + len));
            pos += len;
        }
        Ok(rows)
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scanner_id: Option<String>,
    #[serde(default)]
    pub has_more_results: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RowBlock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOpType {
    Insert,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteOp {
    pub op_type: WriteOpType,
    /// Encoded row in the table schema's cell codec.
    pub row: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    pub tablet_id: String,
    pub schema: Schema,
    pub ops: Vec<WriteOp>,
}

/// A mutation-level failure. Never fails the RPC itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerRowError {
    pub row_index: u32,
    pub error: WireStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireStatus>,
    #[serde(default)]
    pub per_row_errors: Vec<PerRowError>,
}

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod frame;
mod master;
mod status;
mod tserver;

pub use frame::{encode_frame, parse_frame, Frame, RpcMethod, FRAME_HEADER_SIZE};
pub use master::{
    AlterStep, AlterTableRequest, AlterTableResponse, CreateTableRequest, CreateTableResponse,
    DeleteTableRequest, DeleteTableResponse, GetTableLocationsRequest, GetTableLocationsResponse,
    GetTableSchemaRequest, GetTableSchemaResponse, IsAlterTableDoneRequest,
    IsAlterTableDoneResponse, IsCreateTableDoneRequest, IsCreateTableDoneResponse,
    ReplicaLocation, TableIdentifier, TabletLocation,
};
pub use status::{WireStatus, WireStatusCode};
pub use tserver::{
    ColumnRangePredicate, NewScanRequest, PerRowError, RowBlock, ScanRequest, ScanResponse,
    WriteOp, WriteOpType, WriteRequest, WriteResponse,
};

pub const PROTOCOL_VERSION: u8 = 1;

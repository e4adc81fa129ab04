//! Request/response messages consumed from the master catalog service.

use serde::{Deserialize, Serialize};
use slt_core::{ColumnSchema, Schema};

use crate::WireStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableIdentifier {
    pub table_name: String,
}

impl TableIdentifier {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTableRequest {
    pub name: String,
    pub schema: Schema,
    #[serde(default)]
    pub pre_split_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTableResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsCreateTableDoneRequest {
    pub table: TableIdentifier,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IsCreateTableDoneResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireStatus>,
    #[serde(default)]
    pub done: bool,
}

/// One schema-mutation step in an alter request. Steps apply in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlterStep {
    AddColumn { schema: ColumnSchema },
    DropColumn { name: String },
    RenameColumn { old_name: String, new_name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlterTableRequest {
    pub table: TableIdentifier,
    #[serde(default)]
    pub steps: Vec<AlterStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_table_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlterTableResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsAlterTableDoneRequest {
    pub table: TableIdentifier,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IsAlterTableDoneResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireStatus>,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteTableRequest {
    pub table: TableIdentifier,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteTableResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTableSchemaRequest {
    pub table: TableIdentifier,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetTableSchemaResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTableLocationsRequest {
    pub table: TableIdentifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_returned_locations: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaLocation {
    pub uuid: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletLocation {
    pub tablet_id: String,
    /// Empty string = unbounded below.
    pub start_key: String,
    /// Empty string = unbounded above.
    pub end_key: String,
    #[serde(default)]
    pub replicas: Vec<ReplicaLocation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetTableLocationsResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireStatus>,
    #[serde(default)]
    pub tablet_locations: Vec<TabletLocation>,
}

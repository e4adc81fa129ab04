//! In-memory fake cluster: a master and a tablet server implementing
//! the client's service traits, wired up through a fake messenger.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use slt_client::rpc::{MasterRpc, Messenger, TabletServerRpc};
use slt_client::{Client, ClientOptions, Result};
use slt_core::{Row, Schema};
use slt_wire::{
    AlterStep, AlterTableRequest, AlterTableResponse, CreateTableRequest, CreateTableResponse,
    DeleteTableRequest, DeleteTableResponse, GetTableLocationsRequest, GetTableLocationsResponse,
    GetTableSchemaRequest, GetTableSchemaResponse, IsAlterTableDoneRequest,
    IsAlterTableDoneResponse, IsCreateTableDoneRequest, IsCreateTableDoneResponse, PerRowError,
    ReplicaLocation, RowBlock, ScanRequest, ScanResponse, TabletLocation, WireStatus,
    WriteRequest, WriteResponse,
};

pub const MASTER_ADDR: &str = "127.0.0.1:7150";
const TSERVER_HOST: &str = "127.0.0.1";
const TSERVER_PORT: u16 = 7250;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Tunables the cluster components observe. The client core never reads
/// these; tests set them the way they would set process flags.
#[derive(Debug, Clone)]
pub struct FakeClusterConfig {
    /// Tablet-server heartbeat cadence. Lowered in tests that create
    /// many tablets so assignment converges quickly.
    pub heartbeat_interval_ms: u64,
    /// Whether tablet servers preallocate log segments. Disabled in
    /// tests that create thousands of tablets.
    pub log_preallocate_segments: bool,
    /// How many tablets the master marks running per location poll.
    pub tablets_assigned_per_poll: usize,
    /// Rows per scan page served by the tablet server.
    pub rows_per_batch: usize,
}

impl Default for FakeClusterConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 500,
            log_preallocate_segments: true,
            tablets_assigned_per_poll: 40,
            rows_per_batch: 100,
        }
    }
}

pub struct FakeCluster {
    pub master: Arc<FakeMaster>,
    pub tserver: Arc<FakeTabletServer>,
    pub messenger: Arc<FakeMessenger>,
}

impl FakeCluster {
    pub fn new(config: FakeClusterConfig) -> Self {
        let master = Arc::new(FakeMaster::new(&config));
        let tserver = Arc::new(FakeTabletServer::new(&config));
        let messenger = Arc::new(FakeMessenger {
            master: master.clone(),
            tserver: tserver.clone(),
        });
        Self {
            master,
            tserver,
            messenger,
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions::new(MASTER_ADDR).with_messenger(self.messenger.clone())
    }

    pub async fn client(&self) -> Arc<Client> {
        Client::new(self.client_options())
            .await
            .unwrap_or_else(|e| panic!("client init failed: {}", e))
    }
}

pub struct FakeMessenger {
    master: Arc<FakeMaster>,
    tserver: Arc<FakeTabletServer>,
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn master_proxy(&self, _addr: SocketAddr) -> Result<Arc<dyn MasterRpc>> {
        Ok(self.master.clone())
    }

    async fn tablet_server_proxy(&self, _addr: SocketAddr) -> Result<Arc<dyn TabletServerRpc>> {
        Ok(self.tserver.clone())
    }
}

// ============================================================================
// Fake master
// ============================================================================

struct FakeTable {
    schema: Schema,
    tablets: Vec<TabletLocation>,
    /// Tablets visible to location requests so far. Assignment advances
    /// on every poll and restarts from zero when the master restarts.
    running: usize,
    alter_polls_remaining: u32,
}

struct MasterState {
    tables: HashMap<String, FakeTable>,
    restarts: u32,
    starting_up: bool,
}

pub struct FakeMaster {
    state: Mutex<MasterState>,
    tablets_assigned_per_poll: usize,
}

impl FakeMaster {
    fn new(config: &FakeClusterConfig) -> Self {
        Self {
            state: Mutex::new(MasterState {
                tables: HashMap::new(),
                restarts: 0,
                starting_up: false,
            }),
            tablets_assigned_per_poll: config.tablets_assigned_per_poll.max(1),
        }
    }

    /// Simulate a master restart: assignment progress is rebuilt from
    /// tablet-server heartbeats, and the first RPC afterwards sees the
    /// master still starting up.
    pub fn restart(&self) {
        let mut state = lock(&self.state);
        state.restarts += 1;
        state.starting_up = true;
        for table in state.tables.values_mut() {
            table.running = 0;
        }
    }

    pub fn restart_count(&self) -> u32 {
        lock(&self.state).restarts
    }

    fn startup_error(state: &mut MasterState) -> Option<WireStatus> {
        if state.starting_up {
            state.starting_up = false;
            Some(WireStatus::service_unavailable("master is starting up"))
        } else {
            None
        }
    }

    fn replicas() -> Vec<ReplicaLocation> {
        vec![ReplicaLocation {
            uuid: "ts-1".to_string(),
            host: TSERVER_HOST.to_string(),
            port: TSERVER_PORT,
        }]
    }

    /// Tile the keyspace with one tablet per split interval.
    fn build_tablets(table_name: &str, split_keys: &[String]) -> Vec<TabletLocation> {
        let mut keys = split_keys.to_vec();
        keys.sort();
        keys.dedup();

        let mut bounds = vec![String::new()];
        bounds.extend(keys);
        bounds.push(String::new());

        bounds
            .windows(2)
            .enumerate()
            .map(|(i, pair)| TabletLocation {
                tablet_id: format!("{}-tablet-{:05}", table_name, i),
                start_key: pair[0].clone(),
                end_key: pair[1].clone(),
                replicas: Self::replicas(),
            })
            .collect()
    }

    fn assign_ids(schema: &Schema) -> Schema {
        let columns = schema
            .columns()
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mut c = c.clone();
                c.id = Some(i as u32 + 10);
                c
            })
            .collect();
        Schema::new(columns, schema.num_key_columns())
            .unwrap_or_else(|e| panic!("fake master rebuilt invalid schema: {}", e))
    }
}

#[async_trait]
impl MasterRpc for FakeMaster {
    async fn create_table(
        &self,
        req: CreateTableRequest,
        _timeout: Duration,
    ) -> Result<CreateTableResponse> {
        let mut state = lock(&self.state);
        if let Some(err) = Self::startup_error(&mut state) {
            return Ok(CreateTableResponse { error: Some(err) });
        }
        if state.tables.contains_key(&req.name) {
            return Ok(CreateTableResponse {
                error: Some(WireStatus::already_present(format!(
                    "table {} already exists",
                    req.name
                ))),
            });
        }

        let tablets = Self::build_tablets(&req.name, &req.pre_split_keys);
        state.tables.insert(
            req.name.clone(),
            FakeTable {
                schema: Self::assign_ids(&req.schema),
                tablets,
                running: 0,
                alter_polls_remaining: 0,
            },
        );
        Ok(CreateTableResponse::default())
    }

    async fn is_create_table_done(
        &self,
        req: IsCreateTableDoneRequest,
        _timeout: Duration,
    ) -> Result<IsCreateTableDoneResponse> {
        let mut state = lock(&self.state);
        if let Some(err) = Self::startup_error(&mut state) {
            return Ok(IsCreateTableDoneResponse {
                error: Some(err),
                done: false,
            });
        }
        let per_poll = self.tablets_assigned_per_poll;
        match state.tables.get_mut(&req.table.table_name) {
            Some(table) => {
                table.running = (table.running + per_poll).min(table.tablets.len());
                Ok(IsCreateTableDoneResponse {
                    error: None,
                    done: table.running == table.tablets.len(),
                })
            }
            None => Ok(IsCreateTableDoneResponse {
                error: Some(WireStatus::not_found(format!(
                    "table {} not found",
                    req.table.table_name
                ))),
                done: false,
            }),
        }
    }

    async fn alter_table(
        &self,
        req: AlterTableRequest,
        _timeout: Duration,
    ) -> Result<AlterTableResponse> {
        let mut state = lock(&self.state);
        if let Some(err) = Self::startup_error(&mut state) {
            return Ok(AlterTableResponse { error: Some(err) });
        }

        let name = req.table.table_name.clone();
        let Some(mut table) = state.tables.remove(&name) else {
            return Ok(AlterTableResponse {
                error: Some(WireStatus::not_found(format!("table {} not found", name))),
            });
        };

        let mut columns = table.schema.columns().to_vec();
        for step in &req.steps {
            match step {
                AlterStep::AddColumn { schema } => {
                    if columns.iter().any(|c| c.name == schema.name) {
                        state.tables.insert(name, table);
                        return Ok(AlterTableResponse {
                            error: Some(WireStatus::already_present(format!(
                                "column {} already exists",
                                schema.name
                            ))),
                        });
                    }
                    columns.push(schema.clone());
                }
                AlterStep::DropColumn { name: col } => {
                    let Some(idx) = columns.iter().position(|c| &c.name == col) else {
                        state.tables.insert(name, table);
                        return Ok(AlterTableResponse {
                            error: Some(WireStatus::not_found(format!(
                                "column {} not found",
                                col
                            ))),
                        });
                    };
                    columns.remove(idx);
                }
                AlterStep::RenameColumn { old_name, new_name } => {
                    let Some(idx) = columns.iter().position(|c| &c.name == old_name) else {
                        state.tables.insert(name, table);
                        return Ok(AlterTableResponse {
                            error: Some(WireStatus::not_found(format!(
                                "column {} not found",
                                old_name
                            ))),
                        });
                    };
                    columns[idx].name = new_name.clone();
                }
            }
        }

        match Schema::new(columns, table.schema.num_key_columns()) {
            Ok(schema) => table.schema = schema,
            Err(e) => {
                state.tables.insert(name, table);
                return Ok(AlterTableResponse {
                    error: Some(WireStatus::invalid_argument(e.to_string())),
                });
            }
        }

        // Completion is reported a couple of polls later, like a real
        // alter propagating to tablet servers.
        table.alter_polls_remaining = 2;

        let final_name = req.new_table_name.unwrap_or_else(|| name.clone());
        if final_name != name && state.tables.contains_key(&final_name) {
            state.tables.insert(name, table);
            return Ok(AlterTableResponse {
                error: Some(WireStatus::already_present(format!(
                    "table {} already exists",
                    final_name
                ))),
            });
        }
        state.tables.insert(final_name, table);
        Ok(AlterTableResponse::default())
    }

    async fn is_alter_table_done(
        &self,
        req: IsAlterTableDoneRequest,
        _timeout: Duration,
    ) -> Result<IsAlterTableDoneResponse> {
        let mut state = lock(&self.state);
        if let Some(err) = Self::startup_error(&mut state) {
            return Ok(IsAlterTableDoneResponse {
                error: Some(err),
                done: false,
            });
        }
        match state.tables.get_mut(&req.table.table_name) {
            Some(table) => {
                let done = table.alter_polls_remaining == 0;
                if !done {
                    table.alter_polls_remaining -= 1;
                }
                Ok(IsAlterTableDoneResponse { error: None, done })
            }
            None => Ok(IsAlterTableDoneResponse {
                error: Some(WireStatus::not_found(format!(
                    "table {} not found",
                    req.table.table_name
                ))),
                done: false,
            }),
        }
    }

    async fn delete_table(
        &self,
        req: DeleteTableRequest,
        _timeout: Duration,
    ) -> Result<DeleteTableResponse> {
        let mut state = lock(&self.state);
        if let Some(err) = Self::startup_error(&mut state) {
            return Ok(DeleteTableResponse { error: Some(err) });
        }
        match state.tables.remove(&req.table.table_name) {
            Some(_) => Ok(DeleteTableResponse::default()),
            None => Ok(DeleteTableResponse {
                error: Some(WireStatus::not_found(format!(
                    "table {} not found",
                    req.table.table_name
                ))),
            }),
        }
    }

    async fn get_table_schema(
        &self,
        req: GetTableSchemaRequest,
        _timeout: Duration,
    ) -> Result<GetTableSchemaResponse> {
        let mut state = lock(&self.state);
        if let Some(err) = Self::startup_error(&mut state) {
            return Ok(GetTableSchemaResponse {
                error: Some(err),
                schema: None,
            });
        }
        match state.tables.get(&req.table.table_name) {
            Some(table) => Ok(GetTableSchemaResponse {
                error: None,
                schema: Some(table.schema.clone()),
            }),
            None => Ok(GetTableSchemaResponse {
                error: Some(WireStatus::not_found(format!(
                    "table {} not found",
                    req.table.table_name
                ))),
                schema: None,
            }),
        }
    }

    async fn get_table_locations(
        &self,
        req: GetTableLocationsRequest,
        _timeout: Duration,
    ) -> Result<GetTableLocationsResponse> {
        let mut state = lock(&self.state);
        if let Some(err) = Self::startup_error(&mut state) {
            return Ok(GetTableLocationsResponse {
                error: Some(err),
                tablet_locations: Vec::new(),
            });
        }

        if req.max_returned_locations == Some(0) {
            return Ok(GetTableLocationsResponse {
                error: Some(WireStatus::invalid_argument(
                    "max_returned_locations must be greater than 0",
                )),
                tablet_locations: Vec::new(),
            });
        }

        let per_poll = self.tablets_assigned_per_poll;
        let Some(table) = state.tables.get_mut(&req.table.table_name) else {
            return Ok(GetTableLocationsResponse {
                error: Some(WireStatus::not_found(format!(
                    "table {} not found",
                    req.table.table_name
                ))),
                tablet_locations: Vec::new(),
            });
        };

        table.running = (table.running + per_poll).min(table.tablets.len());

        let start_key = req.start_key.unwrap_or_default();
        let max = req
            .max_returned_locations
            .map_or(usize::MAX, |m| m as usize);

        let tablet_locations = table.tablets[..table.running]
            .iter()
            .filter(|t| t.end_key.is_empty() || t.end_key.as_str() > start_key.as_str())
            .take(max)
            .cloned()
            .collect();

        Ok(GetTableLocationsResponse {
            error: None,
            tablet_locations,
        })
    }
}

// ============================================================================
// Fake tablet server
// ============================================================================

struct ScanCursor {
    rows: Vec<Bytes>,
    pos: usize,
}

struct TsState {
    /// Encoded rows per tablet, in the full table schema.
    rows: HashMap<String, Vec<Bytes>>,
    /// Full schema per tablet, learned from writes or seeding.
    schemas: HashMap<String, Schema>,
    write_log: Vec<WriteRequest>,
    scanners: HashMap<String, ScanCursor>,
    closed_scanners: Vec<String>,
    next_scanner_id: u64,
    scan_calls: u32,
    fail_next_write: Option<WireStatus>,
    reject_rows_in_next_write: Vec<u32>,
    fail_next_scan: Option<WireStatus>,
    write_delay: Option<Duration>,
}

pub struct FakeTabletServer {
    state: Mutex<TsState>,
    rows_per_batch: usize,
}

impl FakeTabletServer {
    fn new(config: &FakeClusterConfig) -> Self {
        Self {
            state: Mutex::new(TsState {
                rows: HashMap::new(),
                schemas: HashMap::new(),
                write_log: Vec::new(),
                scanners: HashMap::new(),
                closed_scanners: Vec::new(),
                next_scanner_id: 1,
                scan_calls: 0,
                fail_next_write: None,
                reject_rows_in_next_write: Vec::new(),
                fail_next_scan: None,
                write_delay: None,
            }),
            rows_per_batch: config.rows_per_batch.max(1),
        }
    }

    pub fn seed_rows(&self, tablet_id: &str, schema: &Schema, rows: &[Row]) {
        let mut state = lock(&self.state);
        let encoded = rows
            .iter()
            .map(|r| {
                r.encode()
                    .unwrap_or_else(|e| panic!("seed row failed to encode: {}", e))
            })
            .collect::<Vec<_>>();
        state.schemas.insert(tablet_id.to_string(), schema.clone());
        state
            .rows
            .entry(tablet_id.to_string())
            .or_default()
            .extend(encoded);
    }

    pub fn write_log(&self) -> Vec<WriteRequest> {
        lock(&self.state).write_log.clone()
    }

    pub fn row_count(&self, tablet_id: &str) -> usize {
        lock(&self.state).rows.get(tablet_id).map_or(0, Vec::len)
    }

    pub fn closed_scanners(&self) -> Vec<String> {
        lock(&self.state).closed_scanners.clone()
    }

    pub fn open_scanner_count(&self) -> usize {
        lock(&self.state).scanners.len()
    }

    pub fn scan_calls(&self) -> u32 {
        lock(&self.state).scan_calls
    }

    pub fn fail_next_write(&self, status: WireStatus) {
        lock(&self.state).fail_next_write = Some(status);
    }

    pub fn reject_rows_in_next_write(&self, indices: Vec<u32>) {
        lock(&self.state).reject_rows_in_next_write = indices;
    }

    pub fn fail_next_scan(&self, status: WireStatus) {
        lock(&self.state).fail_next_scan = Some(status);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        lock(&self.state).write_delay = Some(delay);
    }

    /// Re-encode a stored row into the scan's projection.
    fn project_row(full_schema: &Schema, projection: &Schema, encoded: &Bytes) -> Bytes {
        let row = Row::decode(full_schema, encoded)
            .unwrap_or_else(|e| panic!("stored row failed to decode: {}", e));
        let mut projected = Row::new(projection.clone());
        for col in projection.columns() {
            if let Some(cell) = row.get(&col.name) {
                projected
                    .set_cell(&col.name, cell.clone())
                    .unwrap_or_else(|e| panic!("projection cell copy failed: {}", e));
            }
        }
        projected
            .encode()
            .unwrap_or_else(|e| panic!("projected row failed to encode: {}", e))
    }
}

#[async_trait]
impl TabletServerRpc for FakeTabletServer {
    async fn write(&self, req: WriteRequest, _timeout: Duration) -> Result<WriteResponse> {
        let delay = lock(&self.state).write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.state);
        state.write_log.push(req.clone());

        if let Some(status) = state.fail_next_write.take() {
            return Ok(WriteResponse {
                error: Some(status),
                per_row_errors: Vec::new(),
            });
        }

        let rejects = std::mem::take(&mut state.reject_rows_in_next_write);
        let mut per_row_errors = Vec::new();
        state
            .schemas
            .insert(req.tablet_id.clone(), req.schema.clone());
        let rows = state.rows.entry(req.tablet_id.clone()).or_default();
        for (idx, op) in req.ops.into_iter().enumerate() {
            if rejects.contains(&(idx as u32)) {
                per_row_errors.push(PerRowError {
                    row_index: idx as u32,
                    error: WireStatus::already_present("key already present"),
                });
            } else {
                rows.push(op.row);
            }
        }

        Ok(WriteResponse {
            error: None,
            per_row_errors,
        })
    }

    async fn scan(&self, req: ScanRequest, _timeout: Duration) -> Result<ScanResponse> {
        let mut state = lock(&self.state);
        state.scan_calls += 1;

        if req.close_scanner {
            if let Some(id) = req.scanner_id {
                state.scanners.remove(&id);
                state.closed_scanners.push(id);
            }
            return Ok(ScanResponse::default());
        }

        if let Some(status) = state.fail_next_scan.take() {
            return Ok(ScanResponse {
                error: Some(status),
                ..ScanResponse::default()
            });
        }

        if let Some(new_scan) = req.new_scan {
            let full_schema = state.schemas.get(&new_scan.tablet_id).cloned();
            let stored = state
                .rows
                .get(&new_scan.tablet_id)
                .cloned()
                .unwrap_or_default();

            if stored.is_empty() {
                return Ok(ScanResponse {
                    error: None,
                    scanner_id: None,
                    has_more_results: false,
                    data: None,
                });
            }

            let Some(full_schema) = full_schema else {
                return Ok(ScanResponse {
                    error: Some(WireStatus::not_found(format!(
                        "unknown tablet {}",
                        new_scan.tablet_id
                    ))),
                    ..ScanResponse::default()
                });
            };

            let projected: Vec<Bytes> = stored
                .iter()
                .map(|r| Self::project_row(&full_schema, &new_scan.projected_columns, r))
                .collect();

            let page: Vec<Bytes> = projected.iter().take(self.rows_per_batch).cloned().collect();
            let has_more = projected.len() > page.len();
            let scanner_id = if has_more {
                let id = format!("scanner-{}", state.next_scanner_id);
                state.next_scanner_id += 1;
                state.scanners.insert(
                    id.clone(),
                    ScanCursor {
                        rows: projected,
                        pos: page.len(),
                    },
                );
                Some(id)
            } else {
                None
            };

            return Ok(ScanResponse {
                error: None,
                scanner_id,
                has_more_results: has_more,
                data: Some(RowBlock::from_rows(&page)),
            });
        }

        // Continuation of an existing cursor.
        let Some(id) = req.scanner_id else {
            return Ok(ScanResponse {
                error: Some(WireStatus::invalid_argument(
                    "scan request carries neither new_scan nor scanner_id",
                )),
                ..ScanResponse::default()
            });
        };
        let Some(cursor) = state.scanners.get_mut(&id) else {
            return Ok(ScanResponse {
                error: Some(WireStatus::not_found(format!("unknown scanner {}", id))),
                ..ScanResponse::default()
            });
        };

        let end = (cursor.pos + self.rows_per_batch).min(cursor.rows.len());
        let page: Vec<Bytes> = cursor.rows[cursor.pos..end].to_vec();
        cursor.pos = end;
        let has_more = cursor.pos < cursor.rows.len();
        if !has_more {
            state.scanners.remove(&id);
        }

        Ok(ScanResponse {
            error: None,
            scanner_id: Some(id),
            has_more_results: has_more,
            data: Some(RowBlock::from_rows(&page)),
        })
    }
}

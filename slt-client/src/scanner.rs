//! Streaming scanner over a table's tablet.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use slt_core::{Schema, DEFAULT_BATCH_SIZE_BYTES};
use slt_wire::{ColumnRangePredicate, NewScanRequest, ScanRequest, ScanResponse};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};
use crate::rpc::TabletServerRpc;
use crate::table::Table;

const SCAN_TIMEOUT: Duration = Duration::from_secs(5);

/// A cursor over one tablet's rows.
///
/// Configure (projection, batch size, predicates), `open`, then pull
/// pages with `next_batch` while `has_more_rows`. Rows come back as
/// zero-copy slices of the last response's block; decode them with
/// `Row::decode` against the scanner's projection.
///
/// Dropping the scanner releases the server-side cursor best-effort: the
/// close RPC runs on a detached task with its own state, so it survives
/// the scanner itself.
pub struct Scanner {
    table: Arc<Table>,
    projection: Schema,
    next_req: ScanRequest,
    last_response: ScanResponse,
    proxy: Option<Arc<dyn TabletServerRpc>>,
    open: bool,
    data_in_open: bool,
}

impl Scanner {
    /// A scanner over `table`, projecting all columns by default.
    pub fn new(table: Arc<Table>) -> Self {
        let projection = table.schema().without_ids();
        let next_req = ScanRequest {
            new_scan: Some(NewScanRequest {
                tablet_id: String::new(),
                projected_columns: projection.clone(),
                range_predicates: Vec::new(),
            }),
            scanner_id: None,
            batch_size_bytes: DEFAULT_BATCH_SIZE_BYTES,
            close_scanner: false,
        };
        Self {
            table,
            projection,
            next_req,
            last_response: ScanResponse::default(),
            proxy: None,
            open: false,
            data_in_open: false,
        }
    }

    /// Project a subset of columns, by name. Only legal before `open`.
    pub fn set_projection(&mut self, columns: &[&str]) -> Result<()> {
        assert!(!self.open, "scanner already open");
        let projection = self
            .table
            .schema()
            .projection_for(columns)
            .map_err(|e| match e {
                slt_core::SlateError::UnknownColumn(c) => {
                    ClientError::InvalidArgument(format!("unknown column {}", c))
                }
                other => ClientError::from(other),
            })?;
        if let Some(new_scan) = self.next_req.new_scan.as_mut() {
            new_scan.projected_columns = projection.clone();
        }
        self.projection = projection;
        Ok(())
    }

    /// Only legal before `open`.
    pub fn set_batch_size_bytes(&mut self, batch_size: u32) {
        assert!(!self.open, "scanner already open");
        self.next_req.batch_size_bytes = batch_size;
    }

    /// AND another predicate onto the scan. Only legal before `open`.
    pub fn add_conjunct_predicate(&mut self, pred: ColumnRangePredicate) {
        assert!(!self.open, "scanner already open");
        if let Some(new_scan) = self.next_req.new_scan.as_mut() {
            new_scan.range_predicates.push(pred);
        }
    }

    pub fn projection(&self) -> &Schema {
        &self.projection
    }

    /// Open a server-side cursor. On failure the scanner stays
    /// unopened and may be retried or dropped freely.
    pub async fn open(&mut self) -> Result<()> {
        assert!(!self.open, "scanner already open");

        if let Some(new_scan) = self.next_req.new_scan.as_mut() {
            new_scan.tablet_id = self.table.tablet_id().to_string();
        }

        let proxy = self.table.proxy().await?;
        let resp = proxy.scan(self.next_req.clone(), SCAN_TIMEOUT).await?;
        if let Some(err) = resp.error {
            return Err(ClientError::from_wire(err));
        }

        self.proxy = Some(proxy);
        self.data_in_open = resp.data.is_some();

        self.next_req.new_scan = None;
        if resp.has_more_results {
            self.next_req.scanner_id = resp.scanner_id.clone();
            debug!(scanner_id = ?resp.scanner_id, "started scanner");
        } else {
            debug!("scanner matched no rows, no scanner id assigned");
        }

        self.last_response = resp;
        self.open = true;
        Ok(())
    }

    /// Whether another `next_batch` call can yield rows.
    pub fn has_more_rows(&self) -> bool {
        assert!(self.open, "scanner not open");
        self.data_in_open || self.last_response.has_more_results
    }

    /// Pull the next page of rows. The first call drains rows returned
    /// by `open`; later calls fetch from the server cursor. Each row is
    /// a slice of the response block, decodable with the projection.
    pub async fn next_batch(&mut self) -> Result<Vec<Bytes>> {
        assert!(self.open, "scanner not open");

        if self.data_in_open {
            self.data_in_open = false;
        } else {
            let proxy = self
                .proxy
                .clone()
                .ok_or_else(|| ClientError::IllegalState("scanner has no proxy".to_string()))?;
            let resp = proxy.scan(self.next_req.clone(), SCAN_TIMEOUT).await?;
            if let Some(err) = resp.error {
                return Err(ClientError::from_wire(err));
            }
            self.last_response = resp;
        }

        match &self.last_response.data {
            Some(block) => Ok(block.extract_rows(&self.projection)?),
            None => Ok(Vec::new()),
        }
    }

    /// Release the server-side cursor. Fire-and-forget: the RPC runs on
    /// a detached task against its own request state, and a failure is
    /// only logged. No-op when the scan never got a cursor.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }

        let scanner_id = match self.next_req.scanner_id.take() {
            Some(id) if !id.is_empty() => id,
            // The scan matched no rows and no server cursor was ever
            // allocated; nothing to close.
            _ => {
                self.open = false;
                return;
            }
        };

        // Detached closer: nothing here may borrow the scanner, which
        // can be destroyed before the RPC completes.
        if let Some(proxy) = self.proxy.take() {
            let close_req = ScanRequest {
                new_scan: None,
                scanner_id: Some(scanner_id.clone()),
                batch_size_bytes: 0,
                close_scanner: true,
            };
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        match proxy.scan(close_req, SCAN_TIMEOUT).await {
                            Ok(resp) => {
                                if let Some(err) = resp.error {
                                    warn!(scanner_id = %scanner_id, error = %err, "couldn't close scanner");
                                }
                            }
                            Err(e) => {
                                warn!(scanner_id = %scanner_id, error = %e, "couldn't close scanner");
                            }
                        }
                    });
                }
                Err(_) => {
                    warn!(scanner_id = %scanner_id, "no runtime available to close scanner");
                }
            }
        }

        self.next_req = ScanRequest {
            new_scan: None,
            scanner_id: None,
            batch_size_bytes: 0,
            close_scanner: false,
        };
        self.last_response = ScanResponse::default();
        self.open = false;
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.close();
    }
}

//! Shared table handle: schema, tablet location, lazily built proxy.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use slt_core::{Row, Schema};
use slt_wire::{GetTableLocationsRequest, TableIdentifier};
use tokio::time::Instant;
use tracing::debug;

use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::rpc::{MasterRpc, TabletServerRpc};
use crate::write_op::Insert;

const LOCATION_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// A user-visible table. Holds a strong reference to the client; the
/// client never holds tables, so no cycle forms.
pub struct Table {
    client: Arc<Client>,
    name: String,
    schema: Schema,
    tablet_id: String,
    proxy: Mutex<Option<Arc<dyn TabletServerRpc>>>,
}

impl Table {
    /// Poll the master for this table's tablet until at least one is
    /// assigned, bounded by the client's admin timeout, then record the
    /// first tablet's id and seed the metadata cache.
    pub(crate) async fn open(
        client: Arc<Client>,
        name: &str,
        schema: Schema,
    ) -> Result<Table> {
        let deadline = Instant::now() + client.admin_timeout();
        let req = GetTableLocationsRequest {
            table: TableIdentifier::new(name),
            start_key: None,
            max_returned_locations: None,
        };

        let locations = loop {
            let resp = client
                .master_proxy()
                .get_table_locations(req.clone(), client.admin_timeout())
                .await?;
            if let Some(err) = resp.error {
                return Err(ClientError::from_wire(err));
            }
            if !resp.tablet_locations.is_empty() {
                break resp.tablet_locations;
            }
            if Instant::now() >= deadline {
                return Err(ClientError::TimedOut(format!(
                    "timed out waiting for tablet assignment of table {}",
                    name
                )));
            }
            tokio::time::sleep(LOCATION_POLL_INTERVAL).await;
        };

        debug_assert_eq!(
            locations.len(),
            1,
            "only one tablet per table is supported"
        );
        let tablet_id = locations[0].tablet_id.clone();
        debug!(table = name, %tablet_id, "opened table");

        client.meta_cache().tablet_for(&tablet_id, name);

        Ok(Table {
            client,
            name: name.to_string(),
            schema,
            tablet_id,
            proxy: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn tablet_id(&self) -> &str {
        &self.tablet_id
    }

    /// Start building an insert against this table.
    pub fn new_insert(self: &Arc<Self>) -> Insert {
        Insert::new(self.clone(), Row::new(self.schema.clone()))
    }

    /// The proxy for the tablet server hosting this table's tablet,
    /// materialized on first use.
    pub(crate) async fn proxy(&self) -> Result<Arc<dyn TabletServerRpc>> {
        if let Some(proxy) = lock(&self.proxy).clone() {
            return Ok(proxy);
        }
        let proxy = self.client.tablet_proxy(&self.tablet_id).await?;
        *lock(&self.proxy) = Some(proxy.clone());
        Ok(proxy)
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("tablet_id", &self.tablet_id)
            .finish()
    }
}

//! Client-side cache of tablet locations and tablet-server proxies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use slt_wire::{GetTableLocationsRequest, ReplicaLocation, TableIdentifier};
use tracing::trace;

use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::rpc::{MasterRpc, TabletServerRpc};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Process-wide (per client) tablet metadata cache. Entries are seeded
/// when tables are opened and refreshed on demand.
#[derive(Default)]
pub(crate) struct MetaCache {
    tablets: Mutex<HashMap<String, Arc<RemoteTablet>>>,
}

impl MetaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cache entry for `tablet_id`, creating it if absent.
    pub fn tablet_for(&self, tablet_id: &str, table_name: &str) -> Arc<RemoteTablet> {
        let mut tablets = lock(&self.tablets);
        tablets
            .entry(tablet_id.to_string())
            .or_insert_with(|| {
                trace!(tablet_id, table_name, "seeding meta cache entry");
                Arc::new(RemoteTablet::new(tablet_id, table_name))
            })
            .clone()
    }

    pub fn lookup_tablet(&self, tablet_id: &str) -> Option<Arc<RemoteTablet>> {
        lock(&self.tablets).get(tablet_id).cloned()
    }
}

/// A tablet as seen by this client: its replica set, refreshed from the
/// master on demand.
pub(crate) struct RemoteTablet {
    tablet_id: String,
    table_name: String,
    replicas: Mutex<Vec<Arc<RemoteTabletServer>>>,
}

impl RemoteTablet {
    fn new(tablet_id: &str, table_name: &str) -> Self {
        Self {
            tablet_id: tablet_id.to_string(),
            table_name: table_name.to_string(),
            replicas: Mutex::new(Vec::new()),
        }
    }

    pub fn tablet_id(&self) -> &str {
        &self.tablet_id
    }

    /// Re-fetch this tablet's replica set from the master. Existing
    /// replica entries are kept when the server uuid matches, so their
    /// cached proxies survive the refresh.
    pub async fn refresh(&self, client: &Client) -> Result<()> {
        let req = GetTableLocationsRequest {
            table: TableIdentifier::new(&self.table_name),
            start_key: None,
            max_returned_locations: None,
        };
        let resp = client
            .master_proxy()
            .get_table_locations(req, client.admin_timeout())
            .await?;
        if let Some(err) = resp.error {
            return Err(ClientError::from_wire(err));
        }

        let location = resp
            .tablet_locations
            .into_iter()
            .find(|l| l.tablet_id == self.tablet_id);

        let mut replicas = lock(&self.replicas);
        let old = std::mem::take(&mut *replicas);
        if let Some(location) = location {
            for replica in &location.replicas {
                let existing = old.iter().find(|ts| ts.uuid == replica.uuid).cloned();
                replicas.push(
                    existing.unwrap_or_else(|| Arc::new(RemoteTabletServer::new(replica))),
                );
            }
        }
        trace!(
            tablet_id = %self.tablet_id,
            replicas = replicas.len(),
            "refreshed tablet"
        );
        Ok(())
    }

    /// The first replica, which is the one the client talks to.
    pub fn first_replica(&self) -> Option<Arc<RemoteTabletServer>> {
        lock(&self.replicas).first().cloned()
    }
}

/// A tablet server hosting at least one replica, with a lazily built
/// proxy.
pub(crate) struct RemoteTabletServer {
    uuid: String,
    host: String,
    port: u16,
    proxy: Mutex<Option<Arc<dyn TabletServerRpc>>>,
}

impl RemoteTabletServer {
    fn new(replica: &ReplicaLocation) -> Self {
        Self {
            uuid: replica.uuid.clone(),
            host: replica.host.clone(),
            port: replica.port,
            proxy: Mutex::new(None),
        }
    }

    /// Resolve this server's address and build (or reuse) its proxy.
    pub async fn refresh_proxy(&self, client: &Client) -> Result<Arc<dyn TabletServerRpc>> {
        if let Some(proxy) = lock(&self.proxy).clone() {
            return Ok(proxy);
        }
        let addrs = client
            .dns_resolver()
            .resolve_host_port(&self.host, self.port)
            .await?;
        let proxy = client.messenger().tablet_server_proxy(addrs[0]).await?;
        *lock(&self.proxy) = Some(proxy.clone());
        Ok(proxy)
    }
}

//! The Slate client: factory, admin façade, and tablet-proxy lookup.

use std::sync::Arc;
use std::time::Duration;

use slt_core::Schema;
use slt_wire::{
    CreateTableRequest, DeleteTableRequest, GetTableSchemaRequest, IsAlterTableDoneRequest,
    IsCreateTableDoneRequest, TableIdentifier,
};
use tokio::time::Instant;
use tracing::warn;

use crate::alter::AlterTableBuilder;
use crate::error::{ClientError, Result};
use crate::meta_cache::MetaCache;
use crate::retry::retry_until;
use crate::rpc::{DnsResolver, MasterRpc, Messenger, MessengerBuilder, TabletServerRpc};
use crate::session::Session;
use crate::table::Table;

pub const DEFAULT_MASTER_PORT: u16 = 7150;

const DEFAULT_ADMIN_TIMEOUT: Duration = Duration::from_secs(5);
const CREATE_TABLE_DEADLINE: Duration = Duration::from_secs(15);
const ALTER_TABLE_DEADLINE: Duration = Duration::from_secs(60);

/// Client construction options.
#[derive(Clone)]
pub struct ClientOptions {
    /// Master address as host or host:port. Required.
    pub master_address: String,
    /// Timeout applied to each single-shot admin RPC.
    pub default_admin_timeout: Duration,
    /// Injected transport; a TCP messenger is built when absent.
    pub messenger: Option<Arc<dyn Messenger>>,
}

impl ClientOptions {
    pub fn new(master_address: impl Into<String>) -> Self {
        Self {
            master_address: master_address.into(),
            default_admin_timeout: DEFAULT_ADMIN_TIMEOUT,
            messenger: None,
        }
    }

    pub fn with_admin_timeout(mut self, timeout: Duration) -> Self {
        self.default_admin_timeout = timeout;
        self
    }

    pub fn with_messenger(mut self, messenger: Arc<dyn Messenger>) -> Self {
        self.messenger = Some(messenger);
        self
    }
}

/// Options for `Client::create_table`.
#[derive(Debug, Clone)]
pub struct CreateTableOptions {
    split_keys: Vec<String>,
    wait_assignment: bool,
}

impl Default for CreateTableOptions {
    fn default() -> Self {
        Self {
            split_keys: Vec::new(),
            wait_assignment: true,
        }
    }
}

impl CreateTableOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-split the table at the given keys; n keys yield n+1 tablets.
    pub fn with_split_keys(mut self, keys: Vec<String>) -> Self {
        self.split_keys = keys;
        self
    }

    /// Whether to block until the master reports tablet assignment
    /// complete. On by default.
    pub fn wait_assignment(mut self, wait: bool) -> Self {
        self.wait_assignment = wait;
        self
    }
}

/// Shared handle to the cluster. Created once, cloned via `Arc` into
/// every session and table.
pub struct Client {
    options: ClientOptions,
    messenger: Arc<dyn Messenger>,
    master_proxy: Arc<dyn MasterRpc>,
    meta_cache: MetaCache,
    dns_resolver: DnsResolver,
    initted: bool,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("initted", &self.initted)
            .finish()
    }
}

impl Client {
    /// Build and initialize a client: construct the messenger if none
    /// was injected, resolve the master address, and set up the
    /// metadata cache.
    pub async fn new(options: ClientOptions) -> Result<Arc<Client>> {
        if options.master_address.is_empty() {
            return Err(ClientError::InvalidArgument(
                "no master address specified".to_string(),
            ));
        }

        let messenger = match &options.messenger {
            Some(messenger) => messenger.clone(),
            None => MessengerBuilder::new("client").build(),
        };

        let dns_resolver = DnsResolver::new();
        let addrs = dns_resolver
            .resolve(&options.master_address, DEFAULT_MASTER_PORT)
            .await?;
        if addrs.len() > 1 {
            warn!(
                master_address = %options.master_address,
                using = %addrs[0],
                "master address resolved to multiple IPs"
            );
        }
        let master_proxy = messenger.master_proxy(addrs[0]).await?;

        Ok(Arc::new(Client {
            options,
            messenger,
            master_proxy,
            meta_cache: MetaCache::new(),
            dns_resolver,
            initted: true,
        }))
    }

    pub(crate) fn master_proxy(&self) -> &Arc<dyn MasterRpc> {
        &self.master_proxy
    }

    pub(crate) fn messenger(&self) -> &Arc<dyn Messenger> {
        &self.messenger
    }

    pub(crate) fn dns_resolver(&self) -> &DnsResolver {
        &self.dns_resolver
    }

    pub(crate) fn meta_cache(&self) -> &MetaCache {
        &self.meta_cache
    }

    pub fn admin_timeout(&self) -> Duration {
        self.options.default_admin_timeout
    }

    /// Create a table with default options (no splits, wait for
    /// assignment).
    pub async fn create_table(&self, table_name: &str, schema: &Schema) -> Result<()> {
        self.create_table_with(table_name, schema, CreateTableOptions::default())
            .await
    }

    pub async fn create_table_with(
        &self,
        table_name: &str,
        schema: &Schema,
        opts: CreateTableOptions,
    ) -> Result<()> {
        let deadline = Instant::now() + CREATE_TABLE_DEADLINE;

        let req = CreateTableRequest {
            name: table_name.to_string(),
            schema: schema.clone(),
            pre_split_keys: opts.split_keys,
        };
        let resp = self
            .master_proxy
            .create_table(req, self.options.default_admin_timeout)
            .await?;
        if let Some(err) = resp.error {
            // Existence conflicts are returned verbatim, no spinning.
            return Err(ClientError::from_wire(err));
        }

        if opts.wait_assignment {
            retry_until(
                deadline,
                "waiting on create table to complete",
                "timed out waiting for table creation",
                |probe_deadline| self.is_create_table_in_progress(table_name, probe_deadline),
            )
            .await?;
        }

        Ok(())
    }

    /// Probe shape for the retry driver: the "in progress" answer is
    /// the retry flag.
    async fn is_create_table_in_progress(
        &self,
        table_name: &str,
        deadline: Instant,
    ) -> (Result<()>, bool) {
        let req = IsCreateTableDoneRequest {
            table: TableIdentifier::new(table_name),
        };
        let timeout = deadline.saturating_duration_since(Instant::now());
        match self.master_proxy.is_create_table_done(req, timeout).await {
            Ok(resp) => match resp.error {
                Some(err) => (Err(ClientError::from_wire(err)), true),
                None => (Ok(()), !resp.done),
            },
            Err(e) => (Err(e), true),
        }
    }

    /// Apply the accumulated alter steps, then poll until the master
    /// reports the alteration complete.
    pub async fn alter_table(&self, table_name: &str, alter: &AlterTableBuilder) -> Result<()> {
        if !alter.has_changes() {
            return Err(ClientError::InvalidArgument(
                "no alter steps provided".to_string(),
            ));
        }

        let deadline = Instant::now() + ALTER_TABLE_DEADLINE;

        let req = alter.to_request(TableIdentifier::new(table_name));
        let resp = self
            .master_proxy
            .alter_table(req, self.options.default_admin_timeout)
            .await?;
        if let Some(err) = resp.error {
            return Err(ClientError::from_wire(err));
        }

        // Poll under the new name when the alter renames the table.
        let alter_name = alter.new_table_name().unwrap_or(table_name).to_string();
        retry_until(
            deadline,
            "waiting on alter table to complete",
            "timed out waiting for alter table",
            |probe_deadline| self.is_alter_table_in_progress(&alter_name, probe_deadline),
        )
        .await?;

        Ok(())
    }

    async fn is_alter_table_in_progress(
        &self,
        table_name: &str,
        deadline: Instant,
    ) -> (Result<()>, bool) {
        let req = IsAlterTableDoneRequest {
            table: TableIdentifier::new(table_name),
        };
        let timeout = deadline.saturating_duration_since(Instant::now());
        match self.master_proxy.is_alter_table_done(req, timeout).await {
            Ok(resp) => match resp.error {
                Some(err) => (Err(ClientError::from_wire(err)), true),
                None => (Ok(()), !resp.done),
            },
            Err(e) => (Err(e), true),
        }
    }

    pub async fn delete_table(&self, table_name: &str) -> Result<()> {
        let req = DeleteTableRequest {
            table: TableIdentifier::new(table_name),
        };
        let resp = self
            .master_proxy
            .delete_table(req, self.options.default_admin_timeout)
            .await?;
        if let Some(err) = resp.error {
            return Err(ClientError::from_wire(err));
        }
        Ok(())
    }

    /// Fetch a table's schema. Server-assigned column ids are stripped
    /// so the result compares equal to client-built schemas.
    pub async fn get_table_schema(&self, table_name: &str) -> Result<Schema> {
        let req = GetTableSchemaRequest {
            table: TableIdentifier::new(table_name),
        };
        let resp = self
            .master_proxy
            .get_table_schema(req, self.options.default_admin_timeout)
            .await?;
        if let Some(err) = resp.error {
            return Err(ClientError::from_wire(err));
        }
        let schema = resp.schema.ok_or_else(|| {
            ClientError::InvalidResponse("schema response carried no schema".to_string())
        })?;
        Ok(schema.without_ids())
    }

    /// Fetch schema and tablet location for a table and return a shared
    /// handle to it.
    pub async fn open_table(self: &Arc<Self>, table_name: &str) -> Result<Arc<Table>> {
        assert!(self.initted, "client used before initialization");

        let schema = self.get_table_schema(table_name).await?;
        let table = Table::open(self.clone(), table_name, schema).await?;
        Ok(Arc::new(table))
    }

    /// Start a new write session against this client.
    pub fn new_session(self: &Arc<Self>) -> Arc<Session> {
        assert!(self.initted, "client used before initialization");
        Session::new(self.clone())
    }

    /// Resolve a tablet id to a proxy for the server hosting its first
    /// replica.
    pub(crate) async fn tablet_proxy(&self, tablet_id: &str) -> Result<Arc<dyn TabletServerRpc>> {
        let tablet = self.meta_cache.lookup_tablet(tablet_id).ok_or_else(|| {
            ClientError::NotFound(format!("unknown tablet {}", tablet_id))
        })?;

        tablet.refresh(self).await?;

        let ts = tablet.first_replica().ok_or_else(|| {
            ClientError::NotFound(format!("no replicas for tablet {}", tablet_id))
        })?;

        ts.refresh_proxy(self).await
    }
}

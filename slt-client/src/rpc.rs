//! RPC plumbing: service traits, DNS resolution, and the default
//! TCP messenger.
//!
//! The master and tablet-server services are consumed through
//! object-safe traits so tests can stand up in-memory fakes. The
//! production path speaks the `slt-wire` frame protocol over TCP with
//! one lazily-established connection per proxy; a failed call drops
//! the connection so the next call reconnects.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use slt_wire::{
    encode_frame, parse_frame, AlterTableRequest, AlterTableResponse, CreateTableRequest,
    CreateTableResponse, DeleteTableRequest, DeleteTableResponse, Frame,
    GetTableLocationsRequest, GetTableLocationsResponse, GetTableSchemaRequest,
    GetTableSchemaResponse, IsAlterTableDoneRequest, IsAlterTableDoneResponse,
    IsCreateTableDoneRequest, IsCreateTableDoneResponse, RpcMethod, ScanRequest, ScanResponse,
    WriteRequest, WriteResponse, FRAME_HEADER_SIZE,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::error::{ClientError, Result};

/// Master catalog service, as consumed by the client.
#[async_trait]
pub trait MasterRpc: Send + Sync {
    async fn create_table(
        &self,
        req: CreateTableRequest,
        timeout: Duration,
    ) -> Result<CreateTableResponse>;

    async fn is_create_table_done(
        &self,
        req: IsCreateTableDoneRequest,
        timeout: Duration,
    ) -> Result<IsCreateTableDoneResponse>;

    async fn alter_table(
        &self,
        req: AlterTableRequest,
        timeout: Duration,
    ) -> Result<AlterTableResponse>;

    async fn is_alter_table_done(
        &self,
        req: IsAlterTableDoneRequest,
        timeout: Duration,
    ) -> Result<IsAlterTableDoneResponse>;

    async fn delete_table(
        &self,
        req: DeleteTableRequest,
        timeout: Duration,
    ) -> Result<DeleteTableResponse>;

    async fn get_table_schema(
        &self,
        req: GetTableSchemaRequest,
        timeout: Duration,
    ) -> Result<GetTableSchemaResponse>;

    async fn get_table_locations(
        &self,
        req: GetTableLocationsRequest,
        timeout: Duration,
    ) -> Result<GetTableLocationsResponse>;
}

/// Tablet-server data plane, as consumed by the client.
#[async_trait]
pub trait TabletServerRpc: Send + Sync {
    async fn write(&self, req: WriteRequest, timeout: Duration) -> Result<WriteResponse>;

    async fn scan(&self, req: ScanRequest, timeout: Duration) -> Result<ScanResponse>;
}

/// Transport factory. One messenger is shared per client; proxies it
/// hands out are shared freely across tasks.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn master_proxy(&self, addr: SocketAddr) -> Result<Arc<dyn MasterRpc>>;

    async fn tablet_server_proxy(&self, addr: SocketAddr) -> Result<Arc<dyn TabletServerRpc>>;
}

/// Thin wrapper over `tokio::net::lookup_host`.
#[derive(Debug, Default)]
pub struct DnsResolver;

impl DnsResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve `addr` (host or host:port) to socket addresses, applying
    /// `default_port` when no port is given.
    pub async fn resolve(&self, addr: &str, default_port: u16) -> Result<Vec<SocketAddr>> {
        let target = if addr.contains(':') {
            addr.to_string()
        } else {
            format!("{}:{}", addr, default_port)
        };
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&target)
            .await
            .map_err(ClientError::ConnectionFailed)?
            .collect();
        if addrs.is_empty() {
            return Err(ClientError::NotFound(format!(
                "address {} resolved to nothing",
                addr
            )));
        }
        Ok(addrs)
    }

    pub async fn resolve_host_port(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>> {
        self.resolve(&format!("{}:{}", host, port), port).await
    }
}

/// Builds the default TCP messenger.
pub struct MessengerBuilder {
    name: String,
}

impl MessengerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn build(self) -> Arc<dyn Messenger> {
        Arc::new(TcpMessenger { name: self.name })
    }
}

struct TcpMessenger {
    name: String,
}

#[async_trait]
impl Messenger for TcpMessenger {
    async fn master_proxy(&self, addr: SocketAddr) -> Result<Arc<dyn MasterRpc>> {
        debug!(messenger = %self.name, %addr, "building master proxy");
        Ok(Arc::new(RemoteProxy::new(addr)))
    }

    async fn tablet_server_proxy(&self, addr: SocketAddr) -> Result<Arc<dyn TabletServerRpc>> {
        debug!(messenger = %self.name, %addr, "building tablet server proxy");
        Ok(Arc::new(RemoteProxy::new(addr)))
    }
}

/// One logical connection to a remote service. Connects on first use;
/// any failure or timeout tears the stream down so the next call dials
/// again.
struct RpcConnection {
    addr: SocketAddr,
    state: tokio::sync::Mutex<ConnState>,
}

struct ConnState {
    stream: Option<TcpStream>,
    buf: Vec<u8>,
    filled: usize,
}

impl RpcConnection {
    fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            state: tokio::sync::Mutex::new(ConnState {
                stream: None,
                buf: vec![0u8; 64 * 1024],
                filled: 0,
            }),
        }
    }

    async fn call(&self, method: RpcMethod, payload: Bytes, timeout: Duration) -> Result<Frame> {
        let mut state = self.state.lock().await;
        match tokio::time::timeout(timeout, Self::call_inner(&mut state, self.addr, method, payload))
            .await
        {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(e)) => {
                state.stream = None;
                state.filled = 0;
                Err(e)
            }
            Err(_) => {
                state.stream = None;
                state.filled = 0;
                Err(ClientError::TimedOut(format!(
                    "RPC {:?} to {} timed out after {:?}",
                    method, self.addr, timeout
                )))
            }
        }
    }

    async fn call_inner(
        state: &mut ConnState,
        addr: SocketAddr,
        method: RpcMethod,
        payload: Bytes,
    ) -> Result<Frame> {
        let mut stream = match state.stream.take() {
            Some(stream) => stream,
            None => {
                trace!(%addr, "dialing");
                let stream = TcpStream::connect(addr)
                    .await
                    .map_err(ClientError::ConnectionFailed)?;
                stream.set_nodelay(true)?;
                state.filled = 0;
                stream
            }
        };

        let frame_bytes = encode_frame(&Frame::new(method, payload));
        stream.write_all(&frame_bytes).await?;

        let frame = loop {
            if state.filled >= FRAME_HEADER_SIZE {
                if let Some((frame, consumed)) = parse_frame(&state.buf[..state.filled])? {
                    state.buf.copy_within(consumed..state.filled, 0);
                    state.filled -= consumed;
                    break frame;
                }
            }
            if state.filled == state.buf.len() {
                state.buf.resize(state.buf.len() * 2, 0);
            }
            let n = stream.read(&mut state.buf[state.filled..]).await?;
            if n == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            state.filled += n;
        };

        state.stream = Some(stream);
        Ok(frame)
    }
}

/// Frame-level proxy speaking JSON payloads, shared by both services.
struct RemoteProxy {
    conn: RpcConnection,
}

impl RemoteProxy {
    fn new(addr: SocketAddr) -> Self {
        Self {
            conn: RpcConnection::new(addr),
        }
    }

    async fn call_json<Req, Resp>(
        &self,
        method: RpcMethod,
        req: &Req,
        timeout: Duration,
    ) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_vec(req)
            .map_err(|e| ClientError::Protocol(format!("request encode failed: {}", e)))?;
        let frame = self.conn.call(method, Bytes::from(payload), timeout).await?;
        if frame.method == RpcMethod::ErrorResponse {
            return Err(ClientError::InvalidResponse(
                String::from_utf8_lossy(&frame.payload).into_owned(),
            ));
        }
        serde_json::from_slice(&frame.payload)
            .map_err(|e| ClientError::InvalidResponse(format!("response decode failed: {}", e)))
    }
}

#[async_trait]
impl MasterRpc for RemoteProxy {
    async fn create_table(
        &self,
        req: CreateTableRequest,
        timeout: Duration,
    ) -> Result<CreateTableResponse> {
        self.call_json(RpcMethod::CreateTable, &req, timeout).await
    }

    async fn is_create_table_done(
        &self,
        req: IsCreateTableDoneRequest,
        timeout: Duration,
    ) -> Result<IsCreateTableDoneResponse> {
        self.call_json(RpcMethod::IsCreateTableDone, &req, timeout)
            .await
    }

    async fn alter_table(
        &self,
        req: AlterTableRequest,
        timeout: Duration,
    ) -> Result<AlterTableResponse> {
        self.call_json(RpcMethod::AlterTable, &req, timeout).await
    }

    async fn is_alter_table_done(
        &self,
        req: IsAlterTableDoneRequest,
        timeout: Duration,
    ) -> Result<IsAlterTableDoneResponse> {
        self.call_json(RpcMethod::IsAlterTableDone, &req, timeout)
            .await
    }

    async fn delete_table(
        &self,
        req: DeleteTableRequest,
        timeout: Duration,
    ) -> Result<DeleteTableResponse> {
        self.call_json(RpcMethod::DeleteTable, &req, timeout).await
    }

    async fn get_table_schema(
        &self,
        req: GetTableSchemaRequest,
        timeout: Duration,
    ) -> Result<GetTableSchemaResponse> {
        self.call_json(RpcMethod::GetTableSchema, &req, timeout)
            .await
    }

    async fn get_table_locations(
        &self,
        req: GetTableLocationsRequest,
        timeout: Duration,
    ) -> Result<GetTableLocationsResponse> {
        self.call_json(RpcMethod::GetTableLocations, &req, timeout)
            .await
    }
}

#[async_trait]
impl TabletServerRpc for RemoteProxy {
    async fn write(&self, req: WriteRequest, timeout: Duration) -> Result<WriteResponse> {
        self.call_json(RpcMethod::Write, &req, timeout).await
    }

    async fn scan(&self, req: ScanRequest, timeout: Duration) -> Result<ScanResponse> {
        self.call_json(RpcMethod::Scan, &req, timeout).await
    }
}

//! TCP session manager.
//!
//! [`SessionManager`] accepts connections, gives each one a [`ClientId`],
//! and runs a receive loop per connection that decodes frames and hands
//! them to registered packet callbacks. It can address any live connection
//! by id, broadcast to all of them, and shut everything down.

use crate::error::ServerError;
use framecast_protocol::{
    BoxFuture, Codec, Endpoint, Framing, Packet, PacketId, PacketType, ProtocolError, Registry,
    TransportError, DEFAULT_MAX_PACKET_SIZE,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

/// Identifies one live connection on a [`SessionManager`].
///
/// Ids start at 1 and are never reused while the manager lives; 0 is the
/// [`ClientId::NONE`] sentinel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub const NONE: ClientId = ClientId(0);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handed to packet callbacks and lifecycle hooks: which client this is,
/// plus a handle back to the manager.
#[derive(Clone)]
pub struct ClientContext {
    id: ClientId,
    sessions: SessionManager,
}

impl ClientContext {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Sends a packet back to this client.
    pub async fn reply(&self, packet: &dyn Packet) -> Result<(), ServerError> {
        self.sessions.send_packet(self.id, packet).await
    }

    /// Sends a packet to every other client. Returns how many got it.
    pub async fn broadcast(&self, packet: &dyn Packet) -> usize {
        self.sessions.broadcast_packet(packet, Some(self.id)).await
    }

    /// Closes this client's connection.
    pub fn close(&self) -> bool {
        self.sessions.disconnect_client(self.id)
    }
}

impl fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientContext").field("id", &self.id).finish()
    }
}

/// Called once a connection is registered, before its first receive.
pub type ConnectedCallback = Arc<dyn Fn(ClientContext) -> BoxFuture<'static, ()> + Send + Sync>;

/// Called once a connection is gone. The error is `None` for a clean close.
pub type DisconnectedCallback =
    Arc<dyn Fn(ClientContext, Option<TransportError>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Session manager configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to; the port is given to [`SessionManager::start`].
    pub bind_ip: IpAddr,
    /// Inactivity deadline per connection (zero disables it).
    pub idle_timeout: Duration,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Largest frame (type id + payload) in bytes.
    pub max_packet_size: usize,
    /// How frames are delimited on the stream.
    pub framing: Framing,
    pub on_connected: Option<ConnectedCallback>,
    pub on_disconnected: Option<DisconnectedCallback>,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_ip", &self.bind_ip)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_connections", &self.max_connections)
            .field("max_packet_size", &self.max_packet_size)
            .field("framing", &self.framing)
            .field("on_connected", &self.on_connected.is_some())
            .field("on_disconnected", &self.on_disconnected.is_some())
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            idle_timeout: Duration::from_secs(300),
            max_connections: 1000,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            framing: Framing::Unframed,
            on_connected: None,
            on_disconnected: None,
        }
    }
}

impl ServerConfig {
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            max_packet_size,
            ..Default::default()
        }
    }

    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Sets the hook run when a client connects.
    pub fn on_connected<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(ClientContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_connected = Some(Arc::new(
            move |ctx: ClientContext| -> BoxFuture<'static, ()> { Box::pin(callback(ctx)) },
        ));
        self
    }

    /// Sets the hook run when a client disconnects.
    pub fn on_disconnected<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(ClientContext, Option<TransportError>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_disconnected = Some(Arc::new(
            move |ctx: ClientContext, err: Option<TransportError>| -> BoxFuture<'static, ()> {
                Box::pin(callback(ctx, err))
            },
        ));
        self
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_refused: AtomicU64,
    pub packets_received: AtomicU64,
    pub packets_sent: AtomicU64,
    pub errors_total: AtomicU64,
}

type ClientEndpoint = Arc<Endpoint<ClientContext>>;

/// Live connections keyed by id.
#[derive(Default)]
struct ConnectionTable {
    last_id: u64,
    connections: HashMap<ClientId, ClientEndpoint>,
}

impl ConnectionTable {
    fn insert(&mut self, endpoint: ClientEndpoint) -> ClientId {
        self.last_id += 1;
        let id = ClientId(self.last_id);
        self.connections.insert(id, endpoint);
        id
    }

    fn get(&self, id: ClientId) -> Option<ClientEndpoint> {
        self.connections.get(&id).cloned()
    }

    fn remove(&mut self, id: ClientId) -> Option<ClientEndpoint> {
        self.connections.remove(&id)
    }

    fn snapshot(&self, exclude: Option<ClientId>) -> Vec<(ClientId, ClientEndpoint)> {
        self.connections
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .map(|(id, endpoint)| (*id, endpoint.clone()))
            .collect()
    }

    fn drain(&mut self) -> Vec<(ClientId, ClientEndpoint)> {
        self.connections.drain().collect()
    }

    fn len(&self) -> usize {
        self.connections.len()
    }
}

struct Shared {
    config: ServerConfig,
    codec: Codec<ClientContext>,
    table: RwLock<ConnectionTable>,
    shutdown: watch::Sender<bool>,
    local_addr: RwLock<Option<SocketAddr>>,
    stats: ServerStats,
}

/// Accepts connections and routes packets between them.
///
/// Cheap to clone; every clone drives the same set of connections.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    /// Creates a manager. Fails if the configured packet size is zero.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let codec = Codec::new(config.max_packet_size, config.framing)?;
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                codec,
                table: RwLock::new(ConnectionTable::default()),
                shutdown,
                local_addr: RwLock::new(None),
                stats: ServerStats::default(),
            }),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// The packet types this manager decodes.
    pub fn registry(&self) -> &Registry<ClientContext> {
        self.shared.codec.registry()
    }

    /// Registers `P` with an async handler run for every packet received.
    pub fn register_handler<P, F, Fut>(&self, handler: F) -> Result<(), ProtocolError>
    where
        P: PacketType,
        F: Fn(ClientContext, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.registry().register_handler(handler)
    }

    /// Registers `P` so it can be decoded, with no handler.
    pub fn register_passive<P: PacketType>(&self) -> Result<(), ProtocolError> {
        self.registry().register_passive::<P>()
    }

    /// Listens on `port` and serves connections until [`Self::stop`].
    ///
    /// Never returns `Ok`: after `stop` it fails with an `Accept` error
    /// (see [`ServerError::is_listener_closed`]). A bind failure is a
    /// `Listen` error.
    pub async fn start(&self, port: u16) -> Result<(), ServerError> {
        let bind_addr = SocketAddr::new(self.shared.config.bind_ip, port);
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|source| ServerError::Listen { port, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Listen { port, source })?;
        *self.shared.local_addr.write() = Some(local_addr);

        tracing::info!(
            "Server listening on {} ({})",
            local_addr,
            self.shared.config.framing
        );

        let mut shutdown_rx = self.shared.shutdown.subscribe();
        let result = loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.accept(stream, addr),
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                            break Err(ServerError::Accept(e));
                        }
                    }
                }
                _ = wait_stopped(&mut shutdown_rx) => {
                    tracing::info!("Server shutting down");
                    break Err(ServerError::Accept(std::io::Error::new(
                        std::io::ErrorKind::ConnectionAborted,
                        "listener closed",
                    )));
                }
            }
        };

        *self.shared.local_addr.write() = None;
        result
    }

    fn accept(&self, stream: TcpStream, addr: SocketAddr) {
        let shared = &self.shared;
        stream.set_nodelay(true).ok();

        let endpoint = Arc::new(Endpoint::from_stream(
            stream,
            shared.codec.clone(),
            shared.config.idle_timeout,
        ));

        let id = {
            let mut table = shared.table.write();
            // Checked under the table lock so a concurrent stop never misses us
            if self.is_stopped() {
                return;
            }
            if table.len() >= shared.config.max_connections {
                tracing::warn!("Connection limit reached, rejecting {}", addr);
                shared.stats.connections_refused.fetch_add(1, Ordering::Relaxed);
                return;
            }
            table.insert(endpoint.clone())
        };
        shared.stats.connections_total.fetch_add(1, Ordering::Relaxed);

        tracing::info!("Client {} connected from {}", id, addr);

        let sessions = self.clone();
        tokio::spawn(async move { sessions.serve(id, endpoint).await });
    }

    /// Per-connection receive loop.
    async fn serve(self, id: ClientId, endpoint: ClientEndpoint) {
        let ctx = ClientContext {
            id,
            sessions: self.clone(),
        };

        if let Some(callback) = &self.shared.config.on_connected {
            callback(ctx.clone()).await;
        }

        let cause = loop {
            match endpoint.receive(ctx.clone()).await {
                Ok(packet_id) => {
                    self.shared
                        .stats
                        .packets_received
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::trace!("Client {} handled packet {}", id, packet_id);
                }
                Err(TransportError::Disconnected) => break None,
                Err(e) => break Some(e),
            }
        };

        endpoint.release().await;
        self.shared.table.write().remove(id);

        match &cause {
            None => tracing::info!("Client {} disconnected", id),
            Some(e) => {
                self.shared.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                tracing::info!("Client {} disconnected: {}", id, e);
            }
        }

        if let Some(callback) = &self.shared.config.on_disconnected {
            callback(ctx, cause).await;
        }
    }

    fn endpoint(&self, id: ClientId) -> Result<ClientEndpoint, ServerError> {
        self.shared
            .table
            .read()
            .get(id)
            .ok_or(ServerError::InvalidClientId(id))
    }

    /// Sends a packet to one client.
    pub async fn send_packet(&self, id: ClientId, packet: &dyn Packet) -> Result<(), ServerError> {
        let endpoint = self.endpoint(id)?;
        endpoint.send(packet).await?;
        self.shared.stats.packets_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Sends a packet to every client except `exclude`.
    ///
    /// The packet is encoded once. Individual send failures are logged and
    /// skipped; the return value is the number of clients that got it.
    pub async fn broadcast_packet(&self, packet: &dyn Packet, exclude: Option<ClientId>) -> usize {
        let recipients = self.shared.table.read().snapshot(exclude);
        if recipients.is_empty() {
            return 0;
        }

        let wire = match self.shared.codec.encode_wire(packet) {
            Ok(wire) => wire,
            Err(e) => {
                tracing::warn!("Failed to encode broadcast packet {}: {}", packet.id(), e);
                return 0;
            }
        };

        let mut delivered = 0;
        for (id, endpoint) in recipients {
            match endpoint.send_encoded(packet.id(), &wire).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!("Broadcast to client {} failed: {}", id, e),
            }
        }
        self.shared
            .stats
            .packets_sent
            .fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    /// Receives one packet from a client and runs its handler.
    ///
    /// Every connection already has a receive loop; calling this as well
    /// makes the two take turns reading from the same stream.
    pub async fn receive_packet(&self, id: ClientId) -> Result<PacketId, ServerError> {
        let endpoint = self.endpoint(id)?;
        let ctx = ClientContext {
            id,
            sessions: self.clone(),
        };
        Ok(endpoint.receive(ctx).await?)
    }

    /// Closes one client's connection. Its receive loop ends cleanly and
    /// the disconnect hook runs. Returns false if the id is unknown.
    pub fn disconnect_client(&self, id: ClientId) -> bool {
        match self.shared.table.read().get(id) {
            Some(endpoint) => {
                endpoint.close();
                true
            }
            None => false,
        }
    }

    /// Stops accepting and closes every connection.
    pub fn stop(&self) {
        self.shared.shutdown.send_replace(true);
        let drained = self.shared.table.write().drain();

        for (id, endpoint) in &drained {
            tracing::debug!("Closing client {}", id);
            endpoint.close();
        }
        tracing::info!("Server stopped, closed {} connections", drained.len());
    }

    pub fn is_stopped(&self) -> bool {
        *self.shared.shutdown.borrow()
    }

    /// The bound listener address while [`Self::start`] is running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.shared.local_addr.read()
    }

    pub fn client_count(&self) -> usize {
        self.shared.table.read().len()
    }

    /// Ids of live connections, ascending.
    pub fn client_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<_> = self.shared.table.read().connections.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn stats(&self) -> &ServerStats {
        &self.shared.stats
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.shared.config)
            .field("clients", &self.client_count())
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

async fn wait_stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stopped| *stopped).await;
}

//! High-level client API.

use crate::connection::ClientConfig;
use crate::error::ClientError;
use framecast_protocol::{Codec, Endpoint, Packet, PacketId, PacketType, Registry, TransportError};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Client for a framecast server.
///
/// Cheap to clone; clones share the connection and registry. Packet
/// handlers receive a clone of the client so they can reply.
#[derive(Clone)]
pub struct Client {
    endpoint: Arc<Endpoint<Client>>,
    config: Arc<ClientConfig>,
}

impl Client {
    /// Creates a new client (not yet connected).
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let codec = Codec::new(config.max_packet_size, config.framing)?;
        Ok(Self {
            endpoint: Arc::new(Endpoint::new(codec, config.idle_timeout)),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The packet types this client decodes.
    pub fn registry(&self) -> &Registry<Client> {
        self.endpoint.codec().registry()
    }

    /// Registers `P` with an async handler run for every packet received.
    pub fn register_handler<P, F, Fut>(&self, handler: F) -> Result<(), ClientError>
    where
        P: PacketType,
        F: Fn(Client, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Ok(self.registry().register_handler(handler)?)
    }

    /// Registers `P` so it can be decoded, with no handler.
    pub fn register_passive<P: PacketType>(&self) -> Result<(), ClientError> {
        Ok(self.registry().register_passive::<P>()?)
    }

    /// Connects to the server at `addr` (`host:port`).
    pub async fn connect(&self, addr: &str) -> Result<(), ClientError> {
        Ok(self
            .endpoint
            .connect(addr, self.config.connect_timeout)
            .await?)
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.endpoint.is_connected()
    }

    /// Closes the connection.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        Ok(self.endpoint.disconnect().await?)
    }

    /// Closes the connection without waiting; a pending receive returns
    /// a disconnect error.
    pub fn close(&self) {
        self.endpoint.close();
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ClientError> {
        Ok(self.endpoint.local_addr()?)
    }

    pub fn server_addr(&self) -> Result<SocketAddr, ClientError> {
        Ok(self.endpoint.peer_addr()?)
    }

    /// Sends a packet to the server.
    pub async fn send(&self, packet: &dyn Packet) -> Result<(), ClientError> {
        Ok(self.endpoint.send(packet).await?)
    }

    /// Receives one packet and runs its handler. Returns its type id.
    pub async fn receive(&self) -> Result<PacketId, ClientError> {
        Ok(self.endpoint.receive(self.clone()).await?)
    }

    /// Spawns a task that receives until the connection ends.
    ///
    /// The task resolves to `Ok(())` when the connection closes cleanly and
    /// to the error otherwise.
    pub fn spawn_receive_loop(&self) -> JoinHandle<Result<(), ClientError>> {
        let client = self.clone();
        tokio::spawn(async move {
            loop {
                match client.endpoint.receive(client.clone()).await {
                    Ok(packet_id) => tracing::trace!("Handled packet {}", packet_id),
                    Err(TransportError::Disconnected) => {
                        tracing::debug!("Server closed the connection");
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::debug!("Receive loop ended: {}", e);
                        return Err(e.into());
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecast_protocol::{Framing, PacketReader, PacketWriter, ProtocolError};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Debug, Clone, PartialEq)]
    struct TestPacket {
        data: Vec<u8>,
    }

    impl Packet for TestPacket {
        fn id(&self) -> PacketId {
            Self::ID
        }

        fn encode(&self, writer: &mut PacketWriter) -> Result<(), ProtocolError> {
            writer.put_slice(&self.data)
        }
    }

    impl PacketType for TestPacket {
        const ID: PacketId = 0;

        fn decode(reader: &mut PacketReader<'_>) -> Result<Self, ProtocolError> {
            let data = reader.rest();
            if data.first() != Some(&b't') {
                return Err(ProtocolError::decode(Self::ID, "payload must start with 't'"));
            }
            Ok(TestPacket {
                data: data.to_vec(),
            })
        }
    }

    fn test_packet() -> TestPacket {
        TestPacket {
            data: b"test data".to_vec(),
        }
    }

    /// Connects a client to a one-shot listener and returns the server side.
    async fn connected(config: ClientConfig) -> (Client, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let client = Client::new(config).unwrap();
        let (result, accepted) = tokio::join!(client.connect(&addr), listener.accept());
        assert_ok!(result);
        (client, accepted.unwrap().0)
    }

    #[test]
    fn test_new_rejects_zero_packet_size() {
        let err = Client::new(ClientConfig::new(0)).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::InvalidMaxPacketSize)
        ));
    }

    #[test]
    fn test_register_duplicate() {
        let client = Client::new(ClientConfig::default()).unwrap();
        assert_ok!(client.register_passive::<TestPacket>());
        let err = client.register_passive::<TestPacket>().unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::AlreadyRegistered(0))
        ));
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = Client::new(ClientConfig::default()).unwrap();
        let err = client.connect(&addr).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport(TransportError::Connect { .. })
        ));
        assert!(err.is_retryable());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_addresses() {
        let client = Client::new(ClientConfig::default()).unwrap();
        assert_err!(client.local_addr());
        assert_err!(client.server_addr());

        let (client, server) = connected(ClientConfig::default()).await;
        assert_eq!(client.server_addr().unwrap(), server.local_addr().unwrap());
        assert_eq!(client.local_addr().unwrap(), server.peer_addr().unwrap());
    }

    #[tokio::test]
    async fn test_disconnect() {
        let client = Client::new(ClientConfig::default()).unwrap();
        assert!(client.disconnect().await.unwrap_err().is_retryable());

        let (client, _server) = connected(ClientConfig::default()).await;
        assert_ok!(client.disconnect().await);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_send() {
        let (client, mut server) = connected(ClientConfig::new(10)).await;
        assert_ok!(client.send(&test_packet()).await);

        let mut buf = [0u8; 16];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"\x00test data");
    }

    #[tokio::test]
    async fn test_receive_runs_handler() {
        let (client, mut server) = connected(ClientConfig::new(10)).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        client
            .register_handler(move |_client: Client, packet: TestPacket| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(packet);
                }
            })
            .unwrap();

        server.write_all(b"\x00test data").await.unwrap();
        assert_eq!(client.receive().await.unwrap(), 0);
        assert_eq!(rx.recv().await.unwrap(), test_packet());
    }

    #[tokio::test]
    async fn test_handler_can_reply() {
        let (client, mut server) = connected(ClientConfig::new(10)).await;
        client
            .register_handler(|client: Client, packet: TestPacket| async move {
                client.send(&packet).await.unwrap();
            })
            .unwrap();

        server.write_all(b"\x00test echo").await.unwrap();
        client.receive().await.unwrap();

        let mut buf = [0u8; 16];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"\x00test echo");
    }

    #[tokio::test]
    async fn test_receive_errors() {
        let (client, mut server) = connected(ClientConfig::new(10)).await;
        client.register_passive::<TestPacket>().unwrap();

        server.write_all(b"\x00nope").await.unwrap();
        let err = client.receive().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport(TransportError::Protocol(ProtocolError::Decode { .. }))
        ));

        drop(server);
        assert!(client.receive().await.unwrap_err().is_disconnect());
    }

    #[tokio::test]
    async fn test_receive_timeout() {
        let config = ClientConfig::new(10).with_idle_timeout(Duration::from_millis(50));
        let (client, _server) = connected(config).await;
        assert!(client.receive().await.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_receive_loop() {
        let config = ClientConfig::new(64).with_framing(Framing::LengthPrefixed);
        let (client, mut server) = connected(config).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        client
            .register_handler(move |_client: Client, packet: TestPacket| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(packet.data);
                }
            })
            .unwrap();

        let handle = client.spawn_receive_loop();

        // Two frames in one write
        server
            .write_all(&[3, 0, 0, 0, 0, b't', b'1', 3, 0, 0, 0, 0, b't', b'2'])
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), b"t1");
        assert_eq!(rx.recv().await.unwrap(), b"t2");

        drop(server);
        assert_ok!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_close_stops_receive_loop() {
        let (client, _server) = connected(ClientConfig::default()).await;
        let handle = client.spawn_receive_loop();

        tokio::time::sleep(Duration::from_millis(20)).await;
        client.close();
        assert_ok!(handle.await.unwrap());
        assert!(!client.is_connected());
    }
}

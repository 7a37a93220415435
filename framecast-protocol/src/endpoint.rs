//! Connection endpoint.
//!
//! An [`Endpoint`] owns one TCP stream and the codec used on it. The server
//! wraps every accepted stream in one; the client wraps its single outbound
//! stream. Sends and receives may run concurrently from different tasks:
//! the read and write halves sit behind separate locks.

use crate::codec::Codec;
use crate::error::TransportError;
use crate::frame::{FrameDecoder, Framing};
use crate::packet::{Packet, PacketId};
use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

/// Read half plus whatever buffering the framing mode needs.
struct FrameReader {
    half: OwnedReadHalf,
    framing: Framing,
    scratch: Vec<u8>,
    decoder: FrameDecoder,
}

impl FrameReader {
    fn new(half: OwnedReadHalf, framing: Framing, max_packet_size: usize) -> Self {
        Self {
            half,
            framing,
            scratch: vec![0u8; max_packet_size],
            decoder: FrameDecoder::new(max_packet_size),
        }
    }

    async fn read_frame(&mut self) -> Result<Bytes, TransportError> {
        match self.framing {
            Framing::Unframed => {
                let n = self.read_chunk().await?;
                if n == 0 {
                    return Err(TransportError::Disconnected);
                }
                Ok(Bytes::copy_from_slice(&self.scratch[..n]))
            }
            Framing::LengthPrefixed => loop {
                if let Some(frame) = self
                    .decoder
                    .decode_frame()
                    .map_err(TransportError::malformed)?
                {
                    return Ok(frame);
                }

                let n = self.read_chunk().await?;
                if n == 0 {
                    if self.decoder.buffered() == 0 {
                        return Err(TransportError::Disconnected);
                    }
                    return Err(TransportError::Receive(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed mid-frame",
                    )));
                }
                self.decoder.extend(&self.scratch[..n]);
            },
        }
    }

    async fn read_chunk(&mut self) -> Result<usize, TransportError> {
        match self.half.read(&mut self.scratch).await {
            Ok(n) => Ok(n),
            Err(e) => Err(classify_read_error(e)),
        }
    }
}

fn classify_read_error(err: io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::TimedOut => TransportError::Timeout,
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
            TransportError::Disconnected
        }
        _ => TransportError::Receive(err),
    }
}

#[derive(Debug, Clone, Copy)]
struct Addrs {
    local: SocketAddr,
    peer: SocketAddr,
}

/// One side of a framed TCP connection.
pub struct Endpoint<C> {
    codec: Codec<C>,
    /// Inactivity window; zero disables the deadline.
    idle_timeout: Duration,
    reader: Mutex<Option<FrameReader>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    connected: AtomicBool,
    addrs: parking_lot::Mutex<Option<Addrs>>,
    /// Last moment a read may complete before the connection times out.
    /// `None` when the timeout is disabled or too large to represent.
    deadline: parking_lot::Mutex<Option<Instant>>,
    /// Flipped to true to abort a pending receive.
    closed: watch::Sender<bool>,
}

impl<C: Send + 'static> Endpoint<C> {
    /// Creates an endpoint that is not yet connected.
    pub fn new(codec: Codec<C>, idle_timeout: Duration) -> Self {
        let (closed, _) = watch::channel(true);
        Self {
            codec,
            idle_timeout,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            connected: AtomicBool::new(false),
            addrs: parking_lot::Mutex::new(None),
            deadline: parking_lot::Mutex::new(None),
            closed,
        }
    }

    /// Wraps an already-established stream.
    pub fn from_stream(stream: TcpStream, codec: Codec<C>, idle_timeout: Duration) -> Self {
        let addrs = stream_addrs(&stream);
        let (read_half, write_half) = stream.into_split();
        let reader = FrameReader::new(read_half, codec.framing(), codec.max_packet_size());
        let (closed, _) = watch::channel(false);
        let endpoint = Self {
            codec,
            idle_timeout,
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(write_half)),
            connected: AtomicBool::new(true),
            addrs: parking_lot::Mutex::new(addrs),
            deadline: parking_lot::Mutex::new(None),
            closed,
        };
        endpoint.rearm();
        endpoint
    }

    pub fn codec(&self) -> &Codec<C> {
        &self.codec
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Dials `target`, giving up after `timeout`. Replaces any existing
    /// connection.
    pub async fn connect(&self, target: &str, timeout: Duration) -> Result<(), TransportError> {
        tracing::debug!("Connecting to {}", target);

        let stream = tokio::time::timeout(timeout, TcpStream::connect(target))
            .await
            .map_err(|_| TransportError::Connect {
                target: target.to_string(),
                source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
            })?
            .map_err(|source| TransportError::Connect {
                target: target.to_string(),
                source,
            })?;

        stream.set_nodelay(true).ok();

        if self.is_connected() {
            tracing::debug!("Replacing existing connection with {}", target);
            self.release().await;
        }
        self.install(stream).await;

        tracing::debug!("Connected to {}", target);
        Ok(())
    }

    async fn install(&self, stream: TcpStream) {
        let addrs = stream_addrs(&stream);
        let (read_half, write_half) = stream.into_split();
        let reader = FrameReader::new(
            read_half,
            self.codec.framing(),
            self.codec.max_packet_size(),
        );

        *self.reader.lock().await = Some(reader);
        *self.writer.lock().await = Some(write_half);
        *self.addrs.lock() = addrs;
        self.closed.send_replace(false);
        self.rearm();
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Closes the connection. Fails with [`TransportError::NotConnected`]
    /// if there is nothing to close.
    pub async fn disconnect(&self) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.release().await;
        Ok(())
    }

    /// Marks the endpoint closed and wakes any pending receive or send
    /// without waiting for locks. An interrupted send fails with
    /// [`TransportError::Send`]. The socket itself is dropped by [`Self::release`]
    /// or when the endpoint is dropped.
    ///
    /// Returns true if the endpoint was connected.
    pub fn close(&self) -> bool {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        self.closed.send_replace(true);
        // Shut down the write side now if nobody is mid-send
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
        was_connected
    }

    /// Closes the endpoint and drops both halves of the socket. Idempotent.
    pub async fn release(&self) {
        self.close();
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.reader.lock().await.take();
        self.addrs.lock().take();
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.current_addrs().map(|addrs| addrs.local)
    }

    pub fn peer_addr(&self) -> Result<SocketAddr, TransportError> {
        self.current_addrs().map(|addrs| addrs.peer)
    }

    fn current_addrs(&self) -> Result<Addrs, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        (*self.addrs.lock()).ok_or(TransportError::NotConnected)
    }

    /// Encodes and writes one packet.
    pub async fn send(&self, packet: &dyn Packet) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let wire = self.codec.encode_wire(packet)?;
        self.send_encoded(packet.id(), &wire).await
    }

    /// Writes bytes already produced by [`Codec::encode_wire`]. Lets a
    /// broadcaster encode once and write to many endpoints.
    pub async fn send_encoded(&self, packet_id: PacketId, wire: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        {
            let mut guard = self.writer.lock().await;
            let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;
            // A peer that stops reading must not pin the writer past close()
            let result = tokio::select! {
                biased;
                _ = wait_closed(self.closed.subscribe()) => Err(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "connection closed",
                )),
                result = writer.write_all(wire) => result,
            };
            if let Err(source) = result {
                if !self.is_connected() {
                    guard.take();
                }
                return Err(TransportError::Send { packet_id, source });
            }
        }
        tracing::trace!("Sent packet {} ({} bytes)", packet_id, wire.len());
        self.rearm();
        Ok(())
    }

    /// Reads one frame, decodes it and runs its callback with `ctx`.
    ///
    /// Returns the identifier of the packet that was handled. A closed
    /// stream surfaces as [`TransportError::Disconnected`], an expired
    /// inactivity deadline as [`TransportError::Timeout`].
    pub async fn receive(&self, ctx: C) -> Result<PacketId, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let frame = self.read_frame().await?;
        let decoded = self.codec.decode(&frame)?;
        self.rearm();

        let packet_id = decoded.registration.id();
        tracing::trace!(
            "Received packet {} ({}, {} bytes)",
            packet_id,
            decoded.registration.name(),
            frame.len()
        );

        if let Some(callback) = decoded.registration.dispatch(ctx, decoded.packet) {
            callback.await;
        }
        Ok(packet_id)
    }

    async fn read_frame(&self) -> Result<Bytes, TransportError> {
        let closed = wait_closed(self.closed.subscribe());
        tokio::pin!(closed);

        let mut guard = tokio::select! {
            biased;
            _ = &mut closed => return Err(TransportError::Disconnected),
            guard = self.reader.lock() => guard,
        };
        let reader = guard.as_mut().ok_or(TransportError::NotConnected)?;

        let read = reader.read_frame();
        tokio::pin!(read);

        loop {
            let deadline = self.deadline();
            tokio::select! {
                biased;
                _ = &mut closed => return Err(TransportError::Disconnected),
                result = &mut read => return result,
                _ = sleep_until(deadline) => {
                    // A send may have pushed the deadline out while we slept
                    if self.deadline().map_or(false, |d| Instant::now() >= d) {
                        tracing::debug!("Connection idle past its deadline");
                        return Err(TransportError::Timeout);
                    }
                }
            }
        }
    }

    fn deadline(&self) -> Option<Instant> {
        *self.deadline.lock()
    }

    /// Pushes the inactivity deadline out by the idle timeout. A timeout
    /// past the clock's range means no deadline.
    fn rearm(&self) {
        *self.deadline.lock() = if self.idle_timeout.is_zero() {
            None
        } else {
            Instant::now().checked_add(self.idle_timeout)
        };
    }
}

impl<C> std::fmt::Debug for Endpoint<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .field("addrs", &*self.addrs.lock())
            .field("idle_timeout", &self.idle_timeout)
            .field("codec", &self.codec)
            .finish()
    }
}

fn stream_addrs(stream: &TcpStream) -> Option<Addrs> {
    Some(Addrs {
        local: stream.local_addr().ok()?,
        peer: stream.peer_addr().ok()?,
    })
}

async fn wait_closed(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|closed| *closed).await;
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use crate::frame::encode_envelope;
    use crate::packet::{PacketReader, PacketType, PacketWriter};
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    const MAX_PACKET_SIZE: usize = 10;

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

    type Sink = mpsc::UnboundedSender<TestPacket>;

    fn codec(framing: Framing) -> Codec<Sink> {
        let codec = Codec::new(MAX_PACKET_SIZE, framing).unwrap();
        codec
            .registry()
            .register_handler(|sink: Sink, packet: TestPacket| async move {
                let _ = sink.send(packet);
            })
            .unwrap();
        codec
    }

    /// Returns a connected endpoint and the raw peer stream.
    async fn pair(framing: Framing, idle_timeout: Duration) -> (Endpoint<Sink>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let target = addr.to_string();

        let endpoint = Endpoint::new(codec(framing), idle_timeout);
        let (connected, accepted) = tokio::join!(
            endpoint.connect(&target, Duration::from_secs(5)),
            listener.accept()
        );
        connected.unwrap();
        (endpoint, accepted.unwrap().0)
    }

    fn sink() -> (Sink, mpsc::UnboundedReceiver<TestPacket>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = Endpoint::new(codec(Framing::Unframed), Duration::ZERO);
        let err = endpoint
            .connect(&addr.to_string(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
        assert!(!endpoint.is_connected());
    }

    #[tokio::test]
    async fn test_connect_and_addrs() {
        let (endpoint, peer) = pair(Framing::Unframed, Duration::ZERO).await;
        assert!(endpoint.is_connected());
        assert_eq!(endpoint.peer_addr().unwrap(), peer.local_addr().unwrap());
        assert_eq!(endpoint.local_addr().unwrap(), peer.peer_addr().unwrap());
    }

    #[tokio::test]
    async fn test_not_connected_operations() {
        let endpoint = Endpoint::new(codec(Framing::Unframed), Duration::ZERO);
        let (tx, _rx) = sink();

        assert!(matches!(
            endpoint.disconnect().await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            endpoint.send(&test_packet()).await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            endpoint.receive(tx).await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            endpoint.local_addr(),
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            endpoint.peer_addr(),
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_disconnect() {
        let (endpoint, _peer) = pair(Framing::Unframed, Duration::ZERO).await;
        endpoint.disconnect().await.unwrap();
        assert!(!endpoint.is_connected());
        assert!(matches!(
            endpoint.disconnect().await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_send_writes_frame() {
        let (endpoint, mut peer) = pair(Framing::Unframed, Duration::ZERO).await;
        endpoint.send(&test_packet()).await.unwrap();

        let mut buf = [0u8; 16];
        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"\x00test data");
    }

    #[tokio::test]
    async fn test_send_oversized_packet() {
        let (endpoint, _peer) = pair(Framing::Unframed, Duration::ZERO).await;
        let err = endpoint
            .send(&TestPacket {
                data: b"test data, too long".to_vec(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Protocol(ProtocolError::BufferTooSmall { .. })
        ));
    }

    #[tokio::test]
    async fn test_receive_dispatches_callback() {
        let (endpoint, mut peer) = pair(Framing::Unframed, Duration::ZERO).await;
        peer.write_all(b"\x00test data").await.unwrap();

        let (tx, mut rx) = sink();
        let id = endpoint.receive(tx).await.unwrap();
        assert_eq!(id, 0);
        assert_eq!(rx.recv().await.unwrap(), test_packet());
    }

    #[tokio::test]
    async fn test_receive_peer_closed() {
        let (endpoint, peer) = pair(Framing::Unframed, Duration::ZERO).await;
        drop(peer);

        let (tx, _rx) = sink();
        let err = endpoint.receive(tx).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_receive_unregistered() {
        let (endpoint, mut peer) = pair(Framing::Unframed, Duration::ZERO).await;
        peer.write_all(b"unregistered packet").await.unwrap();

        let (tx, _rx) = sink();
        let err = endpoint.receive(tx).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Protocol(ProtocolError::NotRegistered(117))
        ));
    }

    #[tokio::test]
    async fn test_receive_decode_failure() {
        let (endpoint, mut peer) = pair(Framing::Unframed, Duration::ZERO).await;
        peer.write_all(b"\x00unknown").await.unwrap();

        let (tx, mut rx) = sink();
        let err = endpoint.receive(tx).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Protocol(ProtocolError::Decode { packet: 0, .. })
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_receive_times_out() {
        let (endpoint, _peer) = pair(Framing::Unframed, Duration::from_millis(50)).await;

        let (tx, _rx) = sink();
        let err = endpoint.receive(tx).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_close_wakes_pending_receive() {
        let (endpoint, _peer) = pair(Framing::Unframed, Duration::ZERO).await;
        let endpoint = Arc::new(endpoint);

        let (tx, _rx) = sink();
        let pending = {
            let endpoint = endpoint.clone();
            tokio::spawn(async move { endpoint.receive(tx).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(endpoint.close());

        let err = pending.await.unwrap().unwrap_err();
        assert!(err.is_disconnect());
        assert!(!endpoint.is_connected());
    }

    #[tokio::test]
    async fn test_length_prefixed_split_and_coalesced() {
        let (endpoint, mut peer) = pair(Framing::LengthPrefixed, Duration::ZERO).await;

        let first = encode_envelope(b"\x00tone").unwrap();
        let second = encode_envelope(b"\x00ttwo").unwrap();
        let mut wire = first.to_vec();
        wire.extend_from_slice(&second);

        // Both frames in one write, the second split across two
        peer.write_all(&wire[..wire.len() - 2]).await.unwrap();

        let (tx, mut rx) = sink();
        endpoint.receive(tx.clone()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().data, b"tone");

        peer.write_all(&wire[wire.len() - 2..]).await.unwrap();
        endpoint.receive(tx).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().data, b"ttwo");
    }

    #[tokio::test]
    async fn test_length_prefixed_empty_frame_is_receive_error() {
        let (endpoint, mut peer) = pair(Framing::LengthPrefixed, Duration::ZERO).await;
        peer.write_all(&[0, 0, 0, 0]).await.unwrap();

        let (tx, _rx) = sink();
        let err = endpoint.receive(tx).await.unwrap_err();
        assert!(matches!(err, TransportError::Receive(_)));
    }

    #[tokio::test]
    async fn test_length_prefixed_truncated_stream() {
        let (endpoint, mut peer) = pair(Framing::LengthPrefixed, Duration::ZERO).await;
        peer.write_all(&[5, 0, 0, 0, 0, b't']).await.unwrap();
        drop(peer);

        let (tx, _rx) = sink();
        let err = endpoint.receive(tx).await.unwrap_err();
        match err {
            TransportError::Receive(io) => assert_eq!(io.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_send_while_receiving() {
        let (endpoint, mut peer) = pair(Framing::Unframed, Duration::ZERO).await;
        let endpoint = Arc::new(endpoint);

        let (tx, mut rx) = sink();
        let receiver = {
            let endpoint = endpoint.clone();
            tokio::spawn(async move { endpoint.receive(tx).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        // The pending read must not block the write half
        endpoint.send(&test_packet()).await.unwrap();

        let mut buf = [0u8; 16];
        let n = peer.read(&mut buf).await.unwrap();
        peer.write_all(&buf[..n]).await.unwrap();

        assert_eq!(receiver.await.unwrap().unwrap(), 0);
        assert_eq!(rx.recv().await.unwrap(), test_packet());
    }

    #[tokio::test]
    async fn test_huge_idle_timeout_means_no_deadline() {
        let (endpoint, mut peer) = pair(Framing::Unframed, Duration::from_secs(u64::MAX)).await;
        assert!(endpoint.deadline().is_none());

        endpoint.send(&test_packet()).await.unwrap();
        let mut buf = [0u8; 16];
        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"\x00test data");

        let (tx, _rx) = sink();
        let pending = tokio::time::timeout(Duration::from_millis(50), endpoint.receive(tx)).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn test_close_aborts_blocked_send() {
        let (endpoint, _peer) = pair(Framing::Unframed, Duration::ZERO).await;
        let endpoint = Arc::new(endpoint);

        // Far more than the socket buffers hold; the peer never reads
        let sender = {
            let endpoint = endpoint.clone();
            tokio::spawn(async move {
                let wire = vec![0u8; 64 * 1024 * 1024];
                endpoint.send_encoded(0, &wire).await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!sender.is_finished());

        endpoint.close();
        let result = tokio::time::timeout(Duration::from_secs(5), sender)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(TransportError::Send { packet_id: 0, .. })));
        assert!(matches!(
            endpoint.send(&test_packet()).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_sends_do_not_interleave() {
        const FRAMES: usize = 64;
        const LEN: usize = 32 * 1024;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap().to_string();
        let codec: Codec<Sink> = Codec::new(LEN + 1, Framing::LengthPrefixed).unwrap();
        let endpoint = Arc::new(Endpoint::new(codec, Duration::ZERO));
        let (connected, accepted) = tokio::join!(
            endpoint.connect(&target, Duration::from_secs(5)),
            listener.accept()
        );
        connected.unwrap();
        let mut peer = accepted.unwrap().0;

        let senders: Vec<_> = (0..FRAMES)
            .map(|i| {
                let endpoint = endpoint.clone();
                tokio::spawn(async move {
                    let mut data = vec![i as u8; LEN];
                    data[0] = b't';
                    endpoint.send(&TestPacket { data }).await
                })
            })
            .collect();

        let mut decoder = FrameDecoder::new(LEN + 1);
        let mut seen = vec![false; FRAMES];
        let mut buf = vec![0u8; 64 * 1024];
        let mut frames = 0;
        while frames < FRAMES {
            let n = peer.read(&mut buf).await.unwrap();
            assert!(n > 0, "stream ended after {} frames", frames);
            decoder.extend(&buf[..n]);
            while let Some(frame) = decoder.decode_frame().unwrap() {
                assert_eq!(frame.len(), LEN + 1);
                assert_eq!(&frame[..2], &[0, b't']);
                let fill = frame[2];
                assert!(frame[2..].iter().all(|b| *b == fill));
                assert!(!seen[fill as usize]);
                seen[fill as usize] = true;
                frames += 1;
            }
        }

        for sender in senders {
            sender.await.unwrap().unwrap();
        }
        assert!(seen.iter().all(|s| *s));
    }
}

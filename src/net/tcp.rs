//! TCP listener and client connections.
//!
//! A [`TransportListener`] owns one bound socket and an accept loop running
//! on the tokio runtime. Plain listeners pass each connection straight to the
//! [`ConnectionHandler`] together with the extended operation registry; TLS
//! listeners complete the handshake first.

use super::extended::ExtendedOperations;
use super::transport::TransportSpec;
use crate::core::error::{DirectoryError, DirectoryResult};
use crate::directory::engine::BoundTransport;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_rustls::{server::TlsStream, TlsAcceptor};

/// Connection identifier, unique per listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Byte stream of a client connection.
pub enum TransportStream {
    /// Plain TCP.
    Plain(TcpStream),
    /// TLS over TCP.
    Tls(Box<TlsStream<TcpStream>>),
}

impl TransportStream {
    /// Whether the stream is encrypted.
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl AsyncRead for TransportStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// An accepted client connection.
pub struct ClientConnection {
    /// Connection ID.
    pub id: ConnectionId,

    /// Remote address.
    pub remote_addr: SocketAddr,

    /// Name of the transport that accepted it.
    pub transport: String,

    stream: TransportStream,

    extended: Arc<ExtendedOperations>,
}

impl ClientConnection {
    /// Create a connection.
    pub fn new(
        id: ConnectionId,
        remote_addr: SocketAddr,
        transport: impl Into<String>,
        stream: TransportStream,
        extended: Arc<ExtendedOperations>,
    ) -> Self {
        Self {
            id,
            remote_addr,
            transport: transport.into(),
            stream,
            extended,
        }
    }

    /// Whether the connection is encrypted.
    pub fn is_secure(&self) -> bool {
        self.stream.is_tls()
    }

    /// Whether the client presented a certificate.
    pub fn has_client_certificate(&self) -> bool {
        match &self.stream {
            TransportStream::Tls(stream) => stream.get_ref().1.peer_certificates().is_some(),
            TransportStream::Plain(_) => false,
        }
    }

    /// OIDs of the extended operations available on this connection.
    pub fn supported_extensions(&self) -> Vec<String> {
        self.extended.oids()
    }

    /// Mutable access to the byte stream.
    pub fn stream_mut(&mut self) -> &mut TransportStream {
        &mut self.stream
    }

    /// Take the byte stream.
    pub fn into_stream(self) -> TransportStream {
        self.stream
    }

    /// Run the extended operation registered for `oid`.
    pub async fn extended_operation(self, oid: &str) -> DirectoryResult<Self> {
        let handler = self.extended.get(oid).ok_or_else(|| {
            DirectoryError::UnsupportedExtendedOperation {
                oid: oid.to_string(),
            }
        })?;
        handler.handle(self).await
    }

    /// Run StartTLS on this connection.
    pub async fn start_tls(self) -> DirectoryResult<Self> {
        self.extended_operation(super::start_tls::START_TLS_OID)
            .await
    }

    /// Complete a TLS handshake over the plain stream.
    pub async fn upgrade(self, acceptor: TlsAcceptor) -> DirectoryResult<Self> {
        let Self {
            id,
            remote_addr,
            transport,
            stream,
            extended,
        } = self;
        let tcp = match stream {
            TransportStream::Plain(tcp) => tcp,
            TransportStream::Tls(_) => {
                return Err(DirectoryError::tls(format!(
                    "{} is already using TLS",
                    id
                )))
            }
        };
        let tls = acceptor.accept(tcp).await.map_err(|e| {
            DirectoryError::tls(format!("handshake with {} failed: {}", remote_addr, e))
        })?;
        Ok(Self {
            id,
            remote_addr,
            transport,
            stream: TransportStream::Tls(Box::new(tls)),
            extended,
        })
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("transport", &self.transport)
            .field("secure", &self.is_secure())
            .finish()
    }
}

/// Serves accepted connections. This is where a protocol stack plugs in.
pub trait ConnectionHandler: Send + Sync {
    /// Serve one connection until it closes.
    fn handle(&self, connection: ClientConnection) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// Handler that closes every connection.
#[derive(Debug, Default)]
pub struct CloseConnectionHandler;

impl ConnectionHandler for CloseConnectionHandler {
    fn handle(&self, connection: ClientConnection) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            tracing::debug!(
                conn = %connection.id,
                remote = %connection.remote_addr,
                "no protocol handler attached, closing connection"
            );
        })
    }
}

/// How a listener treats accepted sockets.
#[derive(Clone)]
pub enum ListenerMode {
    /// Plain TCP with the extended operations available for upgrade.
    Plain(Arc<ExtendedOperations>),
    /// TLS handshake before the handler sees the connection.
    Tls(TlsAcceptor),
}

/// Listener metrics.
#[derive(Debug, Default)]
pub struct ListenerMetrics {
    /// Total connections accepted.
    pub connections_total: AtomicU64,

    /// Currently active connections.
    pub connections_active: AtomicU64,

    /// TLS handshakes that failed.
    pub handshake_failures: AtomicU64,
}

impl ListenerMetrics {
    /// Record a new connection and return its ID.
    pub fn connection_accepted(&self) -> ConnectionId {
        self.connections_active.fetch_add(1, Ordering::Relaxed);
        ConnectionId(self.connections_total.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Record a connection closed.
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a failed handshake.
    pub fn handshake_failed(&self) {
        self.handshake_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Active connection count.
    pub fn active_connections(&self) -> u64 {
        self.connections_active.load(Ordering::Relaxed)
    }

    /// Total connection count.
    pub fn total_connections(&self) -> u64 {
        self.connections_total.load(Ordering::Relaxed)
    }
}

/// A bound listener with its accept loop.
pub struct TransportListener {
    spec: TransportSpec,
    local_addr: SocketAddr,
    metrics: Arc<ListenerMetrics>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl TransportListener {
    /// Bind `spec` and start accepting. Must be called within a tokio
    /// runtime.
    pub fn bind(
        spec: &TransportSpec,
        mode: ListenerMode,
        handler: Arc<dyn ConnectionHandler>,
    ) -> DirectoryResult<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            DirectoryError::transport(&spec.name, "binding requires a running tokio runtime")
        })?;
        let addr = spec.socket_addr()?;

        let std_listener = std::net::TcpListener::bind(addr)
            .map_err(|source| DirectoryError::Bind { addr, source })?;
        std_listener.set_nonblocking(true)?;
        let local_addr = std_listener.local_addr()?;
        let listener = {
            let _guard = runtime.enter();
            TcpListener::from_std(std_listener)?
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = Arc::new(ListenerMetrics::default());
        let task = runtime.spawn(accept_loop(
            spec.name.clone(),
            listener,
            mode,
            handler,
            metrics.clone(),
            shutdown_rx,
        ));

        tracing::info!(transport = %spec.name, addr = %local_addr, tls = spec.tls, "transport listening");

        Ok(Self {
            spec: spec.clone(),
            local_addr,
            metrics,
            shutdown_tx,
            task: Some(task),
        })
    }

    /// Listener metrics.
    pub fn metrics(&self) -> &Arc<ListenerMetrics> {
        &self.metrics
    }

    /// Whether the accept loop is still running.
    pub fn is_listening(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl BoundTransport for TransportListener {
    fn spec(&self) -> &TransportSpec {
        &self.spec
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn stop(&mut self) -> DirectoryResult<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        let _ = self.shutdown_tx.send(true);
        task.abort();
        tracing::info!(
            transport = %self.spec.name,
            addr = %self.local_addr,
            accepted = self.metrics.total_connections(),
            "transport stopped"
        );
        Ok(())
    }
}

impl Drop for TransportListener {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = self.shutdown_tx.send(true);
            task.abort();
        }
    }
}

async fn accept_loop(
    name: String,
    listener: TcpListener,
    mode: ListenerMode,
    handler: Arc<dyn ConnectionHandler>,
    metrics: Arc<ListenerMetrics>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, remote_addr)) => {
                        let _ = stream.set_nodelay(true);
                        let id = metrics.connection_accepted();
                        tokio::spawn(serve(
                            name.clone(),
                            id,
                            stream,
                            remote_addr,
                            mode.clone(),
                            handler.clone(),
                            metrics.clone(),
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(transport = %name, error = %e, "accept failed");
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                break;
            }
        }
    }
}

async fn serve(
    name: String,
    id: ConnectionId,
    stream: TcpStream,
    remote_addr: SocketAddr,
    mode: ListenerMode,
    handler: Arc<dyn ConnectionHandler>,
    metrics: Arc<ListenerMetrics>,
) {
    let connection = match mode {
        ListenerMode::Plain(extended) => ClientConnection::new(
            id,
            remote_addr,
            name,
            TransportStream::Plain(stream),
            extended,
        ),
        ListenerMode::Tls(acceptor) => match acceptor.accept(stream).await {
            Ok(tls) => ClientConnection::new(
                id,
                remote_addr,
                name,
                TransportStream::Tls(Box::new(tls)),
                Arc::new(ExtendedOperations::default()),
            ),
            Err(e) => {
                tracing::warn!(transport = %name, conn = %id, remote = %remote_addr, error = %e, "TLS handshake failed");
                metrics.handshake_failed();
                metrics.connection_closed();
                return;
            }
        },
    };

    tracing::debug!(conn = %id, remote = %remote_addr, "connection accepted");
    handler.handle(connection).await;
    metrics.connection_closed();
}

//! Outbound peer connections and the reconnect queue
//!
//! One connection exists per configured remote endpoint. Connections are
//! created lazily, never mutated in place, and on any request timeout or
//! send failure the whole connection is dropped and its endpoint queued
//! for a deferred reconnect attempt.

use crate::directory::merge;
use crate::endpoint;
use crate::error::{Error, Result};
use crate::identity::PublicKey;
use crate::network::peer_public_key;
use crate::wire::{read_frame, write_frame, Request, Response};
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

enum PeerStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl PeerStream {
    async fn request(&mut self, request: &Request) -> Result<Response> {
        let payload = request.encode()?;
        match self {
            PeerStream::Plain(stream) => {
                write_frame(stream, &payload).await?;
                Response::decode(&read_frame(stream).await?)
            }
            PeerStream::Tls(stream) => {
                write_frame(stream.as_mut(), &payload).await?;
                Response::decode(&read_frame(stream.as_mut()).await?)
            }
        }
    }
}

/// An outbound link to one remote directory endpoint
pub struct PeerConnection {
    /// The configured endpoint string, public-key suffix included
    pub endpoint: String,
    /// Expected remote identity, when the endpoint pinned one
    pub remote_key: Option<PublicKey>,
    stream: PeerStream,
}

/// The set of outbound peer connections plus the reconnect queue
///
/// Owned exclusively by the actor task; all I/O here runs synchronously
/// inside that task, so an unresponsive peer stalls the actor for at
/// most the per-call timeout before its connection is queued for
/// reconnect.
pub struct PeerPool {
    connections: Vec<PeerConnection>,
    reconnect_queue: Vec<String>,
    call_timeout: Duration,
    client_tls: Option<Arc<ClientConfig>>,
}

impl PeerPool {
    /// Create an empty pool
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            connections: Vec::new(),
            reconnect_queue: Vec::new(),
            call_timeout,
            client_tls: None,
        }
    }

    /// Install the client-side TLS configuration
    ///
    /// Endpoints carrying a `|publickey` suffix handshake with this
    /// config from the next connect onwards.
    pub fn set_client_tls(&mut self, config: Arc<ClientConfig>) {
        self.client_tls = Some(config);
    }

    /// Whether a live connection exists for `endpoint`
    pub fn contains(&self, endpoint: &str) -> bool {
        self.connections.iter().any(|c| c.endpoint == endpoint)
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the pool has no live connections
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Endpoints currently awaiting a reconnect attempt
    pub fn pending_reconnects(&self) -> &[String] {
        &self.reconnect_queue
    }

    /// Ensure a connection to `endpoint` exists
    ///
    /// Idempotent: a second connect for a pooled endpoint is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed endpoint string or a failed
    /// connect/handshake; the endpoint is not added to the pool.
    pub async fn connect(&mut self, endpoint: &str) -> Result<()> {
        if self.contains(endpoint) {
            return Ok(());
        }

        let parsed = endpoint::parse_peer(endpoint)?;
        let stream = timeout(self.call_timeout, self.open(&parsed))
            .await
            .map_err(|_| Error::Timeout {
                endpoint: endpoint.to_string(),
            })??;

        debug!("connected to {}", parsed.address);
        self.connections.push(PeerConnection {
            endpoint: parsed.endpoint,
            remote_key: parsed.public_key,
            stream,
        });
        Ok(())
    }

    async fn open(&self, parsed: &endpoint::PeerEndpoint) -> Result<PeerStream> {
        let tcp = TcpStream::connect(&parsed.address)
            .await
            .map_err(|e| Error::ConnectionFailed {
                endpoint: parsed.endpoint.clone(),
                reason: e.to_string(),
            })?;

        let (Some(tls), Some(expected)) = (&self.client_tls, parsed.public_key) else {
            if parsed.public_key.is_some() {
                warn!(
                    "{}: endpoint pins a key but no local identity is loaded, connecting plain",
                    parsed.endpoint
                );
            }
            return Ok(PeerStream::Plain(tcp));
        };

        let server_name = ServerName::try_from("meshdisco-node")
            .map_err(|e| Error::Tls(format!("invalid server name: {}", e)))?;
        let stream = TlsConnector::from(tls.clone())
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::ConnectionFailed {
                endpoint: parsed.endpoint.clone(),
                reason: format!("TLS handshake failed: {}", e),
            })?;

        let presented = peer_public_key(stream.get_ref().1.peer_certificates());
        if presented != Some(expected) {
            return Err(Error::Tls(format!(
                "{}: server key does not match pinned key",
                parsed.endpoint
            )));
        }

        Ok(PeerStream::Tls(Box::new(stream)))
    }

    /// Send every entry of `snapshot` to every pooled connection
    ///
    /// Each PUBLISH waits for its acknowledgment, bounded by the per-call
    /// timeout. A connection that fails or times out is dropped from the
    /// pool, its remaining entries skipped, and its endpoint queued for
    /// reconnect.
    pub async fn publish_to_all(&mut self, snapshot: &HashMap<String, String>) {
        let mut failed = Vec::new();

        'conns: for (idx, conn) in self.connections.iter_mut().enumerate() {
            for (key, value) in snapshot {
                let request = Request::Publish {
                    key: key.clone(),
                    value: value.clone(),
                };
                match timeout(self.call_timeout, conn.stream.request(&request)).await {
                    Ok(Ok(Response::Ok)) => {}
                    Ok(Ok(other)) => {
                        warn!("{}: unexpected publish reply: {:?}", conn.endpoint, other);
                        failed.push(idx);
                        continue 'conns;
                    }
                    Ok(Err(e)) => {
                        warn!("{}: publish failed: {}", conn.endpoint, e);
                        failed.push(idx);
                        continue 'conns;
                    }
                    Err(_) => {
                        warn!("{}: publish timed out", conn.endpoint);
                        failed.push(idx);
                        continue 'conns;
                    }
                }
            }
        }

        self.retire(failed);
    }

    /// Pull VALUES from every pooled connection and merge into `into`
    ///
    /// Connections are visited in connect order and collisions resolve
    /// last write wins, so when peers disagree about a key the peer
    /// connected most recently takes precedence. Failing connections are
    /// queued for reconnect, exactly as in [`publish_to_all`].
    ///
    /// [`publish_to_all`]: PeerPool::publish_to_all
    pub async fn pull_merge(&mut self, into: &mut HashMap<String, String>) {
        let mut failed = Vec::new();

        for (idx, conn) in self.connections.iter_mut().enumerate() {
            match timeout(self.call_timeout, conn.stream.request(&Request::Values)).await {
                Ok(Ok(Response::Values { entries })) => {
                    debug!("{}: pulled {} entries", conn.endpoint, entries.len());
                    merge(into, entries);
                }
                Ok(Ok(other)) => {
                    warn!("{}: unexpected values reply: {:?}", conn.endpoint, other);
                    failed.push(idx);
                }
                Ok(Err(e)) => {
                    warn!("{}: values request failed: {}", conn.endpoint, e);
                    failed.push(idx);
                }
                Err(_) => {
                    warn!("{}: values request timed out", conn.endpoint);
                    failed.push(idx);
                }
            }
        }

        self.retire(failed);
    }

    /// Retry every queued endpoint once
    ///
    /// Best effort: endpoints that still fail stay queued for the next
    /// cycle.
    pub async fn drain_reconnects(&mut self) {
        let pending = std::mem::take(&mut self.reconnect_queue);
        for endpoint in pending {
            if let Err(e) = self.connect(&endpoint).await {
                warn!("reconnect to {} failed: {}", endpoint, e);
                self.queue_for_reconnect(endpoint);
            }
        }
    }

    /// Drop failed connections and queue their endpoints for reconnect
    fn retire(&mut self, mut failed: Vec<usize>) {
        failed.sort_unstable();
        for idx in failed.into_iter().rev() {
            let conn = self.connections.remove(idx);
            debug!("queueing {} for reconnect", conn.endpoint);
            self.queue_for_reconnect(conn.endpoint);
        }
    }

    fn queue_for_reconnect(&mut self, endpoint: String) {
        if !self.reconnect_queue.contains(&endpoint) {
            self.reconnect_queue.push(endpoint);
        }
    }
}

//! Inbound server endpoint
//!
//! The endpoint owns the listening socket and the per-connection framing
//! loops. Decoded requests are forwarded, one at a time, to the actor
//! over a channel together with the observed peer address and pinned
//! identity; the actor's reply (or its decision to stay silent) travels
//! back over a oneshot.

use crate::endpoint;
use crate::error::{Error, Result};
use crate::identity::PublicKey;
use crate::network::peer_public_key;
use crate::trust::TrustStore;
use crate::wire::{read_frame, write_frame, Request, Response};
use rustls::ServerConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

/// One decoded inbound request awaiting the actor's verdict
pub struct ServerRequest {
    /// The decoded request
    pub request: Request,
    /// Transport-observed source address of the connecting peer
    pub peer_addr: SocketAddr,
    /// The peer's pinned identity, when authenticated transport is on
    pub peer_key: Option<PublicKey>,
    /// Reply channel; `None` means drop silently, sending nothing back
    pub reply: oneshot::Sender<Option<Response>>,
}

/// The bound listening socket and its accept task
pub struct ServerEndpoint {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl ServerEndpoint {
    /// Bind `endpoint` and start accepting connections
    ///
    /// With TLS material configured every inbound handshake must present
    /// a client certificate; when a trust store is configured as well,
    /// identities absent from it are rejected before any request is
    /// read.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint string is malformed or the
    /// socket cannot be bound — fatal conditions for the actor.
    pub async fn bind(
        bind_endpoint: &str,
        tls: Option<(Arc<ServerConfig>, Option<TrustStore>)>,
        requests: mpsc::Sender<ServerRequest>,
    ) -> Result<Self> {
        let listen_addr = endpoint::parse_bind(bind_endpoint)?;
        let listener = TcpListener::bind(&listen_addr)
            .await
            .map_err(|e| Error::ConnectionFailed {
                endpoint: bind_endpoint.to_string(),
                reason: format!("bind failed: {}", e),
            })?;
        let local_addr = listener.local_addr()?;
        info!("directory server listening on {}", local_addr);

        let acceptor = tls
            .as_ref()
            .map(|(config, _)| TlsAcceptor::from(config.clone()));
        let trust = tls.and_then(|(_, trust)| trust);

        let accept_task = tokio::spawn(async move {
            loop {
                let (stream, peer_addr) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("accept failed: {}", e);
                        continue;
                    }
                };
                let acceptor = acceptor.clone();
                let trust = trust.clone();
                let requests = requests.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, acceptor, trust, requests).await;
                });
            }
        });

        Ok(Self {
            local_addr,
            accept_task,
        })
    }

    /// The address the listener actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for ServerEndpoint {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    acceptor: Option<TlsAcceptor>,
    trust: Option<TrustStore>,
    requests: mpsc::Sender<ServerRequest>,
) {
    match acceptor {
        Some(acceptor) => {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    debug!("{}: TLS handshake failed: {}", peer_addr, e);
                    return;
                }
            };
            let peer_key = peer_public_key(stream.get_ref().1.peer_certificates());

            // With a trust store configured, unknown identities are cut
            // off before any request is read
            if let Some(trust) = &trust {
                let trusted = peer_key.map(|key| trust.contains(&key)).unwrap_or(false);
                if !trusted {
                    info!("{}: rejecting untrusted identity", peer_addr);
                    return;
                }
            }

            serve(stream, peer_addr, peer_key, requests).await;
        }
        None => serve(stream, peer_addr, None, requests).await,
    }
}

/// Frame loop for one accepted connection
async fn serve<S>(
    mut stream: S,
    peer_addr: SocketAddr,
    peer_key: Option<PublicKey>,
    requests: mpsc::Sender<ServerRequest>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let payload = match read_frame(&mut stream).await {
            Ok(payload) => payload,
            // EOF or transport error ends the connection quietly
            Err(_) => return,
        };

        let request = match Request::decode(&payload) {
            Ok(request) => request,
            Err(e) => {
                warn!("{}: protocol violation: {}", peer_addr, e);
                continue;
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let server_request = ServerRequest {
            request,
            peer_addr,
            peer_key,
            reply: reply_tx,
        };
        if requests.send(server_request).await.is_err() {
            // Actor is gone; nothing left to serve
            return;
        }

        match reply_rx.await {
            Ok(Some(response)) => {
                let bytes = match response.encode() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("{}: reply encoding failed: {}", peer_addr, e);
                        return;
                    }
                };
                if write_frame(&mut stream, &bytes).await.is_err() {
                    return;
                }
            }
            // Silent drop: no response frame is written at all
            Ok(None) | Err(_) => {}
        }
    }
}

//! Network module
//!
//! Outbound peer connections, the inbound server endpoint, and the TLS
//! plumbing both share for authenticated transport.

mod pool;
mod server;
mod tls;

pub use pool::{PeerConnection, PeerPool};
pub use server::{ServerEndpoint, ServerRequest};
pub use tls::TlsConfig;

pub(crate) use tls::peer_public_key;

/// ALPN protocol identifier for the directory wire protocol
pub const DISCO_ALPN: &[u8] = b"meshdisco/1";

//! Endpoint string handling
//!
//! Directory endpoints are `tcp://host:port` strings. An outbound
//! endpoint may carry a trailing `|publickey` suffix naming the Ed25519
//! key the remote is expected to present during the transport handshake.
//! A key whose host portion is a bind-any placeholder (`*` or `0.0.0.0`)
//! is rewritten server-side with the observed source address of the
//! publishing peer.

use crate::error::{Error, Result};
use crate::identity::PublicKey;
use std::net::IpAddr;

/// Scheme prefix every directory endpoint carries
pub const SCHEME: &str = "tcp://";

/// Host placeholders recognized as "bind to any interface"
const WILDCARD_HOSTS: [&str; 2] = ["*", "0.0.0.0"];

/// A parsed outbound peer endpoint
#[derive(Debug, Clone)]
pub struct PeerEndpoint {
    /// The original endpoint string, public-key suffix included; this is
    /// the pool and reconnect-queue key
    pub endpoint: String,
    /// `host:port` connect target
    pub address: String,
    /// Expected remote identity, if the endpoint pinned one
    pub public_key: Option<PublicKey>,
}

/// Parse an outbound endpoint, splitting off an optional `|publickey`
///
/// # Errors
///
/// Returns an error if the scheme is missing, the host or port is
/// malformed, or the key suffix is not a valid hex-encoded public key.
///
/// # Example
///
/// ```
/// use meshdisco::endpoint::parse_peer;
///
/// let ep = parse_peer("tcp://10.0.0.1:9100").unwrap();
/// assert_eq!(ep.address, "10.0.0.1:9100");
/// assert!(ep.public_key.is_none());
/// ```
pub fn parse_peer(endpoint: &str) -> Result<PeerEndpoint> {
    let (addr_part, key_part) = match endpoint.split_once('|') {
        Some((addr, key)) => (addr, Some(key)),
        None => (endpoint, None),
    };

    let (host, port) = split_host_port(endpoint, addr_part)?;
    let public_key = key_part
        .map(|hex| {
            PublicKey::from_hex(hex).map_err(|e| Error::Endpoint {
                endpoint: endpoint.to_string(),
                reason: format!("bad public key suffix: {}", e),
            })
        })
        .transpose()?;

    Ok(PeerEndpoint {
        endpoint: endpoint.to_string(),
        address: format!("{}:{}", host, port),
        public_key,
    })
}

/// Parse a bind endpoint into a `host:port` listen address
///
/// Wildcard hosts map to `0.0.0.0`; port 0 asks the OS for an ephemeral
/// port.
pub fn parse_bind(endpoint: &str) -> Result<String> {
    let (host, port) = split_host_port(endpoint, endpoint)?;
    let host = if WILDCARD_HOSTS.contains(&host) {
        "0.0.0.0"
    } else {
        host
    };
    Ok(format!("{}:{}", host, port))
}

/// Rewrite a wildcard-bound key with the observed source address
///
/// Returns `None` when the key is not an endpoint or its host is
/// concrete; such keys are stored verbatim.
pub fn rewrite_wildcard(key: &str, source: IpAddr) -> Option<String> {
    let rest = key.strip_prefix(SCHEME)?;
    let (host, port) = rest.rsplit_once(':')?;
    if !WILDCARD_HOSTS.contains(&host) {
        return None;
    }
    port.parse::<u16>().ok()?;

    let rewritten = match source {
        IpAddr::V4(ip) => format!("{}{}:{}", SCHEME, ip, port),
        IpAddr::V6(ip) => format!("{}[{}]:{}", SCHEME, ip, port),
    };
    Some(rewritten)
}

fn split_host_port<'a>(original: &str, addr: &'a str) -> Result<(&'a str, u16)> {
    let rest = addr.strip_prefix(SCHEME).ok_or_else(|| Error::Endpoint {
        endpoint: original.to_string(),
        reason: format!("missing '{}' scheme", SCHEME),
    })?;
    let (host, port_str) = rest.rsplit_once(':').ok_or_else(|| Error::Endpoint {
        endpoint: original.to_string(),
        reason: "missing port".to_string(),
    })?;
    if host.is_empty() {
        return Err(Error::Endpoint {
            endpoint: original.to_string(),
            reason: "empty host".to_string(),
        });
    }
    let port = port_str.parse::<u16>().map_err(|_| Error::Endpoint {
        endpoint: original.to_string(),
        reason: format!("bad port '{}'", port_str),
    })?;
    Ok((host, port))
}

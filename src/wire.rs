//! Wire protocol: request/reply frames between peers and servers
//!
//! Every frame is a 4-byte big-endian length prefix followed by a JSON
//! payload. Two requests exist: `PUBLISH key value` (acknowledged with
//! `OK`, or with nothing at all when the publisher is untrusted) and
//! `VALUES` (answered with the learned mapping, timestamps stripped).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Maximum frame size in bytes (16 MB)
/// This prevents a misbehaving peer from forcing a huge allocation
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// A request from a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "UPPERCASE")]
pub enum Request {
    /// Advertise one key/value pair
    Publish {
        /// Directory key, possibly wildcard-bound
        key: String,
        /// Advertised value
        value: String,
    },
    /// Ask for the server's learned directory
    Values,
}

/// A reply to a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "UPPERCASE")]
pub enum Response {
    /// Publish acknowledged
    Ok,
    /// Learned directory snapshot
    Values {
        /// The mapping, timestamps stripped
        entries: HashMap<String, String>,
    },
}

impl Request {
    /// Serialize for framing
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Wire(format!("encode failed: {}", e)))
    }

    /// Parse a frame payload
    ///
    /// A payload that is not one of the two known commands is a protocol
    /// violation; callers log and ignore it rather than tearing anything
    /// down.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Wire(format!("bad request: {}", e)))
    }
}

impl Response {
    /// Serialize for framing
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Wire(format!("encode failed: {}", e)))
    }

    /// Parse a frame payload
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Wire(format!("bad response: {}", e)))
    }
}

/// Write one length-prefixed frame
pub async fn write_frame<S>(stream: &mut S, payload: &[u8]) -> Result<()>
where
    S: AsyncWriteExt + Unpin,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(Error::Wire(format!(
            "frame of {} bytes exceeds limit",
            payload.len()
        )));
    }
    let len = payload.len() as u32;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame
///
/// # Errors
///
/// Returns an I/O error on EOF or a wire error when the announced length
/// exceeds [`MAX_FRAME_SIZE`].
pub async fn read_frame<S>(stream: &mut S) -> Result<Vec<u8>>
where
    S: AsyncReadExt + Unpin,
{
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await?;

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(Error::Wire(format!(
            "announced frame of {} bytes exceeds limit",
            len
        )));
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}

//! # meshdisco
//!
//! An eventually-consistent key/value directory for bootstrapping mesh
//! membership. Nodes that do not know each other's addresses in advance
//! advertise "I am reachable at address X" to one or more directory
//! servers and learn everyone else's advertisements back — a best-effort,
//! periodically-resynchronized cache, not a consistent store.
//!
//! ## Quick Start
//!
//! ```no_run
//! use meshdisco::Disco;
//!
//! #[tokio::main]
//! async fn main() -> meshdisco::Result<()> {
//!     let mut disco = Disco::builder().spawn()?;
//!
//!     disco.connect("tcp://127.0.0.1:9100").await?;
//!     disco.publish("node-1", "tcp://10.0.0.1:9200").await?;
//!
//!     while let Some((key, value)) = disco.recv().await {
//!         println!("discovered {} at {}", key, value);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The same handle can also serve the directory itself: `bind` starts the
//! server endpoint, optionally gated by a trust store of recognized
//! public keys.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod actor;
pub mod config;
pub mod directory;
mod disco;
pub mod endpoint;
pub mod error;
pub mod identity;
pub mod network;
pub mod trust;
pub mod wire;

// Re-export main types
pub use config::DiscoConfig;
pub use directory::{Directory, Entry};
pub use disco::{Disco, DiscoBuilder};
pub use error::{Error, Result};
pub use identity::{Identity, PublicKey};
pub use trust::TrustStore;

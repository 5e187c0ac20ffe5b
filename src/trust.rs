//! Trust store: the directory of recognized public keys
//!
//! A trust store is a plain directory of public key files in the format
//! written by [`Identity::save_pair`](crate::Identity::save_pair). The
//! directory is rescanned on every query, so dropping a new key file in
//! (or deleting one) takes effect without restarting the node — the same
//! live-reload behavior operators expect from certificate directories.

use crate::identity::{parse_key_file, PublicKey, SECRET_SUFFIX};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A directory of recognized public keys
///
/// # Example
///
/// ```no_run
/// use meshdisco::{Identity, TrustStore};
///
/// let store = TrustStore::new("./public_keys");
/// let peer = Identity::generate().public_key();
/// if store.contains(&peer) {
///     println!("{} is trusted", peer);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TrustStore {
    dir: PathBuf,
}

impl TrustStore {
    /// Create a trust store backed by `dir`
    ///
    /// The directory does not need to exist yet; a missing directory
    /// behaves as an empty store.
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// The backing directory
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Whether `key` is present in the store
    pub fn contains(&self, key: &PublicKey) -> bool {
        self.scan().iter().any(|(k, _)| k == key)
    }

    /// All recognized public keys
    pub fn public_keys(&self) -> Vec<PublicKey> {
        self.scan().into_iter().map(|(k, _)| k).collect()
    }

    /// Peer endpoints seeded from key files carrying an `endpoint =`
    /// annotation
    ///
    /// Each result is an `address|publickey` string ready to hand to a
    /// CONNECT command, so the outbound handshake pins the annotated
    /// key.
    pub fn bootstrap_endpoints(&self) -> Vec<String> {
        self.scan()
            .into_iter()
            .filter_map(|(key, values)| {
                values
                    .get("endpoint")
                    .map(|ep| format!("{}|{}", ep, key.to_hex()))
            })
            .collect()
    }

    /// Read every parseable public key file in the directory
    ///
    /// Secret key files and unparseable entries are skipped; the store
    /// only ever widens trust through well-formed public files.
    fn scan(&self) -> Vec<(PublicKey, HashMap<String, String>)> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("trust store {} unreadable: {}", self.dir.display(), e);
                return Vec::new();
            }
        };

        let mut keys = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.to_string_lossy().ends_with(SECRET_SUFFIX) {
                continue;
            }
            let values = match parse_key_file(&path) {
                Ok(values) => values,
                Err(e) => {
                    tracing::warn!("skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            let Some(hex) = values.get("public-key") else {
                tracing::warn!("skipping {}: no public-key entry", path.display());
                continue;
            };
            match PublicKey::from_hex(hex) {
                Ok(key) => keys.push((key, values)),
                Err(e) => tracing::warn!("skipping {}: {}", path.display(), e),
            }
        }
        keys
    }
}

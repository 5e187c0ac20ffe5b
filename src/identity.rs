//! Node identity keys and keypair files
//!
//! An identity is a single Ed25519 keypair. The public half is what peers
//! pin during the transport handshake and what trust stores enumerate.
//! Keypairs live on disk as a pair of small text files: `<name>` holding
//! the public key (safe to copy into a trust store) and `<name>_secret`
//! holding both halves.

use crate::error::{Error, Result};
use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use zeroize::ZeroizeOnDrop;

/// Suffix distinguishing a secret key file from its public counterpart
pub const SECRET_SUFFIX: &str = "_secret";

/// A node's Ed25519 keypair
///
/// Secret material is zeroized when the identity is dropped.
///
/// # Example
///
/// ```
/// use meshdisco::Identity;
///
/// let identity = Identity::generate();
/// println!("my key is {}", identity.public_key());
/// ```
#[derive(ZeroizeOnDrop)]
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Generate a deterministic identity from a 32-byte seed
    ///
    /// Useful for tests that need stable, distinct identities.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// The shareable public half of this identity
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Serialize the signing key as PKCS#8 DER
    ///
    /// Used to build the node's self-signed transport certificate from the
    /// same key the identity advertises.
    pub(crate) fn pkcs8_der(&self) -> Result<Vec<u8>> {
        let doc = self
            .signing_key
            .to_pkcs8_der()
            .map_err(|e| Error::Identity(format!("PKCS#8 encoding failed: {}", e)))?;
        Ok(doc.as_bytes().to_vec())
    }

    /// Write this identity to `<base>` (public) and `<base>_secret` files
    ///
    /// If `base` already carries the `_secret` suffix the public file name
    /// is derived by stripping it. Existing files are never overwritten;
    /// if either file exists the call is a logged no-op, matching the
    /// behavior expected of repeated startup key generation.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be written.
    pub fn save_pair<P: AsRef<Path>>(&self, base: P) -> Result<()> {
        let (public_path, secret_path) = keypair_paths(base.as_ref());

        if public_path.exists() || secret_path.exists() {
            tracing::info!(
                "{} already exists, not creating keys",
                public_path.display()
            );
            return Ok(());
        }

        let public_hex = self.public_key().to_hex();
        let secret_hex = hex::encode(self.signing_key.to_bytes());

        let public_data = format!(
            "#   **** meshdisco public key ****\npublic-key = {}\n",
            public_hex
        );
        std::fs::write(&public_path, public_data)?;

        let secret_data = format!(
            "#   **** meshdisco secret key — keep private ****\npublic-key = {}\nsecret-key = {}\n",
            public_hex, secret_hex
        );
        std::fs::write(&secret_path, secret_data)?;

        // Secret file is user-read-only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&secret_path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&secret_path, perms)?;
        }

        tracing::info!(
            "Keys written to {} and {}",
            public_path.display(),
            secret_path.display()
        );
        Ok(())
    }

    /// Load an identity from a secret key file
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, malformed, or holds no
    /// `secret-key` entry.
    pub fn load_secret<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let values = parse_key_file(path)?;
        let secret_hex = values.get("secret-key").ok_or_else(|| {
            Error::Identity(format!("{} has no secret-key entry", path.display()))
        })?;
        let secret_bytes = decode_key_hex(secret_hex)
            .map_err(|e| Error::Identity(format!("{}: {}", path.display(), e)))?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&secret_bytes),
        })
    }
}

/// An Ed25519 public key identifying a remote node
///
/// Rendered as 64 lowercase hex characters everywhere it crosses a
/// process boundary: key files, endpoint suffixes, log lines.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Construct from raw key bytes, validating the Ed25519 point
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self> {
        VerifyingKey::from_bytes(&bytes)
            .map_err(|e| Error::Identity(format!("invalid Ed25519 public key: {}", e)))?;
        Ok(Self(bytes))
    }

    /// Construct from raw key bytes without point validation
    ///
    /// For keys read back out of transport certificates, which rustls has
    /// already used in a completed handshake.
    pub(crate) fn from_bytes_unchecked(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = decode_key_hex(s).map_err(Error::Identity)?;
        Self::from_bytes(bytes)
    }

    /// The raw key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encode the key
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

/// Resolve the public/secret file pair for a base path
fn keypair_paths(base: &Path) -> (PathBuf, PathBuf) {
    let base_str = base.to_string_lossy();
    if let Some(stripped) = base_str.strip_suffix(SECRET_SUFFIX) {
        (PathBuf::from(stripped), base.to_path_buf())
    } else {
        (
            base.to_path_buf(),
            PathBuf::from(format!("{}{}", base_str, SECRET_SUFFIX)),
        )
    }
}

fn decode_key_hex(s: &str) -> std::result::Result<[u8; 32], String> {
    let bytes = hex::decode(s.trim()).map_err(|e| format!("invalid hex: {}", e))?;
    bytes
        .try_into()
        .map_err(|_| "key must be exactly 32 bytes".to_string())
}

/// Parse a `key = value` text key file
///
/// Blank lines and `#` comments are skipped; later duplicate keys win.
/// Shared with the trust store, which reads the same format plus optional
/// annotation lines.
pub(crate) fn parse_key_file(path: &Path) -> Result<HashMap<String, String>> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| Error::Identity(format!("cannot read {}: {}", path.display(), e)))?;

    let mut values = HashMap::new();
    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            values.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    Ok(values)
}

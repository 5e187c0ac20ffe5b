//! Common test helpers and utilities
//!
//! Shared fixtures for the integration tests: fast timing configs,
//! deterministic identities, and outbox draining helpers.

use meshdisco::{Disco, DiscoConfig, Identity};
use std::collections::HashMap;
use std::time::Duration;

/// Initialize test logging once; safe to call from every test
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A config with all intervals shrunk for test speed
pub fn fast_config() -> DiscoConfig {
    DiscoConfig {
        tick_interval: Duration::from_millis(10),
        pull_interval: Duration::from_millis(100),
        expire_interval: Duration::from_millis(50),
        max_age: Duration::from_millis(400),
        push_interval: Duration::from_millis(100),
        reconnect_interval: Duration::from_millis(250),
        call_timeout: Duration::from_millis(500),
        verbose: false,
    }
}

/// A config whose deliver cycle only runs when forced via `get_values`
///
/// The pull interval is far beyond any test's runtime, so each forced
/// deliver produces exactly one burst and assertions never race a
/// background cycle.
pub fn reader_config() -> DiscoConfig {
    DiscoConfig {
        pull_interval: Duration::from_secs(600),
        ..fast_config()
    }
}

/// A deterministic identity from a one-byte seed
pub fn test_identity(seed: u8) -> Identity {
    Identity::from_seed(&[seed; 32])
}

/// Force a deliver cycle and collect its burst
///
/// Receives until the outbox has been quiet for `quiet`, folding the
/// pairs into a map (bursts are full snapshots, so folding is lossless).
pub async fn forced_burst(disco: &mut Disco, quiet: Duration) -> HashMap<String, String> {
    disco.get_values().await.expect("actor terminated");

    let mut burst = HashMap::new();
    while let Ok(Some((key, value))) = tokio::time::timeout(quiet, disco.recv()).await {
        burst.insert(key, value);
    }
    burst
}

/// Wait until a forced deliver surfaces `key`, up to `deadline`
pub async fn wait_for_key(disco: &mut Disco, key: &str, deadline: Duration) -> Option<String> {
    let started = std::time::Instant::now();
    while started.elapsed() < deadline {
        let burst = forced_burst(disco, Duration::from_millis(200)).await;
        if let Some(value) = burst.get(key) {
            return Some(value.clone());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configs_are_valid() {
        assert!(fast_config().validate().is_ok());
        assert!(reader_config().validate().is_ok());
    }

    #[test]
    fn test_identities_are_deterministic() {
        assert_eq!(
            test_identity(1).public_key(),
            test_identity(1).public_key()
        );
        assert_ne!(
            test_identity(1).public_key(),
            test_identity(2).public_key()
        );
    }
}

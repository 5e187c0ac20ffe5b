//! Configuration for a directory actor instance
//!
//! All timing knobs live here so tests can shrink the intervals without
//! touching actor internals.

use std::time::Duration;

/// Complete configuration for one directory actor
///
/// Instances are created via [`DiscoConfig::default`] (production values)
/// and adjusted field by field, then validated by the builder before the
/// actor starts.
///
/// # Example
///
/// ```
/// use meshdisco::DiscoConfig;
/// use std::time::Duration;
///
/// let mut config = DiscoConfig::default();
/// config.max_age = Duration::from_secs(120);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct DiscoConfig {
    /// Bounded poll tick of the control loop
    pub tick_interval: Duration,

    /// How often learned values are pulled from peers, merged, and
    /// delivered to the owner
    pub pull_interval: Duration,

    /// How often the learned directory is swept for stale entries
    pub expire_interval: Duration,

    /// Age beyond which a learned entry is evicted
    pub max_age: Duration,

    /// How often the originated directory is re-announced to every peer
    ///
    /// Defaults to `max_age - 2 * expire_interval` so a healthy publisher
    /// always refreshes its entries before they can expire remotely.
    pub push_interval: Duration,

    /// How often endpoints in the reconnect queue are retried
    pub reconnect_interval: Duration,

    /// Per-request timeout for any peer round trip
    pub call_timeout: Duration,

    /// Emit per-command and per-request diagnostic logging
    pub verbose: bool,
}

impl Default for DiscoConfig {
    fn default() -> Self {
        let expire_interval = Duration::from_secs(5);
        let max_age = Duration::from_secs(60);
        Self {
            tick_interval: Duration::from_secs(1),
            pull_interval: Duration::from_secs(30),
            expire_interval,
            max_age,
            push_interval: max_age - 2 * expire_interval,
            reconnect_interval: Duration::from_secs(90),
            call_timeout: Duration::from_secs(2),
            verbose: false,
        }
    }
}

impl DiscoConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any interval is zero or the push interval is
    /// not shorter than `max_age` (entries would expire remotely between
    /// re-announcements).
    pub fn validate(&self) -> crate::Result<()> {
        if self.tick_interval.is_zero() {
            return Err(crate::Error::Config(
                "tick_interval must be non-zero".to_string(),
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(crate::Error::Config(
                "call_timeout must be non-zero".to_string(),
            ));
        }
        if self.max_age.is_zero() {
            return Err(crate::Error::Config("max_age must be non-zero".to_string()));
        }
        if self.push_interval >= self.max_age {
            return Err(crate::Error::Config(format!(
                "push_interval ({:?}) must be shorter than max_age ({:?})",
                self.push_interval, self.max_age
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DiscoConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_push_interval_derivation() {
        let config = DiscoConfig::default();
        // max_age 60s minus two expire sweeps of 5s
        assert_eq!(config.push_interval, Duration::from_secs(50));
    }

    #[test]
    fn test_push_interval_must_undercut_max_age() {
        let mut config = DiscoConfig::default();
        config.push_interval = config.max_age;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_call_timeout_rejected() {
        let mut config = DiscoConfig::default();
        config.call_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}

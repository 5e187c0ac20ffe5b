//! Public handle for the directory actor
//!
//! [`DiscoBuilder`] configures and spawns the actor; [`Disco`] is the
//! owner's side of the two channels — commands in, discovered pairs out.
//! No shared memory crosses this boundary.

use crate::actor::{Actor, Command};
use crate::config::DiscoConfig;
use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Builder for a directory actor with progressive configuration
///
/// # Example
///
/// ```no_run
/// use meshdisco::Disco;
///
/// # async fn example() -> meshdisco::Result<()> {
/// let disco = Disco::builder()
///     .verbose()
///     .with_private_key_path("client.key_secret")
///     .with_certstore_path("./public_keys")
///     .spawn()?;
///
/// let addr = disco.bind("tcp://*:9100").await?;
/// println!("directory listening on {}", addr);
/// # Ok(())
/// # }
/// ```
pub struct DiscoBuilder {
    config: DiscoConfig,
    private_key_path: Option<PathBuf>,
    certstore_path: Option<PathBuf>,
}

impl DiscoBuilder {
    /// Create a builder with production default timings
    pub fn new() -> Self {
        Self {
            config: DiscoConfig::default(),
            private_key_path: None,
            certstore_path: None,
        }
    }

    /// Replace the whole timing configuration
    ///
    /// Tests shrink the intervals this way.
    pub fn with_config(mut self, config: DiscoConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable diagnostic logging from the start
    pub fn verbose(mut self) -> Self {
        self.config.verbose = true;
        self
    }

    /// Load the local identity at startup, enabling authenticated
    /// transport for both roles
    ///
    /// A load failure is fatal to the actor, exactly as if the owner had
    /// issued the command after spawn.
    pub fn with_private_key_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    /// Configure the trust store directory at startup
    pub fn with_certstore_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.certstore_path = Some(path.into());
        self
    }

    /// Validate the configuration and spawn the actor task
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid. Must be called
    /// from within a tokio runtime.
    pub fn spawn(self) -> Result<Disco> {
        self.config.validate()?;

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let actor = Actor::new(self.config, cmd_rx, out_tx);
        let handle = tokio::spawn(actor.run());

        // Startup configuration rides the (still empty) command channel
        if let Some(path) = self.certstore_path {
            cmd_tx
                .try_send(Command::SetCertstorePath { path })
                .map_err(|_| Error::Terminated)?;
        }
        if let Some(path) = self.private_key_path {
            cmd_tx
                .try_send(Command::SetPrivateKeyPath { path })
                .map_err(|_| Error::Terminated)?;
        }

        Ok(Disco {
            commands: cmd_tx,
            outbox: out_rx,
            actor: handle,
        })
    }
}

impl Default for DiscoBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Owner-side handle to a running directory actor
///
/// Commands are dispatched by the actor one per tick; discovered
/// `(key, value)` pairs arrive through [`recv`](Disco::recv) in a burst
/// after every deliver cycle, each burst a full replacement snapshot.
pub struct Disco {
    commands: mpsc::Sender<Command>,
    outbox: mpsc::UnboundedReceiver<(String, String)>,
    actor: JoinHandle<()>,
}

impl Disco {
    /// Start building a directory actor
    pub fn builder() -> DiscoBuilder {
        DiscoBuilder::new()
    }

    /// Enable diagnostic logging
    pub async fn verbose(&self) -> Result<()> {
        self.send(Command::Verbose).await
    }

    /// Start the server endpoint on `endpoint` (e.g. `tcp://*:9100`)
    ///
    /// Returns the bound address, which is how a `tcp://127.0.0.1:0`
    /// bind learns its ephemeral port.
    ///
    /// # Errors
    ///
    /// A bind failure is returned here and is fatal: the actor
    /// terminates.
    pub async fn bind(&self, endpoint: &str) -> Result<SocketAddr> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Bind {
            endpoint: endpoint.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| Error::Terminated)?
    }

    /// Add or ensure an outbound peer connection
    ///
    /// The endpoint may carry an `|publickey` suffix pinning the remote
    /// identity. Connection failures are logged by the actor and retried
    /// through the reconnect queue; they are not reported here.
    pub async fn connect(&self, endpoint: &str) -> Result<()> {
        self.send(Command::Connect {
            endpoint: endpoint.to_string(),
        })
        .await
    }

    /// Advertise a key/value pair
    ///
    /// The entry is re-announced to every peer on each push interval for
    /// as long as the actor runs.
    pub async fn publish(&self, key: &str, value: &str) -> Result<()> {
        self.send(Command::Publish {
            key: key.to_string(),
            value: value.to_string(),
        })
        .await
    }

    /// Force the next tick's deliver cycle to run immediately
    pub async fn get_values(&self) -> Result<()> {
        self.send(Command::GetValues).await
    }

    /// Configure the trust store directory for the server endpoint
    pub async fn set_certstore_path<P: Into<PathBuf>>(&self, path: P) -> Result<()> {
        self.send(Command::SetCertstorePath { path: path.into() })
            .await
    }

    /// Load the local identity, enabling authenticated transport
    pub async fn set_private_key_path<P: Into<PathBuf>>(&self, path: P) -> Result<()> {
        self.send(Command::SetPrivateKeyPath { path: path.into() })
            .await
    }

    /// Receive the next discovered `(key, value)` pair
    ///
    /// Returns `None` once the actor has terminated and the final burst
    /// has been drained.
    pub async fn recv(&mut self) -> Option<(String, String)> {
        self.outbox.recv().await
    }

    /// Gracefully stop the actor
    ///
    /// The current dispatch completes first; in-flight peer requests run
    /// into their own timeouts rather than being aborted.
    pub async fn stop(self) {
        let _ = self.commands.send(Command::Terminate).await;
        let _ = self.actor.await;
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::Terminated)
    }
}

//! The directory actor: scheduler and control loop
//!
//! One tokio task owns every piece of actor state — both directories,
//! the peer pool, the trust configuration, the server endpoint. The loop
//! multiplexes the control channel, forwarded server requests, and a
//! bounded 1-second tick; command and request handlers run to completion
//! and never interleave. All peer I/O happens inline in this task, so an
//! unresponsive peer stalls the actor for up to the per-call timeout
//! before being queued for reconnect — a deliberate
//! simplicity-over-throughput tradeoff.

use crate::config::DiscoConfig;
use crate::directory::Directory;
use crate::endpoint;
use crate::error::Result;
use crate::identity::Identity;
use crate::network::{PeerPool, ServerEndpoint, ServerRequest, TlsConfig};
use crate::trust::TrustStore;
use crate::wire::{Request, Response};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Control-channel commands, one per message
pub(crate) enum Command {
    /// Enable diagnostic logging
    Verbose,
    /// Start the server endpoint; bind failure terminates the actor
    Bind {
        endpoint: String,
        reply: oneshot::Sender<Result<SocketAddr>>,
    },
    /// Add or ensure an outbound peer connection
    Connect { endpoint: String },
    /// Upsert an originated entry and announce it immediately
    Publish { key: String, value: String },
    /// Force the next tick's deliver cycle to run
    GetValues,
    /// Configure the trust store for the server endpoint
    SetCertstorePath { path: PathBuf },
    /// Load the local identity, enabling authenticated transport
    SetPrivateKeyPath { path: PathBuf },
    /// Begin graceful shutdown
    Terminate,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Verbose => "VERBOSE",
            Command::Bind { .. } => "BIND",
            Command::Connect { .. } => "CONNECT",
            Command::Publish { .. } => "PUBLISH",
            Command::GetValues => "GET VALUES",
            Command::SetCertstorePath { .. } => "SET CERTSTORE PATH",
            Command::SetPrivateKeyPath { .. } => "SET PRIVATE KEY PATH",
            Command::Terminate => "$TERM",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ActorState {
    Running,
    Terminating,
}

pub(crate) struct Actor {
    config: DiscoConfig,
    verbose: bool,
    state: ActorState,

    /// Entries this node announces; never expired locally
    originated: Directory,
    /// Entries learned from remote publishers; swept by the expire timer
    learned: Directory,

    pool: PeerPool,
    identity: Option<Identity>,
    tls: Option<TlsConfig>,
    trust: Option<TrustStore>,
    server: Option<ServerEndpoint>,

    commands: mpsc::Receiver<Command>,
    server_rx: mpsc::Receiver<ServerRequest>,
    /// Kept for handing to server endpoints at bind time; also keeps
    /// `server_rx` from ever yielding `None`
    server_tx: mpsc::Sender<ServerRequest>,
    outbox: mpsc::UnboundedSender<(String, String)>,

    force_pull: bool,
    last_pull: Instant,
    last_expire: Instant,
    last_push: Instant,
    last_reconnect: Instant,
}

impl Actor {
    pub(crate) fn new(
        config: DiscoConfig,
        commands: mpsc::Receiver<Command>,
        outbox: mpsc::UnboundedSender<(String, String)>,
    ) -> Self {
        let (server_tx, server_rx) = mpsc::channel(1);
        let now = Instant::now();
        Self {
            verbose: config.verbose,
            pool: PeerPool::new(config.call_timeout),
            config,
            state: ActorState::Running,
            originated: Directory::new(),
            learned: Directory::new(),
            identity: None,
            tls: None,
            trust: None,
            server: None,
            commands,
            server_rx,
            server_tx,
            outbox,
            force_pull: false,
            last_pull: now,
            last_expire: now,
            last_push: now,
            last_reconnect: now,
        }
    }

    /// Drive the actor until it terminates
    pub(crate) async fn run(mut self) {
        let mut tick = tokio::time::interval(self.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.state == ActorState::Running {
            // One pending command or one pending server request per
            // pass; both handlers run to completion
            tokio::select! {
                maybe_cmd = self.commands.recv() => match maybe_cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    // Owner dropped the handle: treat as $TERM
                    None => self.state = ActorState::Terminating,
                },
                Some(request) = self.server_rx.recv() => self.handle_request(request),
                _ = tick.tick() => {}
            }

            if self.state == ActorState::Running {
                self.run_timers().await;
            }
        }

        debug!("directory actor stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        if self.verbose {
            debug!("api command={}", command.name());
        }

        match command {
            Command::Verbose => self.verbose = true,

            Command::Bind { endpoint, reply } => match self.bind(&endpoint).await {
                Ok(addr) => {
                    let _ = reply.send(Ok(addr));
                }
                Err(e) => {
                    error!("bind to {} failed: {}", endpoint, e);
                    let _ = reply.send(Err(e));
                    self.state = ActorState::Terminating;
                }
            },

            Command::Connect { endpoint } => {
                if let Err(e) = self.pool.connect(&endpoint).await {
                    warn!("connect to {} failed: {}", endpoint, e);
                }
            }

            Command::Publish { key, value } => {
                self.originated.put(&key, &value);
                let snapshot = self.originated.snapshot();
                self.pool.publish_to_all(&snapshot).await;
            }

            Command::GetValues => {
                // Deliver on the very next pass instead of waiting out
                // the pull interval
                self.force_pull = true;
            }

            Command::SetCertstorePath { path } => {
                self.trust = Some(TrustStore::new(path));
            }

            Command::SetPrivateKeyPath { path } => self.load_identity(&path),

            Command::Terminate => self.state = ActorState::Terminating,
        }
    }

    /// Load the local identity; failure with an explicitly configured
    /// key path is fatal
    fn load_identity(&mut self, path: &std::path::Path) {
        let identity = match Identity::load_secret(path) {
            Ok(identity) => identity,
            Err(e) => {
                error!("identity load from {} failed: {}", path.display(), e);
                self.state = ActorState::Terminating;
                return;
            }
        };
        let tls = match TlsConfig::from_identity(&identity) {
            Ok(tls) => tls,
            Err(e) => {
                error!("TLS setup for identity failed: {}", e);
                self.state = ActorState::Terminating;
                return;
            }
        };
        match tls.client_config() {
            Ok(client) => self.pool.set_client_tls(client),
            Err(e) => {
                error!("TLS setup for identity failed: {}", e);
                self.state = ActorState::Terminating;
                return;
            }
        }
        info!("identity loaded: {}", identity.public_key());
        self.tls = Some(tls);
        self.identity = Some(identity);
    }

    async fn bind(&mut self, bind_endpoint: &str) -> Result<SocketAddr> {
        if self.server.is_some() {
            return Err(crate::Error::Config(
                "server endpoint is already bound".to_string(),
            ));
        }
        let tls = match &self.tls {
            Some(tls) => Some((tls.server_config()?, self.trust.clone())),
            None => None,
        };
        let server = ServerEndpoint::bind(bind_endpoint, tls, self.server_tx.clone()).await?;
        let addr = server.local_addr();
        self.server = Some(server);
        Ok(addr)
    }

    /// Service one inbound request forwarded by the server endpoint
    fn handle_request(&mut self, request: ServerRequest) {
        // With authenticated transport and a trust store configured,
        // requests from unknown identities are dropped with no reply:
        // the oneshot is released unsent
        if self.identity.is_some() {
            if let Some(trust) = &self.trust {
                let trusted = request
                    .peer_key
                    .map(|key| trust.contains(&key))
                    .unwrap_or(false);
                if !trusted {
                    info!("dropping request from untrusted peer {}", request.peer_addr);
                    return;
                }
            }
        }

        match request.request {
            Request::Publish { key, value } => {
                let stored_key = endpoint::rewrite_wildcard(&key, request.peer_addr.ip())
                    .unwrap_or(key);
                if self.verbose {
                    debug!(
                        "publish from {}: '{}' -> '{}'",
                        request.peer_addr, stored_key, value
                    );
                }
                self.learned.put(&stored_key, &value);
                let _ = request.reply.send(Some(Response::Ok));
            }
            Request::Values => {
                let entries = self.learned.snapshot();
                if self.verbose {
                    debug!(
                        "values request from {}: {} entries",
                        request.peer_addr,
                        entries.len()
                    );
                }
                let _ = request.reply.send(Some(Response::Values { entries }));
            }
        }
    }

    /// Fire any timers whose interval has elapsed
    async fn run_timers(&mut self) {
        let now = Instant::now();

        if self.force_pull || now.duration_since(self.last_pull) >= self.config.pull_interval {
            self.force_pull = false;
            self.last_pull = now;
            self.deliver().await;
        }

        if now.duration_since(self.last_expire) >= self.config.expire_interval {
            self.last_expire = now;
            self.learned.expire(self.config.max_age);
        }

        if now.duration_since(self.last_push) >= self.config.push_interval {
            self.last_push = now;
            if !self.originated.is_empty() {
                let snapshot = self.originated.snapshot();
                self.pool.publish_to_all(&snapshot).await;
            }
        }

        if now.duration_since(self.last_reconnect) >= self.config.reconnect_interval {
            self.last_reconnect = now;
            self.pool.drain_reconnects().await;
        }
    }

    /// The deliver cycle: pull from all peers, merge, emit the result
    ///
    /// Each delivered burst is a full replacement snapshot from the
    /// owner's point of view, one key/value pair per message.
    async fn deliver(&mut self) {
        let mut merged = HashMap::new();
        self.pool.pull_merge(&mut merged).await;

        if self.verbose {
            debug!("delivering {} merged entries", merged.len());
        }
        for pair in merged {
            if self.outbox.send(pair).is_err() {
                // Owner stopped listening; shutdown follows via the
                // command channel closing
                return;
            }
        }
    }
}

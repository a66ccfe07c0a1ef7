//! `Connector` builder, actor task and handle.
//!
//! The connector runs as one Tokio task that owns a [`ConnectorCore`] and
//! the live link. Everything else talks to it through a cloneable
//! [`Connector`] handle:
//!
//! ```text
//! Connector (handle) ──commands──→ actor ──→ ConnectorCore
//!                                   ↑  ↓
//!                          link.recv  link.send (outbox)
//!                                   ↑
//!                          core timers
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use croupier_protocol::{GameDataSchemas, Operation, SchemaCatalog, SchemaValidator};
use croupier_request::{NoopHandlers, RequestDescriptor, RequestHandlers, TestMode};
use croupier_transport::{Connection, Dialer};
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tracing::{debug, info, warn};

use crate::{
    CasinoRecovery, ConnectionState, ConnectorConfig, ConnectorCore, CroupierError, Notifier,
    NullNotifier, RecoveryPolicy, Snapshot,
};

type PolicyFactory = Box<dyn Fn() -> Box<dyn RecoveryPolicy> + Send>;

/// Builder for configuring and starting a connector.
///
/// # Example
///
/// ```rust,ignore
/// use croupier::prelude::*;
///
/// let connector = Connector::builder()
///     .config(ConnectorConfig::from_launch_params(query)?)
///     .handlers(Operation::Bet, MyBetHandlers::default())
///     .notifier(events_tx)
///     .spawn(WebSocketDialer)?;
/// connector.connect(Duration::from_secs(5), 3).await?;
/// connector.request(Operation::StartGame).await?;
/// ```
pub struct ConnectorBuilder {
    config: ConnectorConfig,
    game_data: GameDataSchemas,
    handlers: BTreeMap<Operation, Box<dyn RequestHandlers>>,
    test_modes: BTreeMap<Operation, TestMode>,
    policies: BTreeMap<Operation, Box<dyn RecoveryPolicy>>,
    default_policy: PolicyFactory,
    notifier: Box<dyn Notifier>,
}

impl ConnectorBuilder {
    /// Creates a builder with default settings, [`CasinoRecovery`] for
    /// every operation and no notifier.
    pub fn new() -> Self {
        Self {
            config: ConnectorConfig::default(),
            game_data: GameDataSchemas::default(),
            handlers: BTreeMap::new(),
            test_modes: BTreeMap::new(),
            policies: BTreeMap::new(),
            default_policy: Box::new(|| Box::new(CasinoRecovery)),
            notifier: Box::new(NullNotifier),
        }
    }

    pub fn config(mut self, config: ConnectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the game's `gameData` schemas.
    pub fn game_data(mut self, schemas: GameDataSchemas) -> Self {
        self.game_data = schemas;
        self
    }

    /// Registers the callbacks for `op`. Unregistered operations get
    /// [`NoopHandlers`].
    pub fn handlers(mut self, op: Operation, handlers: impl RequestHandlers) -> Self {
        self.handlers.insert(op, Box::new(handlers));
        self
    }

    /// Sets offline overrides for `op`.
    pub fn test_mode(mut self, op: Operation, test_mode: TestMode) -> Self {
        self.test_modes.insert(op, test_mode);
        self
    }

    /// Overrides the recovery policy for `op` alone.
    pub fn policy(mut self, op: Operation, policy: impl RecoveryPolicy) -> Self {
        self.policies.insert(op, Box::new(policy));
        self
    }

    /// Replaces the policy every operation without its own override uses.
    pub fn default_policy<P: RecoveryPolicy + Clone>(mut self, policy: P) -> Self {
        self.default_policy = Box::new(move || Box::new(policy.clone()));
        self
    }

    pub fn notifier(mut self, notifier: impl Notifier) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    /// Builds the I/O-free core without starting a task.
    ///
    /// # Errors
    /// [`CroupierError::Protocol`] when a schema does not compile.
    pub fn build_core(mut self) -> Result<ConnectorCore, CroupierError> {
        let config = self.config.validated();
        let catalog = SchemaCatalog::new(self.game_data);

        let mut descriptors = Vec::with_capacity(Operation::ALL.len());
        let mut policies = Vec::with_capacity(Operation::ALL.len());
        for op in Operation::ALL {
            let validator = SchemaValidator::for_operation(op, &catalog)?;
            let handlers = self
                .handlers
                .remove(&op)
                .unwrap_or_else(|| Box::new(NoopHandlers));
            let test_mode = self.test_modes.remove(&op).unwrap_or_default();
            descriptors.push(RequestDescriptor::new(validator, handlers).with_test_mode(test_mode));
            policies.push(
                self.policies
                    .remove(&op)
                    .unwrap_or_else(|| (self.default_policy)()),
            );
        }

        Ok(ConnectorCore::new(config, descriptors, policies, self.notifier))
    }

    /// Builds the core and starts the connector task on the current Tokio
    /// runtime.
    ///
    /// # Errors
    /// Same as [`build_core`](Self::build_core).
    pub fn spawn<D: Dialer>(self, dialer: D) -> Result<Connector, CroupierError> {
        let core = self.build_core()?;
        let (tx, rx) = mpsc::channel(core.config().channel_size);
        let actor = ConnectorActor {
            core,
            dialer,
            link: None,
            commands: rx,
        };
        tokio::spawn(actor.run());
        Ok(Connector { sender: tx })
    }
}

impl Default for ConnectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Commands sent to the connector task.
enum Command {
    Connect {
        timeout: Duration,
        retries: u32,
        reply: oneshot::Sender<ConnectionState>,
    },
    Request(Operation),
    Snapshot {
        reply: oneshot::Sender<Snapshot>,
    },
    Shutdown,
}

/// Handle to a running connector. Cheap to clone.
///
/// Every method fails with [`CroupierError::Unavailable`] once the task
/// has stopped.
#[derive(Clone)]
pub struct Connector {
    sender: mpsc::Sender<Command>,
}

impl Connector {
    pub fn builder() -> ConnectorBuilder {
        ConnectorBuilder::new()
    }

    /// Opens the link: one attempt plus up to `retries` retries, each
    /// bounded by `timeout`. Resolves once connected or out of attempts
    /// and returns the resulting state.
    ///
    /// Returns at once when already connected or in standalone mode.
    pub async fn connect(
        &self,
        timeout: Duration,
        retries: u32,
    ) -> Result<ConnectionState, CroupierError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(Command::Connect {
                timeout,
                retries,
                reply: reply_tx,
            })
            .await
            .map_err(|_| CroupierError::Unavailable)?;
        reply_rx.await.map_err(|_| CroupierError::Unavailable)
    }

    /// Asks for `op` to be sent (fire-and-forget). The outcome arrives
    /// through the operation's handlers.
    pub async fn request(&self, op: Operation) -> Result<(), CroupierError> {
        self.sender
            .send(Command::Request(op))
            .await
            .map_err(|_| CroupierError::Unavailable)
    }

    pub async fn snapshot(&self) -> Result<Snapshot, CroupierError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(Command::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| CroupierError::Unavailable)?;
        reply_rx.await.map_err(|_| CroupierError::Unavailable)
    }

    /// Tells the task to close the link and stop.
    pub async fn shutdown(&self) -> Result<(), CroupierError> {
        self.sender
            .send(Command::Shutdown)
            .await
            .map_err(|_| CroupierError::Unavailable)
    }

    /// Resolves once the task has stopped.
    pub async fn closed(&self) {
        self.sender.closed().await;
    }
}

/// The connector task's state.
struct ConnectorActor<D: Dialer> {
    core: ConnectorCore,
    dialer: D,
    link: Option<D::Connection>,
    commands: mpsc::Receiver<Command>,
}

impl<D: Dialer> ConnectorActor<D> {
    async fn run(mut self) {
        info!(url = %self.core.config().url, "connector task started");

        loop {
            self.flush().await;

            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd).await,
                },
                inbound = recv_from(self.link.as_ref()) => self.handle_inbound(inbound),
                key = self.core.next_timer() => self.core.on_timer(key),
            }
        }

        if let Some(link) = self.link.take() {
            let _ = link.close().await;
        }
        info!("connector task stopped");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect {
                timeout,
                retries,
                reply,
            } => {
                let state = self.connect(timeout, retries).await;
                let _ = reply.send(state);
            }
            Command::Request(op) => self.core.request(op),
            Command::Snapshot { reply } => {
                let _ = reply.send(self.core.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    async fn connect(&mut self, timeout: Duration, retries: u32) -> ConnectionState {
        if self.core.connection() == ConnectionState::Normal {
            return ConnectionState::Normal;
        }
        if self.core.config().standalone {
            self.core.on_open();
            return self.core.connection();
        }

        self.core.on_connecting();
        let url = self.core.config().url.clone();
        let mut remaining = retries;
        loop {
            match time::timeout(timeout, self.dialer.dial(&url)).await {
                Ok(Ok(link)) => {
                    info!(%url, conn_id = %link.id(), "link established");
                    self.link = Some(link);
                    self.core.on_open();
                    break;
                }
                Ok(Err(e)) => warn!(%url, error = %e, "connect attempt failed"),
                Err(_) => warn!(
                    %url,
                    timeout_ms = timeout.as_millis() as u64,
                    "connect attempt timed out"
                ),
            }

            if remaining == 0 {
                self.core.on_failed();
                break;
            }
            remaining -= 1;
            self.core.on_retry(remaining);

            let pause = self.core.config().retry_pause();
            if !pause.is_zero() {
                time::sleep(pause).await;
            }
        }
        self.core.connection()
    }

    fn handle_inbound(
        &mut self,
        inbound: Result<Option<Vec<u8>>, <D::Connection as Connection>::Error>,
    ) {
        match inbound {
            Ok(Some(data)) => self.core.handle_inbound_bytes(&data),
            Ok(None) => {
                debug!("link closed by peer");
                self.link = None;
                self.core.on_closed();
            }
            Err(e) => {
                warn!(error = %e, "link receive failed");
                self.link = None;
                self.core.on_closed();
            }
        }
    }

    /// Ships everything the core queued.
    async fn flush(&mut self) {
        while let Some(data) = self.core.take_outbound() {
            let Some(link) = self.link.as_ref() else {
                warn!(bytes = data.len(), "no link, outbound message dropped");
                continue;
            };
            if let Err(e) = link.send(&data).await {
                warn!(error = %e, "link send failed");
                self.link = None;
                self.core.on_closed();
            }
        }
    }
}

/// Receives from the link, or pends forever without one.
async fn recv_from<C: Connection>(link: Option<&C>) -> Result<Option<Vec<u8>>, C::Error> {
    match link {
        Some(link) => link.recv().await,
        None => std::future::pending().await,
    }
}

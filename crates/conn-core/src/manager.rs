//! The top-level state machine: drives the TCP socket through its lifecycle,
//! orchestrates the OperationTable/RetrySchedule/HeartbeatTimer/Pipeline, and
//! is the sole mutator of the OperationTable.
//!
//! Modeled as a single-threaded cooperative event loop: one
//! `tokio::task` consumes one event at a time from an `mpsc` mailbox and
//! runs each handler to completion before the next is dequeued. Everything
//! external — connect attempts, pipeline reads, heartbeat timers, client
//! deaths — is a task that sends an `Event` into that same mailbox, mirroring
//! the reactor-task shape this lineage uses for its own request/response
//! loop, generalized here to drive reconnection ourselves since raw TCP has
//! no automatic-reconnect behavior to lean on.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::client::{ClientHandle, ClientInbox, ClientRegistry};
use crate::correlation::CorrelationId;
use crate::error::SubmitError;
use crate::heartbeat::{self, HeartbeatEvent, HeartbeatId, HeartbeatTimer};
use crate::message::{ClientEvent, Message, MessageFailure, OutLike, PackageIn, PackageOut};
use crate::operation::Operation;
use crate::operation_table::OperationTable;
use crate::pipeline::{Pipeline, TcpPipeline};
use crate::retry::RetrySchedule;
use crate::settings::Settings;

/// Builds a [`Pipeline`] over a freshly connected socket, given the sink it
/// should deliver decoded inbound packages to.
pub type PipelineFactory = Arc<dyn Fn(TcpStream, mpsc::UnboundedSender<PackageIn>) -> Box<dyn Pipeline> + Send + Sync>;

/// Builds a fresh [`Operation`] for a package that the claim rule
/// could not route to an existing one. Concrete operation variants are out
/// of scope for this crate; the façade supplies this factory at spawn time.
/// `inboundDeliverer` is realized as the returned sender the operation
/// captures to deliver its own results to the client.
pub type OperationFactory =
    Arc<dyn Fn(PackageOut, ClientHandle, mpsc::UnboundedSender<ClientEvent>) -> Box<dyn Operation> + Send + Sync>;

/// The length-delimited/bincode pipeline this crate ships, wired up as a
/// ready-to-use [`PipelineFactory`].
pub fn tcp_pipeline_factory() -> PipelineFactory {
    Arc::new(|socket, sink| Box::new(TcpPipeline::new(socket, sink)) as Box<dyn Pipeline>)
}

enum Event {
    Outgoing(ClientHandle, PackageOut),
    Incoming(PackageIn),
    ClientRegistered(ClientHandle, mpsc::UnboundedSender<ClientEvent>),
    ClientTerminated(ClientHandle),
    Connected(TcpStream),
    ConnectFailed,
    PeerClosed,
    Heartbeat(HeartbeatEvent),
}

/// A cloneable, cheap-to-hold reference to a running manager's mailbox.
#[derive(Clone)]
pub struct ManagerHandle {
    mailbox: mpsc::UnboundedSender<Event>,
    registry: Arc<ClientRegistry>,
    default_credentials: Option<crate::message::Credentials>,
}

impl ManagerHandle {
    /// Register a new client, returning its handle and the inbox it should
    /// poll for deliveries. Dropping the returned inbox's sender half (done
    /// internally; callers just drop the handle/inbox pair) is what the
    /// manager's death-watch observes.
    pub fn register_client(&self) -> (ClientHandle, ClientInbox) {
        let (handle, tx, rx) = self.registry.register();
        let _ = self.mailbox.send(Event::ClientRegistered(handle, tx));
        (handle, rx)
    }

    /// Submit a higher-level outbound value; the manager mints a fresh
    /// correlation id and fills in default credentials if none are given.
    pub fn submit(&self, client: ClientHandle, out: OutLike) -> Result<(), SubmitError> {
        let pkg = out.into_package(CorrelationId::new(), self.default_credentials.clone());
        self.submit_package(client, pkg)
    }

    /// Submit a fully formed package, e.g. a follow-up request addressed to
    /// an existing operation's own correlation id.
    pub fn submit_package(&self, client: ClientHandle, pkg: PackageOut) -> Result<(), SubmitError> {
        self.mailbox.send(Event::Outgoing(client, pkg)).map_err(|_| SubmitError)
    }
}

struct Connected {
    pipeline: Box<dyn Pipeline>,
    heartbeat_id: HeartbeatId,
    heartbeat_timer: HeartbeatTimer,
    heartbeat_tx: mpsc::UnboundedSender<HeartbeatEvent>,
}

enum Phase {
    Connecting,
    Connected(Connected),
    Reconnecting(RetrySchedule),
    Terminated,
}

/// Owns the OperationTable and drives the connection's state machine.
/// Never constructed directly by callers; see [`ConnectionManager::spawn`].
pub struct ConnectionManager {
    settings: Settings,
    pipeline_factory: PipelineFactory,
    operation_factory: OperationFactory,
    ops: OperationTable,
    clients: HashMap<ClientHandle, mpsc::UnboundedSender<ClientEvent>>,
    watched: HashSet<ClientHandle>,
    phase: Phase,
    mailbox_tx: mpsc::UnboundedSender<Event>,
}

impl ConnectionManager {
    /// Spawn the manager's event loop as a detached task and return a handle
    /// to it. Starts in `Connecting` and issues an immediate connect attempt.
    pub fn spawn(settings: Settings, pipeline_factory: PipelineFactory, operation_factory: OperationFactory) -> ManagerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Arc::new(ClientRegistry::new());

        let handle = ManagerHandle {
            mailbox: tx.clone(),
            registry,
            default_credentials: settings.default_credentials.clone(),
        };

        let manager = ConnectionManager {
            settings,
            pipeline_factory,
            operation_factory,
            ops: OperationTable::new(),
            clients: HashMap::new(),
            watched: HashSet::new(),
            phase: Phase::Connecting,
            mailbox_tx: tx,
        };

        tokio::spawn(manager.run(rx));
        handle
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Event>) {
        self.spawn_connect_after(Duration::ZERO);

        while let Some(event) = rx.recv().await {
            self.handle_event(event);
            if matches!(self.phase, Phase::Terminated) {
                break;
            }
        }
        debug!("connection manager event loop exiting");
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::ClientRegistered(client, tx) => {
                self.clients.insert(client, tx);
            }
            Event::ClientTerminated(client) => self.on_client_terminated(client),
            Event::Outgoing(client, pkg) => self.on_outgoing(client, pkg),
            Event::Incoming(pkg) => self.on_incoming(pkg),
            Event::Connected(socket) => self.on_connected(socket),
            Event::ConnectFailed => self.on_connect_failed(),
            Event::PeerClosed => self.on_peer_closed(),
            Event::Heartbeat(ev) => self.on_heartbeat(ev),
        }
    }

    // ---- claim rule ----

    fn on_outgoing(&mut self, client: ClientHandle, pkg: PackageOut) {
        let mut claimed_id = Some(pkg.correlation_id);
        let mut claimed = self.ops.remove(pkg.correlation_id);

        if claimed.is_none() {
            let mut candidate = None;
            for id in self.ops.ids_for_client(client) {
                if self.ops.get(id).map(|op| op.claims_outgoing(&pkg.message)) == Some(true) {
                    candidate = Some(id);
                    break;
                }
            }
            claimed_id = candidate;
            if let Some(id) = candidate {
                claimed = self.ops.remove(id);
            }
        }

        if let (Some(op), Some(id)) = (claimed, claimed_id) {
            let mut pipeline_failed = false;
            if let Phase::Connected(conn) = &mut self.phase {
                if let Err(e) = conn.pipeline.send(pkg.clone()) {
                    warn!(error = %e, "failed to transmit outgoing package claimed by existing operation");
                    pipeline_failed = true;
                }
            }
            if pipeline_failed {
                self.teardown_connected("pipeline write failed");
            }
            self.ops.apply(id, op.apply_outgoing(pkg.message));
            return;
        }

        self.ensure_watched(client);

        let mut pipeline_failed = false;
        if let Phase::Connected(conn) = &mut self.phase {
            if let Err(e) = conn.pipeline.send(pkg.clone()) {
                warn!(error = %e, "failed to transmit newly created operation's package");
                pipeline_failed = true;
            }
        }
        if pipeline_failed {
            self.teardown_connected("pipeline write failed");
        }

        let Some(client_tx) = self.clients.get(&client).cloned() else {
            warn!(%client, "outgoing package submitted for unregistered client, dropping");
            return;
        };
        let op = (self.operation_factory)(pkg, client, client_tx);
        self.ops.insert(op);
    }

    fn ensure_watched(&mut self, client: ClientHandle) {
        if !self.watched.insert(client) {
            return;
        }
        let Some(tx) = self.clients.get(&client).cloned() else {
            return;
        };
        let mailbox = self.mailbox_tx.clone();
        tokio::spawn(async move {
            tx.closed().await;
            let _ = mailbox.send(Event::ClientTerminated(client));
        });
    }

    // ---- inbound handling (Connected only) ----

    fn on_incoming(&mut self, pkg: PackageIn) {
        if !matches!(self.phase, Phase::Connected(_)) {
            debug!("dropping inbound package received outside Connected");
            return;
        }

        // Server-initiated probes: reply, but do not reset the heartbeat
        // epoch, so a live peer that only ever pings never looks idle.
        if let Ok(Message::HeartbeatRequest) = &pkg.result {
            self.reply(pkg.correlation_id, Message::HeartbeatResponse);
            return;
        }
        if let Ok(Message::Ping) = &pkg.result {
            self.reply(pkg.correlation_id, Message::Pong);
            return;
        }

        match pkg.result {
            Ok(message) => {
                if let Some(op) = self.ops.remove(pkg.correlation_id) {
                    let next = op.inspect_in(message);
                    self.ops.apply(pkg.correlation_id, next);
                } else {
                    warn!(correlation_id = %pkg.correlation_id, "stray inbound message, no matching operation");
                    if matches!(message, Message::SubscribeCompleted) {
                        let unsubscribe = PackageOut {
                            message: Message::Unsubscribe,
                            correlation_id: pkg.correlation_id,
                            credentials: self.settings.default_credentials.clone(),
                        };
                        let mut pipeline_failed = false;
                        if let Phase::Connected(conn) = &mut self.phase {
                            if let Err(e) = conn.pipeline.send(unsubscribe) {
                                warn!(error = %e, "failed to send defensive unsubscribe");
                                pipeline_failed = true;
                            }
                        }
                        if pipeline_failed {
                            self.teardown_connected("pipeline write failed");
                        }
                    }
                }
                self.bump_heartbeat();
            }
            Err(failure) => {
                if let Some(op) = self.ops.get(pkg.correlation_id) {
                    let client = op.client();
                    self.deliver_failure(client, pkg.correlation_id, failure);
                } else {
                    warn!(correlation_id = %pkg.correlation_id, error = ?failure, "stray decode failure, no matching operation");
                }
                self.bump_heartbeat();
            }
        }
    }

    fn reply(&mut self, correlation_id: CorrelationId, message: Message) {
        let mut pipeline_failed = false;
        if let Phase::Connected(conn) = &mut self.phase {
            let pkg = PackageOut {
                message,
                correlation_id,
                credentials: None,
            };
            if let Err(e) = conn.pipeline.send(pkg) {
                warn!(error = %e, "failed to reply to server probe");
                pipeline_failed = true;
            }
        }
        if pipeline_failed {
            self.teardown_connected("pipeline write failed");
        }
    }

    fn bump_heartbeat(&mut self) {
        let interval = self.settings.heartbeat_interval;
        let timeout = self.settings.heartbeat_timeout;
        if let Phase::Connected(conn) = &mut self.phase {
            let new_id = conn.heartbeat_id + 1;
            let new_timer = HeartbeatTimer::arm(new_id, interval, timeout, conn.heartbeat_tx.clone());
            let old_timer = std::mem::replace(&mut conn.heartbeat_timer, new_timer);
            old_timer.cancel();
            conn.heartbeat_id = new_id;
        }
    }

    fn deliver_failure(&mut self, client: ClientHandle, correlation_id: CorrelationId, failure: MessageFailure) {
        if let Some(tx) = self.clients.get(&client) {
            let _ = tx.send(ClientEvent::Failure { correlation_id, failure });
        }
    }

    // ---- connection lifecycle ----

    fn on_connected(&mut self, socket: TcpStream) {
        let (pkg_tx, mut pkg_rx) = mpsc::unbounded_channel::<PackageIn>();
        let mut pipeline = (self.pipeline_factory)(socket, pkg_tx);

        let reader_mailbox = self.mailbox_tx.clone();
        tokio::spawn(async move {
            while let Some(pkg) = pkg_rx.recv().await {
                if reader_mailbox.send(Event::Incoming(pkg)).is_err() {
                    break;
                }
            }
            let _ = reader_mailbox.send(Event::PeerClosed);
        });

        let mut pipeline_failed = false;
        for id in self.ops.ids() {
            if let Some(op) = self.ops.remove(id) {
                let mut sender = |pkg: PackageOut| {
                    if let Err(e) = pipeline.send(pkg) {
                        warn!(error = %e, "failed to replay package on reconnect");
                        pipeline_failed = true;
                    }
                };
                let next = op.connected(&mut sender);
                self.ops.apply(id, next);
            }
        }

        let (heartbeat_tx, mut heartbeat_rx) = mpsc::unbounded_channel::<HeartbeatEvent>();
        let heartbeat_mailbox = self.mailbox_tx.clone();
        tokio::spawn(async move {
            while let Some(ev) = heartbeat_rx.recv().await {
                if heartbeat_mailbox.send(Event::Heartbeat(ev)).is_err() {
                    break;
                }
            }
        });

        let heartbeat_id: HeartbeatId = 0;
        let heartbeat_timer = HeartbeatTimer::arm(
            heartbeat_id,
            self.settings.heartbeat_interval,
            self.settings.heartbeat_timeout,
            heartbeat_tx.clone(),
        );

        info!(address = %self.settings.address, "connection established");
        self.phase = Phase::Connected(Connected {
            pipeline,
            heartbeat_id,
            heartbeat_timer,
            heartbeat_tx,
        });

        if pipeline_failed {
            self.teardown_connected("pipeline write failed during reconnect replay");
        }
    }

    fn on_connect_failed(&mut self) {
        match &self.phase {
            Phase::Connecting => self.begin_reconnecting("connect attempt failed"),
            Phase::Reconnecting(retry) => match retry.next() {
                Some(next) => {
                    let delay = next.delay();
                    self.phase = Phase::Reconnecting(next);
                    self.spawn_connect_after(delay);
                }
                None => self.terminate("reconnect budget exhausted"),
            },
            _ => {}
        }
    }

    fn on_peer_closed(&mut self) {
        self.teardown_connected("peer closed");
    }

    /// Tear down a live connection and move into `Reconnecting` (or
    /// `Terminated`, if the reconnect budget is already exhausted). Shared by
    /// every path that observes the pipeline as dead: the reader loop
    /// closing (`on_peer_closed`), a heartbeat timeout, and a failed
    /// `pipeline.send()` — a writer-task death is just as fatal to the
    /// session as a reader-task death, and must not be silently swallowed.
    /// A no-op if the phase is not currently `Connected` (e.g. a second
    /// failed send after the first already tore the connection down).
    fn teardown_connected(&mut self, reason: &'static str) {
        let conn = match std::mem::replace(&mut self.phase, Phase::Terminated) {
            Phase::Connected(conn) => conn,
            other => {
                self.phase = other;
                return;
            }
        };
        conn.heartbeat_timer.cancel();
        drop(conn.pipeline);

        for id in self.ops.ids() {
            if let Some(op) = self.ops.remove(id) {
                let client = op.client();
                let next = op.connection_lost();
                let lost = next.is_none();
                self.ops.apply(id, next);
                if lost {
                    self.deliver_failure(client, id, MessageFailure::ConnectionLost);
                }
            }
        }

        warn!(%reason, "connection torn down");
        self.begin_reconnecting(reason);
    }

    fn on_heartbeat(&mut self, event: HeartbeatEvent) {
        let current = match &self.phase {
            Phase::Connected(conn) => conn.heartbeat_id,
            _ => return,
        };
        if !heartbeat::is_current(event, current) {
            return; // stale heartbeat events never cause a state change
        }

        match event {
            HeartbeatEvent::Due(_) => {
                let pkg = PackageOut {
                    message: Message::HeartbeatRequest,
                    correlation_id: CorrelationId::new(),
                    credentials: self.settings.default_credentials.clone(),
                };
                let mut pipeline_failed = false;
                if let Phase::Connected(conn) = &mut self.phase {
                    if let Err(e) = conn.pipeline.send(pkg) {
                        warn!(error = %e, "failed to send heartbeat probe");
                        pipeline_failed = true;
                    }
                }
                if pipeline_failed {
                    self.teardown_connected("pipeline write failed");
                }
            }
            HeartbeatEvent::Timeout(_) => {
                self.teardown_connected("no heartbeat within heartbeat_timeout");
            }
        }
    }

    fn on_client_terminated(&mut self, client: ClientHandle) {
        self.watched.remove(&client);
        self.clients.remove(&client);
        for op in self.ops.remove_all_for_client(client) {
            if let Some(farewell) = op.client_terminated() {
                let mut pipeline_failed = false;
                if let Phase::Connected(conn) = &mut self.phase {
                    if let Err(e) = conn.pipeline.send(farewell) {
                        warn!(error = %e, "failed to send farewell package for terminated client");
                        pipeline_failed = true;
                    }
                }
                if pipeline_failed {
                    self.teardown_connected("pipeline write failed");
                }
            }
        }
    }

    fn begin_reconnecting(&mut self, reason: &'static str) {
        let retry = RetrySchedule::new(
            self.settings.max_reconnections,
            self.settings.reconnection_delay_min,
            self.settings.reconnection_delay_max,
        );
        if retry.is_exhausted() {
            self.terminate(reason);
            return;
        }
        let delay = retry.delay();
        self.phase = Phase::Reconnecting(retry);
        self.spawn_connect_after(delay);
    }

    fn terminate(&mut self, reason: &'static str) {
        error!(%reason, "connection manager terminating");
        for op in self.ops.drain() {
            let client = op.client();
            let correlation_id = op.id();
            self.deliver_failure(client, correlation_id, MessageFailure::ConnectionLost);
        }
        self.phase = Phase::Terminated;
    }

    fn spawn_connect_after(&self, delay: Duration) {
        let address: SocketAddr = self.settings.address;
        let timeout = self.settings.connection_timeout;
        let tx = self.mailbox_tx.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match TcpPipeline::connect(address, timeout).await {
                Ok(socket) => {
                    let _ = tx.send(Event::Connected(socket));
                }
                Err(e) => {
                    warn!(error = %e, "connect attempt failed");
                    let _ = tx.send(Event::ConnectFailed);
                }
            }
        });
    }
}

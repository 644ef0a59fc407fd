//! # Customer Display Channel
//!
//! Actor that exclusively owns the display window handle, the outbound queue
//! and the cached flow snapshot. Everything else talks to it through a
//! cloneable [`DisplayChannelHandle`].
//!
//! ## Handshake States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Display Handshake States                             │
//! │                                                                         │
//! │  ┌────────┐   open()/send()   ┌─────────┐                               │
//! │  │ Closed │ ────────────────► │ Opening │  outbound messages queue      │
//! │  └────────┘                   └────┬────┘                               │
//! │      ▲                             │                                    │
//! │      │              READY received │  or ready_timeout (best effort)    │
//! │      │                             ▼                                    │
//! │      │                        ┌─────────┐                               │
//! │      │                        │  Ready  │  queue flushed                │
//! │      │                        └────┬────┘                               │
//! │      │                             │ first successful post              │
//! │      │                             ▼                                    │
//! │      │   close() / window    ┌─────────┐                                │
//! │      └────────────────────── │ Active  │                                │
//! │          gone (poll)         └─────────┘                                │
//! │                                                                         │
//! │  FAILURE HANDLING                                                       │
//! │  ────────────────                                                       │
//! │  post fails  → drop handle, requeue, reopen (max_send_retries)          │
//! │  open fails  → retry open (max_send_retries) → RetriesExhausted         │
//! │  poll finds window closed → reset handle, handshake, snapshot           │
//! │                             (listeners survive)                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Inbound Filtering
//! A reply is accepted only when its origin equals the configured target
//! origin and its source is the window currently owned. Anything else is
//! dropped. Unknown message types are rejected with a warning.

use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use checkout_core::FlowStep;

use crate::config::DisplayConfig;
use crate::error::{DisplayError, DisplayResult};
use crate::merge::{merge_flow_update, prune_nulls};
use crate::protocol::{Content, FlowMessage, InboundMessage, MessageType};
use crate::surface::{DisplaySurface, PeerWindow, RawMessage, WindowId, WindowSpec};

// =============================================================================
// Channel State
// =============================================================================

/// Handshake state of the display window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// No window.
    Closed,
    /// Window opened, waiting for `CUSTOMER_DISPLAY_READY`.
    Opening,
    /// Ready observed (or assumed after timeout); nothing posted yet.
    Ready,
    /// At least one message delivered since ready.
    Active,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeState::Closed => write!(f, "closed"),
            HandshakeState::Opening => write!(f, "opening"),
            HandshakeState::Ready => write!(f, "ready"),
            HandshakeState::Active => write!(f, "active"),
        }
    }
}

/// Identifies one registered inbound listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Point-in-time view of the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    pub handshake: HandshakeState,
    pub window: Option<WindowId>,
    pub queued: usize,
    pub listeners: usize,
    pub flow_id: Option<String>,
    pub has_flow_snapshot: bool,
    /// Last sequence number handed out.
    pub last_seq: u64,
}

/// The cached content of the flow last started or updated.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSnapshot {
    pub flow_id: String,
    pub content: Content,
}

// =============================================================================
// Listener
// =============================================================================

/// Receives inbound messages accepted by the channel.
///
/// Dropping it does not unregister it; call
/// [`DisplayChannelHandle::remove_listener`] with its id.
#[derive(Debug)]
pub struct DisplayListener {
    id: ListenerId,
    rx: mpsc::UnboundedReceiver<InboundMessage>,
}

impl DisplayListener {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Next accepted inbound message. `None` once the listener was removed
    /// or the channel closed.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<InboundMessage> {
        self.rx.try_recv().ok()
    }
}

// =============================================================================
// Commands
// =============================================================================

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Open(Reply<DisplayResult<()>>),
    Close(Reply<()>),
    Send {
        message: FlowMessage,
        reply: Reply<DisplayResult<u64>>,
    },
    StartFlow {
        flow_id: String,
        content: Content,
        reply: Reply<DisplayResult<u64>>,
    },
    UpdateFlow {
        flow_id: String,
        step: FlowStep,
        payload: Content,
        reply: Reply<DisplayResult<u64>>,
    },
    DirectCashUpdate {
        flow_id: String,
        content: Content,
        reply: Reply<DisplayResult<u64>>,
    },
    AddListener(Reply<DisplayListener>),
    RemoveListener {
        id: ListenerId,
        reply: Reply<bool>,
    },
    Status(Reply<ChannelStatus>),
    Snapshot(Reply<Option<FlowSnapshot>>),
}

// =============================================================================
// Channel Handle
// =============================================================================

/// Handle for talking to the display channel from other components.
#[derive(Clone)]
pub struct DisplayChannelHandle {
    commands: mpsc::Sender<Command>,
    shutdown_tx: mpsc::Sender<()>,
}

impl DisplayChannelHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> DisplayResult<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| DisplayError::ShuttingDown)?;
        rx.await.map_err(|_| DisplayError::ShuttingDown)
    }

    /// Opens the display window. No-op if a live window exists.
    pub async fn open(&self) -> DisplayResult<()> {
        self.request(Command::Open).await?
    }

    /// Closes the window and forgets queued messages, the cached snapshot and
    /// every listener.
    pub async fn close(&self) -> DisplayResult<()> {
        self.request(Command::Close).await
    }

    /// Sends any outbound message. Returns its sequence number.
    pub async fn send(&self, message: FlowMessage) -> DisplayResult<u64> {
        self.request(|reply| Command::Send { message, reply }).await?
    }

    /// Mirrors the idle cart.
    pub async fn display_cart(&self, cart: Value) -> DisplayResult<u64> {
        self.send(FlowMessage::display_update(cart)).await
    }

    /// Returns the display to its welcome screen and drops the flow snapshot.
    pub async fn show_welcome(&self) -> DisplayResult<u64> {
        self.send(FlowMessage::show_welcome()).await
    }

    /// Switches the display to rewards sign-up and drops the flow snapshot.
    pub async fn show_rewards(&self, content: Content) -> DisplayResult<u64> {
        self.send(FlowMessage::show_rewards(content)).await
    }

    /// Starts a customer flow with a full snapshot.
    pub async fn start_flow(&self, flow_id: &str, content: Content) -> DisplayResult<u64> {
        let flow_id = flow_id.to_string();
        self.request(|reply| Command::StartFlow {
            flow_id,
            content,
            reply,
        })
        .await?
    }

    /// Sends the cached snapshot merged with `payload`, at `step`.
    ///
    /// Fails with [`DisplayError::FlowNotStarted`] if `flow_id` has no
    /// cached snapshot.
    pub async fn update_flow(
        &self,
        flow_id: &str,
        step: FlowStep,
        payload: Content,
    ) -> DisplayResult<u64> {
        let flow_id = flow_id.to_string();
        self.request(|reply| Command::UpdateFlow {
            flow_id,
            step,
            payload,
            reply,
        })
        .await?
    }

    /// Tender/change figures, sent as-is without touching the snapshot.
    pub async fn direct_cash_update(&self, flow_id: &str, content: Content) -> DisplayResult<u64> {
        let flow_id = flow_id.to_string();
        self.request(|reply| Command::DirectCashUpdate {
            flow_id,
            content,
            reply,
        })
        .await?
    }

    pub async fn add_listener(&self) -> DisplayResult<DisplayListener> {
        self.request(Command::AddListener).await
    }

    /// Returns false if `id` was not registered.
    pub async fn remove_listener(&self, id: ListenerId) -> DisplayResult<bool> {
        self.request(|reply| Command::RemoveListener { id, reply })
            .await
    }

    pub async fn status(&self) -> DisplayResult<ChannelStatus> {
        self.request(Command::Status).await
    }

    pub async fn last_flow_snapshot(&self) -> DisplayResult<Option<FlowSnapshot>> {
        self.request(Command::Snapshot).await
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> DisplayResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| DisplayError::ShuttingDown)
    }
}

// =============================================================================
// Channel Actor
// =============================================================================

/// The display channel actor.
///
/// ## Usage
/// ```rust,ignore
/// let surface = Arc::new(InMemorySurface::new("http://localhost:1420"));
/// let display = CustomerDisplayChannel::spawn(DisplayConfig::default(), surface)?;
///
/// display.start_flow(&flow_id, content).await?;
/// let mut listener = display.add_listener().await?;
/// while let Some(msg) = listener.recv().await {
///     println!("display said: {}", msg.kind());
/// }
/// ```
pub struct CustomerDisplayChannel {
    config: DisplayConfig,
    target_origin: String,
    spec: WindowSpec,
    surface: Arc<dyn DisplaySurface>,

    window: Option<Box<dyn PeerWindow>>,
    handshake: HandshakeState,
    ready_deadline: Option<Instant>,
    outbox: VecDeque<FlowMessage>,
    snapshot: Option<FlowSnapshot>,
    next_seq: u64,
    failures: u32,

    listeners: HashMap<ListenerId, mpsc::UnboundedSender<InboundMessage>>,
    next_listener: u64,

    inbound_tx: mpsc::UnboundedSender<RawMessage>,
    inbound_rx: mpsc::UnboundedReceiver<RawMessage>,
    commands_rx: mpsc::Receiver<Command>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl CustomerDisplayChannel {
    /// Validates `config`, spawns the actor and returns its handle.
    ///
    /// Must be called inside a Tokio runtime. The window is not opened until
    /// the first `open` or send.
    pub fn spawn(
        config: DisplayConfig,
        surface: Arc<dyn DisplaySurface>,
    ) -> DisplayResult<DisplayChannelHandle> {
        config.validate()?;
        let target_origin = config.target_origin()?;

        let (commands_tx, commands_rx) = mpsc::channel::<Command>(64);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<RawMessage>();

        let channel = CustomerDisplayChannel {
            spec: config.window_spec(),
            config,
            target_origin,
            surface,
            window: None,
            handshake: HandshakeState::Closed,
            ready_deadline: None,
            outbox: VecDeque::new(),
            snapshot: None,
            next_seq: 0,
            failures: 0,
            listeners: HashMap::new(),
            next_listener: 0,
            inbound_tx,
            inbound_rx,
            commands_rx,
            shutdown_rx,
        };

        tokio::spawn(channel.run());

        Ok(DisplayChannelHandle {
            commands: commands_tx,
            shutdown_tx,
        })
    }

    /// Main actor loop.
    async fn run(mut self) {
        info!(origin = %self.target_origin, "Customer display channel starting");

        let mut poll = tokio::time::interval(self.config.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.ready_deadline;
            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => {
                    info!("Customer display channel received shutdown signal");
                    break;
                }

                Some(raw) = self.inbound_rx.recv() => self.handle_inbound(raw),

                command = self.commands_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All display handles dropped");
                        break;
                    }
                },

                _ = poll.tick(), if self.window.is_some() => self.check_liveness(),

                _ = wait_until(deadline), if deadline.is_some() => self.on_ready_timeout(),
            }
        }

        self.close();
        info!("Customer display channel stopped");
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open(reply) => {
                let _ = reply.send(self.open_window());
            }
            Command::Close(reply) => {
                self.close();
                let _ = reply.send(());
            }
            Command::Send { message, reply } => {
                let _ = reply.send(self.send(message));
            }
            Command::StartFlow {
                flow_id,
                content,
                reply,
            } => {
                let _ = reply.send(self.start_flow(flow_id, content));
            }
            Command::UpdateFlow {
                flow_id,
                step,
                payload,
                reply,
            } => {
                let _ = reply.send(self.update_flow(flow_id, step, payload));
            }
            Command::DirectCashUpdate {
                flow_id,
                content,
                reply,
            } => {
                let mut content = content;
                prune_nulls(&mut content);
                let message =
                    FlowMessage::new(MessageType::DirectCashUpdate, content).with_flow_id(flow_id);
                let _ = reply.send(self.dispatch(message));
            }
            Command::AddListener(reply) => {
                let _ = reply.send(self.add_listener());
            }
            Command::RemoveListener { id, reply } => {
                let removed = self.listeners.remove(&id).is_some();
                debug!(listener = %id, removed, "Removing display listener");
                let _ = reply.send(removed);
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot.clone());
            }
        }
    }

    fn send(&mut self, message: FlowMessage) -> DisplayResult<u64> {
        if message.kind.is_inbound() {
            return Err(DisplayError::UnexpectedMessage {
                kind: message.kind.to_string(),
            });
        }

        if message.kind.clears_flow() {
            if let Some(snapshot) = self.snapshot.take() {
                debug!(flow_id = %snapshot.flow_id, "Clearing cached flow snapshot");
            }
        }

        if message.kind == MessageType::StartCustomerFlow {
            if let Some(flow_id) = message.flow_id.clone() {
                self.snapshot = Some(FlowSnapshot {
                    flow_id,
                    content: message.content.clone(),
                });
            }
        }

        self.dispatch(message)
    }

    fn start_flow(&mut self, flow_id: String, mut content: Content) -> DisplayResult<u64> {
        prune_nulls(&mut content);
        info!(flow_id = %flow_id, "Starting customer flow");
        self.snapshot = Some(FlowSnapshot {
            flow_id: flow_id.clone(),
            content: content.clone(),
        });
        let message = FlowMessage::new(MessageType::StartCustomerFlow, content).with_flow_id(flow_id);
        self.dispatch(message)
    }

    fn update_flow(
        &mut self,
        flow_id: String,
        step: FlowStep,
        payload: Content,
    ) -> DisplayResult<u64> {
        let snapshot = match self.snapshot.as_mut() {
            Some(snapshot) if snapshot.flow_id == flow_id => snapshot,
            _ => return Err(DisplayError::FlowNotStarted { flow_id }),
        };

        let merged = merge_flow_update(&snapshot.content, step, &payload);
        snapshot.content = merged.clone();
        debug!(flow_id = %flow_id, step = %step, "Updating customer flow");

        let message = FlowMessage::new(MessageType::UpdateCustomerFlow, merged).with_flow_id(flow_id);
        self.dispatch(message)
    }

    fn add_listener(&mut self) -> DisplayListener {
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.insert(id, tx);
        debug!(listener = %id, "Added display listener");
        DisplayListener { id, rx }
    }

    fn status(&self) -> ChannelStatus {
        ChannelStatus {
            handshake: self.handshake,
            window: self.window.as_ref().map(|w| w.id()),
            queued: self.outbox.len(),
            listeners: self.listeners.len(),
            flow_id: self.snapshot.as_ref().map(|s| s.flow_id.clone()),
            has_flow_snapshot: self.snapshot.is_some(),
            last_seq: self.next_seq,
        }
    }

    // -------------------------------------------------------------------------
    // Delivery
    // -------------------------------------------------------------------------

    /// Stamps a sequence number and delivers or queues the message.
    fn dispatch(&mut self, mut message: FlowMessage) -> DisplayResult<u64> {
        self.next_seq += 1;
        let seq = self.next_seq;
        message.seq = Some(seq);
        self.outbox.push_back(message);

        if self.window_is_dead() {
            // Reopen keeps the cached snapshot; only the poll or close() drop it.
            self.drop_window();
            self.reopen()?;
            return Ok(seq);
        }

        if self.handshake == HandshakeState::Opening {
            debug!(seq, queued = self.outbox.len(), "Display not ready, queued");
            return Ok(seq);
        }

        self.flush()?;
        Ok(seq)
    }

    /// Posts queued messages in order until the queue is empty or a post fails.
    fn flush(&mut self) -> DisplayResult<()> {
        while let Some(message) = self.outbox.pop_front() {
            let Some(window) = self.window.as_ref() else {
                self.outbox.push_front(message);
                return Ok(());
            };

            match window.post_message(&message, &self.target_origin) {
                Ok(()) => {
                    debug!(kind = %message.kind, seq = ?message.seq, "Posted to customer display");
                    self.failures = 0;
                    self.handshake = HandshakeState::Active;
                }
                Err(e) => {
                    warn!(error = %e, kind = %message.kind, "Post to customer display failed");
                    self.outbox.push_front(message);
                    self.drop_window();
                    self.note_failure(&e)?;
                    self.reopen()?;
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Opens a window, retrying failed opens up to `max_send_retries`.
    fn reopen(&mut self) -> DisplayResult<()> {
        loop {
            match self.open_window() {
                Ok(()) => return Ok(()),
                Err(e) => self.note_failure(&e)?,
            }
        }
    }

    fn note_failure(&mut self, cause: &DisplayError) -> DisplayResult<()> {
        self.failures += 1;
        let max = self.config.channel.max_send_retries;
        if self.failures > max {
            let attempts = self.failures;
            self.failures = 0;
            let dropped = self.outbox.len();
            self.outbox.clear();
            error!(attempts, dropped, cause = %cause, "Giving up on customer display");
            return Err(DisplayError::RetriesExhausted { attempts });
        }
        warn!(attempt = self.failures, max, cause = %cause, "Retrying customer display");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Window lifecycle
    // -------------------------------------------------------------------------

    fn window_is_dead(&self) -> bool {
        self.window.as_ref().map_or(true, |w| w.is_closed())
    }

    /// Idempotent: a live window is kept.
    fn open_window(&mut self) -> DisplayResult<()> {
        if !self.window_is_dead() {
            return Ok(());
        }
        self.drop_window();

        let window = self.surface.open(&self.spec, self.inbound_tx.clone())?;
        info!(window = %window.id(), url = %self.spec.url, "Customer display opened");
        self.window = Some(window);
        self.handshake = HandshakeState::Opening;
        self.ready_deadline = Some(Instant::now() + self.config.ready_timeout());
        Ok(())
    }

    /// Forgets the window handle. Queue and snapshot are kept.
    fn drop_window(&mut self) {
        if let Some(window) = self.window.take() {
            if !window.is_closed() {
                window.close();
            }
        }
        self.handshake = HandshakeState::Closed;
        self.ready_deadline = None;
    }

    fn close(&mut self) {
        if let Some(window) = self.window.as_ref() {
            info!(window = %window.id(), "Closing customer display");
        }
        self.drop_window();
        self.outbox.clear();
        self.snapshot = None;
        self.listeners.clear();
        self.failures = 0;
    }

    fn check_liveness(&mut self) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if !window.is_closed() {
            return;
        }

        warn!(window = %window.id(), "Customer display was closed externally");
        self.window = None;
        self.handshake = HandshakeState::Closed;
        self.ready_deadline = None;
        self.outbox.clear();
        self.snapshot = None;
    }

    fn on_ready_timeout(&mut self) {
        self.ready_deadline = None;
        if self.handshake != HandshakeState::Opening {
            return;
        }
        warn!(
            queued = self.outbox.len(),
            "Customer display did not report ready, sending best effort"
        );
        self.handshake = HandshakeState::Ready;
        if let Err(e) = self.flush() {
            error!(error = %e, "Best-effort flush to customer display failed");
        }
    }

    // -------------------------------------------------------------------------
    // Inbound
    // -------------------------------------------------------------------------

    fn handle_inbound(&mut self, raw: RawMessage) {
        if raw.origin != self.target_origin {
            debug!(origin = %raw.origin, "Ignoring message from unexpected origin");
            return;
        }
        match self.window.as_ref() {
            Some(window) if window.id() == raw.source => {}
            _ => {
                debug!(source = %raw.source, "Ignoring message from a window we do not own");
                return;
            }
        }

        let message = match FlowMessage::from_value(raw.data) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Rejecting malformed customer display message");
                return;
            }
        };
        let inbound = match InboundMessage::try_from(message) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, "Rejecting customer display message");
                return;
            }
        };

        if inbound == InboundMessage::DisplayReady {
            self.on_ready();
        }
        self.broadcast(inbound);
    }

    fn on_ready(&mut self) {
        info!(window = ?self.window.as_ref().map(|w| w.id()), "Customer display ready");
        self.ready_deadline = None;
        self.handshake = HandshakeState::Ready;

        // A reloaded page lost its state; replay the flow it was showing.
        if self.outbox.is_empty() {
            if let Some(snapshot) = self.snapshot.clone() {
                self.next_seq += 1;
                info!(flow_id = %snapshot.flow_id, "Replaying flow snapshot to customer display");
                self.outbox.push_back(
                    FlowMessage::new(MessageType::StartCustomerFlow, snapshot.content)
                        .with_flow_id(snapshot.flow_id)
                        .with_seq(self.next_seq),
                );
            }
        }

        if let Err(e) = self.flush() {
            error!(error = %e, "Flushing queued messages to customer display failed");
        }
    }

    fn broadcast(&mut self, message: InboundMessage) {
        self.listeners.retain(|id, tx| {
            let alive = tx.send(message.clone()).is_ok();
            if !alive {
                debug!(listener = %id, "Dropping closed display listener");
            }
            alive
        });
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

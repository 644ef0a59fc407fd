//! # Window Substrate
//!
//! The boundary between the channel and whatever actually renders the
//! customer display (a second webview, a browser popup, a test double).
//!
//! ## Substrate Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Window Substrate                                   │
//! │                                                                         │
//! │  DisplaySurface::open(spec, inbound_tx)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Box<dyn PeerWindow>                                                    │
//! │   ├── id()            identity used as the `source` of replies          │
//! │   ├── is_closed()     polled; no close event is guaranteed              │
//! │   ├── post_message()  always with an explicit target origin             │
//! │   └── close()                                                           │
//! │                                                                         │
//! │  Replies arrive on inbound_tx as RawMessage { origin, source, data }    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`InMemorySurface`] is a complete in-process substrate used by tests and
//! the simulator binary.

use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use crate::error::{DisplayError, DisplayResult};
use crate::protocol::FlowMessage;

// =============================================================================
// Substrate Types
// =============================================================================

/// Identity of one opened window instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window-{}", self.0)
    }
}

/// How to open the display window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    /// Window name/label.
    pub name: String,
    /// Page to load.
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// A message as delivered by the substrate, before any checks.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub origin: String,
    pub source: WindowId,
    pub data: Value,
}

// =============================================================================
// Traits
// =============================================================================

/// Handle to one opened display window.
pub trait PeerWindow: Send + Sync {
    fn id(&self) -> WindowId;

    /// True once the window is gone, however it went.
    fn is_closed(&self) -> bool;

    /// Fire-and-forget post. `target_origin` is never `"*"`.
    fn post_message(&self, message: &FlowMessage, target_origin: &str) -> DisplayResult<()>;

    fn close(&self);
}

/// Opens display windows.
pub trait DisplaySurface: Send + Sync {
    fn open(
        &self,
        spec: &WindowSpec,
        inbound: mpsc::UnboundedSender<RawMessage>,
    ) -> DisplayResult<Box<dyn PeerWindow>>;
}

// =============================================================================
// In-Memory Surface
// =============================================================================

#[derive(Debug)]
struct WindowRecord {
    id: WindowId,
    spec: WindowSpec,
    closed: bool,
    posted: Vec<PostedMessage>,
    inbound: mpsc::UnboundedSender<RawMessage>,
}

/// One recorded `post_message` call.
#[derive(Debug, Clone, PartialEq)]
pub struct PostedMessage {
    pub window: WindowId,
    pub target_origin: String,
    pub message: FlowMessage,
}

#[derive(Debug, Default)]
struct SurfaceState {
    next_id: u64,
    windows: Vec<WindowRecord>,
    failing_opens: u32,
    failing_posts: u32,
}

/// In-process substrate that records everything posted to it.
///
/// ## Example
/// ```rust,ignore
/// let surface = InMemorySurface::new("http://localhost:1420").with_auto_ready();
/// let handle = CustomerDisplayChannel::spawn(config, Arc::new(surface.clone()))?;
///
/// handle.show_welcome().await?;
/// assert_eq!(surface.posted().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct InMemorySurface {
    origin: String,
    auto_ready: bool,
    state: Arc<Mutex<SurfaceState>>,
}

impl InMemorySurface {
    /// `origin` is what simulated replies claim to come from.
    pub fn new(origin: impl Into<String>) -> Self {
        InMemorySurface {
            origin: origin.into(),
            auto_ready: false,
            state: Arc::new(Mutex::new(SurfaceState::default())),
        }
    }

    /// Every opened window immediately reports `CUSTOMER_DISPLAY_READY`.
    pub fn with_auto_ready(mut self) -> Self {
        self.auto_ready = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------------------------------------------------------------
    // Fault injection
    // -------------------------------------------------------------------------

    /// The next `count` opens fail.
    pub fn fail_next_opens(&self, count: u32) {
        self.lock().failing_opens = count;
    }

    /// The next `count` posts fail.
    pub fn fail_next_posts(&self, count: u32) {
        self.lock().failing_posts = count;
    }

    /// Closes a window behind the channel's back (user closed it).
    pub fn close_externally(&self, id: WindowId) {
        if let Some(window) = self.lock().windows.iter_mut().find(|w| w.id == id) {
            window.closed = true;
        }
    }

    // -------------------------------------------------------------------------
    // Simulated display replies
    // -------------------------------------------------------------------------

    /// Sends `message` as if the display page in window `id` posted it.
    pub fn peer_send(&self, id: WindowId, message: &FlowMessage) -> bool {
        match message.to_value() {
            Ok(data) => self.inject(RawMessage {
                origin: self.origin.clone(),
                source: id,
                data,
            }),
            Err(_) => false,
        }
    }

    /// Delivers an arbitrary raw message through window `raw.source`'s
    /// inbound channel, so origin and payload can be forged.
    pub fn inject(&self, raw: RawMessage) -> bool {
        let state = self.lock();
        let Some(window) = state.windows.iter().find(|w| w.id == raw.source) else {
            return false;
        };
        window.inbound.send(raw).is_ok()
    }

    /// Delivers through `via`'s inbound channel while claiming `source`.
    pub fn inject_via(&self, via: WindowId, raw: RawMessage) -> bool {
        let state = self.lock();
        match state.windows.iter().find(|w| w.id == via) {
            Some(window) => window.inbound.send(raw).is_ok(),
            None => false,
        }
    }

    /// `CUSTOMER_DISPLAY_READY` from window `id`.
    pub fn ready(&self, id: WindowId) -> bool {
        self.peer_send(id, &FlowMessage::ready())
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn open_count(&self) -> usize {
        self.lock().windows.len()
    }

    /// Most recently opened window that is still open.
    pub fn current_window(&self) -> Option<WindowId> {
        self.lock()
            .windows
            .iter()
            .rev()
            .find(|w| !w.closed)
            .map(|w| w.id)
    }

    pub fn is_closed(&self, id: WindowId) -> bool {
        self.lock()
            .windows
            .iter()
            .find(|w| w.id == id)
            .map_or(true, |w| w.closed)
    }

    pub fn spec_of(&self, id: WindowId) -> Option<WindowSpec> {
        self.lock()
            .windows
            .iter()
            .find(|w| w.id == id)
            .map(|w| w.spec.clone())
    }

    /// Every successful post across all windows, in order.
    pub fn posted(&self) -> Vec<PostedMessage> {
        let state = self.lock();
        let mut all: Vec<PostedMessage> = state
            .windows
            .iter()
            .flat_map(|w| w.posted.iter().cloned())
            .collect();
        all.sort_by_key(|p| p.message.seq);
        all
    }

    /// Successful posts to one window.
    pub fn posted_to(&self, id: WindowId) -> Vec<FlowMessage> {
        self.lock()
            .windows
            .iter()
            .find(|w| w.id == id)
            .map(|w| w.posted.iter().map(|p| p.message.clone()).collect())
            .unwrap_or_default()
    }

    /// Last successful post anywhere.
    pub fn last_posted(&self) -> Option<FlowMessage> {
        self.posted().pop().map(|p| p.message)
    }
}

impl DisplaySurface for InMemorySurface {
    fn open(
        &self,
        spec: &WindowSpec,
        inbound: mpsc::UnboundedSender<RawMessage>,
    ) -> DisplayResult<Box<dyn PeerWindow>> {
        let mut state = self.lock();
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(DisplayError::OpenFailed("popup blocked".into()));
        }

        state.next_id += 1;
        let id = WindowId(state.next_id);
        if self.auto_ready {
            if let Ok(data) = FlowMessage::ready().to_value() {
                let _ = inbound.send(RawMessage {
                    origin: self.origin.clone(),
                    source: id,
                    data,
                });
            }
        }
        state.windows.push(WindowRecord {
            id,
            spec: spec.clone(),
            closed: false,
            posted: Vec::new(),
            inbound,
        });

        Ok(Box::new(InMemoryWindow {
            id,
            state: Arc::clone(&self.state),
        }))
    }
}

struct InMemoryWindow {
    id: WindowId,
    state: Arc<Mutex<SurfaceState>>,
}

impl InMemoryWindow {
    fn lock(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PeerWindow for InMemoryWindow {
    fn id(&self) -> WindowId {
        self.id
    }

    fn is_closed(&self) -> bool {
        self.lock()
            .windows
            .iter()
            .find(|w| w.id == self.id)
            .map_or(true, |w| w.closed)
    }

    fn post_message(&self, message: &FlowMessage, target_origin: &str) -> DisplayResult<()> {
        let mut state = self.lock();
        if state.failing_posts > 0 {
            state.failing_posts -= 1;
            return Err(DisplayError::PostFailed("window detached".into()));
        }

        let id = self.id;
        let window = state
            .windows
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| DisplayError::PostFailed(format!("{id} is unknown")))?;
        if window.closed {
            return Err(DisplayError::PostFailed(format!("{id} is closed")));
        }
        window.posted.push(PostedMessage {
            window: id,
            target_origin: target_origin.to_string(),
            message: message.clone(),
        });
        Ok(())
    }

    fn close(&self) {
        let id = self.id;
        if let Some(window) = self.lock().windows.iter_mut().find(|w| w.id == id) {
            window.closed = true;
        }
    }
}

//! Handshake State Machine
//!
//! Gates inbound application dispatch behind the `initialize` request /
//! `initialized` notification exchange. Transitions are forward-only:
//! `Uninitialized → Initializing → Initialized`, never back. The client's
//! capabilities and identity are captured exactly once, at the moment the
//! `initialize` request is processed.

use std::sync::Arc;
use std::sync::OnceLock;

use parking_lot::Mutex;
use tokio::sync::watch;

use kestrel_protocol::{ClientCapabilities, Implementation, ProtocolVersion};

use crate::error::{SessionError, SessionResult};
use crate::exchange::Exchange;

/// Lifecycle state of a session's handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No `initialize` request seen yet
    Uninitialized,
    /// `initialize` processed and answered; waiting for `initialized`
    Initializing,
    /// Handshake complete; application dispatch is open
    Initialized,
}

/// What the client declared in its `initialize` request
#[derive(Debug, Clone)]
pub struct ClientHandshake {
    pub protocol_version: ProtocolVersion,
    pub capabilities: ClientCapabilities,
    pub client_info: Implementation,
}

/// The published value of the exchange gate
#[derive(Debug, Clone)]
enum ExchangeSlot {
    /// Handshake not complete yet; dispatch waits
    Pending,
    /// Handshake complete; dispatch proceeds with this exchange
    Ready(Exchange),
    /// Session shut down before (or after) completing; waiters give up
    Closed,
}

/// The handshake state machine plus the single-assignment exchange gate
pub(crate) struct Handshake {
    state: Mutex<SessionState>,
    client: OnceLock<Arc<ClientHandshake>>,
    slot: watch::Sender<ExchangeSlot>,
}

impl Handshake {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(ExchangeSlot::Pending);
        Self {
            state: Mutex::new(SessionState::Uninitialized),
            client: OnceLock::new(),
            slot,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Process the `initialize` request: capture the client's declaration
    /// and move to `Initializing`. A second `initialize` is a protocol
    /// error, never a re-run.
    pub fn begin(&self, hello: ClientHandshake) -> SessionResult<()> {
        let mut state = self.state.lock();
        if *state != SessionState::Uninitialized {
            return Err(SessionError::Handshake(format!(
                "'initialize' received in state {:?}",
                *state
            )));
        }
        let _ = self.client.set(Arc::new(hello));
        *state = SessionState::Initializing;
        Ok(())
    }

    /// Process the `initialized` notification: move to `Initialized` and
    /// publish the exchange, waking every deferred dispatch.
    pub fn complete(&self, exchange: Exchange) -> SessionResult<()> {
        let mut state = self.state.lock();
        if *state != SessionState::Initializing {
            return Err(SessionError::Handshake(format!(
                "'initialized' received in state {:?}",
                *state
            )));
        }
        *state = SessionState::Initialized;
        self.slot.send_replace(ExchangeSlot::Ready(exchange));
        Ok(())
    }

    /// The client declaration captured by `begin`, if any
    pub fn client(&self) -> Option<Arc<ClientHandshake>> {
        self.client.get().cloned()
    }

    /// Wake all gate waiters with "no exchange is coming". Idempotent; a
    /// gate already `Ready` stays ready so in-flight handlers keep their
    /// exchange.
    pub fn shutdown(&self) {
        self.slot.send_if_modified(|slot| {
            if matches!(slot, ExchangeSlot::Pending) {
                *slot = ExchangeSlot::Closed;
                true
            } else {
                false
            }
        });
    }

    /// The single-assignment future gating application dispatch: resolves
    /// with the exchange once the handshake completes, or `None` if the
    /// session shuts down first.
    pub async fn exchange(&self) -> Option<Exchange> {
        let mut rx = self.slot.subscribe();
        loop {
            match &*rx.borrow_and_update() {
                ExchangeSlot::Ready(exchange) => return Some(exchange.clone()),
                ExchangeSlot::Closed => return None,
                ExchangeSlot::Pending => {}
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }
}

//! Transport Seam
//!
//! A session owns exactly one transport. Outbound frames go through
//! [`Transport::send`]; inbound frames reach the engine as an
//! `mpsc::Receiver<JsonRpcFrame>` fed by the transport adapter (one ordered
//! stream, one subscriber). Wire framing (stdio lines, SSE events, WebSocket
//! frames) is the adapter's concern, not the engine's.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use kestrel_json_rpc::JsonRpcFrame;

/// Failures at the transport seam
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The outbound half of a session's channel to its peer.
///
/// Implementations must be safe to call from concurrent outbound callers;
/// the engine performs no locking around `send`.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one frame, resolving when the transport has accepted it.
    /// Acceptance is not delivery: a reply (if any) arrives via the inbound
    /// stream.
    async fn send(&self, frame: JsonRpcFrame) -> Result<(), TransportError>;

    /// Close immediately, dropping anything in flight
    async fn close(&self) -> Result<(), TransportError>;

    /// Close after letting buffered outbound frames flush. Defaults to an
    /// immediate close for transports without buffering.
    async fn close_gracefully(&self) -> Result<(), TransportError> {
        self.close().await
    }
}

/// In-memory transport linking two sessions through bounded channels.
///
/// Used by the test suite and by embedders that run both peers in one
/// process.
#[derive(Debug)]
pub struct DuplexTransport {
    tx: mpsc::Sender<JsonRpcFrame>,
    closed: AtomicBool,
}

impl DuplexTransport {
    /// Create a linked pair. Each side is the transport to hand to its
    /// session plus the inbound receiver carrying what the *other* side
    /// sends.
    pub fn pair(
        capacity: usize,
    ) -> (
        (Arc<DuplexTransport>, mpsc::Receiver<JsonRpcFrame>),
        (Arc<DuplexTransport>, mpsc::Receiver<JsonRpcFrame>),
    ) {
        let (tx_ab, rx_ab) = mpsc::channel(capacity);
        let (tx_ba, rx_ba) = mpsc::channel(capacity);

        let a = Arc::new(DuplexTransport {
            tx: tx_ab,
            closed: AtomicBool::new(false),
        });
        let b = Arc::new(DuplexTransport {
            tx: tx_ba,
            closed: AtomicBool::new(false),
        });

        ((a, rx_ba), (b, rx_ab))
    }
}

#[async_trait]
impl Transport for DuplexTransport {
    async fn send(&self, frame: JsonRpcFrame) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.tx
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

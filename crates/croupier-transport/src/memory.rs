//! In-process transport built on Tokio channels.
//!
//! [`link`] returns a dialer and the listener that receives the server end
//! of every dialed connection. The dialer can be scripted to refuse or
//! stall upcoming dials, which is how connect retries are exercised
//! without sockets.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::{Connection, ConnectionId, Dialer, TransportError};

static NEXT_MEMORY_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy)]
enum DialScript {
    Refuse,
    Stall,
}

/// Creates a connected dialer/listener pair.
pub fn link() -> (MemoryDialer, MemoryListener) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    let dialer = MemoryDialer {
        accept_tx,
        script: Arc::new(Mutex::new(VecDeque::new())),
    };
    (dialer, MemoryListener { accept_rx })
}

/// Creates two connected ends without going through a dialer.
pub fn pair() -> (MemoryConnection, MemoryConnection) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (MemoryConnection::new(a_tx, b_rx), MemoryConnection::new(b_tx, a_rx))
}

/// Dials in-memory connections; cheap to clone.
#[derive(Clone)]
pub struct MemoryDialer {
    accept_tx: mpsc::UnboundedSender<MemoryConnection>,
    script: Arc<Mutex<VecDeque<DialScript>>>,
}

impl MemoryDialer {
    /// The next `n` dials fail with a connection-refused error.
    pub fn refuse_next(&self, n: usize) {
        self.push_script(DialScript::Refuse, n);
    }

    /// The next `n` dials never complete.
    pub fn stall_next(&self, n: usize) {
        self.push_script(DialScript::Stall, n);
    }

    fn push_script(&self, step: DialScript, n: usize) {
        let mut script =
            self.script.lock().unwrap_or_else(PoisonError::into_inner);
        script.extend(std::iter::repeat_n(step, n));
    }

    fn next_script(&self) -> Option<DialScript> {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

impl Dialer for MemoryDialer {
    type Connection = MemoryConnection;
    type Error = TransportError;

    async fn dial(&self, url: &str) -> Result<MemoryConnection, TransportError> {
        match self.next_script() {
            Some(DialScript::Refuse) => {
                tracing::debug!(url, "memory dial refused by script");
                Err(TransportError::ConnectFailed(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "refused",
                )))
            }
            Some(DialScript::Stall) => {
                tracing::debug!(url, "memory dial stalled by script");
                std::future::pending().await
            }
            None => {
                let (client, server) = pair();
                self.accept_tx.send(server).map_err(|_| {
                    TransportError::ConnectFailed(io::Error::new(
                        io::ErrorKind::ConnectionRefused,
                        "no listener",
                    ))
                })?;
                Ok(client)
            }
        }
    }
}

/// Receives the server end of each dialed connection.
pub struct MemoryListener {
    accept_rx: mpsc::UnboundedReceiver<MemoryConnection>,
}

impl MemoryListener {
    /// Waits for the next dialed connection. `None` once every dialer
    /// clone is dropped.
    pub async fn accept(&mut self) -> Option<MemoryConnection> {
        self.accept_rx.recv().await
    }
}

/// One end of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryConnection {
    fn new(
        tx: mpsc::UnboundedSender<Vec<u8>>,
        rx: mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> Self {
        Self {
            id: ConnectionId::new(NEXT_MEMORY_ID.fetch_add(1, Ordering::Relaxed)),
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Sends a UTF-8 message; convenience for test servers.
    pub fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.push(text.as_bytes())
    }

    /// Receives the next message as a string, replacing invalid UTF-8.
    pub async fn recv_text(&self) -> Option<String> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .map(|data| String::from_utf8_lossy(&data).into_owned())
    }

    fn push(&self, data: &[u8]) -> Result<(), TransportError> {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match tx.as_ref() {
            Some(tx) => tx.send(data.to_vec()).map_err(|_| {
                TransportError::SendFailed(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "peer dropped",
                ))
            }),
            None => Err(TransportError::ConnectionClosed("closed locally".into())),
        }
    }
}

impl Connection for MemoryConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        self.push(data)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

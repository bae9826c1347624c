//! # UDP Receiver
//!
//! Listens for broadcast datagrams and renders them for display.
//!
//! ## Receive Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Receiver Loop                                  │
//! │                                                                         │
//! │   UdpSocket (bind_addr:port)                                           │
//! │        │ recv_from                                                      │
//! │        ▼                                                                │
//! │   codec::decode ──── Err ───► warn!, stats.rejected += 1,              │
//! │        │                      Rejected event, keep listening           │
//! │        │ Ok                                                             │
//! │        ├── TransactionBatch ─► one display line per transaction        │
//! │        │                      "Alice — Go Programming x2"              │
//! │        └── Heartbeat ────────► stats only                              │
//! │                                                                         │
//! │   Display keeps one line per transaction id; a rebroadcast replaces    │
//! │   its line in place. History is bounded, the oldest lines drop first.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each datagram is handled on its own. There is no reassembly, ordering
//! or acknowledgement.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec::{decode, DatagramBody, StoreIdentity};
use crate::config::{ReceiverSettings, MAX_UDP_PAYLOAD};
use crate::error::{BroadcastError, BroadcastResult, DecodeError};

const EVENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Configuration
// =============================================================================

/// Receiver settings resolved to a socket address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverConfig {
    pub bind_addr: SocketAddr,
    pub history: usize,
}

impl From<&ReceiverSettings> for ReceiverConfig {
    fn from(settings: &ReceiverSettings) -> Self {
        ReceiverConfig {
            bind_addr: settings.bind_address(),
            history: settings.history,
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self::from(&ReceiverSettings::default())
    }
}

// =============================================================================
// Events & Stats
// =============================================================================

/// Notification emitted for each received datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverEvent {
    /// A transaction batch, rendered one line per transaction.
    Received {
        from: SocketAddr,
        sequence: u64,
        lines: Vec<String>,
        /// Lines of transactions not seen before.
        new_lines: Vec<String>,
    },
    /// A heartbeat from a store with no transactions.
    Heartbeat {
        from: SocketAddr,
        sequence: u64,
        store: StoreIdentity,
    },
    /// A datagram that failed to decode.
    Rejected { from: SocketAddr, error: DecodeError },
}

/// Counters since the receiver started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub datagrams: u64,
    pub transactions: u64,
    pub heartbeats: u64,
    pub rejected: u64,
    pub last_sequence: Option<u64>,
}

// =============================================================================
// Shared State
// =============================================================================

/// Rendered line for one transaction.
struct DisplayLine {
    transaction_id: String,
    text: String,
}

#[derive(Default)]
struct DisplayState {
    lines: VecDeque<DisplayLine>,
    stats: ReceiverStats,
}

impl DisplayState {
    /// Replaces the line of a known transaction, or appends a new one and
    /// evicts the oldest past `history`. Returns true for a new transaction.
    fn upsert(&mut self, transaction_id: &str, text: String, history: usize) -> bool {
        if let Some(line) = self
            .lines
            .iter_mut()
            .find(|l| l.transaction_id == transaction_id)
        {
            line.text = text;
            return false;
        }

        if self.lines.len() == history {
            self.lines.pop_front();
        }
        self.lines.push_back(DisplayLine {
            transaction_id: transaction_id.to_string(),
            text,
        });
        true
    }

    fn texts(&self) -> Vec<String> {
        self.lines.iter().map(|l| l.text.clone()).collect()
    }
}

struct Shared {
    history: usize,
    display: Mutex<DisplayState>,
    events: broadcast::Sender<ReceiverEvent>,
}

impl Shared {
    fn new(history: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Shared {
            history,
            display: Mutex::new(DisplayState::default()),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, DisplayState> {
        self.display.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decodes and records one datagram.
    fn handle_datagram(&self, data: &[u8], from: SocketAddr) {
        let event = match decode(data) {
            Ok(datagram) => {
                let mut display = self.lock();
                display.stats.datagrams += 1;
                display.stats.last_sequence = Some(datagram.sequence);

                match datagram.body {
                    DatagramBody::TransactionBatch(batch) => {
                        let mut lines = Vec::with_capacity(batch.transactions.len());
                        let mut new_lines = Vec::new();
                        for record in &batch.transactions {
                            let text = record.to_string();
                            if display.upsert(&record.transaction_id, text.clone(), self.history) {
                                new_lines.push(text.clone());
                            }
                            lines.push(text);
                        }
                        display.stats.transactions += lines.len() as u64;
                        debug!(
                            %from,
                            sequence = datagram.sequence,
                            store_id = %batch.store.store_id,
                            transactions = lines.len(),
                            new = new_lines.len(),
                            "Received transaction batch"
                        );
                        ReceiverEvent::Received {
                            from,
                            sequence: datagram.sequence,
                            lines,
                            new_lines,
                        }
                    }
                    DatagramBody::Heartbeat(heartbeat) => {
                        display.stats.heartbeats += 1;
                        debug!(%from, store_id = %heartbeat.store.store_id, "Received heartbeat");
                        ReceiverEvent::Heartbeat {
                            from,
                            sequence: datagram.sequence,
                            store: heartbeat.store,
                        }
                    }
                }
            }
            Err(error) => {
                self.lock().stats.rejected += 1;
                warn!(%from, %error, len = data.len(), "Dropping undecodable datagram");
                ReceiverEvent::Rejected { from, error }
            }
        };

        let _ = self.events.send(event);
    }
}

// =============================================================================
// Receiver
// =============================================================================

/// UDP listener for transaction broadcasts.
pub struct UdpReceiver {
    config: ReceiverConfig,
}

impl UdpReceiver {
    pub fn new(config: ReceiverConfig) -> Self {
        UdpReceiver { config }
    }

    /// Binds the socket and starts listening in the background.
    pub async fn start(self) -> BroadcastResult<ReceiverHandle> {
        if self.config.history == 0 {
            return Err(BroadcastError::InvalidConfig(
                "receiver history must be greater than 0".into(),
            ));
        }

        let bind_addr = self.config.bind_addr;
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| BroadcastError::Bind {
                addr: bind_addr,
                reason: e.to_string(),
            })?;
        socket.set_broadcast(true).map_err(|e| BroadcastError::Bind {
            addr: bind_addr,
            reason: format!("Failed to enable broadcast: {}", e),
        })?;
        let local_addr = socket.local_addr().map_err(|e| BroadcastError::Bind {
            addr: bind_addr,
            reason: e.to_string(),
        })?;

        info!(%local_addr, "Receiver listening");

        let shared = Arc::new(Shared::new(self.config.history));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let listener_shared = shared.clone();
        let task = tokio::spawn(async move {
            run_listener(socket, listener_shared, shutdown_rx).await;
        });

        Ok(ReceiverHandle {
            local_addr,
            shared,
            shutdown_tx,
            task: Some(task),
        })
    }
}

async fn run_listener(
    socket: UdpSocket,
    shared: Arc<Shared>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut buf = vec![0u8; MAX_UDP_PAYLOAD];

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Receiver shutting down");
                break;
            }
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, from)) => shared.handle_datagram(&buf[..len], from),
                    Err(e) => warn!(?e, "Error receiving datagram"),
                }
            }
        }
    }
}

/// Handle for a running receiver.
pub struct ReceiverHandle {
    local_addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown_tx: mpsc::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl ReceiverHandle {
    /// Address the socket is bound to (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// One rendered line per received transaction, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.shared.lock().texts()
    }

    pub fn stats(&self) -> ReceiverStats {
        self.shared.lock().stats
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReceiverEvent> {
        self.shared.events.subscribe()
    }

    /// Stops listening. The socket is closed when this returns.
    pub async fn stop(mut self) -> BroadcastResult<()> {
        let _ = self.shutdown_tx.send(()).await;
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| BroadcastError::ChannelError(format!("Receiver task failed: {}", e)))?;
        }
        Ok(())
    }
}

impl Drop for ReceiverHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use store_core::{ItemType, StoreRegistries};

    use crate::broadcaster::{UdpBroadcaster, UdpSocketBinder};
    use crate::codec::SnapshotEncoder;
    use crate::config::BroadcastSettings;

    fn loopback_config(history: usize) -> ReceiverConfig {
        ReceiverConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            history,
        }
    }

    fn identity() -> StoreIdentity {
        StoreIdentity {
            store_id: "store-001".into(),
            store_name: "Main Street Books".into(),
        }
    }

    async fn next_event(rx: &mut broadcast::Receiver<ReceiverEvent>) -> ReceiverEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for receiver event")
            .expect("event channel closed")
    }

    fn alice_sale() -> Arc<StoreRegistries> {
        let store = Arc::new(StoreRegistries::new());
        let alice = store.customers().add_customer("Alice").unwrap();
        let book = store
            .items()
            .add_item("Go Programming", ItemType::Book)
            .unwrap();
        store
            .create_transaction(&alice.id, &[(book.id.as_str(), 2)])
            .unwrap();
        store
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_truncated_datagram_rejected_and_loop_continues() {
        let handle = UdpReceiver::new(loopback_config(10)).start().await.unwrap();
        let mut rx = handle.subscribe();

        let store = alice_sale();
        let encoder = SnapshotEncoder::new(store.clone(), identity(), 8192);
        let tx = store.transactions().transactions().remove(0);
        let good = encoder.encode_transaction(&tx, 1).unwrap();

        let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        sender
            .send_to(&good[..good.len() - 4], handle.local_addr())
            .unwrap();

        match next_event(&mut rx).await {
            ReceiverEvent::Rejected { error, .. } => {
                assert!(matches!(error, DecodeError::Truncated { .. }));
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        sender.send_to(&good, handle.local_addr()).unwrap();
        match next_event(&mut rx).await {
            ReceiverEvent::Received { sequence, lines, .. } => {
                assert_eq!(sequence, 1);
                assert_eq!(lines, vec!["Alice — Go Programming x2".to_string()]);
            }
            other => panic!("expected batch, got {:?}", other),
        }

        let stats = handle.stats();
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.datagrams, 1);
        assert_eq!(stats.transactions, 1);

        handle.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_broadcast_reaches_receiver_within_one_interval() {
        let handle = UdpReceiver::new(loopback_config(10)).start().await.unwrap();
        let mut rx = handle.subscribe();

        let interval_ms = 200;
        let settings = BroadcastSettings {
            address: Ipv4Addr::LOCALHOST,
            port: handle.local_addr().port(),
            bind_addr: Ipv4Addr::LOCALHOST,
            interval_ms,
            max_datagram_bytes: 8192,
        };
        let broadcaster = UdpBroadcaster::new(
            settings,
            SnapshotEncoder::new(alice_sale(), identity(), 8192),
            Arc::new(UdpSocketBinder),
            tokio::runtime::Handle::current(),
        );
        broadcaster.start_broadcasting().unwrap();

        let event = tokio::time::timeout(Duration::from_millis(interval_ms), rx.recv())
            .await
            .expect("nothing received within one interval")
            .unwrap();
        match event {
            ReceiverEvent::Received { lines, .. } => {
                assert_eq!(lines, vec!["Alice — Go Programming x2".to_string()]);
            }
            other => panic!("expected batch, got {:?}", other),
        }
        assert_eq!(handle.lines(), vec!["Alice — Go Programming x2".to_string()]);

        broadcaster.stop_broadcasting();
        handle.stop().await.unwrap();
    }

    #[test]
    fn test_history_is_bounded() {
        let shared = Shared::new(3);
        let store = Arc::new(StoreRegistries::new());
        let alice = store.customers().add_customer("Alice").unwrap();
        let book = store.items().add_item("Go Programming", ItemType::Book).unwrap();
        let encoder = SnapshotEncoder::new(store.clone(), identity(), 8192);
        let from: SocketAddr = "127.0.0.1:9".parse().unwrap();

        for qty in 1..=5 {
            let tx = store
                .create_transaction(&alice.id, &[(book.id.as_str(), qty)])
                .unwrap();
            shared.handle_datagram(&encoder.encode_transaction(&tx, qty as u64).unwrap(), from);
        }

        let display = shared.lock();
        assert_eq!(
            display.texts(),
            vec![
                "Alice — Go Programming x3",
                "Alice — Go Programming x4",
                "Alice — Go Programming x5",
            ]
        );
        assert_eq!(display.stats.transactions, 5);
        assert_eq!(display.stats.last_sequence, Some(5));
    }

    #[test]
    fn test_rebroadcast_replaces_lines() {
        let shared = Shared::new(10);
        let store = alice_sale();
        let encoder = SnapshotEncoder::new(store.clone(), identity(), 8192);
        let from: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let mut rx = shared.events.subscribe();

        let first = encoder.encode_snapshot(0).unwrap().remove(0);
        shared.handle_datagram(&first.bytes, from);
        shared.handle_datagram(&encoder.encode_snapshot(1).unwrap().remove(0).bytes, from);

        let alice = store.customers().find_by_name("Alice").unwrap();
        let wired = store.items().add_item("Wired", ItemType::Magazine).unwrap();
        store
            .create_transaction(&alice.id, &[(wired.id.as_str(), 1)])
            .unwrap();
        shared.handle_datagram(&encoder.encode_snapshot(2).unwrap().remove(0).bytes, from);

        assert_eq!(
            shared.lock().texts(),
            vec!["Alice — Go Programming x2", "Alice — Wired x1"]
        );

        let new_lines: Vec<Vec<String>> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|event| match event {
                ReceiverEvent::Received { new_lines, .. } => new_lines,
                other => panic!("expected batch, got {:?}", other),
            })
            .collect();
        assert_eq!(
            new_lines,
            vec![
                vec!["Alice — Go Programming x2".to_string()],
                vec![],
                vec!["Alice — Wired x1".to_string()],
            ]
        );
        assert_eq!(shared.lock().stats.transactions, 4);
    }

    #[test]
    fn test_heartbeat_and_garbage_update_stats() {
        let shared = Shared::new(10);
        let encoder = SnapshotEncoder::new(Arc::new(StoreRegistries::new()), identity(), 8192);
        let from: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let mut rx = shared.events.subscribe();

        let heartbeat = encoder.encode_snapshot(0).unwrap().remove(0);
        shared.handle_datagram(&heartbeat.bytes, from);
        shared.handle_datagram(b"hello", from);

        assert!(matches!(
            rx.try_recv().unwrap(),
            ReceiverEvent::Heartbeat { sequence: 0, .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ReceiverEvent::Rejected {
                error: DecodeError::TooShort { len: 5, .. },
                ..
            }
        ));

        let display = shared.lock();
        assert_eq!(display.stats.heartbeats, 1);
        assert_eq!(display.stats.rejected, 1);
        assert!(display.lines.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_releases_socket() {
        let handle = UdpReceiver::new(loopback_config(10)).start().await.unwrap();
        let addr = handle.local_addr();
        handle.stop().await.unwrap();

        let rebound = UdpReceiver::new(ReceiverConfig {
            bind_addr: addr,
            history: 10,
        })
        .start()
        .await
        .unwrap();
        assert_eq!(rebound.local_addr(), addr);
        rebound.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_history_rejected() {
        let result = UdpReceiver::new(loopback_config(0)).start().await;
        assert!(matches!(result, Err(BroadcastError::InvalidConfig(_))));
    }
}

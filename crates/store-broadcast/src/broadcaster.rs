//! # UDP Broadcaster
//!
//! Periodically pushes the current transaction snapshot to a broadcast
//! address.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Broadcaster State Machine                          │
//! │                                                                         │
//! │               start_broadcasting()                                      │
//! │   ┌────────┐  bind ok, spawn cycle  ┌──────────────┐                    │
//! │   │  Idle  │ ─────────────────────► │ Broadcasting │ ──┐ start again:  │
//! │   │        │ ◄───────────────────── │              │ ◄─┘ no-op         │
//! │   └────────┘  stop_broadcasting()   └──────────────┘                    │
//! │      │  ▲     drop socket, abort      │        ▲                        │
//! │      └──┘                             └────────┘                        │
//! │   stop: no-op          send error: Failed event, retry next tick        │
//! │   bind error: Failed,                                                   │
//! │   stays Idle                                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cycle
//! Every `interval_ms` (first tick immediate) the cycle task locks the
//! broadcaster state, checks it is still the live generation, encodes the
//! snapshot and sends each datagram on the non-blocking socket. Stop takes
//! the same lock, so once `stop_broadcasting` returns no further datagram
//! leaves and no further `Sent` event fires.
//!
//! ## Events
//! Delivered through a `tokio::sync::broadcast` channel. `Sent` means the
//! local socket accepted the bytes; nothing is known about delivery.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::codec::{DatagramKind, SnapshotEncoder};
use crate::config::BroadcastSettings;
use crate::error::{BroadcastError, BroadcastResult, EncodingError};

/// Capacity of the event channel. Slow subscribers lag, senders never block.
const EVENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Socket Seam
// =============================================================================

/// A bound datagram socket the broadcaster sends on.
///
/// Calls must not block; the broadcaster sends while holding its state lock.
pub trait DatagramSocket: Send + Sync {
    fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Opens sockets for the broadcaster.
pub trait SocketBinder: Send + Sync {
    fn bind(&self, addr: SocketAddr) -> io::Result<Box<dyn DatagramSocket>>;
}

/// Binds tokio UDP sockets with broadcast enabled.
///
/// Must be called inside a runtime context; the socket registers with that
/// runtime's reactor.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpSocketBinder;

impl SocketBinder for UdpSocketBinder {
    fn bind(&self, addr: SocketAddr) -> io::Result<Box<dyn DatagramSocket>> {
        let std_socket = std::net::UdpSocket::bind(addr)?;
        std_socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(std_socket)?;
        socket.set_broadcast(true)?;
        Ok(Box::new(socket))
    }
}

impl DatagramSocket for UdpSocket {
    fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.try_send_to(buf, target)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

// =============================================================================
// State & Events
// =============================================================================

/// Whether the broadcaster is currently sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BroadcastState {
    #[default]
    Idle,
    Broadcasting,
}

impl fmt::Display for BroadcastState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BroadcastState::Idle => write!(f, "idle"),
            BroadcastState::Broadcasting => write!(f, "broadcasting"),
        }
    }
}

/// Describes one datagram the socket accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastDescriptor {
    pub sequence: u64,
    pub kind: DatagramKind,
    pub transactions: usize,
    pub bytes: usize,
    pub target: SocketAddr,
}

/// Why a cycle (or a start) failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastFailure {
    /// The snapshot could not be encoded; nothing was sent this cycle.
    Encoding(EncodingError),
    /// The socket could not be opened or refused a datagram.
    Socket { addr: SocketAddr, reason: String },
}

impl fmt::Display for BroadcastFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BroadcastFailure::Encoding(e) => write!(f, "encoding: {}", e),
            BroadcastFailure::Socket { addr, reason } => write!(f, "socket {}: {}", addr, reason),
        }
    }
}

/// Notification emitted by the broadcaster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastEvent {
    Started { target: SocketAddr },
    Sent(BroadcastDescriptor),
    Failed(BroadcastFailure),
    Stopped,
}

impl fmt::Display for BroadcastEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BroadcastEvent::Started { target } => write!(f, "Broadcasting to {}", target),
            BroadcastEvent::Sent(d) if d.kind == DatagramKind::Heartbeat => {
                write!(f, "Heartbeat sent to {} (seq {})", d.target, d.sequence)
            }
            BroadcastEvent::Sent(d) => write!(
                f,
                "Sent {} transaction(s), {} bytes to {} (seq {})",
                d.transactions, d.bytes, d.target, d.sequence
            ),
            BroadcastEvent::Failed(reason) => write!(f, "Broadcast failed: {}", reason),
            BroadcastEvent::Stopped => write!(f, "Broadcast stopped"),
        }
    }
}

// =============================================================================
// Broadcaster
// =============================================================================

#[derive(Default)]
struct Inner {
    state: BroadcastState,
    socket: Option<Box<dyn DatagramSocket>>,
    /// Bumped on every start and stop; a cycle task only runs while its
    /// generation is current.
    generation: u64,
    task: Option<JoinHandle<()>>,
    next_sequence: u64,
    datagrams_sent: u64,
}

struct Shared {
    settings: BroadcastSettings,
    encoder: SnapshotEncoder,
    binder: Arc<dyn SocketBinder>,
    inner: Mutex<Inner>,
    events: broadcast::Sender<BroadcastEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: BroadcastEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Runs one cycle. Returns false when the task should exit.
    fn run_cycle(&self, generation: u64) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if inner.state != BroadcastState::Broadcasting || inner.generation != generation {
            return false;
        }
        let Some(socket) = inner.socket.as_ref() else {
            return false;
        };

        let datagrams = match self.encoder.encode_snapshot(inner.next_sequence) {
            Ok(datagrams) => datagrams,
            Err(e) => {
                warn!(error = %e, "Skipping broadcast cycle: snapshot could not be encoded");
                self.emit(BroadcastEvent::Failed(BroadcastFailure::Encoding(e)));
                return true;
            }
        };
        inner.next_sequence += datagrams.len() as u64;

        let target = self.settings.target();
        for datagram in datagrams {
            match socket.send_to(&datagram.bytes, target) {
                Ok(bytes) => {
                    inner.datagrams_sent += 1;
                    let descriptor = BroadcastDescriptor {
                        sequence: datagram.sequence,
                        kind: datagram.kind,
                        transactions: datagram.transactions,
                        bytes,
                        target,
                    };
                    debug!(
                        sequence = descriptor.sequence,
                        kind = %descriptor.kind,
                        transactions = descriptor.transactions,
                        bytes,
                        "Datagram sent"
                    );
                    self.emit(BroadcastEvent::Sent(descriptor));
                }
                Err(e) => {
                    warn!(?e, destination = %target, "Broadcast send failed, retrying next cycle");
                    self.emit(BroadcastEvent::Failed(BroadcastFailure::Socket {
                        addr: target,
                        reason: e.to_string(),
                    }));
                    break;
                }
            }
        }

        true
    }
}

async fn run_cycles(shared: Arc<Shared>, generation: u64) {
    let mut ticker = interval(shared.settings.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !shared.run_cycle(generation) {
            debug!(generation, "Broadcast cycle task exiting");
            break;
        }
    }
}

/// Sends the transaction snapshot over UDP on a fixed interval.
///
/// All public methods are synchronous and return quickly, so they can be
/// called from the control thread. The cycle runs on the given runtime.
pub struct UdpBroadcaster {
    shared: Arc<Shared>,
    runtime: Handle,
}

impl UdpBroadcaster {
    pub fn new(
        settings: BroadcastSettings,
        encoder: SnapshotEncoder,
        binder: Arc<dyn SocketBinder>,
        runtime: Handle,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        UdpBroadcaster {
            shared: Arc::new(Shared {
                settings,
                encoder,
                binder,
                inner: Mutex::new(Inner::default()),
                events,
            }),
            runtime,
        }
    }

    /// Starts the periodic broadcast.
    ///
    /// Does nothing when already broadcasting. On bind failure the state
    /// stays `Idle`, a `Failed` event is emitted and the error returned.
    pub fn start_broadcasting(&self) -> BroadcastResult<()> {
        let shared = &self.shared;
        let mut inner = shared.lock();

        if inner.state == BroadcastState::Broadcasting {
            debug!("Broadcast already running, ignoring start");
            return Ok(());
        }

        let bind_addr = shared.settings.bind_address();
        let _runtime = self.runtime.enter();
        let socket = match shared.binder.bind(bind_addr) {
            Ok(socket) => socket,
            Err(e) => {
                warn!(?e, %bind_addr, "Failed to open broadcast socket");
                shared.emit(BroadcastEvent::Failed(BroadcastFailure::Socket {
                    addr: bind_addr,
                    reason: e.to_string(),
                }));
                return Err(BroadcastError::Bind {
                    addr: bind_addr,
                    reason: e.to_string(),
                });
            }
        };

        let target = shared.settings.target();
        inner.socket = Some(socket);
        inner.state = BroadcastState::Broadcasting;
        inner.generation += 1;

        let generation = inner.generation;
        inner.task = Some(self.runtime.spawn(run_cycles(shared.clone(), generation)));

        info!(
            destination = %target,
            interval_ms = shared.settings.interval_ms,
            "Broadcast started"
        );
        shared.emit(BroadcastEvent::Started { target });

        Ok(())
    }

    /// Stops the broadcast and releases the socket. Does nothing when idle.
    pub fn stop_broadcasting(&self) {
        let shared = &self.shared;
        let mut inner = shared.lock();

        if inner.state == BroadcastState::Idle {
            debug!("Broadcast not running, ignoring stop");
            return;
        }

        inner.state = BroadcastState::Idle;
        inner.socket = None;
        inner.generation += 1;
        if let Some(task) = inner.task.take() {
            task.abort();
        }

        info!(datagrams_sent = inner.datagrams_sent, "Broadcast stopped");
        shared.emit(BroadcastEvent::Stopped);
    }

    pub fn state(&self) -> BroadcastState {
        self.shared.lock().state
    }

    pub fn is_broadcasting(&self) -> bool {
        self.state() == BroadcastState::Broadcasting
    }

    /// Destination of every datagram.
    pub fn target(&self) -> SocketAddr {
        self.shared.settings.target()
    }

    /// Address of the open socket, if broadcasting.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared
            .lock()
            .socket
            .as_ref()
            .and_then(|s| s.local_addr().ok())
    }

    /// Datagrams accepted by the socket since creation.
    pub fn datagrams_sent(&self) -> u64 {
        self.shared.lock().datagrams_sent
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.shared.events.subscribe()
    }
}

impl Drop for UdpBroadcaster {
    fn drop(&mut self) {
        self.stop_broadcasting();
    }
}

//! # Broadcast Controller
//!
//! Owns the broadcaster on behalf of the control thread.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Controller State Machine                            │
//! │                                                                         │
//! │  ┌───────────────┐  start / restore   ┌─────────────────────────────┐  │
//! │  │ NoBroadcaster │ ─────────────────► │ HasBroadcaster              │  │
//! │  └───────────────┘  (create once)     │   ┌──────┐ start ┌───────┐  │  │
//! │         ▲                             │   │ Idle │ ────► │ Bcast │  │  │
//! │         │                             │   │      │ ◄──── │       │  │  │
//! │         │          shutdown()         │   └──────┘ stop  └───────┘  │  │
//! │         └──────────────────────────── └─────────────────────────────┘  │
//! │                                                                         │
//! │  Controls:  start enabled  ⇔ not broadcasting                          │
//! │             stop enabled   ⇔ broadcasting                              │
//! │             create transaction enabled ⇔ customers and items exist     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The existence check only decides when the broadcaster is created.
//! Whether a start actually starts anything is decided by the broadcaster's
//! own state.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use store_core::StoreRegistries;

use crate::broadcaster::{
    BroadcastEvent, BroadcastState, SocketBinder, UdpBroadcaster, UdpSocketBinder,
};
use crate::codec::{SnapshotEncoder, StoreIdentity};
use crate::config::BroadcastConfig;
use crate::error::BroadcastResult;

// =============================================================================
// Controller State
// =============================================================================

/// What the controller currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    NoBroadcaster,
    Idle,
    Broadcasting,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::NoBroadcaster => write!(f, "no broadcaster"),
            ControllerState::Idle => write!(f, "idle"),
            ControllerState::Broadcasting => write!(f, "broadcasting"),
        }
    }
}

/// Which operator actions are currently enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    pub start_enabled: bool,
    pub stop_enabled: bool,
    pub create_transaction_enabled: bool,
}

// =============================================================================
// Controller
// =============================================================================

/// Creates the broadcaster lazily and exposes start/stop to the operator.
pub struct BroadcastController {
    config: BroadcastConfig,
    registries: Arc<StoreRegistries>,
    binder: Arc<dyn SocketBinder>,
    runtime: Handle,
    broadcaster: Option<UdpBroadcaster>,
    monitor: Option<JoinHandle<()>>,
    status: Arc<Mutex<String>>,
}

impl BroadcastController {
    /// Creates a controller that binds real UDP sockets.
    pub fn new(config: BroadcastConfig, registries: Arc<StoreRegistries>, runtime: Handle) -> Self {
        Self::with_binder(config, registries, Arc::new(UdpSocketBinder), runtime)
    }

    /// Creates a controller with a custom socket binder.
    pub fn with_binder(
        config: BroadcastConfig,
        registries: Arc<StoreRegistries>,
        binder: Arc<dyn SocketBinder>,
        runtime: Handle,
    ) -> Self {
        BroadcastController {
            config,
            registries,
            binder,
            runtime,
            broadcaster: None,
            monitor: None,
            status: Arc::new(Mutex::new("Ready".to_string())),
        }
    }

    /// Starts broadcasting, creating the broadcaster on first use.
    pub fn start_broadcasting(&mut self) -> BroadcastResult<()> {
        let broadcaster = self.ensure_broadcaster();
        let result = broadcaster.start_broadcasting();
        let line = match &result {
            Ok(()) => format!("Broadcasting to {}", broadcaster.target()),
            Err(e) => format!("Broadcast failed: {}", e),
        };
        self.set_status(line);
        result
    }

    /// Stops broadcasting. Does nothing before the broadcaster exists.
    pub fn stop_broadcasting(&mut self) {
        match &self.broadcaster {
            Some(broadcaster) => {
                broadcaster.stop_broadcasting();
                self.set_status("Broadcast stopped".to_string());
            }
            None => debug!("No broadcaster yet, ignoring stop"),
        }
    }

    /// Restores the item list from backup and makes sure a broadcaster
    /// exists. Items still referenced by a transaction are kept. Returns the
    /// resulting item count.
    pub fn restore_items(&mut self) -> BroadcastResult<usize> {
        let count = self.registries.restore_items()?;
        info!(count, "Items restored from backup");
        self.ensure_broadcaster();
        self.set_status(format!("Restored {} items from backup", count));
        Ok(count)
    }

    pub fn state(&self) -> ControllerState {
        match &self.broadcaster {
            None => ControllerState::NoBroadcaster,
            Some(b) => match b.state() {
                BroadcastState::Idle => ControllerState::Idle,
                BroadcastState::Broadcasting => ControllerState::Broadcasting,
            },
        }
    }

    pub fn controls(&self) -> ControlState {
        let broadcasting = self.state() == ControllerState::Broadcasting;
        ControlState {
            start_enabled: !broadcasting,
            stop_enabled: broadcasting,
            create_transaction_enabled: self.registries.can_create_transaction(),
        }
    }

    /// Last status message, as a status bar would show it.
    pub fn status_line(&self) -> String {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Event stream of the broadcaster, once it exists.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<BroadcastEvent>> {
        self.broadcaster.as_ref().map(|b| b.subscribe())
    }

    pub fn broadcaster(&self) -> Option<&UdpBroadcaster> {
        self.broadcaster.as_ref()
    }

    pub fn registries(&self) -> &Arc<StoreRegistries> {
        &self.registries
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    /// Stops and destroys the broadcaster. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(broadcaster) = self.broadcaster.take() {
            broadcaster.stop_broadcasting();
            info!(
                datagrams_sent = broadcaster.datagrams_sent(),
                "Broadcaster shut down"
            );
        }
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
    }

    fn ensure_broadcaster(&mut self) -> &UdpBroadcaster {
        let BroadcastController {
            config,
            registries,
            binder,
            runtime,
            broadcaster,
            monitor,
            status,
        } = self;

        broadcaster.get_or_insert_with(|| {
            let encoder = SnapshotEncoder::new(
                registries.clone(),
                StoreIdentity::from(&config.store),
                config.broadcast.max_datagram_bytes,
            );
            let broadcaster = UdpBroadcaster::new(
                config.broadcast.clone(),
                encoder,
                binder.clone(),
                runtime.clone(),
            );

            let events = broadcaster.subscribe();
            *monitor = Some(runtime.spawn(monitor_events(events, status.clone())));

            info!(destination = %broadcaster.target(), "Broadcaster created");
            broadcaster
        })
    }

    fn set_status(&self, line: String) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = line;
    }
}

impl Drop for BroadcastController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Logs broadcaster events and keeps the status line current.
async fn monitor_events(
    mut events: broadcast::Receiver<BroadcastEvent>,
    status: Arc<Mutex<String>>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                match &event {
                    BroadcastEvent::Sent(d) => debug!(
                        sequence = d.sequence,
                        transactions = d.transactions,
                        bytes = d.bytes,
                        "Broadcast sent"
                    ),
                    BroadcastEvent::Failed(reason) => warn!(%reason, "Broadcast cycle failed"),
                    BroadcastEvent::Started { target } => {
                        info!(destination = %target, "Broadcast started")
                    }
                    BroadcastEvent::Stopped => info!("Broadcast stopped"),
                }
                *status.lock().unwrap_or_else(PoisonError::into_inner) = event.to_string();
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Status monitor lagging behind broadcast events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

//! # Console State
//!
//! Everything the command loop owns between commands.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          AppState                                       │
//! │                                                                         │
//! │  ┌──────────────────┐  ┌──────────────────────┐  ┌──────────────────┐  │
//! │  │ StoreRegistries  │  │ BroadcastController  │  │ ReceiverHandle   │  │
//! │  │ (Arc, shared     │◄─│ lazy broadcaster     │  │ Option, opened   │  │
//! │  │  with encoder)   │  │ start/stop/restore   │  │ at most once     │  │
//! │  └──────────────────┘  └──────────────────────┘  └──────────────────┘  │
//! │                                                                         │
//! │  RegistryActivity observes all three registries: it logs every change  │
//! │  and keeps the latest one for `status`.                                │
//! │                                                                         │
//! │  Only the command loop touches AppState, so no locking here. The       │
//! │  broadcaster and receiver tasks synchronise internally.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use store_broadcast::{
    BroadcastConfig, BroadcastController, ReceiverConfig, ReceiverHandle, SnapshotEncoder,
    SocketBinder, StoreIdentity, UdpReceiver, UdpSocketBinder,
};
use store_core::{RegistryEvent, RegistryObserver, StoreRegistries};
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::error::AppResult;

// =============================================================================
// Registry Activity
// =============================================================================

/// Logs registry changes and remembers the latest one.
#[derive(Default)]
pub struct RegistryActivity {
    last: Mutex<Option<(u64, String)>>,
}

impl RegistryActivity {
    /// Number of changes seen and a description of the latest.
    pub fn last_change(&self) -> Option<(u64, String)> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RegistryObserver for RegistryActivity {
    fn on_registry_event(&self, event: &RegistryEvent) {
        let text = match event {
            RegistryEvent::CustomerAdded(customer) => {
                info!(customer_id = %customer.id, name = %customer.name, "Customer registered");
                format!("customer {} registered", customer.name)
            }
            RegistryEvent::ItemAdded(item) => {
                info!(
                    item_id = %item.id,
                    name = %item.name,
                    item_type = %item.item_type,
                    "Item registered"
                );
                format!("{} {} registered", item.item_type, item.name)
            }
            RegistryEvent::ItemsRestored { count } => {
                info!(count, "Item list restored");
                format!("{} item(s) restored", count)
            }
            RegistryEvent::TransactionAdded(tx) => {
                info!(
                    transaction_id = %tx.id,
                    customer_id = %tx.customer_id,
                    lines = tx.lines.len(),
                    "Transaction registered"
                );
                format!("transaction {} registered", tx.id)
            }
        };

        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let seen = last.as_ref().map_or(0, |(n, _)| *n);
        *last = Some((seen + 1, text));
    }
}

// =============================================================================
// App State
// =============================================================================

/// State held by the console for its whole lifetime.
pub struct AppState {
    controller: BroadcastController,
    activity: Arc<RegistryActivity>,
    encoder: SnapshotEncoder,
    receiver_config: ReceiverConfig,
    receiver: Option<ReceiverHandle>,
}

impl AppState {
    pub fn new(config: BroadcastConfig, runtime: Handle) -> Self {
        Self::with_binder(config, Arc::new(UdpSocketBinder), runtime)
    }

    /// Builds state with a custom socket binder for the broadcaster.
    pub fn with_binder(
        config: BroadcastConfig,
        binder: Arc<dyn SocketBinder>,
        runtime: Handle,
    ) -> Self {
        let registries = Arc::new(StoreRegistries::new());
        let activity = Arc::new(RegistryActivity::default());
        registries.subscribe_all(activity.clone());

        let encoder = SnapshotEncoder::new(
            registries.clone(),
            StoreIdentity::from(&config.store),
            config.broadcast.max_datagram_bytes,
        );
        let receiver_config = ReceiverConfig::from(&config.receiver);
        let controller =
            BroadcastController::with_binder(config, registries, binder, runtime);

        AppState {
            controller,
            activity,
            encoder,
            receiver_config,
            receiver: None,
        }
    }

    pub fn registries(&self) -> &StoreRegistries {
        self.controller.registries()
    }

    pub fn activity(&self) -> &RegistryActivity {
        &self.activity
    }

    pub fn controller(&self) -> &BroadcastController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut BroadcastController {
        &mut self.controller
    }

    /// Encoder used to render local transactions the same way receivers do.
    pub fn encoder(&self) -> &SnapshotEncoder {
        &self.encoder
    }

    pub fn receiver(&self) -> Option<&ReceiverHandle> {
        self.receiver.as_ref()
    }

    /// Opens the in-process receiver on first call.
    ///
    /// Returns the bound address and whether this call created it.
    pub async fn open_receiver(&mut self) -> AppResult<(SocketAddr, bool)> {
        if let Some(receiver) = &self.receiver {
            return Ok((receiver.local_addr(), false));
        }

        let handle = UdpReceiver::new(self.receiver_config.clone()).start().await?;
        let addr = handle.local_addr();
        self.receiver = Some(handle);
        Ok((addr, true))
    }

    /// Stops the broadcaster and closes the receiver.
    pub async fn shutdown(&mut self) {
        self.controller.shutdown();

        if let Some(receiver) = self.receiver.take() {
            if let Err(e) = receiver.stop().await {
                warn!("Receiver did not stop cleanly: {}", e);
            }
        }

        info!("Console state shut down");
    }
}

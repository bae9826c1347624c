//! # store-broadcast: LAN Transaction Broadcast
//!
//! Sends the store's transactions to listeners on the local network over
//! UDP broadcast, and receives them on the other side.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Broadcast Subsystem                                │
//! │                                                                         │
//! │  control thread                                                        │
//! │       │ start / stop / restore                                         │
//! │       ▼                                                                 │
//! │  ┌──────────────────────┐   creates once   ┌──────────────────────┐    │
//! │  │ BroadcastController  │ ───────────────► │   UdpBroadcaster     │    │
//! │  │  controls, status    │ ◄─── events ──── │  interval cycle      │    │
//! │  └──────────────────────┘                  └──────────┬───────────┘    │
//! │                                                       │ each tick      │
//! │                                                       ▼                 │
//! │  ┌──────────────────────┐                  ┌──────────────────────┐    │
//! │  │  StoreRegistries     │ ◄─── reads ───── │  SnapshotEncoder     │    │
//! │  │  (store-core)        │                  │  header + JSON       │    │
//! │  └──────────────────────┘                  └──────────┬───────────┘    │
//! │                                                       │ UDP datagrams  │
//! │                              ═════════════════════════╪════════════    │
//! │                                                       ▼                 │
//! │                                            ┌──────────────────────┐    │
//! │                                            │   UdpReceiver        │    │
//! │                                            │  decode, render      │    │
//! │                                            └──────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery is best effort: no acknowledgements, no retransmission, no
//! ordering. Every datagram carries a full, self-contained batch.
//!
//! ## Module Organization
//! - [`broadcaster`] - `UdpBroadcaster`, socket seam, broadcast events
//! - [`codec`] - Datagram header, snapshot encoder, decoder
//! - [`config`] - TOML + environment configuration
//! - [`controller`] - Lazy broadcaster lifecycle and control enablement
//! - [`error`] - Broadcast, encoding and decode errors
//! - [`receiver`] - UDP listener and display history
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use store_broadcast::{BroadcastConfig, BroadcastController};
//! use store_core::StoreRegistries;
//!
//! let config = BroadcastConfig::load_or_default(None);
//! let store = Arc::new(StoreRegistries::new());
//! let mut controller =
//!     BroadcastController::new(config, store, tokio::runtime::Handle::current());
//!
//! controller.start_broadcasting()?;
//! println!("{}", controller.status_line());
//! controller.shutdown();
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod broadcaster;
pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod receiver;

// =============================================================================
// Re-exports
// =============================================================================

pub use broadcaster::{
    BroadcastDescriptor, BroadcastEvent, BroadcastFailure, BroadcastState, DatagramSocket,
    SocketBinder, UdpBroadcaster, UdpSocketBinder,
};
pub use codec::{
    decode, Datagram, DatagramBody, DatagramKind, EncodedDatagram, SnapshotEncoder,
    StoreIdentity, TransactionRecord,
};
pub use config::{BroadcastConfig, BroadcastSettings, ReceiverSettings, StoreConfig};
pub use controller::{BroadcastController, ControlState, ControllerState};
pub use error::{BroadcastError, BroadcastResult, DecodeError, EncodingError};
pub use receiver::{ReceiverConfig, ReceiverEvent, ReceiverHandle, ReceiverStats, UdpReceiver};

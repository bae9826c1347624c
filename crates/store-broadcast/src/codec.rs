//! # Wire Codec
//!
//! Turns the current transaction state into self-contained UDP datagrams
//! and back.
//!
//! ## Datagram Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Broadcast Datagram (v1)                           │
//! │                                                                         │
//! │  offset  size  field                                                   │
//! │  ──────  ────  ─────────────────────────────────────────────           │
//! │  0       4     magic "SMBC"                                            │
//! │  4       1     version (1)                                             │
//! │  5       1     kind (1 = TransactionBatch, 2 = Heartbeat)              │
//! │  6       8     sequence (u64, big-endian)                              │
//! │  14      4     payload length N (u32, big-endian)                      │
//! │  18      N     payload (UTF-8 JSON)                                    │
//! │                                                                         │
//! │  Every datagram stands alone: a receiver never needs an earlier one    │
//! │  to render a later one. Loss and reordering only cost freshness.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Splitting
//! A snapshot holding more transactions than fit in `max_datagram_bytes`
//! is split greedily into several batch datagrams with consecutive
//! sequence numbers. A snapshot with no transactions becomes a heartbeat.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use store_core::{ItemType, StoreRegistries, Transaction};

use crate::config::StoreConfig;
use crate::error::{DecodeError, EncodingError};

// =============================================================================
// Constants
// =============================================================================

/// Magic bytes at the start of every datagram.
pub const MAGIC: &[u8; 4] = b"SMBC";

/// Wire protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Fixed header size in bytes.
pub const HEADER_LEN: usize = 18;

// =============================================================================
// Datagram Kind
// =============================================================================

/// Payload kind carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DatagramKind {
    /// One or more transaction records.
    TransactionBatch = 1,
    /// Sent when there are no transactions, so receivers see the store.
    Heartbeat = 2,
}

impl TryFrom<u8> for DatagramKind {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(DatagramKind::TransactionBatch),
            2 => Ok(DatagramKind::Heartbeat),
            other => Err(DecodeError::UnknownKind(other)),
        }
    }
}

impl fmt::Display for DatagramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatagramKind::TransactionBatch => write!(f, "transaction_batch"),
            DatagramKind::Heartbeat => write!(f, "heartbeat"),
        }
    }
}

// =============================================================================
// Payload Types
// =============================================================================

/// Identity of the sending store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreIdentity {
    pub store_id: String,
    pub store_name: String,
}

impl From<&StoreConfig> for StoreIdentity {
    fn from(config: &StoreConfig) -> Self {
        StoreIdentity {
            store_id: config.id.clone(),
            store_name: config.name.clone(),
        }
    }
}

/// One transaction line with the item name resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRecord {
    pub item_name: String,
    pub item_type: ItemType,
    pub quantity: u32,
}

/// A transaction as it travels on the wire: names instead of ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub customer_name: String,
    pub timestamp: DateTime<Utc>,
    pub lines: Vec<LineRecord>,
}

impl fmt::Display for TransactionRecord {
    /// Renders `Alice — Go Programming x2, Wired x1`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} — ", self.customer_name)?;
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} x{}", line.item_name, line.quantity)?;
        }
        Ok(())
    }
}

/// Payload of a `TransactionBatch` datagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBatch {
    #[serde(flatten)]
    pub store: StoreIdentity,
    pub transactions: Vec<TransactionRecord>,
}

/// Payload of a `Heartbeat` datagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    #[serde(flatten)]
    pub store: StoreIdentity,
}

/// Decoded datagram body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatagramBody {
    TransactionBatch(TransactionBatch),
    Heartbeat(Heartbeat),
}

impl DatagramBody {
    pub fn kind(&self) -> DatagramKind {
        match self {
            DatagramBody::TransactionBatch(_) => DatagramKind::TransactionBatch,
            DatagramBody::Heartbeat(_) => DatagramKind::Heartbeat,
        }
    }

    pub fn store(&self) -> &StoreIdentity {
        match self {
            DatagramBody::TransactionBatch(batch) => &batch.store,
            DatagramBody::Heartbeat(heartbeat) => &heartbeat.store,
        }
    }
}

/// A complete datagram: header sequence plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub sequence: u64,
    pub body: DatagramBody,
}

/// Wire bytes produced for one send, with the facts the broadcaster reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedDatagram {
    pub sequence: u64,
    pub kind: DatagramKind,
    pub transactions: usize,
    pub bytes: Vec<u8>,
}

// =============================================================================
// Framing
// =============================================================================

fn frame(kind: DatagramKind, sequence: u64, payload: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(HEADER_LEN + payload.len());
    msg.extend_from_slice(MAGIC);
    msg.push(PROTOCOL_VERSION);
    msg.push(kind as u8);
    msg.extend_from_slice(&sequence.to_be_bytes());
    msg.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    msg.extend_from_slice(payload);
    msg
}

/// Encodes a datagram without any size limit.
pub fn encode(datagram: &Datagram) -> Result<Vec<u8>, EncodingError> {
    let payload = match &datagram.body {
        DatagramBody::TransactionBatch(batch) => serde_json::to_vec(batch)?,
        DatagramBody::Heartbeat(heartbeat) => serde_json::to_vec(heartbeat)?,
    };
    Ok(frame(datagram.body.kind(), datagram.sequence, &payload))
}

/// Decodes one datagram.
///
/// ## Checks (in order)
/// 1. At least HEADER_LEN bytes
/// 2. Magic, version, kind
/// 3. Declared length matches the bytes available exactly
/// 4. Payload parses as the JSON body for its kind
pub fn decode(data: &[u8]) -> Result<Datagram, DecodeError> {
    if data.len() < HEADER_LEN {
        return Err(DecodeError::TooShort {
            len: data.len(),
            needed: HEADER_LEN,
        });
    }

    if &data[0..4] != MAGIC {
        return Err(DecodeError::BadMagic);
    }

    let version = data[4];
    if version != PROTOCOL_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let kind = DatagramKind::try_from(data[5])?;

    let mut sequence = [0u8; 8];
    sequence.copy_from_slice(&data[6..14]);
    let sequence = u64::from_be_bytes(sequence);

    let declared = u32::from_be_bytes([data[14], data[15], data[16], data[17]]) as usize;
    let payload = &data[HEADER_LEN..];

    if declared > payload.len() {
        return Err(DecodeError::Truncated {
            declared,
            actual: payload.len(),
        });
    }
    if declared < payload.len() {
        return Err(DecodeError::TrailingBytes(payload.len() - declared));
    }

    let body = match kind {
        DatagramKind::TransactionBatch => DatagramBody::TransactionBatch(
            serde_json::from_slice(payload).map_err(|e| DecodeError::Malformed(e.to_string()))?,
        ),
        DatagramKind::Heartbeat => DatagramBody::Heartbeat(
            serde_json::from_slice(payload).map_err(|e| DecodeError::Malformed(e.to_string()))?,
        ),
    };

    Ok(Datagram { sequence, body })
}

// =============================================================================
// Snapshot Encoder
// =============================================================================

/// Builds datagrams from the registries' current state.
///
/// Reads the registries on every call; nothing is cached between cycles.
#[derive(Clone)]
pub struct SnapshotEncoder {
    registries: Arc<StoreRegistries>,
    identity: StoreIdentity,
    max_datagram_bytes: usize,
}

impl SnapshotEncoder {
    pub fn new(
        registries: Arc<StoreRegistries>,
        identity: StoreIdentity,
        max_datagram_bytes: usize,
    ) -> Self {
        SnapshotEncoder {
            registries,
            identity,
            max_datagram_bytes,
        }
    }

    pub fn identity(&self) -> &StoreIdentity {
        &self.identity
    }

    pub fn max_datagram_bytes(&self) -> usize {
        self.max_datagram_bytes
    }

    /// Resolves a transaction's customer and item names.
    pub fn record(&self, transaction: &Transaction) -> Result<TransactionRecord, EncodingError> {
        if transaction.lines.is_empty() {
            return Err(EncodingError::NoLines {
                transaction_id: transaction.id.clone(),
            });
        }

        let customer = self
            .registries
            .customers()
            .get(&transaction.customer_id)
            .ok_or_else(|| EncodingError::MissingCustomer {
                transaction_id: transaction.id.clone(),
                customer_id: transaction.customer_id.clone(),
            })?;
        if customer.name.trim().is_empty() {
            return Err(EncodingError::EmptyCustomerName {
                customer_id: customer.id,
            });
        }

        let mut lines = Vec::with_capacity(transaction.lines.len());
        for line in &transaction.lines {
            let item = self.registries.items().get(&line.item_id).ok_or_else(|| {
                EncodingError::MissingItem {
                    transaction_id: transaction.id.clone(),
                    item_id: line.item_id.clone(),
                }
            })?;
            if item.name.trim().is_empty() {
                return Err(EncodingError::EmptyItemName { item_id: item.id });
            }
            lines.push(LineRecord {
                item_name: item.name,
                item_type: item.item_type,
                quantity: line.quantity,
            });
        }

        Ok(TransactionRecord {
            transaction_id: transaction.id.clone(),
            customer_name: customer.name,
            timestamp: transaction.timestamp,
            lines,
        })
    }

    /// Encodes a single transaction into one batch datagram.
    pub fn encode_transaction(
        &self,
        transaction: &Transaction,
        sequence: u64,
    ) -> Result<Vec<u8>, EncodingError> {
        let record = self.record(transaction)?;
        let bytes = encode(&Datagram {
            sequence,
            body: DatagramBody::TransactionBatch(TransactionBatch {
                store: self.identity.clone(),
                transactions: vec![record],
            }),
        })?;
        self.check_size(bytes)
    }

    /// Encodes every current transaction.
    ///
    /// Returns one heartbeat when there are no transactions, otherwise as
    /// many batches as needed, numbered from `first_sequence`. Any
    /// unresolvable transaction fails the whole snapshot.
    pub fn encode_snapshot(&self, first_sequence: u64) -> Result<Vec<EncodedDatagram>, EncodingError> {
        let transactions = self.registries.transactions().transactions();

        if transactions.is_empty() {
            let bytes = encode(&Datagram {
                sequence: first_sequence,
                body: DatagramBody::Heartbeat(Heartbeat {
                    store: self.identity.clone(),
                }),
            })?;
            return Ok(vec![EncodedDatagram {
                sequence: first_sequence,
                kind: DatagramKind::Heartbeat,
                transactions: 0,
                bytes: self.check_size(bytes)?,
            }]);
        }

        let records = transactions
            .iter()
            .map(|tx| self.record(tx))
            .collect::<Result<Vec<_>, _>>()?;

        // Compact JSON: a batch with k records is the empty batch plus each
        // record plus k - 1 commas.
        let empty = serde_json::to_vec(&TransactionBatch {
            store: self.identity.clone(),
            transactions: Vec::new(),
        })?;
        let base = HEADER_LEN + empty.len();

        let mut datagrams = Vec::new();
        let mut current: Vec<TransactionRecord> = Vec::new();
        let mut current_size = base;
        let mut sequence = first_sequence;

        for record in records {
            let record_len = serde_json::to_vec(&record)?.len();
            let added = record_len + usize::from(!current.is_empty());

            if !current.is_empty() && current_size + added > self.max_datagram_bytes {
                datagrams.push(self.batch(sequence, std::mem::take(&mut current))?);
                sequence += 1;
                current_size = base;
            }

            current_size += record_len + usize::from(!current.is_empty());
            current.push(record);
        }
        datagrams.push(self.batch(sequence, current)?);

        Ok(datagrams)
    }

    fn batch(
        &self,
        sequence: u64,
        transactions: Vec<TransactionRecord>,
    ) -> Result<EncodedDatagram, EncodingError> {
        let count = transactions.len();
        let bytes = encode(&Datagram {
            sequence,
            body: DatagramBody::TransactionBatch(TransactionBatch {
                store: self.identity.clone(),
                transactions,
            }),
        })?;

        Ok(EncodedDatagram {
            sequence,
            kind: DatagramKind::TransactionBatch,
            transactions: count,
            bytes: self.check_size(bytes)?,
        })
    }

    fn check_size(&self, bytes: Vec<u8>) -> Result<Vec<u8>, EncodingError> {
        if bytes.len() > self.max_datagram_bytes {
            return Err(EncodingError::Oversized {
                size: bytes.len(),
                max: self.max_datagram_bytes,
            });
        }
        Ok(bytes)
    }
}

//! # park-ledger
//!
//! Ledger access for the parkmesh marketplace.
//!
//! The ledger exposes only individual versioned objects, an append-only
//! event log and read-only program functions. This crate turns that into
//! typed reads:
//!
//! - [`decode`] and [`entity`] read the node's loosely typed JSON,
//!   including every encoding of optional values
//! - [`indexer`] discovers identifiers by scanning creation events
//! - [`resolver`] materializes entities by identifier with bounded
//!   concurrency
//! - [`context::LedgerContext`] wires a client, program layout and settings
//!   together without any process-wide state
//!
//! Two clients implement [`LedgerReader`]: [`RpcLedgerClient`] for a real
//! fullnode and [`SimulatedLedger`], an in-memory program used in
//! development and tests, which also implements [`LedgerWriter`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod context;
pub mod decode;
pub mod entity;
pub mod error;
pub mod indexer;
pub mod inspect;
pub mod raw;
pub mod resolver;
pub mod rpc;
pub mod simulated;

pub use client::{LedgerReader, LedgerWriter};
pub use config::{IndexerConfig, Module, Network, ProgramConfig, ResolverConfig, RpcConfig};
pub use context::{LedgerContext, ReadStats, ReadStatsSnapshot};
pub use decode::{OptionShape, OptionalField};
pub use entity::{LedgerEntity, OwnerCap};
pub use error::{LedgerError, Result};
pub use indexer::{EventIndexer, IdScan};
pub use raw::{
    CallArg, EntityKind, EntryCall, EntryFunction, EventCursor, EventKind, EventPage, RawEvent,
    RawObject, TxReceipt, ViewCall, ViewFunction,
};
pub use resolver::{BatchResolution, ObjectResolver, Versioned};
pub use rpc::RpcLedgerClient;
pub use simulated::{Fault, NewSlot, SimulatedLedger};

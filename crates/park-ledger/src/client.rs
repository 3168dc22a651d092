//! Ledger client abstractions.
//!
//! The ledger exposes individual objects, an append-only event log and
//! read-only program functions. Writes go through typed entry points and are
//! validated by the ledger program itself.

use std::future::Future;

use park_core::{Address, ObjectId};
use serde_json::Value;

use crate::error::Result;
use crate::raw::{EntryCall, EventCursor, EventPage, RawObject, TxReceipt, ViewCall};

/// Read access to the ledger.
pub trait LedgerReader: Send + Sync {
    /// Fetches an object. Deleted or unknown objects yield `Ok(None)`.
    fn get_object(&self, id: &ObjectId) -> impl Future<Output = Result<Option<RawObject>>> + Send;

    /// Reads one page of events of `event_type`.
    fn query_events(
        &self,
        event_type: &str,
        cursor: Option<&EventCursor>,
        limit: usize,
        descending: bool,
    ) -> impl Future<Output = Result<EventPage>> + Send;

    /// Objects of `struct_type` owned by `owner`.
    fn owned_objects(
        &self,
        owner: &Address,
        struct_type: &str,
    ) -> impl Future<Output = Result<Vec<RawObject>>> + Send;

    /// Evaluates a read-only program function.
    fn view_call(&self, call: &ViewCall) -> impl Future<Output = Result<Value>> + Send;
}

/// Write access to the ledger.
///
/// Implementations never retry: entry points have side effects and carry no
/// idempotency key.
pub trait LedgerWriter: Send + Sync {
    /// Executes an entry call and returns its receipt.
    fn submit(&self, call: &EntryCall) -> impl Future<Output = Result<TxReceipt>> + Send;
}

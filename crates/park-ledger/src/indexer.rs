//! Discovering entity identifiers from the event log.
//!
//! The ledger has no secondary index and no query-by-type. The only way to
//! enumerate entities is to read creation events, which carry the new
//! object's identifier, and collect the distinct identifiers.
//!
//! [`EventIndexer::find_identifiers`] reads one bounded page, most recent
//! first. It is a cap, not a cursor: entities whose creation event is older
//! than the page are not returned, and the result says so through
//! [`IdScan::possibly_incomplete`]. [`EventIndexer::find_identifiers_paginated`]
//! follows cursors up to the configured page budget for callers that need
//! more.

use std::collections::HashSet;
use std::sync::Arc;

use park_core::ObjectId;
use tracing::{debug, warn};

use crate::client::LedgerReader;
use crate::config::{IndexerConfig, ProgramConfig};
use crate::context::ReadStats;
use crate::decode::value_as_id;
use crate::error::Result;
use crate::raw::{EventCursor, EventKind, RawEvent};

/// Identifiers found by a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdScan {
    /// Distinct identifiers, most recently created first.
    pub ids: Vec<ObjectId>,
    /// Events read.
    pub events_scanned: usize,
    /// Pages read.
    pub pages: usize,
    /// Older events exist that were not read.
    pub possibly_incomplete: bool,
}

impl IdScan {
    /// Whether nothing was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Whether an event payload field names the given identifier.
#[must_use]
pub fn field_is(event: &RawEvent, field: &str, expected: &str) -> bool {
    let Some(value) = event.parsed.get(field) else {
        return false;
    };
    match (value_as_id(value), ObjectId::parse(expected)) {
        (Some(found), Ok(expected)) => found == expected,
        _ => value.as_str() == Some(expected),
    }
}

/// Scans creation events for entity identifiers.
#[derive(Debug)]
pub struct EventIndexer<L> {
    ledger: Arc<L>,
    program: Arc<ProgramConfig>,
    config: IndexerConfig,
    stats: Arc<ReadStats>,
}

impl<L: LedgerReader> EventIndexer<L> {
    /// Creates an indexer.
    pub fn new(
        ledger: Arc<L>,
        program: Arc<ProgramConfig>,
        config: IndexerConfig,
        stats: Arc<ReadStats>,
    ) -> Self {
        Self {
            ledger,
            program,
            config,
            stats,
        }
    }

    /// Identifiers from the most recent page of `kind` events accepted by
    /// `filter`.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the scan fails. A failed scan is never
    /// reported as an empty result.
    pub async fn find_identifiers<F>(&self, kind: EventKind, filter: F) -> Result<IdScan>
    where
        F: Fn(&RawEvent) -> bool + Send + Sync,
    {
        self.scan(kind, &filter, 1).await
    }

    /// Like [`Self::find_identifiers`] but follows cursors for up to
    /// `max_pages` pages (capped by the configured budget).
    ///
    /// # Errors
    ///
    /// Returns the ledger error if any page fails; partial results are
    /// discarded.
    pub async fn find_identifiers_paginated<F>(
        &self,
        kind: EventKind,
        filter: F,
        max_pages: usize,
    ) -> Result<IdScan>
    where
        F: Fn(&RawEvent) -> bool + Send + Sync,
    {
        let pages = max_pages.clamp(1, self.config.max_pages);
        self.scan(kind, &filter, pages).await
    }

    async fn scan<F>(&self, kind: EventKind, filter: &F, max_pages: usize) -> Result<IdScan>
    where
        F: Fn(&RawEvent) -> bool + Send + Sync,
    {
        let event_type = kind.event_type(&self.program);
        let mut seen = HashSet::new();
        let mut scan = IdScan::default();
        let mut cursor: Option<EventCursor> = None;

        loop {
            self.stats.record_scan();
            let page = match self
                .ledger
                .query_events(&event_type, cursor.as_ref(), self.config.page_size, true)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    self.stats.record_scan_failure();
                    warn!(event_type = %event_type, error = %e, "event scan failed");
                    return Err(e);
                }
            };

            scan.pages += 1;
            scan.events_scanned += page.data.len();
            for event in page.data.iter().filter(|e| filter(e)) {
                match event.parsed.get(kind.id_field()).and_then(value_as_id) {
                    Some(id) => {
                        if seen.insert(id.clone()) {
                            scan.ids.push(id);
                        }
                    }
                    None => debug!(
                        event_type = %event_type,
                        tx = %event.id.tx_digest,
                        "event without a usable identifier"
                    ),
                }
            }

            let more = page.has_next_page && page.next_cursor.is_some();
            if !more {
                scan.possibly_incomplete = false;
                break;
            }
            if scan.pages >= max_pages {
                scan.possibly_incomplete = true;
                break;
            }
            cursor = page.next_cursor;
        }

        if scan.possibly_incomplete {
            debug!(
                event_type = %event_type,
                pages = scan.pages,
                events = scan.events_scanned,
                "scan stopped before the start of the log"
            );
        }
        Ok(scan)
    }
}

/// Accepts every event.
#[must_use]
pub const fn any_event(_: &RawEvent) -> bool {
    true
}

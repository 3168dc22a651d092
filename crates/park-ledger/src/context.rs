//! Explicit context shared by the ledger components.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::client::LedgerReader;
use crate::config::{IndexerConfig, ProgramConfig, ResolverConfig};
use crate::indexer::EventIndexer;
use crate::resolver::ObjectResolver;

/// Counters describing read-path health.
#[derive(Debug, Default)]
pub struct ReadStats {
    event_scans: AtomicU64,
    scan_failures: AtomicU64,
    object_reads: AtomicU64,
    object_read_failures: AtomicU64,
    fail_open_decisions: AtomicU64,
}

/// Point-in-time copy of [`ReadStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadStatsSnapshot {
    /// Event pages requested.
    pub event_scans: u64,
    /// Event scans that failed.
    pub scan_failures: u64,
    /// Objects requested.
    pub object_reads: u64,
    /// Object reads that failed (not counting absent objects).
    pub object_read_failures: u64,
    /// Availability answers given without complete data.
    pub fail_open_decisions: u64,
}

impl ReadStats {
    pub(crate) fn record_scan(&self) {
        self.event_scans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scan_failure(&self) {
        self.scan_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_object_read(&self) {
        self.object_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_object_read_failure(&self) {
        self.object_read_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an availability answer that assumed "free" for lack of data.
    pub fn record_fail_open(&self) {
        self.fail_open_decisions.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values.
    #[must_use]
    pub fn snapshot(&self) -> ReadStatsSnapshot {
        ReadStatsSnapshot {
            event_scans: self.event_scans.load(Ordering::Relaxed),
            scan_failures: self.scan_failures.load(Ordering::Relaxed),
            object_reads: self.object_reads.load(Ordering::Relaxed),
            object_read_failures: self.object_read_failures.load(Ordering::Relaxed),
            fail_open_decisions: self.fail_open_decisions.load(Ordering::Relaxed),
        }
    }
}

/// Everything a ledger-backed component needs, constructed once and passed
/// down explicitly.
///
/// Cloning is cheap; all clones share the client and the counters.
#[derive(Debug)]
pub struct LedgerContext<L> {
    ledger: Arc<L>,
    program: Arc<ProgramConfig>,
    indexer: IndexerConfig,
    resolver: ResolverConfig,
    stats: Arc<ReadStats>,
}

impl<L> Clone for LedgerContext<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            program: Arc::clone(&self.program),
            indexer: self.indexer,
            resolver: self.resolver,
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<L: LedgerReader> LedgerContext<L> {
    /// Creates a context with default indexer and resolver settings.
    pub fn new(ledger: Arc<L>, program: ProgramConfig) -> Self {
        Self {
            ledger,
            program: Arc::new(program),
            indexer: IndexerConfig::default(),
            resolver: ResolverConfig::default(),
            stats: Arc::new(ReadStats::default()),
        }
    }

    /// Overrides the indexer settings.
    #[must_use]
    pub const fn with_indexer_config(mut self, config: IndexerConfig) -> Self {
        self.indexer = config;
        self
    }

    /// Overrides the resolver settings.
    #[must_use]
    pub const fn with_resolver_config(mut self, config: ResolverConfig) -> Self {
        self.resolver = config;
        self
    }

    /// The ledger client.
    pub const fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// The program layout.
    pub fn program(&self) -> &ProgramConfig {
        &self.program
    }

    /// The indexer settings.
    pub const fn indexer_config(&self) -> IndexerConfig {
        self.indexer
    }

    /// The resolver settings.
    pub const fn resolver_config(&self) -> ResolverConfig {
        self.resolver
    }

    /// Shared read counters.
    pub const fn stats(&self) -> &Arc<ReadStats> {
        &self.stats
    }

    /// An event indexer over this context.
    pub fn indexer(&self) -> EventIndexer<L> {
        EventIndexer::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.program),
            self.indexer,
            Arc::clone(&self.stats),
        )
    }

    /// An object resolver over this context.
    pub fn resolver(&self) -> ObjectResolver<L> {
        ObjectResolver::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.program),
            self.resolver,
            Arc::clone(&self.stats),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let stats = ReadStats::default();
        stats.record_scan();
        stats.record_scan();
        stats.record_scan_failure();
        stats.record_fail_open();
        let snap = stats.snapshot();
        assert_eq!(snap.event_scans, 2);
        assert_eq!(snap.scan_failures, 1);
        assert_eq!(snap.fail_open_decisions, 1);
        assert_eq!(snap.object_reads, 0);
    }
}

//! Materializing entities by identifier.
//!
//! Objects disappear legitimately (consumed, deleted), so an absent or
//! undecodable object resolves to `None` and batch callers skip it. Only
//! transport failures are errors, and they are kept apart from absence.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use park_core::{Address, ObjectId};
use tracing::debug;

use crate::client::LedgerReader;
use crate::config::{ProgramConfig, ResolverConfig};
use crate::context::ReadStats;
use crate::entity::{LedgerEntity, decode_entity};
use crate::error::{LedgerError, Result};

/// An entity with the object version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    /// Object version.
    pub version: u64,
    /// Decoded entity.
    pub value: T,
}

/// Outcome of resolving several identifiers.
#[derive(Debug)]
pub struct BatchResolution<T> {
    /// Decoded entities, in input order.
    pub resolved: Vec<T>,
    /// Identifiers that are absent or undecodable.
    pub missing: Vec<ObjectId>,
    /// Identifiers whose read failed.
    pub failed: Vec<(ObjectId, LedgerError)>,
}

impl<T> Default for BatchResolution<T> {
    fn default() -> Self {
        Self {
            resolved: Vec::new(),
            missing: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BatchResolution<T> {
    /// Whether every read succeeded (absent objects are not failures).
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fetches and decodes objects.
#[derive(Debug)]
pub struct ObjectResolver<L> {
    ledger: Arc<L>,
    program: Arc<ProgramConfig>,
    config: ResolverConfig,
    stats: Arc<ReadStats>,
}

impl<L: LedgerReader> ObjectResolver<L> {
    /// Creates a resolver.
    pub fn new(
        ledger: Arc<L>,
        program: Arc<ProgramConfig>,
        config: ResolverConfig,
        stats: Arc<ReadStats>,
    ) -> Self {
        Self {
            ledger,
            program,
            config,
            stats,
        }
    }

    /// Resolves one entity.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the read fails.
    pub async fn resolve<T: LedgerEntity>(&self, id: &ObjectId) -> Result<Option<T>> {
        Ok(self.resolve_versioned(id).await?.map(|v| v.value))
    }

    /// Resolves one entity with its version.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the read fails.
    pub async fn resolve_versioned<T: LedgerEntity>(&self, id: &ObjectId) -> Result<Option<Versioned<T>>> {
        self.stats.record_object_read();
        match self.ledger.get_object(id).await {
            Ok(Some(raw)) => Ok(decode_entity::<T>(&raw).map(|value| Versioned {
                version: raw.version,
                value,
            })),
            Ok(None) => {
                debug!(object_id = %id, "object absent");
                Ok(None)
            }
            Err(e) => {
                self.stats.record_object_read_failure();
                debug!(object_id = %id, error = %e, "object read failed");
                Err(e)
            }
        }
    }

    /// Re-reads an entity, keeping `current` if the node answers with an
    /// older version than we already hold.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the read fails.
    pub async fn refresh<T: LedgerEntity>(&self, current: Versioned<T>) -> Result<Option<Versioned<T>>> {
        let id = current.value.object_id().clone();
        match self.resolve_versioned::<T>(&id).await? {
            Some(fresh) if fresh.version < current.version => {
                debug!(
                    object_id = %id,
                    held = current.version,
                    served = fresh.version,
                    "node served an older version; keeping ours"
                );
                Ok(Some(current))
            }
            other => Ok(other),
        }
    }

    /// Resolves many identifiers with at most `max_in_flight` concurrent
    /// reads. Never fails as a whole.
    pub async fn resolve_many<T: LedgerEntity>(&self, ids: &[ObjectId]) -> BatchResolution<T> {
        let results: Vec<(ObjectId, Result<Option<T>>)> = stream::iter(ids.iter().cloned())
            .map(|id| async move {
                let result = self.resolve::<T>(&id).await;
                (id, result)
            })
            .buffered(self.config.max_in_flight)
            .collect()
            .await;

        let mut batch = BatchResolution::default();
        for (id, result) in results {
            match result {
                Ok(Some(entity)) => batch.resolved.push(entity),
                Ok(None) => batch.missing.push(id),
                Err(e) => batch.failed.push((id, e)),
            }
        }
        batch
    }

    /// Entities of type `T` owned by `owner`. Objects that fail to decode
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the listing fails.
    pub async fn owned_by<T: LedgerEntity>(&self, owner: &Address) -> Result<Vec<T>> {
        let struct_type = T::KIND.struct_type(&self.program);
        let objects = self.ledger.owned_objects(owner, &struct_type).await.inspect_err(|e| {
            self.stats.record_object_read_failure();
            debug!(owner = %owner, error = %e, "owned object listing failed");
        })?;
        Ok(objects.iter().filter_map(decode_entity::<T>).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LedgerContext;
    use crate::simulated::{Fault, NewSlot, SimulatedLedger};
    use park_core::{GeoPoint, Reservation, Slot};

    fn setup() -> (Arc<SimulatedLedger>, LedgerContext<SimulatedLedger>) {
        let program = ProgramConfig::new(ObjectId::parse("0x2a").unwrap());
        let ledger = Arc::new(SimulatedLedger::new(program.clone()));
        let ctx = LedgerContext::new(Arc::clone(&ledger), program);
        (ledger, ctx)
    }

    fn list(ledger: &SimulatedLedger) -> ObjectId {
        let owner = Address::parse("0xa").unwrap();
        ledger
            .list_slot(&owner, NewSlot::new(GeoPoint::from_micro(1, 1).unwrap(), 10))
            .unwrap()
    }

    #[tokio::test]
    async fn test_resolve_present_and_absent() {
        let (ledger, ctx) = setup();
        let slot_id = list(&ledger);
        let resolver = ctx.resolver();

        let slot: Option<Slot> = resolver.resolve(&slot_id).await.unwrap();
        assert_eq!(slot.unwrap().id, slot_id);

        let missing: Option<Slot> = resolver.resolve(&ObjectId::parse("0x404").unwrap()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_wrong_type_resolves_to_none() {
        let (ledger, ctx) = setup();
        let slot_id = list(&ledger);
        let as_reservation: Option<Reservation> = ctx.resolver().resolve(&slot_id).await.unwrap();
        assert!(as_reservation.is_none());
    }

    #[tokio::test]
    async fn test_resolve_many_keeps_order_and_skips_missing() {
        let (ledger, ctx) = setup();
        let a = list(&ledger);
        let b = list(&ledger);
        let ghost = ObjectId::parse("0x404").unwrap();

        let batch: BatchResolution<Slot> = ctx
            .resolver()
            .resolve_many(&[b.clone(), ghost.clone(), a.clone()])
            .await;
        let ids: Vec<_> = batch.resolved.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec![b, a]);
        assert_eq!(batch.missing, vec![ghost]);
        assert!(batch.is_complete());
    }

    #[tokio::test]
    async fn test_resolve_many_reports_failures() {
        let (ledger, ctx) = setup();
        let a = list(&ledger);
        ledger.set_fault(Fault::ObjectReads, true);
        let batch: BatchResolution<Slot> = ctx.resolver().resolve_many(&[a]).await;
        assert!(batch.resolved.is_empty());
        assert!(!batch.is_complete());
        assert_eq!(ctx.stats().snapshot().object_read_failures, 1);
    }

    #[tokio::test]
    async fn test_refresh_keeps_newer_version() {
        let (ledger, ctx) = setup();
        let slot_id = list(&ledger);
        let resolver = ctx.resolver();
        let mut held: Versioned<Slot> = resolver.resolve_versioned(&slot_id).await.unwrap().unwrap();
        held.version += 10;
        let refreshed = resolver.refresh(held.clone()).await.unwrap().unwrap();
        assert_eq!(refreshed, held);
    }
}

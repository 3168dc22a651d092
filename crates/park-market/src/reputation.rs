//! Profile lookups and reputation annotation.

use park_core::{Address, ReputationSummary, UserProfile};
use park_ledger::indexer::field_is;
use park_ledger::{EventKind, LedgerContext, LedgerError, LedgerReader};
use serde::Serialize;
use tracing::{debug, warn};

/// Outcome of a reputation lookup.
///
/// Annotation is optional enrichment: a failed lookup is reported as
/// `Unavailable` instead of failing the request it decorates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReputationLookup {
    /// The user has a profile.
    Found(ReputationSummary),
    /// The user never registered.
    NoProfile,
    /// The ledger could not be asked.
    Unavailable,
}

impl ReputationLookup {
    /// The summary, if one was found.
    #[must_use]
    pub const fn summary(&self) -> Option<&ReputationSummary> {
        match self {
            Self::Found(summary) => Some(summary),
            Self::NoProfile | Self::Unavailable => None,
        }
    }
}

/// Finds user profiles.
#[derive(Debug)]
pub struct ProfileDirectory<L> {
    ctx: LedgerContext<L>,
}

impl<L: LedgerReader> ProfileDirectory<L> {
    /// Creates a directory.
    pub const fn new(ctx: LedgerContext<L>) -> Self {
        Self { ctx }
    }

    /// The profile owned by `address`.
    ///
    /// Owned objects are asked first. Some nodes do not report ownership of
    /// profiles, so the creation log is scanned when that finds nothing.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if neither lookup could be made.
    pub async fn profile(&self, address: &Address) -> Result<Option<UserProfile>, LedgerError> {
        let resolver = self.ctx.resolver();
        let owned = resolver.owned_by::<UserProfile>(address).await;
        if let Ok(profiles) = &owned {
            if let Some(profile) = profiles.iter().find(|p| &p.address == address) {
                return Ok(Some(profile.clone()));
            }
        }

        let scan = self
            .ctx
            .indexer()
            .find_identifiers(EventKind::ProfileCreated, |e| field_is(e, "user", address.as_str()))
            .await;
        let scan = match (scan, owned) {
            (Ok(scan), _) => scan,
            (Err(e), Ok(_)) => return Err(e),
            (Err(e), Err(first)) => {
                debug!(user = %address, error = %first, "owned profile lookup failed");
                return Err(e);
            }
        };
        for id in &scan.ids {
            if let Some(profile) = resolver.resolve::<UserProfile>(id).await? {
                if &profile.address == address {
                    return Ok(Some(profile));
                }
            }
        }
        Ok(None)
    }

    /// Reputation annotation for `address`.
    pub async fn reputation(&self, address: &Address) -> ReputationLookup {
        match self.profile(address).await {
            Ok(Some(profile)) => ReputationLookup::Found(ReputationSummary::from_profile(&profile)),
            Ok(None) => ReputationLookup::NoProfile,
            Err(e) => {
                warn!(user = %address, error = %e, "reputation lookup failed");
                ReputationLookup::Unavailable
            }
        }
    }
}

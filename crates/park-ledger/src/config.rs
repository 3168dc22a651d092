//! Configuration for ledger access.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use park_core::ObjectId;
use serde::{Deserialize, Serialize};

/// Default number of events fetched per scan.
pub const DEFAULT_EVENT_PAGE_SIZE: usize = 1000;

/// Default page budget for explicit pagination.
pub const DEFAULT_MAX_PAGES: usize = 10;

/// Default cap on concurrent object reads.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 12;

/// Default per-call timeout.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Ledger network to connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network.
    Mainnet,
    /// Public test network.
    #[default]
    Testnet,
    /// Development network.
    Devnet,
    /// Local node.
    Localnet,
}

impl Network {
    /// Well-known fullnode URL for this network.
    #[must_use]
    pub const fn rpc_url(&self) -> &'static str {
        match self {
            Self::Mainnet => "https://fullnode.mainnet.sui.io:443",
            Self::Testnet => "https://fullnode.testnet.sui.io:443",
            Self::Devnet => "https://fullnode.devnet.sui.io:443",
            Self::Localnet => "http://127.0.0.1:9000",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mainnet => write!(f, "mainnet"),
            Self::Testnet => write!(f, "testnet"),
            Self::Devnet => write!(f, "devnet"),
            Self::Localnet => write!(f, "localnet"),
        }
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "devnet" => Ok(Self::Devnet),
            "localnet" | "local" => Ok(Self::Localnet),
            other => Err(format!("unknown network: {other}")),
        }
    }
}

/// Modules of the ledger program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Module {
    /// Slots and owner capabilities.
    Parking,
    /// Reservations.
    Reservation,
    /// Escrows and disputes.
    Escrow,
    /// User profiles and ratings.
    Reputation,
}

/// Where the ledger program lives and how its modules are named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramConfig {
    /// Published package identifier.
    pub package_id: ObjectId,
    /// Module holding slots.
    pub parking_module: String,
    /// Module holding reservations.
    pub reservation_module: String,
    /// Module holding escrows.
    pub escrow_module: String,
    /// Module holding profiles.
    pub reputation_module: String,
}

impl ProgramConfig {
    /// Program at `package_id` with the standard module names.
    #[must_use]
    pub fn new(package_id: ObjectId) -> Self {
        Self {
            package_id,
            parking_module: "parking".to_string(),
            reservation_module: "reservation".to_string(),
            escrow_module: "escrow".to_string(),
            reputation_module: "reputation".to_string(),
        }
    }

    /// Overrides one module name.
    #[must_use]
    pub fn with_module(mut self, module: Module, name: impl Into<String>) -> Self {
        let name = name.into();
        match module {
            Module::Parking => self.parking_module = name,
            Module::Reservation => self.reservation_module = name,
            Module::Escrow => self.escrow_module = name,
            Module::Reputation => self.reputation_module = name,
        }
        self
    }

    /// Name of a module.
    #[must_use]
    pub fn module_name(&self, module: Module) -> &str {
        match module {
            Module::Parking => &self.parking_module,
            Module::Reservation => &self.reservation_module,
            Module::Escrow => &self.escrow_module,
            Module::Reputation => &self.reputation_module,
        }
    }

    /// Fully qualified `package::module::Name` string.
    #[must_use]
    pub fn qualified(&self, module: Module, name: &str) -> String {
        format!("{}::{}::{}", self.package_id, self.module_name(module), name)
    }
}

/// Event scanning parameters.
///
/// A single scan reads at most `page_size` events, most recent first. Entities
/// whose creation event is older than that page are not seen by a single
/// scan; results then carry `possibly_incomplete`. Raising the page size
/// trades latency and node load for completeness. Callers that need every
/// entity paginate explicitly, bounded by `max_pages`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Events per page.
    pub page_size: usize,
    /// Page budget for explicit pagination.
    pub max_pages: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_EVENT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl IndexerConfig {
    /// Sets the page size (at least 1).
    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = if page_size == 0 { 1 } else { page_size };
        self
    }

    /// Sets the page budget (at least 1).
    #[must_use]
    pub const fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = if max_pages == 0 { 1 } else { max_pages };
        self
    }
}

/// Object resolution parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Maximum concurrent object reads.
    pub max_in_flight: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl ResolverConfig {
    /// Sets the concurrency cap (at least 1).
    #[must_use]
    pub const fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = if max_in_flight == 0 { 1 } else { max_in_flight };
        self
    }
}

/// JSON-RPC transport parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcConfig {
    /// Node URL.
    pub url: String,
    /// Per-call timeout.
    pub timeout: Duration,
}

impl RpcConfig {
    /// Config for a well-known network.
    #[must_use]
    pub fn for_network(network: Network) -> Self {
        Self {
            url: network.rpc_url().to_string(),
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    /// Overrides the node URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Overrides the per-call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::for_network(Network::default())
    }
}

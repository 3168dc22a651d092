//! Command-line argument parsing with clap.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use park_core::ObjectId;
use park_ledger::{
    IndexerConfig, LedgerContext, Network, ProgramConfig, ResolverConfig, RpcConfig, RpcLedgerClient,
    SimulatedLedger,
};
use park_market::{MarketConfig, OrphanPolicy};
use tracing::info;

use crate::backend::LedgerBackend;
use crate::config::ApiConfig;
use crate::demo;
use crate::logging::LogFormat;

/// Package id used by the in-memory ledger when none is given.
const SIMULATED_PACKAGE: &str = "0x2a";

/// Parkmesh - parking marketplace query layer.
#[derive(Parser, Debug, Clone)]
#[command(name = "parkmesh")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Ledger connection settings.
    #[command(flatten)]
    pub ledger: LedgerArgs,

    /// Log output format.
    #[arg(long, env = "PARKMESH_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Where and how to read the ledger.
#[derive(Args, Debug, Clone)]
pub struct LedgerArgs {
    /// Use the in-memory ledger seeded with sample slots.
    #[arg(long, env = "PARKMESH_SIMULATE", global = true)]
    pub simulate: bool,

    /// Ledger network.
    #[arg(long, env = "PARKMESH_NETWORK", default_value_t = Network::Testnet, global = true)]
    pub network: Network,

    /// Fullnode URL, overriding the network default.
    #[arg(long, env = "PARKMESH_RPC_URL", global = true)]
    pub rpc_url: Option<String>,

    /// Marketplace program package id.
    #[arg(long, env = "PARKMESH_PACKAGE_ID", global = true)]
    pub package_id: Option<String>,

    /// Events fetched per scan.
    #[arg(long, env = "PARKMESH_PAGE_SIZE", global = true)]
    pub page_size: Option<usize>,

    /// Page budget for explicit pagination.
    #[arg(long, env = "PARKMESH_MAX_PAGES", global = true)]
    pub max_pages: Option<usize>,

    /// Concurrent object reads.
    #[arg(long, env = "PARKMESH_MAX_IN_FLIGHT", global = true)]
    pub max_in_flight: Option<usize>,

    /// Per-call timeout in seconds.
    #[arg(long, env = "PARKMESH_RPC_TIMEOUT_SECS", global = true)]
    pub rpc_timeout_secs: Option<u64>,

    /// What to do with a reservation whose funds could not be locked.
    #[arg(long, env = "PARKMESH_ORPHAN_POLICY", default_value_t = OrphanPolicy::Cancel, global = true)]
    pub orphan_policy: OrphanPolicy,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP API.
    Serve(ServeArgs),

    /// Run one read-only query and print the result as JSON.
    Query {
        /// Query to run.
        #[command(subcommand)]
        command: QueryCommands,
    },
}

/// Arguments for `serve`.
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "PARKMESH_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Allowed CORS origins (all when empty).
    #[arg(long = "cors-origin", env = "PARKMESH_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,
}

impl ServeArgs {
    /// Server configuration from these arguments.
    pub fn api_config(&self) -> ApiConfig {
        self.cors_origins
            .iter()
            .fold(ApiConfig::new(self.bind), |config, origin| config.with_cors_origin(origin))
    }
}

/// Read-only queries.
#[derive(Subcommand, Debug, Clone)]
pub enum QueryCommands {
    /// Slots near a point.
    Near {
        /// Latitude in degrees.
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        /// Longitude in degrees.
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
        /// Radius in meters.
        #[arg(long)]
        radius: Option<f64>,
        /// Only slots free right now.
        #[arg(long)]
        available_only: bool,
    },

    /// Ranked recommendations near a point.
    Recommend {
        /// Latitude in degrees.
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        /// Longitude in degrees.
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
        /// Radius in meters.
        #[arg(long)]
        radius: Option<f64>,
        /// `balanced`, `closest` or `cheapest`.
        #[arg(long, default_value = "balanced")]
        mode: String,
        /// Highest acceptable total price.
        #[arg(long)]
        max_price: Option<u64>,
        /// Number of recommendations.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// One slot.
    Slot {
        /// Slot id.
        id: String,
    },

    /// Price quote for a slot.
    Quote {
        /// Slot id.
        id: String,
        /// Duration in hours.
        #[arg(long)]
        hours: Option<u64>,
    },

    /// Reservations made by a driver.
    Reservations {
        /// Driver address.
        address: String,
    },

    /// Reputation of a user.
    Reputation {
        /// User address.
        address: String,
    },
}

impl LedgerArgs {
    /// Marketplace settings from these arguments.
    pub fn market_config(&self) -> MarketConfig {
        MarketConfig::default().with_orphan_policy(self.orphan_policy)
    }

    fn indexer_config(&self) -> IndexerConfig {
        let mut config = IndexerConfig::default();
        if let Some(page_size) = self.page_size {
            config = config.with_page_size(page_size);
        }
        if let Some(max_pages) = self.max_pages {
            config = config.with_max_pages(max_pages);
        }
        config
    }

    fn resolver_config(&self) -> ResolverConfig {
        self.max_in_flight
            .map_or_else(ResolverConfig::default, |n| ResolverConfig::default().with_max_in_flight(n))
    }

    fn rpc_config(&self) -> RpcConfig {
        let mut config = RpcConfig::for_network(self.network);
        if let Some(url) = &self.rpc_url {
            config = config.with_url(url);
        }
        if let Some(secs) = self.rpc_timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        config
    }

    /// Connects the configured ledger.
    ///
    /// The in-memory ledger is seeded with sample slots. A fullnode needs a
    /// package id.
    pub async fn connect(&self) -> anyhow::Result<LedgerContext<LedgerBackend>> {
        let (backend, program) = if self.simulate {
            let raw = self.package_id.as_deref().unwrap_or(SIMULATED_PACKAGE);
            let program = ProgramConfig::new(ObjectId::parse(raw).context("invalid package id")?);
            let ledger = SimulatedLedger::new(program.clone());
            demo::seed(&ledger).await?;
            (LedgerBackend::Simulated(Arc::new(ledger)), program)
        } else {
            let raw = self
                .package_id
                .as_deref()
                .context("a package id is required unless --simulate is set")?;
            let program = ProgramConfig::new(ObjectId::parse(raw).context("invalid package id")?);
            let rpc = self.rpc_config();
            info!(url = %rpc.url, network = %self.network, "using fullnode");
            (
                LedgerBackend::Rpc(RpcLedgerClient::new(rpc)?.with_program(program.clone())),
                program,
            )
        };

        Ok(LedgerContext::new(Arc::new(backend), program)
            .with_indexer_config(self.indexer_config())
            .with_resolver_config(self.resolver_config()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_help_does_not_panic() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_serve_defaults() {
        let cli = Cli::parse_from(["parkmesh", "--simulate", "serve"]);
        let Commands::Serve(args) = cli.command else {
            unreachable!("expected serve");
        };
        assert!(cli.ledger.simulate);
        assert_eq!(args.bind.port(), crate::config::DEFAULT_PORT);
        assert!(args.api_config().cors_origins.is_empty());
        assert_eq!(cli.ledger.orphan_policy, OrphanPolicy::Cancel);
    }

    #[test]
    fn parse_cors_origins_list() {
        let cli = Cli::parse_from([
            "parkmesh",
            "serve",
            "--cors-origin",
            "http://a.test,http://b.test",
        ]);
        let Commands::Serve(args) = cli.command else {
            unreachable!("expected serve");
        };
        assert_eq!(args.api_config().cors_origins.len(), 2);
    }

    #[test]
    fn parse_query_near_with_negative_coordinates() {
        let cli = Cli::parse_from(["parkmesh", "query", "near", "--lat", "-33.86", "--lng", "151.2"]);
        match cli.command {
            Commands::Query {
                command: QueryCommands::Near { lat, lng, .. },
            } => {
                assert!((lat + 33.86).abs() < 1e-9);
                assert!((lng - 151.2).abs() < 1e-9);
            }
            other => unreachable!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parse_tuning_flags() {
        let cli = Cli::parse_from([
            "parkmesh",
            "--network",
            "devnet",
            "--page-size",
            "50",
            "--max-in-flight",
            "0",
            "--orphan-policy",
            "leave",
            "query",
            "slot",
            "0x1",
        ]);
        assert_eq!(cli.ledger.network, Network::Devnet);
        assert_eq!(cli.ledger.indexer_config().page_size, 50);
        assert_eq!(cli.ledger.resolver_config().max_in_flight, 1);
        assert_eq!(cli.ledger.market_config().orphan_policy, OrphanPolicy::Leave);
    }

    #[test]
    fn rpc_url_overrides_network() {
        let cli = Cli::parse_from(["parkmesh", "--rpc-url", "http://node.test:9000", "query", "slot", "0x1"]);
        assert_eq!(cli.ledger.rpc_config().url, "http://node.test:9000");
    }

    #[tokio::test]
    async fn connect_requires_package_without_simulation() {
        let cli = Cli::parse_from(["parkmesh", "query", "slot", "0x1"]);
        assert!(cli.ledger.connect().await.is_err());
    }

    #[tokio::test]
    async fn connect_simulated_seeds_slots() {
        let cli = Cli::parse_from(["parkmesh", "--simulate", "query", "slot", "0x1"]);
        let ctx = cli.ledger.connect().await.unwrap();
        assert_eq!(ctx.ledger().kind(), "simulated");
    }
}

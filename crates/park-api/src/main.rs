//! parkmesh - parking marketplace API server and query tool.

use std::io::Write;

use anyhow::Context;
use clap::Parser;
use park_core::{Address, GeoPoint, ObjectId, RankMode, RankingCriteria};
use park_market::{Marketplace, SlotQuery};
use serde::Serialize;
use tracing::info;

use park_api::cli::{Cli, Commands, QueryCommands};
use park_api::{ApiServer, AppState, LedgerBackend, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format)?;

    let ctx = cli.ledger.connect().await?;
    let market_config = cli.ledger.market_config();

    match cli.command {
        Commands::Serve(args) => {
            let config = args.api_config();
            let addr = config.bind_addr;
            let server = ApiServer::new(AppState::new(config, ctx, market_config));
            server.serve_with_shutdown(addr, shutdown_signal()).await?;
        }
        Commands::Query { command } => {
            let market = Marketplace::new(ctx, market_config);
            run_query(&market, command).await?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

async fn run_query(market: &Marketplace<LedgerBackend>, command: QueryCommands) -> anyhow::Result<()> {
    match command {
        QueryCommands::Near {
            lat,
            lng,
            radius,
            available_only,
        } => {
            let mut query = SlotQuery::near(GeoPoint::from_degrees(lat, lng)?).available_only(available_only);
            query.radius_m = radius;
            print_json(&market.query_slots_near(&query).await?)
        }
        QueryCommands::Recommend {
            lat,
            lng,
            radius,
            mode,
            max_price,
            limit,
        } => {
            let mut query = SlotQuery::near(GeoPoint::from_degrees(lat, lng)?);
            query.radius_m = radius;
            let mut criteria = RankingCriteria::new(mode.parse::<RankMode>()?);
            if let Some(max_price) = max_price {
                criteria = criteria.with_max_price(max_price);
            }
            if let Some(limit) = limit {
                criteria = criteria.with_limit(limit);
            }
            print_json(&market.recommend_slots(&query, &criteria).await?)
        }
        QueryCommands::Slot { id } => {
            let slot_id = ObjectId::parse(&id).context("invalid slot id")?;
            print_json(&market.get_slot(&slot_id).await?)
        }
        QueryCommands::Quote { id, hours } => {
            let slot_id = ObjectId::parse(&id).context("invalid slot id")?;
            let hours = hours.unwrap_or(market.config().default_quote_hours);
            print_json(&market.quote(&slot_id, hours).await?)
        }
        QueryCommands::Reservations { address } => {
            let user = Address::parse(&address).context("invalid address")?;
            print_json(&market.reservations_for_user(&user).await?)
        }
        QueryCommands::Reputation { address } => {
            let user = Address::parse(&address).context("invalid address")?;
            print_json(&market.owner_reputation(&user).await)
        }
    }
}

//! Keel agent binary.
//!
//! Wires an agent wallet and an execution router to simulated venues, then
//! prints addresses, classifies pairs, quotes, or runs a trade plan. Every
//! execution record is written to stdout as one JSON line.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, warn};

use keel_core::{classify, AssetPair, ChainFamily};
use keel_router::testing::{
    FlatGas, PriceTable, SimulatedBridge, SimulatedBroadcast, SimulatedCrossProtocol, SimulatedSwap,
    StaticBalances,
};
use keel_router::{AgentTask, ExecutionRouter, ProviderSet, QuoteAggregator, RouterConfig, TradePlan};
use keel_wallet::AgentWalletManager;

#[derive(Parser, Debug)]
#[command(name = "keel-agent", version, about = "Multi-chain trading agent against simulated venues")]
struct Args {
    /// TOML configuration file; `KEEL__*` environment variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Recovery phrase for the agent wallet. A fresh one is generated when absent.
    #[arg(long, env = "KEEL_MNEMONIC", hide_env_values = true)]
    phrase: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the agent's address and derivation path per chain family.
    Addresses,
    /// Show the route category of a pair.
    Classify {
        /// Source asset, e.g. `ETH` or `USDC@137`
        src: String,
        /// Destination asset
        dst: String,
    },
    /// Quote a trade without executing it.
    Quote {
        src: String,
        dst: String,
        amount: Decimal,
    },
    /// Execute a trade plan, one step per interval.
    Run {
        /// Steps as `SRC/DST:AMOUNT`, e.g. `ETH/USDC:0.5`
        #[arg(required = true, value_parser = parse_step)]
        steps: Vec<TradePlan>,

        /// Milliseconds between steps
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}

fn parse_step(s: &str) -> Result<TradePlan, String> {
    let (pair, amount) = s
        .split_once(':')
        .ok_or_else(|| format!("expected SRC/DST:AMOUNT, got {s:?}"))?;
    let (src, dst) = pair
        .split_once('/')
        .ok_or_else(|| format!("expected SRC/DST, got {pair:?}"))?;
    let pair = AssetPair::parse(src, dst)?;
    let amount: Decimal = amount.parse().map_err(|e| format!("amount {amount:?}: {e}"))?;
    Ok(TradePlan::new(pair, amount))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format);

    let config = RouterConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    info!(
        provider_timeout_ms = config.provider_timeout_ms,
        status_timeout_ms = config.status_timeout_ms,
        builders = ?config.protection.builders,
        "Keel agent v{}",
        env!("CARGO_PKG_VERSION")
    );

    if let Command::Classify { src, dst } = &args.command {
        let pair = AssetPair::parse(src, dst).map_err(anyhow::Error::msg)?;
        println!("{pair}: {}", classify(&pair));
        return Ok(());
    }

    let router = build_router(&config, args.phrase.as_deref())?;

    match args.command {
        Command::Classify { .. } => {}
        Command::Addresses => {
            for wallet in router.wallets().cached_wallets()? {
                println!("{:<5} {} {}", wallet.chain_family, wallet.address, wallet.derivation_path);
            }
        }
        Command::Quote { src, dst, amount } => {
            let pair = AssetPair::parse(&src, &dst).map_err(anyhow::Error::msg)?;
            let quote = router
                .quote(&pair, amount)
                .await
                .with_context(|| format!("no quote for {pair}"))?;
            println!("{}", serde_json::to_string_pretty(&*quote)?);
        }
        Command::Run { steps, interval_ms } => run(router, steps, Duration::from_millis(interval_ms)).await?,
    }
    Ok(())
}

/// Router over simulated venues with the configured timeouts and capital.
fn build_router(config: &RouterConfig, phrase: Option<&str>) -> Result<ExecutionRouter> {
    let balances = Arc::new(StaticBalances::new());
    let wallets = match phrase {
        Some(phrase) => AgentWalletManager::from_phrase(phrase, balances).context("invalid recovery phrase")?,
        None => {
            warn!("no recovery phrase supplied; using a fresh wallet for this run only");
            AgentWalletManager::generate(balances)
        }
    };
    let wallets = Arc::new(wallets);

    let prices = PriceTable::default();
    let providers = ProviderSet::new()
        .with_swap(Arc::new(SimulatedSwap::new(prices.clone())))
        .with_swap_fallback(Arc::new(SimulatedSwap::new(prices.clone()).with_fee_bps(60)))
        .with_bridge(Arc::new(SimulatedBridge::new(prices.clone())))
        .with_cross_protocol(Arc::new(SimulatedCrossProtocol::new(prices)))
        .with_gas(Arc::new(FlatGas::new(Decimal::new(21, 4))));
    let quotes = Arc::new(QuoteAggregator::new(providers, config.provider_timeout()));

    let router = ExecutionRouter::new(config, wallets, quotes, Arc::new(SimulatedBroadcast::new()))
        .context("failed to build router")?;
    info!(
        evm = %router.wallets().address(ChainFamily::Evm)?,
        utxo = %router.wallets().address(ChainFamily::Utxo)?,
        relay_auth = %router.protection().auth_address(),
        "agent wallets ready"
    );
    Ok(router)
}

async fn run(router: ExecutionRouter, steps: Vec<TradePlan>, interval: Duration) -> Result<()> {
    let total = steps.len();
    let handle = AgentTask::spawn(router.clone(), steps, interval);
    tokio::select! {
        _ = handle.done() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, cancelling agent");
            handle.cancel();
        }
    }

    let results = handle.join().await;
    let mut failures = 0;
    for result in &results {
        match result {
            Ok(record) => println!("{}", serde_json::to_string(&**record)?),
            Err(e) => {
                failures += 1;
                warn!(error = %e, "step failed");
            }
        }
    }
    // Failed executions have records too; print those.
    for record in router.records().iter().filter(|r| !r.success) {
        println!("{}", serde_json::to_string(&**record)?);
    }
    info!(steps = total, ran = results.len(), failures, "plan finished");
    for (asset, amount) in router.ledger().snapshot() {
        info!(asset = %asset, amount = %amount, "capital");
    }
    if failures == results.len() && !results.is_empty() {
        bail!("every step failed");
    }
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// `RUST_LOG` takes precedence over `level`. Pass `format = "json"` for
/// structured JSON output; any other value gives human-readable text.
fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}

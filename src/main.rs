use clap::Parser;
use paperbroker::config::SimulatorConfig;
use paperbroker::domain::money::Money;
use paperbroker::domain::order::{Order, Side, Variety};
use paperbroker::domain::ports::BrokerGateway;
use paperbroker::infrastructure::paper_broker::PaperBroker;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage directory for the ledger (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Starting capital (overrides the config file)
    #[arg(long)]
    capital: Option<Decimal>,

    /// Wipe persisted state before the session
    #[arg(long)]
    reset: bool,
}

fn load_config(cli: &Cli) -> anyhow::Result<SimulatorConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            toml::from_str(&text)?
        }
        None => SimulatorConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.storage_path = dir.clone();
    }
    if let Some(capital) = cli.capital {
        config.initial_capital = capital;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    info!("Starting paper broker session at {:?}", config.storage_path);
    let schedule = paperbroker::application::charges::ChargeSchedule::new(config.charges.clone());
    info!("Charge schedule: {}", schedule.description());
    let broker = PaperBroker::new(config)?;
    if cli.reset {
        broker.reset()?;
    }
    broker.connect().await?;

    // A short demo session against pinned mock prices.
    broker.set_price("INFY", Money::from(1450));
    broker.set_price("TCS", Money::from(3300));

    let buy_id = broker
        .place_order(Order::market("INFY", dec!(10), Side::Buy)?)
        .await?;
    info!(
        "Market buy {} -> {:?}",
        buy_id,
        broker.get_order(&buy_id).await?.map(|o| o.status)
    );

    // Limit sell above the market; stays open until the price moves.
    let sell_id = broker
        .place_order(Order::limit("INFY", dec!(5), Side::Sell, Money::from(1500))?)
        .await?;
    broker.set_price("INFY", Money::from(1510));
    let filled = broker.process_pending_orders().await?;
    info!(
        "Pending pass filled {} order(s); limit sell {} -> {:?}",
        filled,
        sell_id,
        broker.get_order(&sell_id).await?.map(|o| o.status)
    );

    // An after-market order queues for the next session.
    let amo_id = broker
        .place_order(
            Order::market("TCS", dec!(2), Side::Buy)?.with_variety(Variety::Amo),
        )
        .await?;
    info!(
        "AMO {} queued -> {:?}",
        amo_id,
        broker.get_order(&amo_id).await?.map(|o| o.status)
    );

    let limits = broker.get_account_limits().await?;
    info!(
        "Cash {}, collateral {}, margin available {}",
        limits.available_cash, limits.collateral, limits.margin_available
    );
    let stats = broker.ledger_stats();
    info!(
        "{} orders ({} pending), {} transactions, charges {}, realized P&L {}",
        stats.total_orders,
        stats.pending_orders,
        stats.total_transactions,
        stats.total_charges,
        stats.realized_pnl
    );

    broker.disconnect().await?;
    Ok(())
}

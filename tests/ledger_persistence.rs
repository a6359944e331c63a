use paperbroker::config::SimulatorConfig;
use paperbroker::domain::money::Money;
use paperbroker::domain::order::{Order, OrderStatus, Side};
use paperbroker::domain::ports::BrokerGateway;
use paperbroker::infrastructure::paper_broker::PaperBroker;
use rust_decimal_macros::dec;
use std::path::PathBuf;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

fn session_config(dir: &PathBuf) -> SimulatorConfig {
    let mut config = SimulatorConfig::instant(dir.clone());
    config.initial_capital = dec!(100_000);
    config
}

fn temp_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("paperbroker-{tag}-{}", uuid::Uuid::new_v4()))
}

#[tokio::test]
async fn test_state_survives_across_sessions() -> anyhow::Result<()> {
    init_logging();
    let dir = temp_dir("sessions");

    // session 1: buy and disconnect
    {
        let broker = PaperBroker::new(session_config(&dir))?;
        broker.connect().await?;
        broker.set_price("INFY", Money::from(1450));
        broker
            .place_order(Order::market("INFY", dec!(10), Side::Buy)?)
            .await?;
        broker.disconnect().await?;
    }

    // session 2: everything rehydrates from disk
    let broker = PaperBroker::new(session_config(&dir))?;
    broker.connect().await?;
    broker.set_price("INFY", Money::from(1500));

    assert_eq!(broker.get_available_balance().await?, Money::from(85_500));
    let holding = broker.get_holding("INFY").await?.expect("rehydrated");
    assert_eq!(holding.quantity, dec!(10));
    assert_eq!(holding.average_price, Money::from(1450));
    assert_eq!(broker.get_all_orders().await?.len(), 1);

    // the rehydrated holding can be sold against
    let id = broker
        .place_order(Order::market("INFY", dec!(10), Side::Sell)?)
        .await?;
    assert_eq!(
        broker.get_order(&id).await?.unwrap().status,
        OrderStatus::Complete
    );
    assert_eq!(broker.get_available_balance().await?, Money::from(100_500));
    assert_eq!(broker.ledger_stats().realized_pnl, Money::from(500));

    std::fs::remove_dir_all(dir).ok();
    Ok(())
}

#[tokio::test]
async fn test_open_orders_survive_and_fill_next_session() -> anyhow::Result<()> {
    init_logging();
    let dir = temp_dir("open-orders");

    let id = {
        let broker = PaperBroker::new(session_config(&dir))?;
        broker.connect().await?;
        broker.set_price("INFY", Money::from(1450));
        let id = broker
            .place_order(Order::limit("INFY", dec!(10), Side::Buy, Money::from(1400))?)
            .await?;
        broker.disconnect().await?;
        id
    };

    let broker = PaperBroker::new(session_config(&dir))?;
    broker.connect().await?;
    assert_eq!(broker.get_pending_orders().await?.len(), 1);

    broker.set_price("INFY", Money::from(1390));
    assert_eq!(broker.process_pending_orders().await?, 1);
    let order = broker.get_order(&id).await?.unwrap();
    assert_eq!(order.status, OrderStatus::Complete);
    assert_eq!(order.executed_price, Some(Money::from(1400)));

    std::fs::remove_dir_all(dir).ok();
    Ok(())
}

#[tokio::test]
async fn test_backup_restore_round_trip_at_broker_level() -> anyhow::Result<()> {
    init_logging();
    let dir = temp_dir("backup");
    let broker = PaperBroker::new(session_config(&dir))?;
    broker.connect().await?;
    broker.set_price("INFY", Money::from(1450));
    broker
        .place_order(Order::market("INFY", dec!(10), Side::Buy)?)
        .await?;

    let backup = broker.backup()?;

    broker.reset()?;
    assert_eq!(broker.get_available_balance().await?, Money::from(100_000));
    assert!(broker.get_holding("INFY").await?.is_none());

    broker.restore(&backup)?;
    assert_eq!(broker.get_available_balance().await?, Money::from(85_500));
    let holding = broker.get_holding("INFY").await?.expect("restored");
    assert_eq!(holding.quantity, dec!(10));

    std::fs::remove_dir_all(dir).ok();
    Ok(())
}

#[tokio::test]
async fn test_reset_clears_portfolio_and_ledger() -> anyhow::Result<()> {
    init_logging();
    let dir = temp_dir("reset");
    let broker = PaperBroker::new(session_config(&dir))?;
    broker.connect().await?;
    broker.set_price("INFY", Money::from(1450));
    broker
        .place_order(Order::market("INFY", dec!(10), Side::Buy)?)
        .await?;

    broker.reset()?;
    assert_eq!(broker.get_available_balance().await?, Money::from(100_000));
    assert!(broker.get_all_orders().await?.is_empty());
    assert_eq!(broker.ledger_stats().total_transactions, 0);
    // a fresh sell finds nothing to sell
    let id = broker
        .place_order(Order::market("INFY", dec!(1), Side::Sell)?)
        .await?;
    assert_eq!(
        broker.get_order(&id).await?.unwrap().status,
        OrderStatus::Rejected
    );

    std::fs::remove_dir_all(dir).ok();
    Ok(())
}

use crate::application::portfolio::PortfolioManager;
use crate::application::simulator::{ExecutionDecision, OrderSimulator};
use crate::config::{PriceSourceMode, SimulatorConfig};
use crate::domain::account::{Holding, Transaction};
use crate::domain::errors::BrokerError;
use crate::domain::money::Money;
use crate::domain::order::{Order, OrderStatus, Side};
use crate::domain::ports::{AccountLimits, BrokerGateway, QuoteSource};
use crate::infrastructure::ledger::{Ledger, LedgerStats};
use crate::infrastructure::price_provider::PriceProvider;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, NaiveTime};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};
use uuid::Uuid;

/// Simulated broker: the one gateway callers talk to.
///
/// Composes the price provider, order simulator, portfolio manager and
/// ledger behind the `BrokerGateway` contract. Each component guards its
/// own state, so order flow on one symbol never blocks price lookups or
/// reads on another component.
pub struct PaperBroker {
    config: SimulatorConfig,
    prices: Arc<PriceProvider>,
    simulator: OrderSimulator,
    portfolio: PortfolioManager,
    ledger: Ledger,
    connected: AtomicBool,
}

impl PaperBroker {
    /// Build a broker backed by the mock quote source.
    pub fn new(config: SimulatorConfig) -> Result<Self> {
        if config.price_source == PriceSourceMode::Live {
            warn!("Live price source configured without quote sources, using mock");
        }
        let prices = Arc::new(PriceProvider::mock(config.price_cache_ttl_secs));
        Self::assemble(config, prices)
    }

    /// Build a broker that resolves prices from live collaborators,
    /// degrading to the mock source when they fail.
    pub fn with_quote_sources(
        config: SimulatorConfig,
        primary: Arc<dyn QuoteSource>,
        secondary: Option<Arc<dyn QuoteSource>>,
    ) -> Result<Self> {
        let prices = Arc::new(PriceProvider::live(
            primary,
            secondary,
            config.price_cache_ttl_secs,
        ));
        Self::assemble(config, prices)
    }

    fn assemble(config: SimulatorConfig, prices: Arc<PriceProvider>) -> Result<Self> {
        let ledger = Ledger::open(&config).map_err(BrokerError::Storage)?;
        let simulator = OrderSimulator::new(config.clone(), prices.clone());
        Ok(Self {
            config,
            prices,
            simulator,
            portfolio: PortfolioManager::new(),
            ledger,
            connected: AtomicBool::new(false),
        })
    }

    /// Pin a mock price; demo/test hook.
    pub fn set_price(&self, symbol: &str, price: Money) {
        self.prices.set_price(symbol, price);
    }

    pub fn clear_price_cache(&self) {
        self.prices.clear_cache();
    }

    pub fn ledger_stats(&self) -> LedgerStats {
        self.ledger.stats()
    }

    pub fn backup(&self) -> Result<PathBuf> {
        self.ledger.backup()
    }

    pub fn restore(&self, backup_dir: &std::path::Path) -> Result<()> {
        self.ledger.restore(backup_dir)?;
        self.rehydrate();
        Ok(())
    }

    /// Wipe the ledger and the in-memory portfolio back to a fresh account.
    pub fn reset(&self) -> Result<()> {
        self.ledger.reset()?;
        self.rehydrate();
        Ok(())
    }

    /// Re-check every active order against the current price and clock:
    /// OPEN limit orders whose condition now holds and AMO orders past the
    /// execution time fill here. Returns how many orders filled.
    pub async fn process_pending_orders(&self) -> Result<usize> {
        self.process_pending_orders_at(Local::now().time()).await
    }

    /// Clock-injected variant of `process_pending_orders`.
    pub async fn process_pending_orders_at(&self, now: NaiveTime) -> Result<usize> {
        self.ensure_connected()?;
        let mut filled = 0;
        for mut order in self.ledger.pending_orders() {
            if !matches!(
                order.status,
                OrderStatus::Open | OrderStatus::PartiallyFilled
            ) {
                continue;
            }
            if self.run_execution_cycle(&mut order, now).await? {
                filled += 1;
            }
        }
        if filled > 0 {
            info!("Pending-order pass filled {} order(s)", filled);
        }
        Ok(filled)
    }

    fn ensure_connected(&self) -> Result<(), BrokerError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }

    fn rehydrate(&self) {
        let account = self.ledger.account();
        self.portfolio
            .rehydrate(self.ledger.holdings(), account.realized_pnl);
    }

    fn generate_order_id() -> String {
        let raw = Uuid::new_v4().simple().to_string();
        format!("PB{}", &raw[..12].to_ascii_uppercase())
    }

    /// One simulation cycle for one order: decide, then settle or record
    /// the non-execution. Returns whether the order filled.
    async fn run_execution_cycle(&self, order: &mut Order, now: NaiveTime) -> Result<bool> {
        // Sells need an adequate holding before anything else; real brokers
        // reject these rather than erroring.
        if order.side == Side::Sell
            && !self
                .portfolio
                .can_sell(&order.symbol, order.remaining_quantity())
        {
            let held = self
                .portfolio
                .holding(&order.symbol)
                .map(|h| h.quantity)
                .unwrap_or_default();
            let reason = format!(
                "insufficient holding for {}: requested {}, held {}",
                order.symbol,
                order.remaining_quantity(),
                held
            );
            return self.reject_order(order, &reason);
        }

        match self.simulator.decide(order, now).await {
            ExecutionDecision::Fill { price } => self.settle_fill(order, price).await,
            ExecutionDecision::Defer { reason } => {
                info!(
                    "Order {} stays open: {}",
                    order.order_id.as_deref().unwrap_or("?"),
                    reason
                );
                order.remarks = reason;
                self.ledger.update_order(order)?;
                Ok(false)
            }
            ExecutionDecision::Reject { reason } => self.reject_order(order, &reason),
        }
    }

    fn reject_order(&self, order: &mut Order, reason: &str) -> Result<bool> {
        warn!(
            "Order {} rejected: {}",
            order.order_id.as_deref().unwrap_or("?"),
            reason
        );
        order.reject(reason)?;
        self.ledger.update_order(order)?;
        Ok(false)
    }

    /// Apply one full fill: mutate the portfolio, move cash including
    /// charges, write the transaction and persist the updated order.
    async fn settle_fill(&self, order: &mut Order, price: Money) -> Result<bool> {
        let quantity = order.remaining_quantity();
        let value = price.times(quantity);
        let charges = self.simulator.charges().charges_on(value, order.side);
        let account = self.ledger.account();

        if let Some(reason) = self
            .simulator
            .validate_order_value(value, account.available_cash, order.side)
        {
            return self.reject_order(order, &reason);
        }

        match order.side {
            Side::Buy => {
                let cap = Money::new(self.config.max_portfolio_value);
                if self.portfolio.calculate_portfolio_value() + value > cap {
                    let reason = format!(
                        "buy of {} would exceed max portfolio value {}",
                        value, cap
                    );
                    return self.reject_order(order, &reason);
                }

                order.execute(price, quantity, None)?;
                let holding =
                    self.portfolio
                        .add_holding(&order.symbol, quantity, price, order.exchange);

                // In-memory execution is done; a storage failure from here
                // on is surfaced to the caller, not rolled back.
                self.ledger.upsert_holding(&holding)?;
                self.ledger.update_account(|a| {
                    a.available_cash -= value + charges;
                })?;
                self.ledger
                    .append_transaction(&Transaction::buy(&order.symbol, quantity, price, charges))?;
            }
            Side::Sell => {
                // entry price comes out of the same critical section as the
                // reduction, so the recorded basis can never go stale
                let reduction =
                    match self.portfolio.reduce_holding(&order.symbol, quantity, price) {
                        Ok(reduction) => reduction,
                        Err(e) => return self.reject_order(order, &e.to_string()),
                    };

                order.execute(price, quantity, None)?;
                match reduction.remaining {
                    Some(holding) => self.ledger.upsert_holding(&holding)?,
                    None => self.ledger.remove_holding(&order.symbol)?,
                }
                self.ledger.update_account(|a| {
                    a.available_cash += value - charges;
                    a.realized_pnl += reduction.realized_pnl;
                })?;
                self.ledger.append_transaction(&Transaction::sell(
                    &order.symbol,
                    quantity,
                    reduction.entry_price,
                    price,
                    charges,
                    reduction.realized_pnl,
                ))?;
            }
        }

        self.ledger.update_order(order)?;
        info!(
            "Order {} {} {} x {} filled @ {} (charges {})",
            order.order_id.as_deref().unwrap_or("?"),
            order.side,
            order.symbol,
            quantity,
            price,
            charges
        );
        Ok(true)
    }
}

#[async_trait]
impl BrokerGateway for PaperBroker {
    /// Idempotent; loads durable state into the portfolio manager.
    async fn connect(&self) -> Result<bool> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Ok(true);
        }
        self.rehydrate();
        info!(
            "Paper broker connected: cash {}, {} holding(s)",
            self.ledger.account().available_cash,
            self.ledger.holdings().len()
        );
        Ok(true)
    }

    /// Idempotent; flushes every collection before dropping the session.
    async fn disconnect(&self) -> Result<bool> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(true);
        }
        self.ledger.save_all()?;
        info!("Paper broker disconnected");
        Ok(true)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn place_order(&self, order: Order) -> Result<String> {
        self.ensure_connected()?;
        let mut order = order;
        order.validate().map_err(BrokerError::Validation)?;

        let order_id = Self::generate_order_id();
        order
            .place(order_id.clone())
            .map_err(BrokerError::Validation)?;
        self.ledger.record_order(&order)?;
        info!(
            "Order {} placed: {} {} {} x {}",
            order_id, order.variety, order.side, order.symbol, order.quantity
        );

        if order.is_amo() {
            // Queued for the next AMO window; the pending pass executes it
            // at whatever the price is then.
            return Ok(order_id);
        }

        self.run_execution_cycle(&mut order, Local::now().time())
            .await?;
        Ok(order_id)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool> {
        self.ensure_connected()?;
        let Some(mut order) = self.ledger.order(order_id) else {
            warn!("Cancel requested for unknown order {}", order_id);
            return Ok(false);
        };
        if !matches!(order.status, OrderStatus::Pending | OrderStatus::Open) {
            return Ok(false);
        }
        order.cancel(None)?;
        self.ledger.update_order(&order)?;
        info!("Order {} cancelled", order_id);
        Ok(true)
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        self.ensure_connected()?;
        Ok(self.ledger.order(order_id))
    }

    async fn get_all_orders(&self) -> Result<Vec<Order>> {
        self.ensure_connected()?;
        Ok(self.ledger.orders())
    }

    async fn get_pending_orders(&self) -> Result<Vec<Order>> {
        self.ensure_connected()?;
        Ok(self.ledger.pending_orders())
    }

    async fn search_orders_by_symbol(&self, symbol: &str) -> Result<Vec<Order>> {
        self.ensure_connected()?;
        Ok(self.ledger.orders_for_symbol(symbol))
    }

    /// Cancel every still-active BUY for the symbol, e.g. before a queued
    /// AMO adjustment replaces them. Returns how many were cancelled.
    async fn cancel_pending_buys_for_symbol(&self, symbol: &str) -> Result<usize> {
        self.ensure_connected()?;
        let symbol = symbol.to_ascii_uppercase();
        let mut cancelled = 0;
        for mut order in self.ledger.pending_orders() {
            if order.symbol != symbol || order.side != Side::Buy {
                continue;
            }
            if !matches!(order.status, OrderStatus::Pending | OrderStatus::Open) {
                continue;
            }
            order.cancel(None)?;
            self.ledger.update_order(&order)?;
            cancelled += 1;
        }
        if cancelled > 0 {
            info!("Cancelled {} pending buy(s) for {}", cancelled, symbol);
        }
        Ok(cancelled)
    }

    /// Holdings with marks refreshed from the price provider.
    async fn get_holdings(&self) -> Result<Vec<Holding>> {
        self.ensure_connected()?;
        let symbols: Vec<String> = self
            .portfolio
            .holdings()
            .into_iter()
            .map(|h| h.symbol)
            .collect();
        let prices = self.prices.get_prices(&symbols).await;
        for (symbol, price) in &prices {
            self.portfolio.refresh_price(symbol, *price);
        }
        Ok(self.portfolio.holdings())
    }

    async fn get_holding(&self, symbol: &str) -> Result<Option<Holding>> {
        self.ensure_connected()?;
        let symbol = symbol.to_ascii_uppercase();
        if let Some(price) = self.prices.get_price(&symbol).await {
            self.portfolio.refresh_price(&symbol, price);
        }
        Ok(self.portfolio.holding(&symbol))
    }

    async fn get_account_limits(&self) -> Result<AccountLimits> {
        self.ensure_connected()?;
        // refresh marks so collateral reflects current prices
        let _ = self.get_holdings().await?;
        let account = self.ledger.account();
        let collateral = self.portfolio.calculate_portfolio_value();
        let unrealized = self.portfolio.calculate_unrealized_pnl();
        self.ledger
            .update_account(|a| a.unrealized_pnl = unrealized)?;
        Ok(AccountLimits {
            available_cash: account.available_cash,
            margin_used: account.margin_used,
            margin_available: account.available_cash - account.margin_used,
            collateral,
        })
    }

    async fn get_available_balance(&self) -> Result<Money> {
        self.ensure_connected()?;
        Ok(self.ledger.account().available_cash)
    }
}

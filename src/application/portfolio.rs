use crate::domain::account::Holding;
use crate::domain::errors::PortfolioError;
use crate::domain::money::Money;
use crate::domain::order::Exchange;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct PortfolioState {
    holdings: HashMap<String, Holding>,
    realized_pnl: Money,
}

/// Outcome of one sell reduction.
#[derive(Debug)]
pub struct Reduction {
    /// What is left of the holding; `None` once fully closed.
    pub remaining: Option<Holding>,
    pub realized_pnl: Money,
    /// Average price the slice was carried at before the reduction.
    pub entry_price: Money,
}

/// Owns the in-memory holding set and the running realized-P&L
/// accumulator for one engine session.
///
/// All mutation goes through one internal mutex, so concurrent order
/// executions against the same symbol can never interleave a partial
/// re-average or quantity update.
#[derive(Debug, Default)]
pub struct PortfolioManager {
    state: Mutex<PortfolioState>,
}

impl PortfolioManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace in-memory state with what the ledger holds. Called at
    /// connect, before any order flows.
    pub fn rehydrate(&self, holdings: Vec<Holding>, realized_pnl: Money) {
        let mut state = self.state.lock().unwrap();
        state.holdings = holdings
            .into_iter()
            .map(|h| (h.symbol.clone(), h))
            .collect();
        state.realized_pnl = realized_pnl;
    }

    /// Record a buy fill: extend an existing holding with a re-averaged
    /// cost basis, or open a new one. Returns the resulting holding.
    pub fn add_holding(
        &self,
        symbol: &str,
        quantity: Decimal,
        price: Money,
        exchange: Exchange,
    ) -> Holding {
        let mut state = self.state.lock().unwrap();
        let holding = state
            .holdings
            .entry(symbol.to_string())
            .and_modify(|h| {
                let total_qty = h.quantity + quantity;
                let total_cost = h.cost_basis() + price.times(quantity);
                h.average_price = total_cost
                    .per_unit(total_qty)
                    .expect("buy fill quantity is positive");
                h.quantity = total_qty;
                h.last_price = price;
                h.updated_at = Utc::now();
            })
            .or_insert_with(|| Holding::new(symbol, exchange, quantity, price));
        debug!(
            "Holding {} now {} @ avg {}",
            symbol, holding.quantity, holding.average_price
        );
        holding.clone()
    }

    /// Record a sell fill. The entry price is captured in the same critical
    /// section as the mutation, so a concurrent buy can never slip a
    /// re-averaged basis between the read and the reduction.
    pub fn reduce_holding(
        &self,
        symbol: &str,
        quantity: Decimal,
        sale_price: Money,
    ) -> Result<Reduction, PortfolioError> {
        let mut state = self.state.lock().unwrap();
        let holding = state
            .holdings
            .get_mut(symbol)
            .ok_or_else(|| PortfolioError::HoldingNotFound {
                symbol: symbol.to_string(),
            })?;
        if quantity > holding.quantity {
            return Err(PortfolioError::InsufficientHolding {
                symbol: symbol.to_string(),
                requested: quantity,
                held: holding.quantity,
            });
        }

        let entry_price = holding.average_price;
        let realized = (sale_price - entry_price).times(quantity);
        holding.quantity -= quantity;
        holding.last_price = sale_price;
        holding.updated_at = Utc::now();

        let remaining = if holding.quantity.is_zero() {
            state.holdings.remove(symbol);
            None
        } else {
            Some(holding.clone())
        };
        state.realized_pnl += realized;
        debug!("Reduced {} by {}, realized {}", symbol, quantity, realized);
        Ok(Reduction {
            remaining,
            realized_pnl: realized,
            entry_price,
        })
    }

    /// Pure check: would a sell of this size succeed?
    pub fn can_sell(&self, symbol: &str, quantity: Decimal) -> bool {
        let state = self.state.lock().unwrap();
        state
            .holdings
            .get(symbol)
            .is_some_and(|h| h.quantity >= quantity)
    }

    pub fn holding(&self, symbol: &str) -> Option<Holding> {
        self.state.lock().unwrap().holdings.get(symbol).cloned()
    }

    pub fn holdings(&self) -> Vec<Holding> {
        let state = self.state.lock().unwrap();
        let mut all: Vec<Holding> = state.holdings.values().cloned().collect();
        all.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        all
    }

    /// Refresh the mark price used by the aggregate calculations.
    pub fn refresh_price(&self, symbol: &str, price: Money) {
        let mut state = self.state.lock().unwrap();
        if let Some(h) = state.holdings.get_mut(symbol) {
            h.last_price = price;
            h.updated_at = Utc::now();
        }
    }

    pub fn realized_pnl(&self) -> Money {
        self.state.lock().unwrap().realized_pnl
    }

    pub fn calculate_unrealized_pnl(&self) -> Money {
        let state = self.state.lock().unwrap();
        state.holdings.values().map(|h| h.unrealized_pnl()).sum()
    }

    pub fn calculate_portfolio_value(&self) -> Money {
        let state = self.state.lock().unwrap();
        state.holdings.values().map(|h| h.market_value()).sum()
    }

    pub fn calculate_cost_basis(&self) -> Money {
        let state = self.state.lock().unwrap();
        state.holdings.values().map(|h| h.cost_basis()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_buy_then_buy_reaverages() {
        let pm = PortfolioManager::new();
        pm.add_holding("INFY", dec!(10), Money::from(1450), Exchange::Nse);
        let h = pm.add_holding("INFY", dec!(10), Money::from(1550), Exchange::Nse);
        assert_eq!(h.quantity, dec!(20));
        assert_eq!(h.average_price, Money::from(1500));
    }

    #[test]
    fn test_weighted_average_is_commutative() {
        let a = PortfolioManager::new();
        a.add_holding("TCS", dec!(3), Money::from(3200), Exchange::Nse);
        a.add_holding("TCS", dec!(7), Money::from(3350), Exchange::Nse);

        let b = PortfolioManager::new();
        b.add_holding("TCS", dec!(7), Money::from(3350), Exchange::Nse);
        b.add_holding("TCS", dec!(3), Money::from(3200), Exchange::Nse);

        let ha = a.holding("TCS").unwrap();
        let hb = b.holding("TCS").unwrap();
        assert_eq!(ha.quantity, hb.quantity);
        assert_eq!(ha.average_price, hb.average_price);
    }

    #[test]
    fn test_round_trip_realizes_price_difference() {
        let pm = PortfolioManager::new();
        pm.add_holding("INFY", dec!(10), Money::from(1450), Exchange::Nse);
        let reduction = pm
            .reduce_holding("INFY", dec!(10), Money::from(1500))
            .unwrap();
        assert!(reduction.remaining.is_none());
        assert_eq!(reduction.realized_pnl, Money::from(500));
        assert!(pm.holding("INFY").is_none());
        assert_eq!(pm.realized_pnl(), Money::from(500));
    }

    #[test]
    fn test_partial_sell_keeps_average() {
        let pm = PortfolioManager::new();
        pm.add_holding("INFY", dec!(10), Money::from(1450), Exchange::Nse);
        let reduction = pm
            .reduce_holding("INFY", dec!(5), Money::from(1500))
            .unwrap();
        let h = reduction.remaining.unwrap();
        assert_eq!(h.quantity, dec!(5));
        assert_eq!(h.average_price, Money::from(1450)); // sells never touch the basis
        assert_eq!(reduction.realized_pnl, Money::from(250));
    }

    #[test]
    fn test_reduction_reports_basis_at_time_of_sale() {
        let pm = PortfolioManager::new();
        pm.add_holding("INFY", dec!(10), Money::from(1400), Exchange::Nse);
        pm.add_holding("INFY", dec!(10), Money::from(1500), Exchange::Nse);

        let reduction = pm
            .reduce_holding("INFY", dec!(5), Money::from(1600))
            .unwrap();
        assert_eq!(reduction.entry_price, Money::from(1450));

        // a later buy re-averages; the next sale reports the new basis
        pm.add_holding("INFY", dec!(15), Money::from(1650), Exchange::Nse);
        let reduction = pm
            .reduce_holding("INFY", dec!(5), Money::from(1600))
            .unwrap();
        assert_eq!(reduction.entry_price, Money::from(1550));
    }

    #[test]
    fn test_oversell_fails_without_mutation() {
        let pm = PortfolioManager::new();
        pm.add_holding("INFY", dec!(5), Money::from(1450), Exchange::Nse);
        let err = pm
            .reduce_holding("INFY", dec!(6), Money::from(1500))
            .unwrap_err();
        assert!(matches!(err, PortfolioError::InsufficientHolding { .. }));
        assert_eq!(pm.holding("INFY").unwrap().quantity, dec!(5));
        assert_eq!(pm.realized_pnl(), Money::zero());
    }

    #[test]
    fn test_can_sell_is_pure() {
        let pm = PortfolioManager::new();
        assert!(!pm.can_sell("INFY", dec!(1)));
        pm.add_holding("INFY", dec!(5), Money::from(1450), Exchange::Nse);
        assert!(pm.can_sell("INFY", dec!(5)));
        assert!(!pm.can_sell("INFY", dec!(6)));
        assert_eq!(pm.holding("INFY").unwrap().quantity, dec!(5));
    }

    #[test]
    fn test_aggregates() {
        let pm = PortfolioManager::new();
        pm.add_holding("INFY", dec!(10), Money::from(1450), Exchange::Nse);
        pm.add_holding("TCS", dec!(2), Money::from(3300), Exchange::Nse);
        pm.refresh_price("INFY", Money::from(1500));
        assert_eq!(pm.calculate_cost_basis(), Money::from(21_100));
        assert_eq!(pm.calculate_portfolio_value(), Money::from(21_600));
        assert_eq!(pm.calculate_unrealized_pnl(), Money::from(500));
    }

    #[test]
    fn test_rehydrate_replaces_state() {
        let pm = PortfolioManager::new();
        pm.add_holding("OLD", dec!(1), Money::from(10), Exchange::Nse);
        pm.rehydrate(
            vec![Holding::new("INFY", Exchange::Nse, dec!(4), Money::from(1400))],
            Money::from(120),
        );
        assert!(pm.holding("OLD").is_none());
        assert_eq!(pm.holding("INFY").unwrap().quantity, dec!(4));
        assert_eq!(pm.realized_pnl(), Money::from(120));
    }
}

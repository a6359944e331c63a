use crate::domain::money::Money;
use crate::domain::order::{Exchange, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The single account record behind one paper portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Immutable after creation.
    pub initial_capital: Money,
    pub available_cash: Money,
    pub margin_used: Money,
    pub realized_pnl: Money,
    pub unrealized_pnl: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(initial_capital: Money) -> Self {
        let now = Utc::now();
        Self {
            initial_capital,
            available_cash: initial_capital,
            margin_used: Money::zero(),
            realized_pnl: Money::zero(),
            unrealized_pnl: Money::zero(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// One symbol's position within the portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub exchange: Exchange,
    pub quantity: Decimal,
    /// Quantity-weighted mean of all buy fills since the holding was last
    /// fully closed.
    pub average_price: Money,
    /// Latest mark, refreshed from the price provider.
    pub last_price: Money,
    pub updated_at: DateTime<Utc>,
}

impl Holding {
    pub fn new(symbol: &str, exchange: Exchange, quantity: Decimal, price: Money) -> Self {
        Self {
            symbol: symbol.to_string(),
            exchange,
            quantity,
            average_price: price,
            last_price: price,
            updated_at: Utc::now(),
        }
    }

    pub fn cost_basis(&self) -> Money {
        self.average_price.times(self.quantity)
    }

    pub fn market_value(&self) -> Money {
        self.last_price.times(self.quantity)
    }

    pub fn unrealized_pnl(&self) -> Money {
        self.market_value() - self.cost_basis()
    }
}

/// Append-only record of one executed fill. Never mutated once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Money,
    pub order_value: Money,
    pub charges: Money,
    pub timestamp: DateTime<Utc>,
    // Sell-side fields: realized result against the cost basis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_price: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_price: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realized_pnl: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnl_pct: Option<Decimal>,
}

impl Transaction {
    pub fn buy(symbol: &str, quantity: Decimal, price: Money, charges: Money) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: Side::Buy,
            quantity,
            price,
            order_value: price.times(quantity),
            charges,
            timestamp: Utc::now(),
            entry_price: None,
            exit_price: None,
            realized_pnl: None,
            pnl_pct: None,
        }
    }

    pub fn sell(
        symbol: &str,
        quantity: Decimal,
        entry_price: Money,
        exit_price: Money,
        charges: Money,
        realized_pnl: Money,
    ) -> Self {
        let pnl_pct = if entry_price.is_zero() {
            None
        } else {
            Some(
                (realized_pnl.amount() / entry_price.times(quantity).amount()
                    * Decimal::from(100))
                .round_dp(2),
            )
        };
        Self {
            symbol: symbol.to_string(),
            side: Side::Sell,
            quantity,
            price: exit_price,
            order_value: exit_price.times(quantity),
            charges,
            timestamp: Utc::now(),
            entry_price: Some(entry_price),
            exit_price: Some(exit_price),
            realized_pnl: Some(realized_pnl),
            pnl_pct,
        }
    }
}

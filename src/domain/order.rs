use crate::domain::errors::OrderValidationError;
use crate::domain::money::Money;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Canonical enums for the simulation core. Legacy broker SDKs spell these
// fields a dozen ways; the alias tables in the FromStr impls are consulted
// once at the persistence/adapter boundary, and everything inside the
// engine stays strictly typed.

macro_rules! string_repr {
    ($ty:ty) => {
        impl From<$ty> for String {
            fn from(v: $ty) -> String {
                v.to_string()
            }
        }

        impl TryFrom<String> for $ty {
            type Error = OrderValidationError;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for Side {
    type Err = OrderValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" | "B" | "LONG" => Ok(Side::Buy),
            "SELL" | "S" | "SHORT" => Ok(Side::Sell),
            _ => Err(OrderValidationError::UnknownAlias {
                field: "side",
                value: s.to_string(),
            }),
        }
    }
}
string_repr!(Side);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OrderKind {
    Market,
    Limit,
    StopLoss,
    StopLossMarket,
}

impl OrderKind {
    /// Market-type kinds execute at the resolved price; limit-type kinds
    /// carry an explicit limit price.
    pub fn is_market_type(&self) -> bool {
        matches!(self, OrderKind::Market | OrderKind::StopLossMarket)
    }

    pub fn has_trigger(&self) -> bool {
        matches!(self, OrderKind::StopLoss | OrderKind::StopLossMarket)
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Market => write!(f, "MARKET"),
            OrderKind::Limit => write!(f, "LIMIT"),
            OrderKind::StopLoss => write!(f, "SL"),
            OrderKind::StopLossMarket => write!(f, "SL-M"),
        }
    }
}

impl FromStr for OrderKind {
    type Err = OrderValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MARKET" | "MKT" => Ok(OrderKind::Market),
            "LIMIT" | "LMT" | "L" => Ok(OrderKind::Limit),
            "SL" | "STOPLOSS" | "STOP_LOSS" | "STOP" => Ok(OrderKind::StopLoss),
            "SL-M" | "SLM" | "STOPLOSS_MARKET" | "STOP_MARKET" => Ok(OrderKind::StopLossMarket),
            _ => Err(OrderValidationError::UnknownAlias {
                field: "order kind",
                value: s.to_string(),
            }),
        }
    }
}
string_repr!(OrderKind);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Product {
    /// Cash and carry (delivery)
    Cnc,
    /// Margin intraday square-off
    Mis,
    /// Overnight margin
    Nrml,
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Product::Cnc => write!(f, "CNC"),
            Product::Mis => write!(f, "MIS"),
            Product::Nrml => write!(f, "NRML"),
        }
    }
}

impl FromStr for Product {
    type Err = OrderValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CNC" | "DELIVERY" | "LONGTERM" => Ok(Product::Cnc),
            "MIS" | "INTRADAY" => Ok(Product::Mis),
            "NRML" | "NORMAL" | "CARRYFORWARD" => Ok(Product::Nrml),
            _ => Err(OrderValidationError::UnknownAlias {
                field: "product",
                value: s.to_string(),
            }),
        }
    }
}
string_repr!(Product);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Variety {
    Regular,
    /// After-market order, queued for the next session's open
    Amo,
}

impl fmt::Display for Variety {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variety::Regular => write!(f, "regular"),
            Variety::Amo => write!(f, "amo"),
        }
    }
}

impl FromStr for Variety {
    type Err = OrderValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "REGULAR" | "NORMAL" => Ok(Variety::Regular),
            "AMO" | "AFTER_MARKET" | "AFTER_MARKET_ORDER" => Ok(Variety::Amo),
            _ => Err(OrderValidationError::UnknownAlias {
                field: "variety",
                value: s.to_string(),
            }),
        }
    }
}
string_repr!(Variety);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Exchange {
    Nse,
    Bse,
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exchange::Nse => write!(f, "NSE"),
            Exchange::Bse => write!(f, "BSE"),
        }
    }
}

impl FromStr for Exchange {
    type Err = OrderValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NSE" => Ok(Exchange::Nse),
            "BSE" => Ok(Exchange::Bse),
            _ => Err(OrderValidationError::UnknownAlias {
                field: "exchange",
                value: s.to_string(),
            }),
        }
    }
}
string_repr!(Exchange);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Validity {
    Day,
    Ioc,
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validity::Day => write!(f, "DAY"),
            Validity::Ioc => write!(f, "IOC"),
        }
    }
}

impl FromStr for Validity {
    type Err = OrderValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAY" | "GFD" => Ok(Validity::Day),
            "IOC" | "IMMEDIATE" => Ok(Validity::Ioc),
            _ => Err(OrderValidationError::UnknownAlias {
                field: "validity",
                value: s.to_string(),
            }),
        }
    }
}
string_repr!(Validity);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OrderStatus {
    Pending,
    Open,
    PartiallyFilled,
    Complete,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Active orders can still fill or be cancelled.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Open | OrderStatus::PartiallyFilled
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Complete | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::Open => write!(f, "OPEN"),
            OrderStatus::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            OrderStatus::Complete => write!(f, "COMPLETE"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = OrderValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" | "PUT ORDER REQ RECEIVED" => Ok(OrderStatus::Pending),
            "OPEN" | "TRIGGER PENDING" => Ok(OrderStatus::Open),
            "PARTIALLY_FILLED" | "PARTIAL" => Ok(OrderStatus::PartiallyFilled),
            // Some feeds report full fills as EXECUTED rather than COMPLETE.
            "COMPLETE" | "EXECUTED" | "FILLED" => Ok(OrderStatus::Complete),
            "CANCELLED" | "CANCELED" => Ok(OrderStatus::Cancelled),
            "REJECTED" => Ok(OrderStatus::Rejected),
            _ => Err(OrderValidationError::UnknownAlias {
                field: "status",
                value: s.to_string(),
            }),
        }
    }
}
string_repr!(OrderStatus);

/// One equity order, from construction through its terminal state.
///
/// Orders are created by callers, mutated only through `place`, `execute`,
/// `cancel` and `reject`, and never destroyed; the ledger retains them as
/// history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Assigned by the broker at placement; absent until then.
    pub order_id: Option<String>,
    pub symbol: String,
    pub quantity: Decimal,
    pub kind: OrderKind,
    pub side: Side,
    pub limit_price: Option<Money>,
    pub trigger_price: Option<Money>,
    pub product: Product,
    pub variety: Variety,
    pub exchange: Exchange,
    pub validity: Validity,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub placed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    /// Quantity-weighted average price across fills.
    pub executed_price: Option<Money>,
    pub executed_quantity: Decimal,
    pub remarks: String,
}

impl Order {
    pub fn new(
        symbol: &str,
        quantity: Decimal,
        kind: OrderKind,
        side: Side,
        limit_price: Option<Money>,
        trigger_price: Option<Money>,
    ) -> Result<Self, OrderValidationError> {
        let now = Utc::now();
        let order = Self {
            order_id: None,
            symbol: symbol.trim().to_ascii_uppercase(),
            quantity,
            kind,
            side,
            limit_price,
            trigger_price,
            product: Product::Cnc,
            variety: Variety::Regular,
            exchange: Exchange::Nse,
            validity: Validity::Day,
            status: OrderStatus::Pending,
            created_at: now,
            placed_at: None,
            updated_at: now,
            executed_price: None,
            executed_quantity: Decimal::ZERO,
            remarks: String::new(),
        };
        order.validate()?;
        Ok(order)
    }

    pub fn market(symbol: &str, quantity: Decimal, side: Side) -> Result<Self, OrderValidationError> {
        Self::new(symbol, quantity, OrderKind::Market, side, None, None)
    }

    pub fn limit(
        symbol: &str,
        quantity: Decimal,
        side: Side,
        limit_price: Money,
    ) -> Result<Self, OrderValidationError> {
        Self::new(symbol, quantity, OrderKind::Limit, side, Some(limit_price), None)
    }

    pub fn with_product(mut self, product: Product) -> Self {
        self.product = product;
        self
    }

    pub fn with_variety(mut self, variety: Variety) -> Self {
        self.variety = variety;
        self
    }

    pub fn with_exchange(mut self, exchange: Exchange) -> Self {
        self.exchange = exchange;
        self
    }

    pub fn with_validity(mut self, validity: Validity) -> Self {
        self.validity = validity;
        self
    }

    /// Shape validation, run at construction and again at placement so
    /// hand-assembled orders cannot slip malformed fields past the broker.
    pub fn validate(&self) -> Result<(), OrderValidationError> {
        if self.symbol.is_empty() {
            return Err(OrderValidationError::EmptySymbol);
        }
        if self.quantity <= Decimal::ZERO {
            return Err(OrderValidationError::NonPositiveQuantity(self.quantity));
        }
        match (self.kind.is_market_type(), self.limit_price) {
            (true, Some(_)) => {
                return Err(OrderValidationError::UnexpectedLimitPrice {
                    kind: self.kind.to_string(),
                });
            }
            (false, None) => {
                return Err(OrderValidationError::MissingLimitPrice {
                    kind: self.kind.to_string(),
                });
            }
            _ => {}
        }
        if self.kind.has_trigger() && self.trigger_price.is_none() {
            return Err(OrderValidationError::MissingTriggerPrice {
                kind: self.kind.to_string(),
            });
        }
        for price in [self.limit_price, self.trigger_price].into_iter().flatten() {
            if price <= Money::zero() {
                return Err(OrderValidationError::NonPositivePrice(price.amount()));
            }
        }
        Ok(())
    }

    pub fn is_amo(&self) -> bool {
        self.variety == Variety::Amo
    }

    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.executed_quantity
    }

    /// PENDING -> OPEN, assigning the broker id.
    pub fn place(&mut self, order_id: String) -> Result<(), OrderValidationError> {
        if self.status != OrderStatus::Pending {
            return Err(OrderValidationError::InvalidTransition {
                status: self.status.to_string(),
                expected: "PENDING",
            });
        }
        let now = Utc::now();
        self.order_id = Some(order_id);
        self.status = OrderStatus::Open;
        self.placed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Record a fill. Advances executed quantity, keeps the weighted
    /// average executed price, and moves to PARTIALLY_FILLED or COMPLETE.
    pub fn execute(
        &mut self,
        price: Money,
        quantity: Decimal,
        ts: Option<DateTime<Utc>>,
    ) -> Result<(), OrderValidationError> {
        if !matches!(
            self.status,
            OrderStatus::Open | OrderStatus::PartiallyFilled
        ) {
            return Err(OrderValidationError::InvalidTransition {
                status: self.status.to_string(),
                expected: "OPEN or PARTIALLY_FILLED",
            });
        }
        if quantity <= Decimal::ZERO {
            return Err(OrderValidationError::NonPositiveFill(quantity));
        }
        let remaining = self.remaining_quantity();
        if quantity > remaining {
            return Err(OrderValidationError::Overfill {
                fill: quantity,
                remaining,
            });
        }

        let filled_so_far = self.executed_quantity;
        let prior_cost = self
            .executed_price
            .unwrap_or_else(Money::zero)
            .times(filled_so_far);
        let new_total = filled_so_far + quantity;
        // new_total > 0 is guaranteed by the positive-fill check above
        let avg = (prior_cost + price.times(quantity))
            .per_unit(new_total)
            .expect("fill quantity is positive");

        self.executed_price = Some(avg);
        self.executed_quantity = new_total;
        self.status = if self.executed_quantity < self.quantity {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Complete
        };
        self.updated_at = ts.unwrap_or_else(Utc::now);
        Ok(())
    }

    /// Cancel an active order.
    pub fn cancel(&mut self, ts: Option<DateTime<Utc>>) -> Result<(), OrderValidationError> {
        if !self.status.is_active() {
            return Err(OrderValidationError::InvalidTransition {
                status: self.status.to_string(),
                expected: "an active status",
            });
        }
        self.status = OrderStatus::Cancelled;
        self.updated_at = ts.unwrap_or_else(Utc::now);
        Ok(())
    }

    /// Reject an order that has not started filling, recording the reason.
    pub fn reject(&mut self, reason: &str) -> Result<(), OrderValidationError> {
        if !matches!(self.status, OrderStatus::Pending | OrderStatus::Open) {
            return Err(OrderValidationError::InvalidTransition {
                status: self.status.to_string(),
                expected: "PENDING or OPEN",
            });
        }
        self.status = OrderStatus::Rejected;
        if !self.remarks.is_empty() {
            self.remarks.push_str("; ");
        }
        self.remarks.push_str(reason);
        self.updated_at = Utc::now();
        Ok(())
    }
}

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by fixed-precision money arithmetic
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("cannot compute an average over a quantity of zero")]
    ZeroQuantityAverage,
}

/// Errors raised at order construction or by an invalid lifecycle transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderValidationError {
    #[error("symbol must not be empty")]
    EmptySymbol,

    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),

    #[error("price must be positive, got {0}")]
    NonPositivePrice(Decimal),

    #[error("{kind} order requires a limit price")]
    MissingLimitPrice { kind: String },

    #[error("{kind} order must not carry a limit price")]
    UnexpectedLimitPrice { kind: String },

    #[error("{kind} order requires a trigger price")]
    MissingTriggerPrice { kind: String },

    #[error("order is {status}, expected {expected}")]
    InvalidTransition { status: String, expected: &'static str },

    #[error("fill quantity must be positive, got {0}")]
    NonPositiveFill(Decimal),

    #[error("fill quantity {fill} exceeds remaining quantity {remaining}")]
    Overfill { fill: Decimal, remaining: Decimal },

    #[error("unrecognized {field} value: '{value}'")]
    UnknownAlias { field: &'static str, value: String },
}

/// Errors related to portfolio state mutation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortfolioError {
    #[error("no holding for {symbol}")]
    HoldingNotFound { symbol: String },

    #[error("insufficient holding for {symbol}: requested {requested}, held {held}")]
    InsufficientHolding {
        symbol: String,
        requested: Decimal,
        held: Decimal,
    },
}

/// Errors related to price resolution
#[derive(Debug, Error)]
pub enum PriceError {
    #[error("no price available for {symbol}")]
    Unavailable { symbol: String },

    #[error("quote source '{source_name}' failed: {reason}")]
    SourceFailed { source_name: String, reason: String },
}

/// Errors surfaced by the broker gateway
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker is not connected")]
    NotConnected,

    #[error("unknown order id: {0}")]
    UnknownOrder(String),

    #[error(transparent)]
    Validation(#[from] OrderValidationError),

    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),
}

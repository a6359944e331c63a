use crate::domain::account::Holding;
use crate::domain::money::Money;
use crate::domain::order::Order;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Margin/limit snapshot derived from the account and current marks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountLimits {
    pub available_cash: Money,
    pub margin_used: Money,
    pub margin_available: Money,
    pub collateral: Money,
}

/// External market-data collaborator. Unreliable by contract: it may
/// return `Ok(None)` or fail outright at any time.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    fn name(&self) -> &str;
    async fn latest_price(&self, symbol: &str) -> Result<Option<Money>>;
}

/// The broker-gateway contract consumed by strategy/execution callers.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    async fn connect(&self) -> Result<bool>;
    async fn disconnect(&self) -> Result<bool>;
    fn is_connected(&self) -> bool;

    /// Places the order and returns its broker-assigned id. Business
    /// rejections (insufficient funds, no holding to sell, market closed)
    /// leave the order REJECTED but still return the id.
    async fn place_order(&self, order: Order) -> Result<String>;
    async fn cancel_order(&self, order_id: &str) -> Result<bool>;

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>>;
    async fn get_all_orders(&self) -> Result<Vec<Order>>;
    async fn get_pending_orders(&self) -> Result<Vec<Order>>;
    async fn search_orders_by_symbol(&self, symbol: &str) -> Result<Vec<Order>>;
    async fn cancel_pending_buys_for_symbol(&self, symbol: &str) -> Result<usize>;

    async fn get_holdings(&self) -> Result<Vec<Holding>>;
    async fn get_holding(&self, symbol: &str) -> Result<Option<Holding>>;

    async fn get_account_limits(&self) -> Result<AccountLimits>;
    async fn get_available_balance(&self) -> Result<Money>;
}

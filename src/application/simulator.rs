use crate::application::charges::ChargeSchedule;
use crate::config::SimulatorConfig;
use crate::domain::money::Money;
use crate::domain::order::{Order, OrderKind, Side};
use crate::infrastructure::price_provider::PriceProvider;
use chrono::NaiveTime;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of one simulation cycle for one order.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionDecision {
    /// Execute the full remaining quantity at this price.
    Fill { price: Money },
    /// Not executable this cycle (limit not met, AMO not due); the order
    /// stays OPEN and will be re-checked.
    Defer { reason: String },
    /// Business rejection; the order moves to REJECTED with this reason.
    Reject { reason: String },
}

/// Decides whether and how an order executes given the current price,
/// configuration and market-hours state.
pub struct OrderSimulator {
    config: SimulatorConfig,
    charges: ChargeSchedule,
    prices: Arc<PriceProvider>,
}

impl OrderSimulator {
    pub fn new(mut config: SimulatorConfig, prices: Arc<PriceProvider>) -> Self {
        if config.slippage_min_pct > config.slippage_max_pct {
            warn!(
                "Slippage range inverted ({} > {}), swapping bounds",
                config.slippage_min_pct, config.slippage_max_pct
            );
            std::mem::swap(
                &mut config.slippage_min_pct,
                &mut config.slippage_max_pct,
            );
        }
        let charges = ChargeSchedule::new(config.charges.clone());
        Self {
            config,
            charges,
            prices,
        }
    }

    pub fn charges(&self) -> &ChargeSchedule {
        &self.charges
    }

    pub fn is_market_open(&self, now: NaiveTime) -> bool {
        now >= self.config.market_open && now <= self.config.market_close
    }

    /// AMO orders wait for the configured execution time; until then every
    /// simulation cycle defers them regardless of how often it runs.
    pub fn should_execute_amo(&self, order: &Order, now: NaiveTime) -> bool {
        order.is_amo() && now >= self.config.amo_execution_time
    }

    /// Run one execution attempt. The price used is always the one fetched
    /// at this moment, which is what makes deferred AMO orders fill at the
    /// next session's opening price rather than the placement-time price.
    pub async fn decide(&self, order: &Order, now: NaiveTime) -> ExecutionDecision {
        if self.config.enforce_market_hours && !self.is_market_open(now) {
            if order.is_amo() {
                return ExecutionDecision::Defer {
                    reason: format!(
                        "market closed; AMO queued until {}",
                        self.config.amo_execution_time
                    ),
                };
            }
            return ExecutionDecision::Reject {
                reason: format!(
                    "market closed (open {} - {})",
                    self.config.market_open, self.config.market_close
                ),
            };
        }

        if order.is_amo() && !self.should_execute_amo(order, now) {
            return ExecutionDecision::Defer {
                reason: format!(
                    "AMO executes at {}",
                    self.config.amo_execution_time
                ),
            };
        }

        if self.config.execution_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.execution_delay_ms)).await;
        }

        let Some(current) = self.prices.get_price(&order.symbol).await else {
            return ExecutionDecision::Reject {
                reason: format!("price not available for {}", order.symbol),
            };
        };

        if order.kind.has_trigger() {
            // Trigger gate for stop orders: a buy stop arms at or above the
            // trigger, a sell stop at or below it.
            let trigger = order.trigger_price.expect("validated at construction");
            let armed = match order.side {
                Side::Buy => current >= trigger,
                Side::Sell => current <= trigger,
            };
            if !armed {
                return ExecutionDecision::Defer {
                    reason: format!(
                        "trigger {} not breached at current price {}",
                        trigger, current
                    ),
                };
            }
        }

        match order.kind {
            OrderKind::Market | OrderKind::StopLossMarket => ExecutionDecision::Fill {
                price: self.apply_slippage(current, order.side),
            },
            OrderKind::Limit | OrderKind::StopLoss => {
                let limit = order.limit_price.expect("validated at construction");
                match order.side {
                    Side::Buy if current <= limit => ExecutionDecision::Fill { price: limit },
                    Side::Sell if current >= limit => ExecutionDecision::Fill { price: limit },
                    Side::Buy => ExecutionDecision::Defer {
                        reason: format!("current price {} above limit {}", current, limit),
                    },
                    Side::Sell => ExecutionDecision::Defer {
                        reason: format!("current price {} below limit {}", current, limit),
                    },
                }
            }
        }
    }

    /// Market orders pay a trader-unfavorable deviation drawn uniformly
    /// from the configured percentage range: buys fill higher, sells lower.
    fn apply_slippage(&self, price: Money, side: Side) -> Money {
        if !self.config.slippage_enabled {
            return price;
        }
        let pct = rand::rng()
            .random_range(self.config.slippage_min_pct..=self.config.slippage_max_pct);
        let factor = match side {
            Side::Buy => 1.0 + pct / 100.0,
            Side::Sell => 1.0 - pct / 100.0,
        };
        let raw = price.amount().to_f64().unwrap_or(0.0) * factor;
        let slipped = Money::from_f64(raw).unwrap_or(price);
        debug!("Slippage {:.4}% applied: {} -> {}", pct, price, slipped);
        slipped
    }

    /// Pre-trade checks on the order's value. Returns the rejection reason
    /// if the order must not execute.
    pub fn validate_order_value(
        &self,
        value: Money,
        available_cash: Money,
        side: Side,
    ) -> Option<String> {
        if self.config.check_funds && side == Side::Buy {
            let required = value + self.charges.charges_on(value, Side::Buy);
            if required > available_cash {
                return Some(format!(
                    "insufficient funds: required {}, available {}",
                    required, available_cash
                ));
            }
        }
        let cap = Money::new(self.config.max_position_size);
        if value > cap {
            return Some(format!(
                "order value {} exceeds max position size {}",
                value, cap
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChargeRates;
    use rust_decimal_macros::dec;

    fn instant_config() -> SimulatorConfig {
        SimulatorConfig {
            slippage_enabled: false,
            execution_delay_ms: 0,
            enforce_market_hours: false,
            charges: ChargeRates::zero(),
            price_cache_ttl_secs: 0,
            ..SimulatorConfig::default()
        }
    }

    fn simulator(config: SimulatorConfig) -> OrderSimulator {
        let prices = Arc::new(PriceProvider::mock(config.price_cache_ttl_secs));
        OrderSimulator::new(config, prices)
    }

    fn simulator_with_price(config: SimulatorConfig, symbol: &str, price: Money) -> OrderSimulator {
        let sim = simulator(config);
        sim.prices.set_price(symbol, price);
        sim
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn test_market_closed_rejects_regular_order() {
        let mut config = instant_config();
        config.enforce_market_hours = true;
        let sim = simulator_with_price(config, "INFY", Money::from(1450));
        let order = Order::market("INFY", dec!(10), Side::Buy).unwrap();

        let decision = sim.decide(&order, at(18, 0)).await;
        assert!(matches!(
            decision,
            ExecutionDecision::Reject { reason } if reason.contains("market closed")
        ));
    }

    #[tokio::test]
    async fn test_market_closed_defers_amo_order() {
        let mut config = instant_config();
        config.enforce_market_hours = true;
        let sim = simulator_with_price(config, "INFY", Money::from(1450));
        let order = Order::market("INFY", dec!(10), Side::Buy)
            .unwrap()
            .with_variety(crate::domain::order::Variety::Amo);

        let decision = sim.decide(&order, at(18, 0)).await;
        assert!(matches!(decision, ExecutionDecision::Defer { .. }));
    }

    #[tokio::test]
    async fn test_amo_waits_for_execution_time() {
        let mut config = instant_config();
        config.amo_execution_time = at(9, 15);
        let sim = simulator_with_price(config, "INFY", Money::from(1450));
        let order = Order::market("INFY", dec!(10), Side::Buy)
            .unwrap()
            .with_variety(crate::domain::order::Variety::Amo);

        assert!(!sim.should_execute_amo(&order, at(9, 0)));
        assert!(matches!(
            sim.decide(&order, at(9, 0)).await,
            ExecutionDecision::Defer { .. }
        ));

        assert!(sim.should_execute_amo(&order, at(9, 15)));
        assert_eq!(
            sim.decide(&order, at(9, 30)).await,
            ExecutionDecision::Fill {
                price: Money::from(1450)
            }
        );
    }

    #[tokio::test]
    async fn test_market_order_fills_at_current_price_without_slippage() {
        let sim = simulator_with_price(instant_config(), "INFY", Money::from(1450));
        let order = Order::market("INFY", dec!(10), Side::Buy).unwrap();
        assert_eq!(
            sim.decide(&order, at(10, 0)).await,
            ExecutionDecision::Fill {
                price: Money::from(1450)
            }
        );
    }

    #[tokio::test]
    async fn test_slippage_moves_against_the_trader() {
        let mut config = instant_config();
        config.slippage_enabled = true;
        config.slippage_min_pct = 1.0;
        config.slippage_max_pct = 1.0; // pin the draw
        let sim = simulator_with_price(config, "INFY", Money::from(1000));

        let buy = Order::market("INFY", dec!(1), Side::Buy).unwrap();
        assert_eq!(
            sim.decide(&buy, at(10, 0)).await,
            ExecutionDecision::Fill {
                price: Money::from(1010)
            }
        );

        let sell = Order::market("INFY", dec!(1), Side::Sell).unwrap();
        assert_eq!(
            sim.decide(&sell, at(10, 0)).await,
            ExecutionDecision::Fill {
                price: Money::from(990)
            }
        );
    }

    #[tokio::test]
    async fn test_inverted_slippage_range_is_normalized() {
        let mut config = instant_config();
        config.slippage_enabled = true;
        config.slippage_min_pct = 2.0;
        config.slippage_max_pct = 1.0;
        let sim = simulator_with_price(config, "INFY", Money::from(1000));

        let buy = Order::market("INFY", dec!(1), Side::Buy).unwrap();
        let ExecutionDecision::Fill { price } = sim.decide(&buy, at(10, 0)).await else {
            panic!("expected a fill");
        };
        // the draw must come from the swapped 1..=2 range, not panic
        assert!(price >= Money::from(1010));
        assert!(price <= Money::from(1020));
    }

    #[tokio::test]
    async fn test_limit_buy_fills_at_limit_when_condition_met() {
        let sim = simulator_with_price(instant_config(), "INFY", Money::from(1450));
        let order = Order::limit("INFY", dec!(10), Side::Buy, Money::from(1500)).unwrap();
        // current 1450 <= limit 1500: fill, and at the *limit* price
        assert_eq!(
            sim.decide(&order, at(10, 0)).await,
            ExecutionDecision::Fill {
                price: Money::from(1500)
            }
        );
    }

    #[tokio::test]
    async fn test_limit_buy_defers_above_limit() {
        let sim = simulator_with_price(instant_config(), "INFY", Money::from(1450));
        let order = Order::limit("INFY", dec!(10), Side::Buy, Money::from(1400)).unwrap();
        let decision = sim.decide(&order, at(10, 0)).await;
        assert!(matches!(
            decision,
            ExecutionDecision::Defer { reason } if reason.contains("above limit")
        ));
    }

    #[tokio::test]
    async fn test_limit_sell_condition() {
        let sim = simulator_with_price(instant_config(), "INFY", Money::from(1450));

        let fills = Order::limit("INFY", dec!(5), Side::Sell, Money::from(1400)).unwrap();
        assert_eq!(
            sim.decide(&fills, at(10, 0)).await,
            ExecutionDecision::Fill {
                price: Money::from(1400)
            }
        );

        let waits = Order::limit("INFY", dec!(5), Side::Sell, Money::from(1500)).unwrap();
        assert!(matches!(
            sim.decide(&waits, at(10, 0)).await,
            ExecutionDecision::Defer { reason } if reason.contains("below limit")
        ));
    }

    #[tokio::test]
    async fn test_stop_loss_market_defers_until_triggered() {
        let sim = simulator_with_price(instant_config(), "INFY", Money::from(1450));
        let order = Order::new(
            "INFY",
            dec!(5),
            OrderKind::StopLossMarket,
            Side::Sell,
            None,
            Some(Money::from(1400)),
        )
        .unwrap();
        // current 1450 above the 1400 sell trigger: not armed yet
        assert!(matches!(
            sim.decide(&order, at(10, 0)).await,
            ExecutionDecision::Defer { .. }
        ));

        sim.prices.set_price("INFY", Money::from(1395));
        assert_eq!(
            sim.decide(&order, at(10, 0)).await,
            ExecutionDecision::Fill {
                price: Money::from(1395)
            }
        );
    }

    #[test]
    fn test_validate_order_value_insufficient_funds() {
        let mut config = instant_config();
        config.charges = ChargeRates::default();
        let sim = simulator(config);
        let reason = sim
            .validate_order_value(Money::from(100_000), Money::from(100_000), Side::Buy)
            .unwrap();
        // value alone fits, value + buy-side charges does not
        assert!(reason.contains("insufficient funds"));
    }

    #[test]
    fn test_validate_order_value_respects_funds_check_flag() {
        let mut config = instant_config();
        config.check_funds = false;
        let sim = simulator(config);
        assert_eq!(
            sim.validate_order_value(Money::from(100_000), Money::from(1), Side::Buy),
            None
        );
    }

    #[test]
    fn test_validate_order_value_position_cap() {
        let mut config = instant_config();
        config.max_position_size = dec!(50_000);
        let sim = simulator(config);
        let reason = sim
            .validate_order_value(Money::from(60_000), Money::from(1_000_000), Side::Buy)
            .unwrap();
        assert!(reason.contains("max position size"));
    }

    #[test]
    fn test_market_hours_window() {
        let config = SimulatorConfig::default();
        let sim = simulator(config);
        assert!(!sim.is_market_open(at(9, 0)));
        assert!(sim.is_market_open(at(9, 15)));
        assert!(sim.is_market_open(at(15, 30)));
        assert!(!sim.is_market_open(at(15, 31)));
    }
}

use chrono::NaiveTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which quote source backs the price provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriceSourceMode {
    #[default]
    Mock,
    Live,
}

/// Per-charge-type percentages, expressed in percent units
/// (0.03 means 0.03% of order value).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargeRates {
    pub brokerage_pct: Decimal,
    /// Securities transaction tax, sell side only.
    pub stt_pct: Decimal,
    pub transaction_pct: Decimal,
    /// GST applied on the brokerage component, in percent of it.
    pub gst_pct: Decimal,
    pub sebi_pct: Decimal,
    /// Stamp duty, buy side only.
    pub stamp_duty_pct: Decimal,
}

impl Default for ChargeRates {
    fn default() -> Self {
        // Discount-broker equity delivery rates.
        Self {
            brokerage_pct: dec!(0.03),
            stt_pct: dec!(0.025),
            transaction_pct: dec!(0.00345),
            gst_pct: dec!(18.0),
            sebi_pct: dec!(0.0001),
            stamp_duty_pct: dec!(0.003),
        }
    }
}

impl ChargeRates {
    /// All-zero rates, for frictionless simulations.
    pub fn zero() -> Self {
        Self {
            brokerage_pct: Decimal::ZERO,
            stt_pct: Decimal::ZERO,
            transaction_pct: Decimal::ZERO,
            gst_pct: Decimal::ZERO,
            sebi_pct: Decimal::ZERO,
            stamp_duty_pct: Decimal::ZERO,
        }
    }
}

/// The one immutable configuration value the engine is constructed with.
///
/// The library never reads the environment or files; the binary resolves
/// a config (defaults, TOML, flags) and passes it in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub initial_capital: Decimal,

    pub slippage_enabled: bool,
    /// Uniform slippage draw range, percent units.
    pub slippage_min_pct: f64,
    pub slippage_max_pct: f64,

    /// Simulated execution latency; 0 disables it (instant mode for tests).
    pub execution_delay_ms: u64,

    pub market_open: NaiveTime,
    pub market_close: NaiveTime,
    /// Queued AMO orders execute once the clock passes this time.
    pub amo_execution_time: NaiveTime,
    pub enforce_market_hours: bool,

    pub charges: ChargeRates,

    /// Cap on a single order's value.
    pub max_position_size: Decimal,
    /// Cap on total portfolio value after a buy.
    pub max_portfolio_value: Decimal,
    pub check_funds: bool,

    pub storage_path: PathBuf,
    pub auto_save: bool,

    pub price_source: PriceSourceMode,
    pub price_cache_ttl_secs: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            initial_capital: dec!(1_000_000),
            slippage_enabled: true,
            slippage_min_pct: 0.01,
            slippage_max_pct: 0.1,
            execution_delay_ms: 500,
            market_open: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            market_close: NaiveTime::from_hms_opt(15, 30, 0).unwrap(),
            amo_execution_time: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            enforce_market_hours: true,
            charges: ChargeRates::default(),
            max_position_size: dec!(500_000),
            max_portfolio_value: dec!(10_000_000),
            check_funds: true,
            storage_path: PathBuf::from("paper_data"),
            auto_save: true,
            price_source: PriceSourceMode::Mock,
            price_cache_ttl_secs: 5,
        }
    }
}

impl SimulatorConfig {
    /// A frictionless instant-execution config rooted at `storage_path`,
    /// the baseline for deterministic tests and demos.
    pub fn instant(storage_path: PathBuf) -> Self {
        Self {
            slippage_enabled: false,
            execution_delay_ms: 0,
            enforce_market_hours: false,
            charges: ChargeRates::zero(),
            storage_path,
            price_cache_ttl_secs: 0,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = SimulatorConfig::default();
        assert!(config.market_open < config.market_close);
        assert!(config.slippage_min_pct <= config.slippage_max_pct);
        assert!(config.initial_capital > Decimal::ZERO);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = SimulatorConfig::default();
        let text = toml::to_string(&config).unwrap();
        let back: SimulatorConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.initial_capital, config.initial_capital);
        assert_eq!(back.market_close, config.market_close);
        assert_eq!(back.charges, config.charges);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let back: SimulatorConfig =
            toml::from_str("initial_capital = \"250000\"\nauto_save = false\n").unwrap();
        assert_eq!(back.initial_capital, dec!(250000));
        assert!(!back.auto_save);
        assert_eq!(back.charges, ChargeRates::default());
    }
}

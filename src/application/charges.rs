use crate::config::ChargeRates;
use crate::domain::money::Money;
use crate::domain::order::Side;
use rust_decimal::Decimal;

/// Statutory + brokerage charge model for simulated equity fills.
///
/// All components are percentages of order value. Stamp duty applies to
/// buys only, STT to sells only, and GST is levied on the brokerage
/// component rather than on the order value itself.
#[derive(Debug, Clone)]
pub struct ChargeSchedule {
    rates: ChargeRates,
}

impl ChargeSchedule {
    pub fn new(rates: ChargeRates) -> Self {
        Self { rates }
    }

    /// Effective total percentage of order value for one side.
    pub fn total_pct(&self, side: Side) -> Decimal {
        let r = &self.rates;
        let gst = r.brokerage_pct * r.gst_pct / Decimal::from(100);
        let side_specific = match side {
            Side::Buy => r.stamp_duty_pct,
            Side::Sell => r.stt_pct,
        };
        r.brokerage_pct + r.transaction_pct + gst + r.sebi_pct + side_specific
    }

    /// Charges on a given order value.
    pub fn charges_on(&self, value: Money, side: Side) -> Money {
        value.percent(self.total_pct(side))
    }

    pub fn description(&self) -> String {
        format!(
            "Brokerage {}% + txn {}% + GST {}% + SEBI {}% | stamp {}% (buy) / STT {}% (sell)",
            self.rates.brokerage_pct,
            self.rates.transaction_pct,
            self.rates.gst_pct,
            self.rates.sebi_pct,
            self.rates.stamp_duty_pct,
            self.rates.stt_pct,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_total_pct_splits_by_side() {
        let schedule = ChargeSchedule::new(ChargeRates::default());
        let buy = schedule.total_pct(Side::Buy);
        let sell = schedule.total_pct(Side::Sell);
        // Sides share everything except stamp duty (buy) vs STT (sell).
        assert_eq!(buy - dec!(0.003), sell - dec!(0.025));
        assert!(sell > buy);
    }

    #[test]
    fn test_charges_on_value() {
        let schedule = ChargeSchedule::new(ChargeRates {
            brokerage_pct: dec!(0.1),
            stt_pct: Decimal::ZERO,
            transaction_pct: Decimal::ZERO,
            gst_pct: dec!(18),
            sebi_pct: Decimal::ZERO,
            stamp_duty_pct: Decimal::ZERO,
        });
        // 0.1% + 18% GST on it = 0.118% of 10000 = 11.80
        assert_eq!(
            schedule.charges_on(Money::from(10_000), Side::Buy),
            Money::new(dec!(11.80))
        );
    }

    #[test]
    fn test_gst_base_is_brokerage_only() {
        let schedule = ChargeSchedule::new(ChargeRates {
            brokerage_pct: dec!(0.1),
            stt_pct: Decimal::ZERO,
            transaction_pct: dec!(0.05),
            gst_pct: dec!(18),
            sebi_pct: Decimal::ZERO,
            stamp_duty_pct: Decimal::ZERO,
        });
        // 0.1 + 18% of 0.1 + 0.05 = 0.168; transaction charges carry no GST
        assert_eq!(schedule.total_pct(Side::Buy), dec!(0.168));
    }

    #[test]
    fn test_zero_rates_charge_nothing() {
        let schedule = ChargeSchedule::new(ChargeRates::zero());
        assert_eq!(schedule.charges_on(Money::from(14_500), Side::Buy), Money::zero());
        assert_eq!(schedule.total_pct(Side::Sell), Decimal::ZERO);
    }
}

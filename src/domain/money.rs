use crate::domain::errors::MoneyError;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// A fixed-precision monetary amount, always held at 2 decimal places.
///
/// Every constructor and arithmetic result rounds with banker's rounding,
/// so a value read back from the ledger compares equal to the value that
/// was computed in memory.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub fn new(amount: Decimal) -> Self {
        Self(amount.round_dp(2))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Construct from a float; returns `None` for NaN/infinite inputs.
    pub fn from_f64(amount: f64) -> Option<Self> {
        Decimal::from_f64(amount).map(Self::new)
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Multiply by a quantity (e.g. price * shares).
    pub fn times(&self, quantity: Decimal) -> Self {
        Self::new(self.0 * quantity)
    }

    /// Divide by a quantity, as when averaging a cost basis.
    ///
    /// Dividing by zero is an error, never a silent zero.
    pub fn per_unit(&self, quantity: Decimal) -> Result<Self, MoneyError> {
        if quantity.is_zero() {
            return Err(MoneyError::ZeroQuantityAverage);
        }
        Ok(Self::new(self.0 / quantity))
    }

    /// Apply a percentage (e.g. 0.03 means 0.03%).
    pub fn percent(&self, pct: Decimal) -> Self {
        Self::new(self.0 * pct / Decimal::from(100))
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self::new(amount)
    }
}

impl From<i64> for Money {
    fn from(amount: i64) -> Self {
        Self(Decimal::from(amount))
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money::new(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        *self = *self + rhs;
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money::new(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        *self = *self - rhs;
    }
}

impl Neg for Money {
    type Output = Money;
    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

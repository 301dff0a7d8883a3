//! Two-decimal fixed-point values (amounts, prices, quantities).
//!
//! Values are stored as a signed count of hundredths, so sums are exact. Input
//! with more than two decimals is rounded half away from zero, which is what a
//! `DECIMAL(10,2)` column would keep.

use core::fmt;
use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DomainError;

/// Hundredths per unit.
const SCALE: i64 = 100;

/// A signed two-decimal fixed-point value.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fixed(i64);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);

    /// Largest discrepancy tolerated when a client-supplied value is compared
    /// against a computed one (0.01).
    pub const TOLERANCE: Fixed = Fixed(1);

    pub const fn from_hundredths(hundredths: i64) -> Self {
        Self(hundredths)
    }

    /// Whole units, e.g. `Fixed::from_units(10)` is `10.00`.
    pub const fn from_units(units: i64) -> Self {
        Self(units * SCALE)
    }

    pub const fn hundredths(self) -> i64 {
        self.0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, rhs: Fixed) -> Option<Fixed> {
        self.0.checked_add(rhs.0).map(Fixed)
    }

    /// Sum a sequence, `None` on overflow.
    pub fn checked_sum<I>(values: I) -> Option<Fixed>
    where
        I: IntoIterator<Item = Fixed>,
    {
        values
            .into_iter()
            .try_fold(Fixed::ZERO, |acc, v| acc.checked_add(v))
    }

    /// `true` when `self` and `other` differ by at most [`Fixed::TOLERANCE`].
    pub fn within_tolerance(self, other: Fixed) -> bool {
        (i128::from(self.0) - i128::from(other.0)).abs() <= i128::from(Self::TOLERANCE.0)
    }

    /// Exact product of two values, kept at four decimals.
    pub fn mul_exact(self, rhs: Fixed) -> Product {
        Product(i128::from(self.0) * i128::from(rhs.0))
    }

    fn from_decimal(d: Decimal, raw: &str) -> Result<Self, DomainError> {
        let mut rounded = d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(2);
        i64::try_from(rounded.mantissa())
            .map(Fixed)
            .map_err(|_| DomainError::validation(format!("value out of range: {raw}")))
    }
}

/// Exact product of two [`Fixed`] values, in ten-thousandths.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Product(i128);

impl Product {
    /// `true` when `amount` is within 0.01 of this product.
    pub fn matches(self, amount: Fixed) -> bool {
        // 0.01 expressed in ten-thousandths.
        let tolerance = i128::from(Fixed::TOLERANCE.0 * SCALE);
        (self.0 - i128::from(amount.0) * i128::from(SCALE)).abs() <= tolerance
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Decimal::try_from_i128_with_scale(self.0, 4) {
            Ok(d) => {
                let mut d = d.normalize();
                if d.scale() < 2 {
                    d.rescale(2);
                }
                fmt::Display::fmt(&d, f)
            }
            // Beyond 96 bits; only reachable with absurd inputs.
            Err(_) => write!(f, "{}e-4", self.0),
        }
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / SCALE as u64, abs % SCALE as u64)
    }
}

impl FromStr for Fixed {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parsed = if trimmed.contains(['e', 'E']) {
            Decimal::from_scientific(trimmed)
        } else {
            Decimal::from_str(trimmed)
        };
        let d = parsed.map_err(|_| DomainError::validation(format!("invalid number: {s}")))?;
        Self::from_decimal(d, s)
    }
}

impl TryFrom<f64> for Fixed {
    type Error = DomainError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() {
            return Err(DomainError::validation(format!("invalid number: {value}")));
        }
        // `f64`'s Display is the shortest representation that round-trips, so
        // 0.1 parses as exactly 0.1 rather than its binary approximation.
        value.to_string().parse()
    }
}

impl Serialize for Fixed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fixed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FixedVisitor)
    }
}

struct FixedVisitor;

impl Visitor<'_> for FixedVisitor {
    type Value = Fixed;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal number or numeric string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Fixed, E> {
        v.checked_mul(SCALE)
            .map(Fixed)
            .ok_or_else(|| E::custom(format!("value out of range: {v}")))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Fixed, E> {
        i64::try_from(v)
            .ok()
            .and_then(|v| v.checked_mul(SCALE))
            .map(Fixed)
            .ok_or_else(|| E::custom(format!("value out of range: {v}")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Fixed, E> {
        Fixed::try_from(v).map_err(E::custom)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Fixed, E> {
        v.parse().map_err(E::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fx(s: &str) -> Fixed {
        s.parse().unwrap()
    }

    #[test]
    fn display_pads_to_two_decimals() {
        assert_eq!(Fixed::from_units(10).to_string(), "10.00");
        assert_eq!(Fixed::from_hundredths(-150).to_string(), "-1.50");
        assert_eq!(Fixed::from_hundredths(-5).to_string(), "-0.05");
        assert_eq!(Fixed::ZERO.to_string(), "0.00");
    }

    #[test]
    fn parse_rounds_half_away_from_zero() {
        assert_eq!(fx("1.005"), Fixed::from_hundredths(101));
        assert_eq!(fx("-1.005"), Fixed::from_hundredths(-101));
        assert_eq!(fx("2.344"), Fixed::from_hundredths(234));
        assert_eq!(fx("1e2"), Fixed::from_units(100));
    }

    #[test]
    fn parse_rejects_non_numbers() {
        assert!("ten".parse::<Fixed>().is_err());
        assert!("".parse::<Fixed>().is_err());
        assert!(Fixed::try_from(f64::NAN).is_err());
    }

    #[test]
    fn float_input_is_not_polluted_by_binary_representation() {
        assert_eq!(Fixed::try_from(0.1 + 0.2).unwrap(), Fixed::from_hundredths(30));
        assert_eq!(Fixed::try_from(19.99).unwrap(), Fixed::from_hundredths(1999));
    }

    #[test]
    fn deserializes_numbers_and_strings() {
        let v: Vec<Fixed> = serde_json::from_str(r#"[10, -1, 2.5, "7.25"]"#).unwrap();
        assert_eq!(
            v,
            vec![
                Fixed::from_units(10),
                Fixed::from_units(-1),
                Fixed::from_hundredths(250),
                Fixed::from_hundredths(725),
            ]
        );
    }

    #[test]
    fn serializes_as_two_decimal_string() {
        let json = serde_json::to_string(&Fixed::from_hundredths(900)).unwrap();
        assert_eq!(json, r#""9.00""#);
    }

    #[test]
    fn rejects_values_that_overflow_hundredths() {
        assert!(serde_json::from_str::<Fixed>("1e300").is_err());
        assert!(serde_json::from_str::<Fixed>(&u64::MAX.to_string()).is_err());
    }

    #[test]
    fn product_display_trims_to_at_least_two_decimals() {
        assert_eq!(fx("2").mul_exact(fx("5")).to_string(), "10.00");
        assert_eq!(fx("1.5").mul_exact(fx("1.5")).to_string(), "2.25");
        assert_eq!(fx("0.33").mul_exact(fx("0.33")).to_string(), "0.1089");
    }

    #[test]
    fn product_matches_within_one_hundredth() {
        let p = fx("0.33").mul_exact(fx("0.33")); // 0.1089
        assert!(p.matches(fx("0.11")));
        assert!(p.matches(fx("0.10")));
        assert!(!p.matches(fx("0.12")));
        assert!(!fx("2").mul_exact(fx("5")).matches(fx("11")));
    }

    #[test]
    fn tolerance_is_inclusive() {
        assert!(fx("9.00").within_tolerance(fx("9.01")));
        assert!(fx("9.01").within_tolerance(fx("9.00")));
        assert!(!fx("9.00").within_tolerance(fx("9.02")));
    }

    #[test]
    fn checked_sum_reports_overflow() {
        assert_eq!(
            Fixed::checked_sum([fx("1.10"), fx("2.20"), fx("-0.30")]),
            Some(fx("3.00"))
        );
        assert_eq!(
            Fixed::checked_sum([Fixed::from_hundredths(i64::MAX), Fixed::from_hundredths(1)]),
            None
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Rendering then parsing never moves a value.
        #[test]
        fn display_is_parseable(h in -1_000_000_000i64..1_000_000_000i64) {
            let v = Fixed::from_hundredths(h);
            prop_assert_eq!(v.to_string().parse::<Fixed>().unwrap(), v);
        }

        /// The product of two values always matches its own rounding to cents.
        #[test]
        fn product_matches_its_rounding(q in 1i64..100_000, p in 1i64..100_000) {
            let product = Fixed::from_hundredths(q).mul_exact(Fixed::from_hundredths(p));
            let rounded: Fixed = product.to_string().parse().unwrap();
            prop_assert!(product.matches(rounded));
        }
    }
}

//! BabyJubJub twisted Edwards curve embedded in the BN254 scalar field.
//!
//! `a·x² + y² = 1 + d·x²·y²` with `a = 168700`, `d = 168696`. Keys and
//! signatures live in the prime-order subgroup generated by [`BASE8`].

use halo2curves_axiom::{bn256::Fr, ff::Field};
use num_bigint::BigUint;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::fr_from_decimal;

pub const CURVE_A: u64 = 168_700;
pub const CURVE_D: u64 = 168_696;

/// Generator of the prime-order subgroup (eight times the curve generator).
pub static BASE8: Lazy<Point> = Lazy::new(|| Point {
    x: decimal_const(
        "5299619240641551281634865583518297030282874472190772894086521144482721001553",
    ),
    y: decimal_const(
        "16950150798460657717958625567821834550301663161624707787222815936182638968203",
    ),
});

/// Order `l` of the subgroup generated by [`BASE8`].
pub static SUBORDER: Lazy<BigUint> = Lazy::new(|| {
    BigUint::parse_bytes(
        b"2736030358979909402780800718157159386076813972158567259200215660948447373041",
        10,
    )
    .unwrap_or_default()
});

fn decimal_const(value: &str) -> Fr {
    fr_from_decimal(value).unwrap_or(Fr::ZERO)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    #[serde(with = "crate::serde_fr")]
    pub x: Fr,
    #[serde(with = "crate::serde_fr")]
    pub y: Fr,
}

impl Point {
    pub fn new(x: Fr, y: Fr) -> Self {
        Self { x, y }
    }

    /// Neutral element `(0, 1)`.
    pub fn identity() -> Self {
        Self {
            x: Fr::ZERO,
            y: Fr::ONE,
        }
    }

    pub fn is_on_curve(&self) -> bool {
        let x2 = self.x.square();
        let y2 = self.y.square();
        Fr::from(CURVE_A) * x2 + y2 == Fr::ONE + Fr::from(CURVE_D) * x2 * y2
    }

    /// Twisted Edwards addition. The formula is complete for points on the
    /// curve; callers validate untrusted points with [`Point::is_on_curve`]
    /// first.
    pub fn add(&self, other: &Point) -> Point {
        let x1x2 = self.x * other.x;
        let y1y2 = self.y * other.y;
        let dxy = Fr::from(CURVE_D) * x1x2 * y1y2;

        let x_num = self.x * other.y + self.y * other.x;
        let y_num = y1y2 - Fr::from(CURVE_A) * x1x2;
        let x_den = (Fr::ONE + dxy).invert().unwrap_or(Fr::ZERO);
        let y_den = (Fr::ONE - dxy).invert().unwrap_or(Fr::ZERO);

        Point {
            x: x_num * x_den,
            y: y_num * y_den,
        }
    }

    pub fn double(&self) -> Point {
        self.add(self)
    }

    /// Left-to-right double-and-add.
    pub fn mul_scalar(&self, scalar: &BigUint) -> Point {
        let mut acc = Point::identity();
        for bit in (0..scalar.bits()).rev() {
            acc = acc.double();
            if scalar.bit(bit) {
                acc = acc.add(self);
            }
        }
        acc
    }

    /// True when the point is on the curve and lies in the `BASE8` subgroup.
    pub fn in_subgroup(&self) -> bool {
        self.is_on_curve() && self.mul_scalar(&SUBORDER) == Point::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base8_is_on_curve_and_in_subgroup() {
        assert!(BASE8.is_on_curve());
        assert!(BASE8.in_subgroup());
    }

    #[test]
    fn identity_is_neutral() {
        let p = *BASE8;
        assert_eq!(p.add(&Point::identity()), p);
        assert_eq!(Point::identity().add(&p), p);
    }

    #[test]
    fn scalar_multiplication_distributes() {
        let a = BigUint::from(12_345u64);
        let b = BigUint::from(67_890u64);
        let lhs = BASE8.mul_scalar(&(&a + &b));
        let rhs = BASE8.mul_scalar(&a).add(&BASE8.mul_scalar(&b));
        assert_eq!(lhs, rhs);
        assert!(lhs.is_on_curve());
    }

    #[test]
    fn multiplying_by_zero_gives_identity() {
        assert_eq!(BASE8.mul_scalar(&BigUint::from(0u32)), Point::identity());
    }

    #[test]
    fn arbitrary_coordinates_are_off_curve() {
        assert!(!Point::new(Fr::from(1u64), Fr::from(2u64)).is_on_curve());
    }
}

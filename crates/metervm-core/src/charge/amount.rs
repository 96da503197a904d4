//! Charge amounts and the saturating fixed-point type used to compute them.

use std::fmt;

/// Upper bound on the cost of one VM-bound call.
///
/// [`ChargeAmount::MAX`] is the sentinel for "cost cannot be bounded". It is
/// a refusal, never a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ChargeAmount(pub u64);

impl ChargeAmount {
    pub const ZERO: ChargeAmount = ChargeAmount(0);
    pub const MAX: ChargeAmount = ChargeAmount(u64::MAX);

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_max(self) -> bool {
        self == Self::MAX
    }

    /// Sum of two charges. Saturates to [`ChargeAmount::MAX`].
    pub fn saturating_add(self, other: ChargeAmount) -> ChargeAmount {
        ChargeAmount(self.0.saturating_add(other.0))
    }

    /// Scale by a unit cost. Saturates to [`ChargeAmount::MAX`].
    pub fn saturating_mul(self, factor: u64) -> ChargeAmount {
        ChargeAmount(self.0.saturating_mul(factor))
    }
}

impl fmt::Display for ChargeAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_max() {
            f.write_str("unbounded")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<u64> for ChargeAmount {
    fn from(value: u64) -> Self {
        ChargeAmount(value)
    }
}

const FRACTION_BITS: u32 = 32;

/// Unsigned Q32.32 fixed-point number.
///
/// Arithmetic never wraps. Any overflow yields [`Fixed::SATURATED`], and
/// every operation involving a saturated operand stays saturated, so a cost
/// that overflowed anywhere converts to [`ChargeAmount::MAX`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Default,
    serde::Serialize,
    serde::Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub struct Fixed(u64);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(1 << FRACTION_BITS);
    pub const SATURATED: Fixed = Fixed(u64::MAX);

    /// Whole number. Values above the integer range saturate.
    pub const fn from_int(value: u64) -> Fixed {
        if value > u32::MAX as u64 {
            Fixed::SATURATED
        } else {
            Fixed(value << FRACTION_BITS)
        }
    }

    pub const fn from_bits(bits: u64) -> Fixed {
        Fixed(bits)
    }

    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// `numerator / 2^shift`, for `shift <= 32`.
    pub const fn from_ratio_pow2(numerator: u32, shift: u32) -> Fixed {
        assert!(shift <= FRACTION_BITS);
        Fixed((numerator as u64) << (FRACTION_BITS - shift))
    }

    /// A size or element count as a fixed-point value.
    pub fn from_count(count: u64) -> Fixed {
        Fixed::from_int(count)
    }

    pub fn is_saturated(self) -> bool {
        self == Fixed::SATURATED
    }

    pub fn saturating_add(self, other: Fixed) -> Fixed {
        if self.is_saturated() || other.is_saturated() {
            return Fixed::SATURATED;
        }
        self.0.checked_add(other.0).map_or(Fixed::SATURATED, Fixed)
    }

    /// Multiply by an integer count.
    pub fn mul_count(self, count: u64) -> Fixed {
        if self.is_saturated() {
            return Fixed::SATURATED;
        }
        self.0.checked_mul(count).map_or(Fixed::SATURATED, Fixed)
    }

    /// Fixed-point product, truncating the fraction.
    pub fn mul(self, other: Fixed) -> Fixed {
        if self.is_saturated() || other.is_saturated() {
            return Fixed::SATURATED;
        }
        let wide = (u128::from(self.0) * u128::from(other.0)) >> FRACTION_BITS;
        u64::try_from(wide).map_or(Fixed::SATURATED, Fixed)
    }

    /// Integer part.
    pub fn floor(self) -> u64 {
        self.0 >> FRACTION_BITS
    }

    /// Truncate to a charge. Saturated values become [`ChargeAmount::MAX`].
    pub fn to_charge(self) -> ChargeAmount {
        if self.is_saturated() {
            ChargeAmount::MAX
        } else {
            ChargeAmount(self.floor())
        }
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_saturated() {
            return f.write_str("saturated");
        }
        let fraction = (self.0 & u64::from(u32::MAX)) as f64 / (1u64 << FRACTION_BITS) as f64;
        write!(f, "{}", self.floor() as f64 + fraction)
    }
}

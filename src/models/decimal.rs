use std::fmt;

/// Fixed point value, `coefficient * 10^exponent`.
///
/// The coefficient is kept as a 32-bit magnitude plus a signedness flag so that both
/// `i32` and `u32` register values can be stored without widening to 64 bits.
/// `Decimal::none()` is a third state meaning "not reported by this meter", which is
/// not the same as zero and is skipped entirely when a reading is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decimal {
    set: bool,
    coefficient: u32,
    signed: bool,
    exponent: i8,
}

impl Decimal {
    pub const fn none() -> Self {
        return Decimal { set: false, coefficient: 0, signed: false, exponent: 0 };
    }

    pub const fn from_i32(coefficient: i32, exponent: i8) -> Self {
        return Decimal { set: true, coefficient: coefficient as u32, signed: true, exponent };
    }

    pub const fn from_u32(coefficient: u32, exponent: i8) -> Self {
        return Decimal { set: true, coefficient, signed: false, exponent };
    }

    pub fn new<T: Coefficient>(coefficient: T, exponent: i8) -> Self {
        return coefficient.into_decimal(exponent);
    }

    pub fn has_value(&self) -> bool {
        return self.set;
    }

    /// Raw 32-bit coefficient, reinterpret as `i32` if `is_signed()`.
    pub fn coefficient(&self) -> u32 {
        return self.coefficient;
    }

    pub fn is_signed(&self) -> bool {
        return self.signed;
    }

    pub fn exponent(&self) -> i8 {
        return self.exponent;
    }

    /// Integer value at the given power of ten, truncated towards zero.
    ///
    /// Returns `None` if there is no value or the result does not fit in an `i64`.
    pub fn rescale(&self, exponent: i8) -> Option<i64> {
        if !self.set {
            return None;
        }

        let value: i64 = match self.signed {
            true => self.coefficient as i32 as i64,
            false => self.coefficient as i64,
        };

        let shift = self.exponent as i32 - exponent as i32;
        if shift >= 0 {
            let factor = 10i64.checked_pow(shift as u32)?;
            return value.checked_mul(factor);
        }

        return match 10i64.checked_pow(shift.unsigned_abs()) {
            Some(divisor) => Some(value / divisor),
            /* anything beyond 10^18 truncates to zero */
            None => Some(0),
        };
    }
}

impl fmt::Display for Decimal {
    /// `<coefficient>` or `<coefficient>e<exponent>`; the alternate form (`{:#}`)
    /// writes `<coefficient>.0e<exponent>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.signed {
            write!(f, "{}", self.coefficient as i32)?;
        } else {
            write!(f, "{}", self.coefficient)?;
        }

        if f.alternate() {
            f.write_str(".0")?;
        }

        if self.exponent != 0 {
            write!(f, "e{}", self.exponent)?;
        }

        Ok(())
    }
}

/// Integer types a `Decimal` can be built from. Everything widens to 32 bits.
pub trait Coefficient: Copy {
    fn into_decimal(self, exponent: i8) -> Decimal;
}

macro_rules! signed_coefficient {
    ($($t: ty),*) => {
        $(impl Coefficient for $t {
            fn into_decimal(self, exponent: i8) -> Decimal {
                Decimal::from_i32(self as i32, exponent)
            }
        })*
    };
}

macro_rules! unsigned_coefficient {
    ($($t: ty),*) => {
        $(impl Coefficient for $t {
            fn into_decimal(self, exponent: i8) -> Decimal {
                Decimal::from_u32(self as u32, exponent)
            }
        })*
    };
}

signed_coefficient!(i8, i16, i32);
unsigned_coefficient!(u8, u16, u32);

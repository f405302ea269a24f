//! Numeric-type abstraction.
//!
//! The optimizer, code generator, constant table and interpreter are all
//! generic over the program's number type. Calc4 arithmetic is signed
//! two's-complement with wrapping overflow, truncating division and
//! truncating remainder, so the trait exposes exactly the wrapping
//! operations plus the conversions the pipeline needs:
//!
//! - construction from a sign-extended 16-bit bytecode immediate
//! - narrowing back to `i16` when a constant fits an immediate
//! - widening to `i64` for global-array indexing
//! - truncation to a byte for character output
//!
//! `i32` and `i64` backends are provided. Callers of [`Number::wrapping_div`]
//! and [`Number::wrapping_rem`] must reject a zero divisor first; the
//! checked opcodes and the optimizer both do.

use std::fmt;
use std::hash::Hash;

/// A signed integer type usable as the Calc4 program number type.
pub trait Number:
    Copy + Clone + Eq + Ord + Hash + Default + fmt::Debug + fmt::Display + 'static
{
    const ZERO: Self;
    const ONE: Self;

    /// Converts a small constant, sign-extending as needed.
    fn from_i32(value: i32) -> Self;

    /// Returns the value as `i16` if it is exactly representable.
    fn to_i16_exact(self) -> Option<i16>;

    /// Widens (or wraps, for hypothetical wider types) to `i64`.
    fn to_i64(self) -> i64;

    fn wrapping_add(self, rhs: Self) -> Self;
    fn wrapping_sub(self, rhs: Self) -> Self;
    fn wrapping_mul(self, rhs: Self) -> Self;

    /// Truncating division. The divisor must be non-zero; `MIN / -1`
    /// wraps.
    fn wrapping_div(self, rhs: Self) -> Self;

    /// Truncating remainder. The divisor must be non-zero; `MIN % -1`
    /// is zero.
    fn wrapping_rem(self, rhs: Self) -> Self;

    /// Converts a comparison result to the language's 0/1 encoding.
    #[inline]
    fn from_bool(value: bool) -> Self {
        if value {
            Self::ONE
        } else {
            Self::ZERO
        }
    }

    #[inline]
    fn is_zero(self) -> bool {
        self == Self::ZERO
    }

    /// The low byte of the value, for `PrintChar`.
    #[inline]
    fn to_byte(self) -> u8 {
        self.to_i64() as u8
    }
}

macro_rules! impl_number {
    ($ty:ty) => {
        impl Number for $ty {
            const ZERO: Self = 0;
            const ONE: Self = 1;

            #[inline]
            fn from_i32(value: i32) -> Self {
                value as $ty
            }

            #[inline]
            fn to_i16_exact(self) -> Option<i16> {
                i16::try_from(self).ok()
            }

            #[inline]
            fn to_i64(self) -> i64 {
                self as i64
            }

            #[inline]
            fn wrapping_add(self, rhs: Self) -> Self {
                <$ty>::wrapping_add(self, rhs)
            }

            #[inline]
            fn wrapping_sub(self, rhs: Self) -> Self {
                <$ty>::wrapping_sub(self, rhs)
            }

            #[inline]
            fn wrapping_mul(self, rhs: Self) -> Self {
                <$ty>::wrapping_mul(self, rhs)
            }

            #[inline]
            fn wrapping_div(self, rhs: Self) -> Self {
                <$ty>::wrapping_div(self, rhs)
            }

            #[inline]
            fn wrapping_rem(self, rhs: Self) -> Self {
                <$ty>::wrapping_rem(self, rhs)
            }
        }
    };
}

impl_number!(i32);
impl_number!(i64);

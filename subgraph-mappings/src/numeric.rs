//! Checked 256-bit accumulator arithmetic shared by the handlers.

use alloy::primitives::{Address, I256};
use subgraph::{Entity, MappingError, i256_from_u64};

/// Add `delta` to the `BigInt` field `field`, returning the new value.
///
/// # Errors
///
/// Returns [`MappingError::Arithmetic`] on overflow and
/// [`MappingError::TypeMismatch`] if the field is not numeric.
pub fn increase(entity: &mut Entity, field: &str, delta: I256) -> Result<I256, MappingError> {
    let value = entity
        .big_int(field)?
        .checked_add(delta)
        .ok_or_else(|| MappingError::Arithmetic(format!("{}.{field}", entity.entity_type())))?;
    entity.set(field, value);
    Ok(value)
}

/// Subtract `delta` from the `BigInt` field `field`, returning the new value.
///
/// Totals may go negative, like the hosted `BigInt` they mirror.
///
/// # Errors
///
/// Returns [`MappingError::Arithmetic`] on overflow and
/// [`MappingError::TypeMismatch`] if the field is not numeric.
pub fn decrease(entity: &mut Entity, field: &str, delta: I256) -> Result<I256, MappingError> {
    let value = entity
        .big_int(field)?
        .checked_sub(delta)
        .ok_or_else(|| MappingError::Arithmetic(format!("{}.{field}", entity.entity_type())))?;
    entity.set(field, value);
    Ok(value)
}

/// Truncating `part / total`. A zero total yields zero.
///
/// # Errors
///
/// Returns [`MappingError::Arithmetic`] if the division overflows.
pub fn ratio(part: I256, total: I256, field: &str) -> Result<I256, MappingError> {
    if total.is_zero() {
        tracing::warn!(field, part = %part, "running total is zero, ratio stored as zero");
        return Ok(I256::ZERO);
    }
    part.checked_div(total)
        .ok_or_else(|| MappingError::Arithmetic(field.to_owned()))
}

/// Block number as a `BigInt`.
#[must_use]
pub fn big(n: u64) -> I256 {
    i256_from_u64(n)
}

/// Entity id for an address: lowercase `0x` hex.
#[must_use]
pub fn hex(address: Address) -> String {
    format!("{address:#x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use subgraph::i256_from_i64;

    #[test]
    fn accumulators_go_negative_without_wrapping() {
        let mut pair = Entity::new("LendingPair", "0x1");
        assert_eq!(increase(&mut pair, "total", big(5)).unwrap(), big(5));
        assert_eq!(decrease(&mut pair, "total", big(7)).unwrap(), i256_from_i64(-2));
        assert_eq!(pair.big_int("total").unwrap(), i256_from_i64(-2));
    }

    #[test]
    fn overflow_is_an_error() {
        let mut pair = Entity::new("LendingPair", "0x1");
        pair.set("total", I256::MAX);
        assert!(matches!(
            increase(&mut pair, "total", big(1)),
            Err(MappingError::Arithmetic(field)) if field == "LendingPair.total"
        ));
    }

    #[test]
    fn ratio_truncates_and_zero_total_is_zero() {
        assert_eq!(ratio(big(7), big(2), "share").unwrap(), big(3));
        assert_eq!(ratio(big(7), I256::ZERO, "share").unwrap(), I256::ZERO);
        assert!(ratio(I256::MIN, i256_from_i64(-1), "share").is_err(), "MIN / -1 overflows");
    }
}

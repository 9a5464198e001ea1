//! Position arithmetic for simulated trading.
//!
//! Quantity is signed: positive long, negative short. All functions are
//! pure; the persistence layer applies them inside the same transaction
//! that records the trade.

use crate::order::OrderSide;
use rust_decimal::Decimal;

/// Clamp bound for the stored pnl-percent column. Values explode when the
/// cost basis is near zero, and the column is NUMERIC(8,4).
pub const PNL_PCT_CLAMP: Decimal = Decimal::from_parts(99999999, 0, 0, false, 4);

/// Minimum cost basis for a meaningful pnl percentage.
const MIN_BASIS_FOR_PCT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Core position figures carried between trades.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PositionState {
    /// Signed quantity: positive long, negative short.
    pub quantity: Decimal,
    pub average_cost: Decimal,
    pub cost_basis: Decimal,
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    pub fn is_long(&self) -> bool {
        self.quantity.is_sign_positive() && !self.quantity.is_zero()
    }

    pub fn is_short(&self) -> bool {
        self.quantity.is_sign_negative()
    }
}

/// Apply one trade to an existing position.
///
/// Rules:
/// - no existing position: quantity takes the signed size, basis = price * size
/// - adding to the position on the same side: basis accumulates, average
///   recomputes as basis / |quantity|
/// - reducing without crossing zero: basis scales by the surviving fraction,
///   average unchanged
/// - crossing zero: basis resets to |new quantity| * price, average = price
/// - closing exactly: basis and average reset to zero
pub fn apply_trade(
    existing: Option<PositionState>,
    side: OrderSide,
    size: Decimal,
    price: Decimal,
) -> PositionState {
    let signed = side.signed(size);

    let existing = match existing {
        Some(p) if !p.quantity.is_zero() => p,
        _ => {
            return PositionState {
                quantity: signed,
                average_cost: price,
                cost_basis: price * size,
            }
        }
    };

    let q = existing.quantity;
    let new_q = q + signed;

    if new_q.is_zero() {
        return PositionState {
            quantity: Decimal::ZERO,
            average_cost: Decimal::ZERO,
            cost_basis: Decimal::ZERO,
        };
    }

    // Same-sign trade extends the position.
    if q.is_sign_positive() == signed.is_sign_positive() {
        let basis = existing.cost_basis + price * size;
        return PositionState {
            quantity: new_q,
            average_cost: basis / new_q.abs(),
            cost_basis: basis,
        };
    }

    // Opposite-sign trade: either reduces toward zero or flips through it.
    if new_q.is_sign_positive() == q.is_sign_positive() {
        // Reduced, same side survives. Scale basis by the surviving fraction.
        let fraction = size / q.abs();
        PositionState {
            quantity: new_q,
            average_cost: existing.average_cost,
            cost_basis: existing.cost_basis * (Decimal::ONE - fraction),
        }
    } else {
        // Flipped through zero; the surplus opens a fresh position at `price`.
        PositionState {
            quantity: new_q,
            average_cost: price,
            cost_basis: new_q.abs() * price,
        }
    }
}

/// Mark a position against the latest price.
///
/// Returns `(market_value, unrealized_pnl)`:
/// - long: pnl = market_value - cost_basis
/// - short: pnl = cost_basis + market_value (market_value is negative)
pub fn mark_position(state: &PositionState, current_price: Decimal) -> (Decimal, Decimal) {
    let market_value = state.quantity * current_price;
    let pnl = if state.quantity.is_sign_negative() {
        state.cost_basis + market_value
    } else {
        market_value - state.cost_basis
    };
    (market_value, pnl)
}

/// Pnl percentage relative to cost basis.
///
/// `None` when the basis is too small to be meaningful; otherwise clamped
/// to the stored column range.
pub fn pnl_pct(unrealized_pnl: Decimal, cost_basis: Decimal) -> Option<Decimal> {
    if cost_basis <= MIN_BASIS_FOR_PCT {
        return None;
    }
    let pct = unrealized_pnl / cost_basis;
    Some(pct.clamp(-PNL_PCT_CLAMP, PNL_PCT_CLAMP))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pos(q: Decimal, avg: Decimal, basis: Decimal) -> PositionState {
        PositionState {
            quantity: q,
            average_cost: avg,
            cost_basis: basis,
        }
    }

    #[test]
    fn test_open_long() {
        let p = apply_trade(None, OrderSide::Buy, dec!(50), dec!(0.48));
        assert_eq!(p.quantity, dec!(50));
        assert_eq!(p.average_cost, dec!(0.48));
        assert_eq!(p.cost_basis, dec!(24.0));
    }

    #[test]
    fn test_add_to_long() {
        let existing = pos(dec!(50), dec!(0.48), dec!(24.0));
        let p = apply_trade(Some(existing), OrderSide::Buy, dec!(50), dec!(0.52));
        assert_eq!(p.quantity, dec!(100));
        assert_eq!(p.cost_basis, dec!(50.0));
        assert_eq!(p.average_cost, dec!(0.50));
    }

    #[test]
    fn test_reduce_long_keeps_average() {
        let existing = pos(dec!(100), dec!(0.50), dec!(50.0));
        let p = apply_trade(Some(existing), OrderSide::Sell, dec!(40), dec!(0.60));
        assert_eq!(p.quantity, dec!(60));
        assert_eq!(p.average_cost, dec!(0.50));
        assert_eq!(p.cost_basis, dec!(30.0));
    }

    #[test]
    fn test_close_resets() {
        let existing = pos(dec!(50), dec!(0.48), dec!(24.0));
        let p = apply_trade(Some(existing), OrderSide::Sell, dec!(50), dec!(0.55));
        assert!(p.is_flat());
        assert_eq!(p.average_cost, Decimal::ZERO);
        assert_eq!(p.cost_basis, Decimal::ZERO);
    }

    #[test]
    fn test_flip_to_short() {
        let existing = pos(dec!(30), dec!(0.50), dec!(15.0));
        let p = apply_trade(Some(existing), OrderSide::Sell, dec!(50), dec!(0.55));
        assert_eq!(p.quantity, dec!(-20));
        assert_eq!(p.average_cost, dec!(0.55));
        assert_eq!(p.cost_basis, dec!(11.0));
    }

    #[test]
    fn test_cover_short_partial() {
        let existing = pos(dec!(-100), dec!(0.40), dec!(40.0));
        let p = apply_trade(Some(existing), OrderSide::Buy, dec!(25), dec!(0.30));
        assert_eq!(p.quantity, dec!(-75));
        assert_eq!(p.average_cost, dec!(0.40));
        assert_eq!(p.cost_basis, dec!(30.0));
    }

    #[test]
    fn test_mark_long() {
        let state = pos(dec!(50), dec!(0.48), dec!(24.0));
        let (mv, pnl) = mark_position(&state, dec!(0.60));
        assert_eq!(mv, dec!(30.0));
        assert_eq!(pnl, dec!(6.0));
    }

    #[test]
    fn test_mark_short() {
        let state = pos(dec!(-50), dec!(0.48), dec!(24.0));
        let (mv, pnl) = mark_position(&state, dec!(0.40));
        assert_eq!(mv, dec!(-20.0));
        // Short from 0.48, now 0.40: 24.0 - 20.0 = 4.0 profit
        assert_eq!(pnl, dec!(4.0));
    }

    #[test]
    fn test_pnl_pct_near_zero_basis() {
        assert!(pnl_pct(dec!(5), dec!(0.005)).is_none());
        assert_eq!(pnl_pct(dec!(5), dec!(50)).unwrap(), dec!(0.1));
    }

    #[test]
    fn test_pnl_pct_clamped() {
        let pct = pnl_pct(dec!(1000000), dec!(0.02)).unwrap();
        assert_eq!(pct, PNL_PCT_CLAMP);
    }
}

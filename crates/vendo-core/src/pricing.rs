//! # Pricing Engine
//!
//! Deterministic recomputation of a cart's running totals.
//!
//! ## Recompute Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  items            ──► items_count, total_price                          │
//! │  coupon snapshot  ──► total_discount (re-evaluated, never cached)       │
//! │  shipping option  ──► shipping_fee (threshold / free-shipping zeroing)  │
//! │  tax rate         ──► tax_amount on the discounted subtotal             │
//! │                                                                         │
//! │  grand_total = max(0, (total_price - total_discount)                    │
//! │                        + shipping_fee + tax_amount)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A pure function of cart state. The cart aggregate calls this after
//! every mutation (add/update/remove, coupon apply/remove, shipping
//! change) so the summary is never stale, and recomputing twice without
//! a mutation yields identical results.

use crate::coupon::{CouponEngine, CouponSnapshot};
use crate::money::Money;
use crate::types::{CartItem, CartSummary, ShippingSelection, TaxRate};

pub struct PricingEngine;

impl PricingEngine {
    /// Recomputes a [`CartSummary`] from the cart's current state.
    pub fn recompute(
        items: &[CartItem],
        coupon: Option<&CouponSnapshot>,
        shipping: Option<&ShippingSelection>,
        tax_rate: TaxRate,
    ) -> CartSummary {
        let items_count: i64 = items.iter().map(|i| i.quantity).sum();
        let total_price: Money = items.iter().map(CartItem::line_total).sum();

        // Coupon discount is re-evaluated against the current lines, so
        // removing or adding items changes it automatically.
        let (total_discount, coupon_free_shipping) = match coupon {
            Some(snapshot) => {
                CouponEngine::discount(&snapshot.rule, &snapshot.restrictions, items)
            }
            None => (Money::zero(), false),
        };

        let shipping_fee = Self::shipping_fee(shipping, total_price, coupon_free_shipping);

        // Tax applies to the discounted goods value, floored at zero so
        // an oversized fixed discount cannot produce negative tax.
        let taxable = (total_price - total_discount).clamp_non_negative();
        let tax_amount = taxable.calculate_tax(tax_rate);

        let grand_total =
            ((total_price - total_discount) + shipping_fee + tax_amount).clamp_non_negative();

        CartSummary {
            items_count,
            total_price,
            total_discount,
            shipping_fee,
            tax_amount,
            grand_total,
        }
    }

    /// The selected option's flat fee, zeroed when the subtotal reaches
    /// the option's free threshold or the coupon grants free shipping.
    /// Both conditions are idempotent: either alone suffices.
    fn shipping_fee(
        shipping: Option<&ShippingSelection>,
        total_price: Money,
        coupon_free_shipping: bool,
    ) -> Money {
        let Some(option) = shipping else {
            return Money::zero();
        };
        if coupon_free_shipping {
            return Money::zero();
        }
        if let Some(threshold) = option.free_threshold {
            if total_price >= threshold {
                return Money::zero();
            }
        }
        option.fee
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

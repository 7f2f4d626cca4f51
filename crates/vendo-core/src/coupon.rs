//! # Coupon Engine
//!
//! Coupon definitions and the eligibility/discount pipeline.
//!
//! ## Validation Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  evaluate(coupon, customer_uses, now, subtotal, items)                  │
//! │                                                                         │
//! │  1. active + inside [starts_at, ends_at]?   ──► not_found               │
//! │  2. global usage under usage_limit?         ──► depleted                │
//! │  3. customer uses under per_customer_limit? ──► per_customer_limit      │
//! │  4. subtotal >= min_purchase?               ──► minimum_not_met         │
//! │  5. applicable subtotal over restrictions   ──► no_eligible_items       │
//! │  6. discount by rule variant                                            │
//! │                                                                         │
//! │  Each step is a hard stop on failure.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine is pure: code normalization, the lookup itself and the
//! usage-count queries live in vendo-db. Step 6 is also reachable on its
//! own through [`CouponEngine::discount`], which the pricing engine calls
//! on every recompute so a stored coupon's discount always reflects the
//! *current* cart contents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::money::Money;
use crate::types::CartItem;

// =============================================================================
// Discount Rule
// =============================================================================

/// What a coupon grants, as a tagged variant.
///
/// The discount calculator matches exhaustively on this, so adding a
/// rule type is a compile error until every caller handles it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
pub enum DiscountRule {
    /// Percentage of the applicable subtotal, optionally capped.
    Percentage {
        /// Rate in basis points (1000 = 10%).
        rate_bps: u32,
        max_discount: Option<Money>,
    },
    /// Fixed amount, never exceeding what it is applied to.
    Fixed { amount: Money },
    /// No amount discount; zeroes the shipping fee instead.
    FreeShipping,
}

// =============================================================================
// Restrictions
// =============================================================================

/// Restriction axes limiting which cart lines a coupon applies to.
///
/// An item is eligible if it matches at least one non-empty axis. Both
/// axes empty means the coupon applies to the whole cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CouponRestrictions {
    pub categories: Vec<String>,
    pub product_ids: Vec<String>,
}

impl CouponRestrictions {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.product_ids.is_empty()
    }

    /// Whether a cart line matches any non-empty axis.
    pub fn matches(&self, item: &CartItem) -> bool {
        (!self.categories.is_empty() && self.categories.contains(&item.category))
            || (!self.product_ids.is_empty() && self.product_ids.contains(&item.product_id))
    }
}

// =============================================================================
// Coupon
// =============================================================================

/// Derived coupon status. Expiry wins over depletion, which wins over
/// the active flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum CouponStatus {
    Active,
    Inactive,
    Expired,
    Depleted,
}

/// A discount rule identified by a redemption code.
///
/// Mutated only by marketing operators; the engine reads it. The
/// `usage_count` here is a read snapshot - the authoritative counter is
/// guarded by a conditional increment in the db layer.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Coupon {
    pub id: String,
    /// Unique, stored uppercase; lookups normalize case.
    pub code: String,
    pub rule: DiscountRule,
    /// Cart subtotal required before the coupon applies.
    pub min_purchase: Money,
    /// Global redemption cap, if any.
    pub usage_limit: Option<i64>,
    /// Per-customer redemption cap, if any.
    pub per_customer_limit: Option<i64>,
    pub usage_count: i64,
    pub restrictions: CouponRestrictions,
    #[ts(as = "String")]
    pub starts_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub ends_at: DateTime<Utc>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    /// Derived status at `now`.
    pub fn status(&self, now: DateTime<Utc>) -> CouponStatus {
        if now > self.ends_at {
            return CouponStatus::Expired;
        }
        if let Some(limit) = self.usage_limit {
            if self.usage_count >= limit {
                return CouponStatus::Depleted;
            }
        }
        if self.is_active {
            CouponStatus::Active
        } else {
            CouponStatus::Inactive
        }
    }

    fn in_window(&self, now: DateTime<Utc>) -> bool {
        now >= self.starts_at && now <= self.ends_at
    }
}

/// Frozen coupon data stored on carts and orders.
///
/// A snapshot, not a live reference: later edits to the coupon do not
/// change what an applied cart or a past order sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CouponSnapshot {
    pub coupon_id: String,
    pub code: String,
    pub rule: DiscountRule,
    pub restrictions: CouponRestrictions,
    pub min_purchase: Money,
}

impl From<&Coupon> for CouponSnapshot {
    fn from(coupon: &Coupon) -> Self {
        CouponSnapshot {
            coupon_id: coupon.id.clone(),
            code: coupon.code.clone(),
            rule: coupon.rule.clone(),
            restrictions: coupon.restrictions.clone(),
            min_purchase: coupon.min_purchase,
        }
    }
}

// =============================================================================
// Evaluation Results
// =============================================================================

/// Successful evaluation: what the coupon grants against this cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountInfo {
    pub discount: Money,
    pub free_shipping: bool,
    pub coupon_id: String,
    pub restrictions: CouponRestrictions,
}

/// Why a coupon was rejected. Stable reason codes are part of the
/// collaborator contract; see [`CouponRejection::reason_code`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponRejection {
    /// Absent, inactive, or outside its activity window.
    #[error("coupon does not exist or is not active")]
    NotFound,

    /// Global usage limit reached.
    #[error("coupon usage limit has been reached")]
    Depleted,

    /// This customer exhausted their personal allowance.
    #[error("coupon already used the maximum number of times by this customer")]
    PerCustomerLimit,

    #[error("cart subtotal {subtotal} is below the {minimum} minimum purchase")]
    MinimumNotMet { minimum: Money, subtotal: Money },

    /// Restrictions are set and nothing in the cart matches them.
    #[error("no items in the cart are eligible for this coupon")]
    NoEligibleItems,
}

impl CouponRejection {
    /// Stable machine-readable code, exposed unchanged to collaborators.
    pub fn reason_code(&self) -> &'static str {
        match self {
            CouponRejection::NotFound => "not_found",
            CouponRejection::Depleted => "depleted",
            CouponRejection::PerCustomerLimit => "per_customer_limit",
            CouponRejection::MinimumNotMet { .. } => "minimum_not_met",
            CouponRejection::NoEligibleItems => "no_eligible_items",
        }
    }
}

// =============================================================================
// Coupon Engine
// =============================================================================

/// Pure coupon evaluation.
pub struct CouponEngine;

impl CouponEngine {
    /// Runs the full eligibility pipeline against a cart.
    ///
    /// `coupon` is the (already code-normalized) lookup result;
    /// `customer_uses` is this account's historical redemption count.
    /// Each step is a hard stop; the cart is untouched on failure.
    pub fn evaluate(
        coupon: Option<&Coupon>,
        customer_uses: i64,
        now: DateTime<Utc>,
        cart_subtotal: Money,
        items: &[CartItem],
    ) -> Result<DiscountInfo, CouponRejection> {
        // Step 1: existence, active flag, activity window.
        let coupon = match coupon {
            Some(c) if c.is_active && c.in_window(now) => c,
            _ => return Err(CouponRejection::NotFound),
        };

        // Step 2: global usage cap.
        if let Some(limit) = coupon.usage_limit {
            if coupon.usage_count >= limit {
                return Err(CouponRejection::Depleted);
            }
        }

        // Step 3: per-customer cap.
        if let Some(limit) = coupon.per_customer_limit {
            if customer_uses >= limit {
                return Err(CouponRejection::PerCustomerLimit);
            }
        }

        // Step 4: minimum purchase.
        if cart_subtotal < coupon.min_purchase {
            return Err(CouponRejection::MinimumNotMet {
                minimum: coupon.min_purchase,
                subtotal: cart_subtotal,
            });
        }

        // Step 5: restriction axes must catch at least one line.
        let applicable = Self::applicable_subtotal(&coupon.restrictions, items);
        if !coupon.restrictions.is_empty() && applicable.is_zero() {
            return Err(CouponRejection::NoEligibleItems);
        }

        // Step 6: discount by rule.
        let (discount, free_shipping) = Self::discount_on(&coupon.rule, applicable);

        Ok(DiscountInfo {
            discount,
            free_shipping,
            coupon_id: coupon.id.clone(),
            restrictions: coupon.restrictions.clone(),
        })
    }

    /// Recomputes the discount an applied snapshot grants against the
    /// current cart lines (steps 5-6 only).
    ///
    /// Called from the pricing engine on every recompute, so adding or
    /// removing items changes the discount automatically. Returns
    /// `(discount, free_shipping)`.
    pub fn discount(
        rule: &DiscountRule,
        restrictions: &CouponRestrictions,
        items: &[CartItem],
    ) -> (Money, bool) {
        let applicable = Self::applicable_subtotal(restrictions, items);
        Self::discount_on(rule, applicable)
    }

    /// Sum of `price * quantity` over the lines the restrictions catch;
    /// the full subtotal when no restrictions are set.
    fn applicable_subtotal(restrictions: &CouponRestrictions, items: &[CartItem]) -> Money {
        items
            .iter()
            .filter(|item| restrictions.is_empty() || restrictions.matches(item))
            .map(CartItem::line_total)
            .sum()
    }

    fn discount_on(rule: &DiscountRule, applicable: Money) -> (Money, bool) {
        match rule {
            DiscountRule::Percentage {
                rate_bps,
                max_discount,
            } => {
                let mut discount = applicable.fraction_bps(*rate_bps);
                if let Some(cap) = max_discount {
                    discount = discount.min(*cap);
                }
                (discount, false)
            }
            // A fixed discount never exceeds what it is applied to.
            DiscountRule::Fixed { amount } => ((*amount).min(applicable), false),
            DiscountRule::FreeShipping => (Money::zero(), true),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProductType;
    use chrono::Duration;

    fn item(product_id: &str, category: &str, price_cents: i64, quantity: i64) -> CartItem {
        CartItem {
            product_id: product_id.to_string(),
            name: format!("Item {product_id}"),
            price: Money::from_cents(price_cents),
            quantity,
            image: None,
            category: category.to_string(),
            product_type: ProductType::Single,
            package_info: None,
            is_available: true,
            max_quantity: 99,
        }
    }

    fn coupon(rule: DiscountRule) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: "c1".to_string(),
            code: "WELCOME10".to_string(),
            rule,
            min_purchase: Money::from_cents(5000),
            usage_limit: None,
            per_customer_limit: None,
            usage_count: 0,
            restrictions: CouponRestrictions::default(),
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(30),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn percentage(rate_bps: u32) -> DiscountRule {
        DiscountRule::Percentage {
            rate_bps,
            max_discount: None,
        }
    }

    #[test]
    fn test_percentage_coupon() {
        // Scenario A: 10% off a $200.00 cart, min purchase $50.00.
        let c = coupon(percentage(1000));
        let items = vec![item("p1", "coffee", 10000, 2)];
        let info =
            CouponEngine::evaluate(Some(&c), 0, Utc::now(), Money::from_cents(20000), &items)
                .unwrap();
        assert_eq!(info.discount.cents(), 2000);
        assert!(!info.free_shipping);
    }

    #[test]
    fn test_fixed_coupon() {
        // Scenario B: fixed $20.00 off, min purchase $100.00.
        let mut c = coupon(DiscountRule::Fixed {
            amount: Money::from_cents(2000),
        });
        c.min_purchase = Money::from_cents(10000);
        let items = vec![item("p1", "coffee", 10000, 2)];
        let info =
            CouponEngine::evaluate(Some(&c), 0, Utc::now(), Money::from_cents(20000), &items)
                .unwrap();
        assert_eq!(info.discount.cents(), 2000);
    }

    #[test]
    fn test_fixed_coupon_never_exceeds_applicable() {
        let mut c = coupon(DiscountRule::Fixed {
            amount: Money::from_cents(50000),
        });
        c.min_purchase = Money::zero();
        let items = vec![item("p1", "coffee", 1000, 1)];
        let info = CouponEngine::evaluate(Some(&c), 0, Utc::now(), Money::from_cents(1000), &items)
            .unwrap();
        assert_eq!(info.discount.cents(), 1000);
    }

    #[test]
    fn test_percentage_cap() {
        let c = coupon(DiscountRule::Percentage {
            rate_bps: 5000, // 50%
            max_discount: Some(Money::from_cents(2500)),
        });
        let items = vec![item("p1", "coffee", 10000, 2)];
        let info =
            CouponEngine::evaluate(Some(&c), 0, Utc::now(), Money::from_cents(20000), &items)
                .unwrap();
        assert_eq!(info.discount.cents(), 2500);
    }

    #[test]
    fn test_free_shipping() {
        let c = coupon(DiscountRule::FreeShipping);
        let items = vec![item("p1", "coffee", 10000, 1)];
        let info =
            CouponEngine::evaluate(Some(&c), 0, Utc::now(), Money::from_cents(10000), &items)
                .unwrap();
        assert!(info.free_shipping);
        assert!(info.discount.is_zero());
    }

    #[test]
    fn test_missing_inactive_or_expired_is_not_found() {
        let items = vec![item("p1", "coffee", 10000, 1)];
        let subtotal = Money::from_cents(10000);

        assert_eq!(
            CouponEngine::evaluate(None, 0, Utc::now(), subtotal, &items),
            Err(CouponRejection::NotFound)
        );

        let mut inactive = coupon(percentage(1000));
        inactive.is_active = false;
        assert_eq!(
            CouponEngine::evaluate(Some(&inactive), 0, Utc::now(), subtotal, &items),
            Err(CouponRejection::NotFound)
        );

        let mut expired = coupon(percentage(1000));
        expired.ends_at = Utc::now() - Duration::days(1);
        assert_eq!(
            CouponEngine::evaluate(Some(&expired), 0, Utc::now(), subtotal, &items),
            Err(CouponRejection::NotFound)
        );
        assert_eq!(expired.status(Utc::now()), CouponStatus::Expired);
    }

    #[test]
    fn test_depleted() {
        let mut c = coupon(percentage(1000));
        c.usage_limit = Some(100);
        c.usage_count = 100;
        let items = vec![item("p1", "coffee", 10000, 1)];
        assert_eq!(
            CouponEngine::evaluate(Some(&c), 0, Utc::now(), Money::from_cents(10000), &items),
            Err(CouponRejection::Depleted)
        );
        assert_eq!(c.status(Utc::now()), CouponStatus::Depleted);
    }

    #[test]
    fn test_per_customer_limit() {
        let mut c = coupon(percentage(1000));
        c.per_customer_limit = Some(1);
        let items = vec![item("p1", "coffee", 10000, 1)];
        assert_eq!(
            CouponEngine::evaluate(Some(&c), 1, Utc::now(), Money::from_cents(10000), &items),
            Err(CouponRejection::PerCustomerLimit)
        );
    }

    #[test]
    fn test_minimum_not_met() {
        let c = coupon(percentage(1000)); // min purchase $50.00
        let items = vec![item("p1", "coffee", 1000, 1)];
        let err = CouponEngine::evaluate(Some(&c), 0, Utc::now(), Money::from_cents(1000), &items)
            .unwrap_err();
        assert_eq!(err.reason_code(), "minimum_not_met");
    }

    #[test]
    fn test_restrictions_limit_applicable_subtotal() {
        let mut c = coupon(percentage(1000));
        c.restrictions.categories = vec!["coffee".to_string()];
        let items = vec![
            item("p1", "coffee", 10000, 1), // eligible: $100.00
            item("p2", "tea", 10000, 1),    // not eligible
        ];
        let info =
            CouponEngine::evaluate(Some(&c), 0, Utc::now(), Money::from_cents(20000), &items)
                .unwrap();
        // 10% of the eligible $100.00 only.
        assert_eq!(info.discount.cents(), 1000);
    }

    #[test]
    fn test_no_eligible_items() {
        let mut c = coupon(percentage(1000));
        c.restrictions.product_ids = vec!["other".to_string()];
        let items = vec![item("p1", "coffee", 10000, 1)];
        assert_eq!(
            CouponEngine::evaluate(Some(&c), 0, Utc::now(), Money::from_cents(10000), &items),
            Err(CouponRejection::NoEligibleItems)
        );
    }

    #[test]
    fn test_discount_never_exceeds_applicable_subtotal() {
        // Property: for all rules, discount <= applicable subtotal.
        let items = vec![item("p1", "coffee", 700, 3)];
        let applicable = Money::from_cents(2100);
        for rule in [
            percentage(10000), // 100%
            DiscountRule::Fixed {
                amount: Money::from_cents(999_999),
            },
            DiscountRule::FreeShipping,
        ] {
            let (discount, _) = CouponEngine::discount(&rule, &CouponRestrictions::default(), &items);
            assert!(discount <= applicable, "rule {rule:?} overshot");
        }
    }
}

//! # Cart Aggregate
//!
//! The mutable pre-purchase basket, one per account.
//!
//! ## Mutation Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  every mutating call                                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  refresh_stock()   refresh is_available/max_quantity from live stock,  │
//! │       │            clamp over-committed quantities downward            │
//! │       ▼                                                                 │
//! │  the operation     validated against stock; failure = cart unchanged   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  recompute()       summary is never stale                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The aggregate composes [`StockLedger`] on every mutation and the
//! pricing/coupon engines on every recompute. Persistence (lazy creation
//! per account, save/load) lives in vendo-db.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::coupon::{Coupon, CouponEngine, CouponSnapshot, DiscountInfo};
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::pricing::PricingEngine;
use crate::stock::{ProductSource, StockLedger};
use crate::types::{Address, CartItem, CartSummary, Product, ShippingSelection, TaxRate};
use crate::validation::validate_quantity;
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

// =============================================================================
// Cart
// =============================================================================

/// A mutable pre-purchase basket owned by one account.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Cart {
    pub id: String,
    pub account_id: String,
    pub items: Vec<CartItem>,
    pub summary: CartSummary,
    /// Frozen coupon data; re-evaluated against current items on every
    /// recompute, but never re-read from the live coupon.
    pub coupon: Option<CouponSnapshot>,
    pub shipping: Option<ShippingSelection>,
    pub shipping_address: Option<Address>,
    pub tax_rate: TaxRate,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty cart for an account.
    pub fn new(id: impl Into<String>, account_id: impl Into<String>, tax_rate: TaxRate) -> Self {
        let now = Utc::now();
        Cart {
            id: id.into(),
            account_id: account_id.into(),
            items: Vec::new(),
            summary: CartSummary::default(),
            coupon: None,
            shipping: None,
            shipping_address: None,
            tax_rate,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Current subtotal over the lines (`price * quantity`).
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }

    // =========================================================================
    // Stock refresh
    // =========================================================================

    /// Refreshes each line's `is_available`/`max_quantity` from current
    /// stock and clamps quantities that now exceed it.
    ///
    /// A product that vanished from the catalog degrades its line to
    /// `is_available = false, max_quantity = 0` instead of failing the
    /// whole read; the line stays visible so the account holder can see
    /// what happened.
    pub fn refresh_stock<S: ProductSource>(&mut self, source: &S) {
        let ledger = StockLedger::new(source);
        for item in &mut self.items {
            let available = ledger.available_quantity(&item.product_id);
            item.max_quantity = available;
            item.is_available = available > 0;
            if available > 0 && item.quantity > available {
                item.quantity = available;
            }
        }
        self.recompute();
    }

    // =========================================================================
    // Item operations
    // =========================================================================

    /// Adds `quantity` units of a product, merging into an existing line.
    ///
    /// The *merged* total is validated against stock, never the delta
    /// alone. Rejection reports `max_can_add` and leaves the cart
    /// unchanged.
    pub fn add_item<S: ProductSource>(
        &mut self,
        product: &Product,
        quantity: i64,
        source: &S,
    ) -> CoreResult<()> {
        validate_quantity(quantity)?;
        self.refresh_stock(source);

        let existing_quantity = self
            .items
            .iter()
            .find(|i| i.product_id == product.id)
            .map(|i| i.quantity)
            .unwrap_or(0);
        let merged = existing_quantity + quantity;

        if merged > MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: merged,
                max: MAX_ITEM_QUANTITY,
            });
        }

        let availability = StockLedger::new(source).available(&product.id, merged);
        if !availability.ok {
            return Err(CoreError::InsufficientStock {
                product_id: product.id.clone(),
                name: product.name.clone(),
                requested: quantity,
                max_can_add: (availability.available_quantity - existing_quantity).max(0),
            });
        }

        if let Some(item) = self.items.iter_mut().find(|i| i.product_id == product.id) {
            item.quantity = merged;
            item.max_quantity = availability.available_quantity;
            item.is_available = true;
        } else {
            if self.items.len() >= MAX_CART_ITEMS {
                return Err(CoreError::CartTooLarge {
                    max: MAX_CART_ITEMS,
                });
            }
            self.items.push(CartItem {
                product_id: product.id.clone(),
                name: product.name.clone(),
                price: product.price,
                quantity,
                image: product.image.clone(),
                category: product.category.clone(),
                product_type: product.product_type,
                // Packages carry their constituent breakdown from add time.
                package_info: if product.is_package() {
                    Some(product.package_components.clone())
                } else {
                    None
                },
                is_available: true,
                max_quantity: availability.available_quantity,
            });
        }

        self.recompute();
        Ok(())
    }

    /// Sets a line's quantity, validated against the live stock count.
    pub fn update_quantity(
        &mut self,
        product_id: &str,
        quantity: i64,
        live_stock: i64,
    ) -> CoreResult<()> {
        validate_quantity(quantity)?;

        let item = self
            .items
            .iter_mut()
            .find(|i| i.product_id == product_id)
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        if quantity > live_stock {
            return Err(CoreError::InsufficientStock {
                product_id: item.product_id.clone(),
                name: item.name.clone(),
                requested: quantity,
                max_can_add: live_stock.max(0),
            });
        }

        item.quantity = quantity;
        item.max_quantity = live_stock;
        item.is_available = live_stock > 0;
        self.recompute();
        Ok(())
    }

    /// Removes a line. Unconditional: removing an absent line is a no-op.
    pub fn remove_item(&mut self, product_id: &str) {
        self.items.retain(|i| i.product_id != product_id);
        self.recompute();
    }

    /// Empties the cart and drops the coupon.
    pub fn clear(&mut self) {
        self.items.clear();
        self.coupon = None;
        self.recompute();
    }

    // =========================================================================
    // Coupon operations
    // =========================================================================

    /// Applies a coupon (already looked up by normalized code).
    ///
    /// On success the cart stores a snapshot, not a live reference; on
    /// failure the cart is unchanged.
    pub fn apply_coupon(
        &mut self,
        coupon: Option<&Coupon>,
        customer_uses: i64,
        now: DateTime<Utc>,
    ) -> CoreResult<DiscountInfo> {
        let info =
            CouponEngine::evaluate(coupon, customer_uses, now, self.subtotal(), &self.items)?;
        // evaluate only succeeds when a coupon was present
        if let Some(coupon) = coupon {
            self.coupon = Some(CouponSnapshot::from(coupon));
        }
        self.recompute();
        Ok(info)
    }

    /// Drops the applied coupon. Unconditional.
    pub fn remove_coupon(&mut self) {
        self.coupon = None;
        self.recompute();
    }

    // =========================================================================
    // Shipping
    // =========================================================================

    pub fn select_shipping(&mut self, shipping: Option<ShippingSelection>) {
        self.shipping = shipping;
        self.recompute();
    }

    pub fn set_shipping_address(&mut self, address: Option<Address>) {
        self.shipping_address = address;
    }

    // =========================================================================
    // Recompute
    // =========================================================================

    /// Recomputes the summary from current state. Called after every
    /// mutating operation; idempotent between mutations.
    pub fn recompute(&mut self) {
        self.summary = PricingEngine::recompute(
            &self.items,
            self.coupon.as_ref(),
            self.shipping.as_ref(),
            self.tax_rate,
        );
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupon::{CouponRestrictions, DiscountRule};
    use crate::types::{PackageComponent, ProductType};
    use chrono::Duration;
    use std::collections::HashMap;

    fn product(id: &str, price_cents: i64, stock: i64) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {id}"),
            description: None,
            category: "coffee".to_string(),
            image: None,
            price: Money::from_cents(price_cents),
            product_type: ProductType::Single,
            package_components: vec![],
            package_savings: None,
            current_stock: stock,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn store(products: Vec<Product>) -> HashMap<String, Product> {
        products.into_iter().map(|p| (p.id.clone(), p)).collect()
    }

    fn welcome10() -> Coupon {
        let now = Utc::now();
        Coupon {
            id: "c-welcome".to_string(),
            code: "WELCOME10".to_string(),
            rule: DiscountRule::Percentage {
                rate_bps: 1000,
                max_discount: None,
            },
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

    #[test]
    fn test_scenario_a_add_and_apply_coupon() {
        let p = product("p1", 10000, 5);
        let source = store(vec![p.clone()]);
        let mut cart = Cart::new("cart1", "acct1", TaxRate::zero());

        cart.add_item(&p, 2, &source).unwrap();
        assert_eq!(cart.summary.total_price.cents(), 20000);

        let coupon = welcome10();
        let info = cart.apply_coupon(Some(&coupon), 0, Utc::now()).unwrap();
        assert_eq!(info.discount.cents(), 2000);
        assert_eq!(cart.summary.total_discount.cents(), 2000);
        assert_eq!(cart.summary.grand_total.cents(), 18000);
    }

    #[test]
    fn test_scenario_c_insufficient_stock_reports_max_can_add() {
        let p = product("p1", 10000, 5);
        let source = store(vec![p.clone()]);
        let mut cart = Cart::new("cart1", "acct1", TaxRate::zero());

        let err = cart.add_item(&p, 10, &source).unwrap_err();
        match err {
            CoreError::InsufficientStock { max_can_add, .. } => assert_eq!(max_can_add, 5),
            other => panic!("unexpected error: {other:?}"),
        }
        // Rejected mutation leaves the cart unchanged.
        assert!(cart.is_empty());
        assert_eq!(cart.summary.total_price, Money::zero());
    }

    #[test]
    fn test_merge_validates_merged_total() {
        let p = product("p1", 1000, 5);
        let source = store(vec![p.clone()]);
        let mut cart = Cart::new("cart1", "acct1", TaxRate::zero());

        cart.add_item(&p, 3, &source).unwrap();
        // 3 in cart + 3 more = 6 > stock of 5; the merged total is checked.
        let err = cart.add_item(&p, 3, &source).unwrap_err();
        match err {
            CoreError::InsufficientStock { max_can_add, .. } => assert_eq!(max_can_add, 2),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(cart.items[0].quantity, 3);

        cart.add_item(&p, 2, &source).unwrap();
        assert_eq!(cart.items[0].quantity, 5);
        assert_eq!(cart.items.len(), 1);
    }

    #[test]
    fn test_package_copies_constituents() {
        let mut bundle = product("bundle", 2500, 0);
        bundle.product_type = ProductType::Package;
        bundle.package_components = vec![PackageComponent {
            product_id: "p1".to_string(),
            name: "Beans".to_string(),
            quantity: 2,
            price: Money::from_cents(1000),
        }];
        let source = store(vec![bundle.clone(), product("p1", 1000, 10)]);
        let mut cart = Cart::new("cart1", "acct1", TaxRate::zero());

        cart.add_item(&bundle, 2, &source).unwrap();
        let info = cart.items[0].package_info.as_ref().unwrap();
        assert_eq!(info[0].product_id, "p1");
    }

    #[test]
    fn test_refresh_clamps_overcommitted_quantity() {
        let p = product("p1", 1000, 10);
        let mut source = store(vec![p.clone()]);
        let mut cart = Cart::new("cart1", "acct1", TaxRate::zero());
        cart.add_item(&p, 8, &source).unwrap();

        // Stock shrank behind the cart's back.
        source.get_mut("p1").unwrap().current_stock = 3;
        cart.refresh_stock(&source);

        assert_eq!(cart.items[0].quantity, 3);
        assert_eq!(cart.items[0].max_quantity, 3);
        assert_eq!(cart.summary.total_price.cents(), 3000);
    }

    #[test]
    fn test_vanished_product_degrades_line() {
        let p = product("p1", 1000, 10);
        let source = store(vec![p.clone()]);
        let mut cart = Cart::new("cart1", "acct1", TaxRate::zero());
        cart.add_item(&p, 2, &source).unwrap();

        let empty = store(vec![]);
        cart.refresh_stock(&empty);

        assert!(!cart.items[0].is_available);
        assert_eq!(cart.items[0].max_quantity, 0);
    }

    #[test]
    fn test_update_quantity_against_live_stock() {
        let p = product("p1", 1000, 10);
        let source = store(vec![p.clone()]);
        let mut cart = Cart::new("cart1", "acct1", TaxRate::zero());
        cart.add_item(&p, 2, &source).unwrap();

        assert!(cart.update_quantity("p1", 12, 10).is_err());
        assert_eq!(cart.items[0].quantity, 2);

        cart.update_quantity("p1", 7, 10).unwrap();
        assert_eq!(cart.items[0].quantity, 7);
        assert_eq!(cart.summary.total_price.cents(), 7000);
    }

    #[test]
    fn test_failed_coupon_leaves_cart_unchanged() {
        let p = product("p1", 1000, 10);
        let source = store(vec![p.clone()]);
        let mut cart = Cart::new("cart1", "acct1", TaxRate::zero());
        cart.add_item(&p, 1, &source).unwrap();

        // Subtotal $10.00 is below WELCOME10's $50.00 minimum.
        let coupon = welcome10();
        assert!(cart.apply_coupon(Some(&coupon), 0, Utc::now()).is_err());
        assert!(cart.coupon.is_none());
        assert_eq!(cart.summary.total_discount, Money::zero());
    }

    #[test]
    fn test_clear_drops_coupon() {
        let p = product("p1", 10000, 10);
        let source = store(vec![p.clone()]);
        let mut cart = Cart::new("cart1", "acct1", TaxRate::zero());
        cart.add_item(&p, 1, &source).unwrap();
        cart.apply_coupon(Some(&welcome10()), 0, Utc::now()).unwrap();
        assert!(cart.coupon.is_some());

        cart.clear();
        assert!(cart.is_empty());
        assert!(cart.coupon.is_none());
        assert_eq!(cart.summary, CartSummary::default());
    }

    #[test]
    fn test_removing_items_reevaluates_discount() {
        let a = product("a", 10000, 10);
        let b = product("b", 10000, 10);
        let source = store(vec![a.clone(), b.clone()]);
        let mut cart = Cart::new("cart1", "acct1", TaxRate::zero());
        cart.add_item(&a, 1, &source).unwrap();
        cart.add_item(&b, 1, &source).unwrap();
        cart.apply_coupon(Some(&welcome10()), 0, Utc::now()).unwrap();
        assert_eq!(cart.summary.total_discount.cents(), 2000);

        // Discount follows the cart contents, not the apply-time value.
        cart.remove_item("b");
        assert_eq!(cart.summary.total_discount.cents(), 1000);
    }
}

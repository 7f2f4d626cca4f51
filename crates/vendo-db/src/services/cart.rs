//! # Cart Service
//!
//! The storefront's cart surface: every operation loads the aggregate,
//! refreshes it against live stock, applies the pure mutation from
//! vendo-core and persists the result.
//!
//! ## Read/Mutate Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  request (account_id, ...)                                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  load cart (lazy create) ── load backing products ── refresh_stock      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  pure mutation on the aggregate (vendo-core::cart)                      │
//! │       │              │                                                  │
//! │       │              └── rejected → cart untouched, nothing saved       │
//! │       ▼                                                                 │
//! │  save (summary recomputed inside the aggregate)                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock here is advisory UX-gating only; the authoritative claim is the
//! conditional decrement at checkout.

use tracing::debug;
use vendo_core::cart::Cart;
use vendo_core::coupon::DiscountInfo;
use vendo_core::types::{Address, ShippingSelection, TaxRate};
use vendo_core::validation::validate_coupon_code;

use crate::error::DbResult;
use crate::pool::Database;

/// Storefront cart operations for one database.
#[derive(Debug, Clone)]
pub struct CartService {
    db: Database,
    /// Tax rate stamped onto newly created carts.
    default_tax_rate: TaxRate,
}

impl CartService {
    pub fn new(db: Database, default_tax_rate: TaxRate) -> Self {
        CartService {
            db,
            default_tax_rate,
        }
    }

    /// Loads the account's cart (creating it lazily) with availability
    /// refreshed from live stock.
    pub async fn get(&self, account_id: &str) -> DbResult<Cart> {
        let cart = self.load_fresh(account_id).await?;
        self.db.carts().save(&cart).await?;
        Ok(cart)
    }

    /// Adds units of a product, merging into an existing line.
    pub async fn add_item(&self, account_id: &str, product_id: &str, quantity: i64) -> DbResult<Cart> {
        let product = self.db.products().require_active(product_id).await?;
        let mut cart = self.load_fresh(account_id).await?;

        let mut ids = line_product_ids(&cart);
        ids.push(product_id.to_string());
        let source = self.db.products().product_map(&ids).await?;

        cart.add_item(&product, quantity, &source)?;
        self.db.carts().save(&cart).await?;

        debug!(account_id, product_id, quantity, "Added cart item");
        Ok(cart)
    }

    /// Sets a line's quantity (no merge semantics).
    pub async fn update_quantity(
        &self,
        account_id: &str,
        product_id: &str,
        quantity: i64,
    ) -> DbResult<Cart> {
        let mut cart = self.load_fresh(account_id).await?;

        // refresh_stock just ran, so the line's max_quantity is live.
        let live_stock = cart
            .items
            .iter()
            .find(|i| i.product_id == product_id)
            .map(|i| i.max_quantity)
            .unwrap_or(0);

        cart.update_quantity(product_id, quantity, live_stock)?;
        self.db.carts().save(&cart).await?;
        Ok(cart)
    }

    /// Removes a line (no-op when absent).
    pub async fn remove_item(&self, account_id: &str, product_id: &str) -> DbResult<Cart> {
        let mut cart = self.load_fresh(account_id).await?;
        cart.remove_item(product_id);
        self.db.carts().save(&cart).await?;
        Ok(cart)
    }

    /// Empties the cart (drops the coupon too).
    pub async fn clear(&self, account_id: &str) -> DbResult<Cart> {
        let mut cart = self.load_fresh(account_id).await?;
        cart.clear();
        self.db.carts().save(&cart).await?;
        Ok(cart)
    }

    /// Applies a coupon by code against the current cart contents.
    pub async fn apply_coupon(&self, account_id: &str, code: &str) -> DbResult<DiscountInfo> {
        validate_coupon_code(code)?;

        let mut cart = self.load_fresh(account_id).await?;
        let coupon = self.db.coupons().find_by_code(code).await?;
        let customer_uses = match &coupon {
            Some(c) => self.db.coupons().customer_uses(&c.id, account_id).await?,
            None => 0,
        };

        let info = cart.apply_coupon(coupon.as_ref(), customer_uses, chrono::Utc::now())?;
        self.db.carts().save(&cart).await?;

        debug!(account_id, code, discount = %info.discount, "Applied coupon");
        Ok(info)
    }

    /// Drops the applied coupon.
    pub async fn remove_coupon(&self, account_id: &str) -> DbResult<Cart> {
        let mut cart = self.load_fresh(account_id).await?;
        cart.remove_coupon();
        self.db.carts().save(&cart).await?;
        Ok(cart)
    }

    /// Selects (or clears) the shipping option.
    pub async fn select_shipping(
        &self,
        account_id: &str,
        shipping: Option<ShippingSelection>,
    ) -> DbResult<Cart> {
        let mut cart = self.load_fresh(account_id).await?;
        cart.select_shipping(shipping);
        self.db.carts().save(&cart).await?;
        Ok(cart)
    }

    /// Sets (or clears) the shipping address.
    pub async fn set_shipping_address(
        &self,
        account_id: &str,
        address: Option<Address>,
    ) -> DbResult<Cart> {
        let mut cart = self.load_fresh(account_id).await?;
        cart.set_shipping_address(address);
        cart.recompute();
        self.db.carts().save(&cart).await?;
        Ok(cart)
    }

    /// Loads the cart and refreshes it against live stock. Does not save;
    /// callers persist after their mutation.
    async fn load_fresh(&self, account_id: &str) -> DbResult<Cart> {
        let mut cart = self
            .db
            .carts()
            .get_or_create(account_id, self.default_tax_rate)
            .await?;
        let source = self
            .db
            .products()
            .product_map(&line_product_ids(&cart))
            .await?;
        cart.refresh_stock(&source);
        Ok(cart)
    }
}

fn line_product_ids(cart: &Cart) -> Vec<String> {
    cart.items.iter().map(|i| i.product_id.clone()).collect()
}

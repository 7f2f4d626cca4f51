//! # Domain Types
//!
//! Shared record types of the transaction core.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │    CartItem     │   │  CartSummary    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  product_id     │   │  total_price    │       │
//! │  │  price (Money)  │   │  quantity       │   │  total_discount │       │
//! │  │  current_stock  │   │  max_quantity   │   │  grand_total    │       │
//! │  │  components[]   │   │  is_available   │   │                 │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  Product is owned by catalog management and read-only to this core.    │
//! │  CartItem/CartSummary are the cart's contract shape for collaborators. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Coupon types live in [`crate::coupon`], order types in [`crate::order`]
//! and payment types in [`crate::payment`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate in basis points (1 bp = 0.01%; 825 bps = 8.25%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    pub fn from_percentage(pct: f64) -> Self {
        TaxRate((pct * 100.0).round() as u32)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Display-only percentage representation.
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Product
// =============================================================================

/// Whether a catalog row is a standalone product or a bundle of others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Single,
    Package,
}

impl Default for ProductType {
    fn default() -> Self {
        ProductType::Single
    }
}

/// One constituent of a package product.
///
/// A non-owning reference: `product_id` is an index into the product
/// store, so package membership never blocks the referenced product's
/// own lifecycle. Name and price are captured for display and for the
/// order snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PackageComponent {
    pub product_id: String,
    pub name: String,
    /// Units of the constituent per one package.
    pub quantity: i64,
    pub price: Money,
}

/// A catalog product (external, read-only to the transaction core).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name.
    pub name: String,

    pub description: Option<String>,

    /// Category used by coupon restriction matching.
    pub category: String,

    /// Primary image URL, if any.
    pub image: Option<String>,

    pub price: Money,

    pub product_type: ProductType,

    /// Constituents, only populated for package products.
    pub package_components: Vec<PackageComponent>,

    /// Precomputed savings versus buying the constituents separately.
    pub package_savings: Option<Money>,

    /// Current inventory count. Availability derives from this and from
    /// constituent stock for packages; see [`crate::stock`].
    pub current_stock: i64,

    /// Active flag (soft delete). Inactive products are unavailable.
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn is_package(&self) -> bool {
        self.product_type == ProductType::Package
    }
}

// =============================================================================
// Cart records
// =============================================================================

/// One line of a cart.
///
/// Product data is denormalized at add time; `is_available` and
/// `max_quantity` are the only fields refreshed from live stock, on
/// every read and before every mutation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub price: Money,
    pub quantity: i64,
    pub image: Option<String>,
    pub category: String,
    pub product_type: ProductType,
    /// Constituent breakdown, copied from the package at add time.
    pub package_info: Option<Vec<PackageComponent>>,
    /// Live-stock refresh: false once the product vanished or went inactive.
    pub is_available: bool,
    /// Live-stock refresh: how many units the account could hold right now.
    /// Invariant: `quantity <= max_quantity` after every refresh.
    pub max_quantity: i64,
}

impl CartItem {
    /// Line total (`price * quantity`).
    #[inline]
    pub fn line_total(&self) -> Money {
        self.price.multiply_quantity(self.quantity)
    }
}

/// The cart's running totals. Recomputed after every mutation, never stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartSummary {
    pub items_count: i64,
    pub total_price: Money,
    pub total_discount: Money,
    pub shipping_fee: Money,
    pub tax_amount: Money,
    pub grand_total: Money,
}

/// The shipping option a cart has selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ShippingSelection {
    pub name: String,
    /// Flat fee for this option.
    pub fee: Money,
    /// Order subtotal at or above which this option ships free.
    pub free_threshold: Option<Money>,
}

// =============================================================================
// Address & Customer
// =============================================================================

/// A shipping or billing address, frozen into orders at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Address {
    pub full_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
}

/// Denormalized customer snapshot carried on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CustomerSnapshot {
    pub account_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_from_bps() {
        let rate = TaxRate::from_bps(825);
        assert_eq!(rate.bps(), 825);
        assert!((rate.percentage() - 8.25).abs() < 0.001);
    }

    #[test]
    fn test_tax_rate_from_percentage() {
        assert_eq!(TaxRate::from_percentage(8.25).bps(), 825);
    }

    #[test]
    fn test_cart_item_line_total() {
        let item = CartItem {
            product_id: "p1".to_string(),
            name: "Widget".to_string(),
            price: Money::from_cents(299),
            quantity: 3,
            image: None,
            category: "gadgets".to_string(),
            product_type: ProductType::Single,
            package_info: None,
            is_available: true,
            max_quantity: 10,
        };
        assert_eq!(item.line_total().cents(), 897);
    }
}

//! # Stock Ledger
//!
//! The read-mostly availability gate every cart mutation and checkout
//! passes through.
//!
//! ## Availability Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Single product:   available = current_stock   (0 if inactive/missing)  │
//! │                                                                         │
//! │  Package product:  every constituent must independently cover           │
//! │                    quantity x component.quantity, and the package       │
//! │                    row itself must be active:                           │
//! │                                                                         │
//! │                    available = min over components of                   │
//! │                                (component_stock / component.quantity)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No side effects: always a read against the live product records. A
//! missing product is simply unavailable, never an error - degraded
//! availability is the caller's signal.
//!
//! The actual stock *mutation* (decrement at checkout, restore on
//! cancellation) lives in vendo-db behind conditional UPDATE guards;
//! this module only answers "could quantity Q be taken right now".

use crate::types::{Product, ProductType};

// =============================================================================
// Product Source
// =============================================================================

/// Read access to live product records.
///
/// The db layer implements this over rows it has already fetched; tests
/// use the `HashMap` impl below.
pub trait ProductSource {
    fn product(&self, product_id: &str) -> Option<&Product>;
}

impl ProductSource for std::collections::HashMap<String, Product> {
    fn product(&self, product_id: &str) -> Option<&Product> {
        self.get(product_id)
    }
}

// =============================================================================
// Availability
// =============================================================================

/// Answer to "is quantity Q of product P available".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    pub ok: bool,
    /// How many units could be taken right now (never negative).
    pub available_quantity: i64,
}

impl Availability {
    pub const fn none() -> Self {
        Availability {
            ok: false,
            available_quantity: 0,
        }
    }
}

// =============================================================================
// Stock Ledger
// =============================================================================

/// Borrow of a [`ProductSource`] answering availability questions.
pub struct StockLedger<'a, S: ProductSource> {
    source: &'a S,
}

impl<'a, S: ProductSource> StockLedger<'a, S> {
    pub fn new(source: &'a S) -> Self {
        StockLedger { source }
    }

    /// Checks that `quantity` units of `product_id` are available.
    pub fn available(&self, product_id: &str, quantity: i64) -> Availability {
        let available_quantity = self.available_quantity(product_id);
        Availability {
            ok: quantity > 0 && available_quantity >= quantity,
            available_quantity,
        }
    }

    /// Units of `product_id` that could be taken right now.
    pub fn available_quantity(&self, product_id: &str) -> i64 {
        let Some(product) = self.source.product(product_id) else {
            return 0;
        };
        if !product.is_active {
            return 0;
        }

        match product.product_type {
            ProductType::Single => product.current_stock.max(0),
            // A package is capped by its scarcest constituent.
            ProductType::Package => product
                .package_components
                .iter()
                .map(|component| {
                    let stock = self
                        .source
                        .product(&component.product_id)
                        .filter(|p| p.is_active)
                        .map(|p| p.current_stock.max(0))
                        .unwrap_or(0);
                    if component.quantity <= 0 {
                        0
                    } else {
                        stock / component.quantity
                    }
                })
                .min()
                .unwrap_or(0),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::types::PackageComponent;
    use chrono::Utc;
    use std::collections::HashMap;

    fn product(id: &str, stock: i64) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {id}"),
            description: None,
            category: "general".to_string(),
            image: None,
            price: Money::from_cents(1000),
            product_type: ProductType::Single,
            package_components: vec![],
            package_savings: None,
            current_stock: stock,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn package(id: &str, components: Vec<(&str, i64)>) -> Product {
        let mut p = product(id, 0);
        p.product_type = ProductType::Package;
        p.package_components = components
            .into_iter()
            .map(|(pid, qty)| PackageComponent {
                product_id: pid.to_string(),
                name: format!("Component {pid}"),
                quantity: qty,
                price: Money::from_cents(500),
            })
            .collect();
        p
    }

    #[test]
    fn test_single_product_availability() {
        let mut store = HashMap::new();
        store.insert("p1".to_string(), product("p1", 5));
        let ledger = StockLedger::new(&store);

        assert!(ledger.available("p1", 5).ok);
        let a = ledger.available("p1", 6);
        assert!(!a.ok);
        assert_eq!(a.available_quantity, 5);
    }

    #[test]
    fn test_missing_product_is_unavailable() {
        let store: HashMap<String, Product> = HashMap::new();
        let ledger = StockLedger::new(&store);
        assert_eq!(ledger.available("ghost", 1), Availability::none());
    }

    #[test]
    fn test_inactive_product_is_unavailable() {
        let mut store = HashMap::new();
        let mut p = product("p1", 50);
        p.is_active = false;
        store.insert("p1".to_string(), p);
        let ledger = StockLedger::new(&store);
        assert!(!ledger.available("p1", 1).ok);
    }

    #[test]
    fn test_package_capped_by_scarcest_constituent() {
        let mut store = HashMap::new();
        store.insert("a".to_string(), product("a", 10));
        store.insert("b".to_string(), product("b", 3));
        // One bundle takes 2x a and 1x b: b allows 3, a allows 5.
        store.insert("bundle".to_string(), package("bundle", vec![("a", 2), ("b", 1)]));
        let ledger = StockLedger::new(&store);

        let availability = ledger.available("bundle", 3);
        assert!(availability.ok);
        assert_eq!(availability.available_quantity, 3);
        assert!(!ledger.available("bundle", 4).ok);
    }

    #[test]
    fn test_package_with_missing_constituent() {
        let mut store = HashMap::new();
        store.insert("bundle".to_string(), package("bundle", vec![("gone", 1)]));
        let ledger = StockLedger::new(&store);
        assert!(!ledger.available("bundle", 1).ok);
    }
}

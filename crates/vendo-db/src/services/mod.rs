//! # Service Layer
//!
//! Orchestration over the repositories: each service owns one workflow
//! and composes pure vendo-core logic with transactional persistence.
//!
//! ## Service Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CartService      cart reads/mutations, coupon apply, shipping          │
//! │  CheckoutService  cart → order, atomically with stock + coupon claims   │
//! │  OrderService     lifecycle transitions and their side effects          │
//! │  PaymentService   capture/fail/retry/cancel and refunds                 │
//! │                                                                         │
//! │  Discipline: pool reads happen BEFORE a transaction begins; inside a    │
//! │  transaction only &mut SqliteConnection repository functions run.       │
//! │  (The in-memory test pool has a single connection, so a pool read      │
//! │  under an open transaction would deadlock.)                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod cart;
pub mod checkout;
pub mod order;
pub mod payment;

pub use cart::CartService;
pub use checkout::{CheckoutRequest, CheckoutService};
pub use order::OrderService;
pub use payment::PaymentService;

use vendo_core::types::{PackageComponent, ProductType};

/// Resolves which stock counters a line moves, and by how much.
///
/// A single product moves its own counter; a package moves each
/// constituent's counter by `constituent units × line quantity` and
/// never touches a counter of its own.
pub(crate) fn stock_moves(
    product_id: &str,
    product_type: ProductType,
    package_info: Option<&[PackageComponent]>,
    quantity: i64,
) -> Vec<(String, i64)> {
    match (product_type, package_info) {
        (ProductType::Package, Some(components)) => components
            .iter()
            .map(|c| (c.product_id.clone(), c.quantity * quantity))
            .collect(),
        _ => vec![(product_id.to_string(), quantity)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vendo_core::Money;

    #[test]
    fn test_stock_moves_single() {
        let moves = stock_moves("p1", ProductType::Single, None, 3);
        assert_eq!(moves, vec![("p1".to_string(), 3)]);
    }

    #[test]
    fn test_stock_moves_package_cascades() {
        let components = vec![
            PackageComponent {
                product_id: "beans".to_string(),
                name: "Beans".to_string(),
                quantity: 2,
                price: Money::from_cents(1000),
            },
            PackageComponent {
                product_id: "filter".to_string(),
                name: "Filter".to_string(),
                quantity: 1,
                price: Money::from_cents(500),
            },
        ];
        let moves = stock_moves("bundle", ProductType::Package, Some(&components), 3);
        assert_eq!(
            moves,
            vec![("beans".to_string(), 6), ("filter".to_string(), 3)]
        );
    }
}

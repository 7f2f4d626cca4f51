//! # vendo-db: Database Layer for the Vendo Transaction Core
//!
//! This crate provides persistence for the Vendo transaction core.
//! It uses SQLite for storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Vendo Data Flow                                 │
//! │                                                                         │
//! │  Storefront request (add_to_cart, checkout, refund)                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     vendo-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────┐   ┌───────────────┐   ┌─────────────────┐   │   │
//! │  │   │   Services   │   │  Repositories │   │    Migrations   │   │   │
//! │  │   │ (services/)  │   │ (repository/) │   │    (embedded)   │   │   │
//! │  │   │              │   │               │   │                 │   │   │
//! │  │   │ CartService  │──►│ CartRepo      │   │ 001_initial.sql │   │   │
//! │  │   │ Checkout     │   │ ProductRepo   │   │ ...             │   │   │
//! │  │   │ OrderService │   │ OrderRepo     │   └─────────────────┘   │   │
//! │  │   │ Payment      │   │ PaymentRepo   │                         │   │
//! │  │   └──────────────┘   │ CouponRepo    │                         │   │
//! │  │                      └───────────────┘                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL mode, foreign keys on)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations per aggregate
//! - [`services`] - Workflow orchestration (checkout, refunds, lifecycle)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vendo_db::{CartService, CheckoutService, Database, DbConfig};
//! use vendo_core::types::TaxRate;
//!
//! let db = Database::new(DbConfig::new("path/to/vendo.db")).await?;
//!
//! let carts = CartService::new(db.clone(), TaxRate::from_bps(825));
//! let cart = carts.add_item("acct-1", "prod-1", 2).await?;
//!
//! let checkout = CheckoutService::new(db.clone());
//! let order = checkout.checkout(request).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod services;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::cart::CartRepository;
pub use repository::coupon::CouponRepository;
pub use repository::order::OrderRepository;
pub use repository::payment::PaymentRepository;
pub use repository::product::ProductRepository;

// Service re-exports
pub use services::{CartService, CheckoutRequest, CheckoutService, OrderService, PaymentService};

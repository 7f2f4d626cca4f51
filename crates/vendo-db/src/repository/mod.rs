//! # Repository Layer
//!
//! One repository per aggregate, each a stateless view over the pool.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Service                                                                │
//! │     │                                                                   │
//! │     ├── pool-backed reads ───────► Repository methods (&self)           │
//! │     │                                                                   │
//! │     └── transactional writes ────► Repository associated functions      │
//! │                                    taking &mut SqliteConnection, so a   │
//! │                                    service can compose several of them  │
//! │                                    into one atomic transaction          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Row mapping is manual (`row.try_get` into the core types) because the
//! stored shapes differ from the domain shapes: money columns are cents,
//! nested value objects are JSON snapshot columns.

pub mod cart;
pub mod coupon;
pub mod order;
pub mod payment;
pub mod product;

//! Persistence contracts and SQLite implementations.
//!
//! # Invariants
//! - Callers depend on the [`parcel_repo::ParcelStore`] trait, not on SQLite.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod parcel_repo;

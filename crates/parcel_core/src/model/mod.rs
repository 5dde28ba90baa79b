//! Parcel domain model.
//!
//! # Invariants
//! - A parcel's `number` is assigned by storage and never reused.
//! - `status` is always one of the recognized [`parcel::ParcelStatus`] values.

pub mod parcel;

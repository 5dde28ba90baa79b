//! Caller-level use cases layered over the parcel store.

pub mod parcel_service;

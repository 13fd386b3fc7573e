//! Postgres persistence for fire events and alert subscribers.
//!
//! Knows nothing about caching or filtering; it stores what it is given and
//! deletes what is older than a cutoff.

pub mod store;

pub use store::FireStore;

//! Storage module
//!
//! Provides on-device key-value storage for small JSON values.

pub mod local_store;

pub use local_store::LocalStore;

//! Connected HubSpot accounts and their persistence.
//!
//! An account carries its OAuth credentials and the per-resource `lastPulledDates`
//! that bound the next incremental window.

/// File-backed account store
mod store;
/// Account, credential and resource type definitions
mod types;

pub use store::{AccountStore, FileAccountStore};
pub use types::*;

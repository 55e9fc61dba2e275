//! HubSpot CRM integration
//!
//! This module provides the transport used by the sync engine: object search, association
//! batch reads and OAuth token refresh against the HubSpot v3 APIs.

/// HTTP client implementing [`CrmApi`]
mod client;
/// Request and response types for the CRM APIs
mod types;

pub use client::{CrmApi, HubspotClient};
pub use types::*;

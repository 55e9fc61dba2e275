//! Incremental HubSpot sync
//!
//! This module pulls contacts, companies and meetings changed since the previous run for every
//! connected account and turns them into analytics events. It is composed of several submodules:
//!
//! - `orchestrator`: Runs every account through its stages and collects the run summary.
//! - `strategies`: Per-resource strategies that map pages of records to events, and the engine configuration.
//! - `pagination`: The modified-date window and cursor of one resource, including offset-cap slides.
//! - `retry`: Bounded exponential backoff around page fetches, refreshing expired tokens in between.
//! - `credentials`: Access token refresh for one account.
//! - `associations`: Contact to company, meeting to contact and contact email lookups.
//! - `events`: The event model and the record-to-event mappings.
//! - `batcher`: Threshold batching with a background flush worker.
//! - `progress_tracker`: Per-resource statistics.

/// Cross-entity association lookups
pub mod associations;
/// Event batching and flushing
pub mod batcher;
/// Access token refresh
pub mod credentials;
/// Event model and record mappings
pub mod events;
/// Main coordinator of a sync run
pub mod orchestrator;
/// Window and cursor handling
pub mod pagination;
/// Tracks per-resource statistics
pub mod progress_tracker;
/// Retry with backoff
pub mod retry;
/// Resource sync strategies and their configuration
pub mod strategies;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use events::Event;
pub use orchestrator::*;
pub use strategies::SyncConfig;

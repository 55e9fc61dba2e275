//! Progress tracking for one resource type's sync.
//!
//! The `SyncProgressTracker` counts pages, records, created/updated classifications, emitted
//! events and window slides while a resource is paged through. It also remembers every record
//! id it has seen so that records fetched twice across a window slide show up in the stats.

use crate::accounts::ResourceType;
use crate::sync::pagination::ChangeKind;
use std::collections::HashSet;
use tracing::{info, warn};

/// Pages between two progress log lines.
const LOG_EVERY_PAGES: usize = 10;

#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
    resource: ResourceType,
    /// Ids of every record processed so far
    seen_ids: HashSet<String>,
    pages_fetched: usize,
    records_processed: usize,
    created: usize,
    updated: usize,
    duplicates: usize,
    events_emitted: usize,
    window_slides: u32,
    last_logged_page: usize,
}

impl SyncProgressTracker {
    pub fn new(resource: ResourceType) -> Self {
        Self {
            resource,
            seen_ids: HashSet::new(),
            pages_fetched: 0,
            records_processed: 0,
            created: 0,
            updated: 0,
            duplicates: 0,
            events_emitted: 0,
            window_slides: 0,
            last_logged_page: 0,
        }
    }

    pub fn record_page(&mut self) {
        self.pages_fetched += 1;
    }

    /// Record one fetched record and how it was classified.
    pub fn record_change(&mut self, id: &str, kind: ChangeKind) {
        self.records_processed += 1;
        if !self.seen_ids.insert(id.to_string()) {
            self.duplicates += 1;
        }
        match kind {
            ChangeKind::Created => self.created += 1,
            ChangeKind::Updated => self.updated += 1,
        }
    }

    pub fn record_events(&mut self, count: usize) {
        self.events_emitted += count;
    }

    pub fn record_slide(&mut self) {
        self.window_slides += 1;
    }

    /// Log progress every few pages or when forced
    pub fn log_progress(&mut self, hub_id: &str, force: bool) {
        let pages_since_last_log = self.pages_fetched.saturating_sub(self.last_logged_page);
        if !force && pages_since_last_log < LOG_EVERY_PAGES {
            return;
        }

        info!(
            hub_id,
            resource = %self.resource,
            pages = self.pages_fetched,
            records = self.records_processed,
            events = self.events_emitted,
            "Sync progress"
        );
        self.last_logged_page = self.pages_fetched;
    }

    pub fn get_stats(&self) -> ResourceStats {
        ResourceStats {
            resource: self.resource,
            pages_fetched: self.pages_fetched,
            records_processed: self.records_processed,
            unique_records: self.seen_ids.len(),
            created: self.created,
            updated: self.updated,
            duplicates: self.duplicates,
            events_emitted: self.events_emitted,
            window_slides: self.window_slides,
        }
    }

    /// Warn about records that were fetched more than once.
    pub fn validate_completion(&self, hub_id: &str) {
        if self.duplicates > 0 {
            warn!(
                hub_id,
                resource = %self.resource,
                duplicates = self.duplicates,
                slides = self.window_slides,
                "Some records were fetched more than once across window slides"
            );
        }
    }
}

/// Statistics of one resource type's sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceStats {
    pub resource: ResourceType,
    pub pages_fetched: usize,
    pub records_processed: usize,
    pub unique_records: usize,
    pub created: usize,
    pub updated: usize,
    pub duplicates: usize,
    pub events_emitted: usize,
    pub window_slides: u32,
}

impl ResourceStats {
    pub fn summary(&self) -> String {
        format!(
            "{}: {} pages, {} records ({} created, {} updated), {} events{}",
            self.resource,
            self.pages_fetched,
            self.records_processed,
            self.created,
            self.updated,
            self.events_emitted,
            if self.window_slides == 0 {
                String::new()
            } else {
                format!(", {} window slides", self.window_slides)
            }
        )
    }
}

//! Pagination window controller.
//!
//! A [`ResourceCursor`] tracks where one resource type's search currently stands within a
//! single run: the opaque `after` token and the `[window_start, window_end)` modified-date
//! window. HubSpot's search API stops paging at an offset of 10 000, so once the cursor
//! reaches [`OFFSET_CAP`] the window slides forward to the last seen modification date and
//! paging restarts from the first page.
//!
//! Records sharing the exact timestamp at a slide boundary may be fetched twice. This is a
//! known limitation; consumers are expected to be idempotent per record id.

use crate::accounts::ResourceType;
use crate::hubspot::{CrmRecord, Filter, FilterGroup, FilterOperator, SearchRequest, Sort, SortDirection};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

/// Largest offset the search API accepts per window.
pub const OFFSET_CAP: u64 = 9900;

/// Records requested per page.
pub const PAGE_LIMIT: u32 = 100;

/// What to do after a page has been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Another page is available.
    More,
    /// The offset cap was hit and the window moved forward; paging restarts.
    Slid,
    Done,
}

/// Created vs updated relative to the previous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
}

impl ChangeKind {
    /// `Created` iff the record was created after the previous pull.
    ///
    /// Uses the pre-run `last_pulled_date`, never the (possibly slid) window start.
    pub fn classify(created_at: DateTime<Utc>, last_pulled_date: Option<DateTime<Utc>>) -> Self {
        match last_pulled_date {
            Some(last) if created_at <= last => ChangeKind::Updated,
            _ => ChangeKind::Created,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceCursor {
    resource: ResourceType,
    after: Option<String>,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    page_limit: u32,
    slides: u32,
}

impl ResourceCursor {
    /// Open a window from the last pull (or the epoch) up to `now`.
    pub fn open(
        resource: ResourceType,
        last_pulled_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        page_limit: u32,
    ) -> Self {
        let window_start = last_pulled_date.unwrap_or(DateTime::UNIX_EPOCH).min(now);
        Self {
            resource,
            after: None,
            window_start,
            window_end: now,
            page_limit,
            slides: 0,
        }
    }

    #[cfg(test)]
    pub fn after(&self) -> Option<&str> {
        self.after.as_deref()
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        self.window_start
    }

    pub fn window_end(&self) -> DateTime<Utc> {
        self.window_end
    }

    #[cfg(test)]
    pub fn slides(&self) -> u32 {
        self.slides
    }

    /// Search request for the next page of this window.
    pub fn search_request(&self) -> SearchRequest {
        let property = self.resource.modified_date_property();
        SearchRequest {
            filter_groups: vec![FilterGroup {
                filters: vec![
                    Filter::new(
                        property,
                        FilterOperator::Gte,
                        self.window_start.timestamp_millis().to_string(),
                    ),
                    Filter::new(
                        property,
                        FilterOperator::Lt,
                        self.window_end.timestamp_millis().to_string(),
                    ),
                ],
            }],
            sorts: vec![Sort {
                property_name: property.to_string(),
                direction: SortDirection::Ascending,
            }],
            properties: self
                .resource
                .search_properties()
                .iter()
                .map(|p| p.to_string())
                .collect(),
            limit: self.page_limit,
            after: self.after.clone(),
        }
    }

    /// Record the outcome of a page and decide whether paging continues.
    ///
    /// `next_after` is the cursor HubSpot returned and `records` the page itself.
    pub fn advance(&mut self, next_after: Option<&str>, records: &[CrmRecord]) -> PageState {
        let Some(next) = next_after.filter(|after| !after.is_empty()) else {
            self.after = None;
            return PageState::Done;
        };

        let offset = next.parse::<u64>().ok();
        if offset.is_some_and(|offset| offset >= OFFSET_CAP) {
            let Some(last) = records.last() else {
                warn!(
                    resource = %self.resource,
                    after = next,
                    "Offset cap reached on an empty page, stopping"
                );
                self.after = None;
                return PageState::Done;
            };
            self.slide_to(last.updated_at);
            return PageState::Slid;
        }

        self.after = Some(next.to_string());
        PageState::More
    }

    fn slide_to(&mut self, last_modified: DateTime<Utc>) {
        let mut next_start = last_modified;
        if next_start <= self.window_start {
            warn!(
                resource = %self.resource,
                window_start = %self.window_start,
                "Offset cap reached within a single timestamp, nudging window forward"
            );
            next_start = self.window_start + Duration::milliseconds(1);
        }

        self.window_start = next_start.min(self.window_end);
        self.after = None;
        self.slides += 1;
        info!(
            resource = %self.resource,
            window_start = %self.window_start,
            window_end = %self.window_end,
            "Offset cap reached, sliding window"
        );
    }
}

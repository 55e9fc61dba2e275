//! Wire types for the HubSpot CRM v3 search, associations and OAuth endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Comparison operators accepted by the CRM search API.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    Gte,
    Lt,
    In,
}

/// A single property filter inside a filter group.
///
/// `IN` filters carry `values`, every other operator carries `value`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub property_name: String,
    pub operator: FilterOperator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

impl Filter {
    pub fn new(property_name: &str, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            property_name: property_name.to_string(),
            operator,
            value: Some(value.into()),
            values: None,
        }
    }

    pub fn one_of(property_name: &str, values: Vec<String>) -> Self {
        Self {
            property_name: property_name.to_string(),
            operator: FilterOperator::In,
            value: None,
            values: Some(values),
        }
    }
}

/// Filters inside one group are AND-ed together.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FilterGroup {
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortDirection {
    Ascending,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Sort {
    pub property_name: String,
    pub direction: SortDirection,
}

/// Body of `POST /crm/v3/objects/{object}/search`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub filter_groups: Vec<FilterGroup>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sorts: Vec<Sort>,
    pub properties: Vec<String>,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

/// A CRM object as returned by search.
///
/// HubSpot reports every requested property, using `null` for unset ones.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmRecord {
    pub id: String,
    #[serde(default)]
    pub properties: Option<HashMap<String, Option<String>>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CrmRecord {
    /// Look up a non-empty property value.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .as_ref()
            .and_then(|props| props.get(name))
            .and_then(|value| value.as_deref())
            .filter(|value| !value.is_empty())
    }

    pub fn has_properties(&self) -> bool {
        self.properties.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NextPage {
    pub after: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub next: Option<NextPage>,
}

/// Response of the search endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<CrmRecord>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

impl SearchResponse {
    /// The opaque cursor of the next page, if HubSpot reported one.
    pub fn next_after(&self) -> Option<&str> {
        self.paging
            .as_ref()
            .and_then(|paging| paging.next.as_ref())
            .map(|next| next.after.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectId {
    pub id: String,
}

/// Body of `POST /crm/v3/associations/{from}/{to}/batch/read`.
#[derive(Debug, Clone, Serialize)]
pub struct AssociationBatchRequest {
    pub inputs: Vec<ObjectId>,
}

impl AssociationBatchRequest {
    pub fn new(ids: &[String]) -> Self {
        Self {
            inputs: ids.iter().map(|id| ObjectId { id: id.clone() }).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssociationTarget {
    pub id: String,
}

/// One resolved association. Unmatched inputs may come back without a `from`.
#[derive(Debug, Clone, Deserialize)]
pub struct AssociationResult {
    #[serde(default)]
    pub from: Option<ObjectId>,
    #[serde(default)]
    pub to: Vec<AssociationTarget>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssociationBatchResponse {
    #[serde(default)]
    pub results: Vec<AssociationResult>,
}

/// Response of `POST /oauth/v1/token` for the refresh-token grant.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
}

/// Error types for HubSpot transport calls
#[derive(Debug, thiserror::Error)]
pub enum HubspotError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HubSpot API returned {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("HubSpot rate limit hit: {0}")]
    RateLimited(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_request_omits_missing_cursor_and_empty_sorts() {
        let request = SearchRequest {
            filter_groups: vec![FilterGroup {
                filters: vec![Filter::new("lastmodifieddate", FilterOperator::Gte, "10")],
            }],
            sorts: Vec::new(),
            properties: vec!["email".to_string()],
            limit: 100,
            after: None,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("after").is_none());
        assert!(json.get("sorts").is_none());
        assert_eq!(json["filterGroups"][0]["filters"][0]["operator"], "GTE");
        assert_eq!(
            json["filterGroups"][0]["filters"][0]["propertyName"],
            "lastmodifieddate"
        );
        assert!(json["filterGroups"][0]["filters"][0].get("values").is_none());
    }

    #[test]
    fn in_filter_serializes_values_list() {
        let filter = Filter::one_of("hs_object_id", vec!["1".into(), "2".into()]);
        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(json["operator"], "IN");
        assert_eq!(json["values"], serde_json::json!(["1", "2"]));
        assert!(json.get("value").is_none());
    }

    #[test]
    fn search_response_parses_paging_and_null_properties() {
        let body = r#"{
            "total": 2,
            "results": [
                {
                    "id": "101",
                    "properties": {"email": "a@example.com", "jobtitle": null},
                    "createdAt": "2024-01-01T00:00:00.000Z",
                    "updatedAt": "2024-02-01T00:00:00.000Z",
                    "archived": false
                }
            ],
            "paging": {"next": {"after": "100", "link": "?after=100"}}
        }"#;

        let response: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.next_after(), Some("100"));
        let record = &response.results[0];
        assert_eq!(record.property("email"), Some("a@example.com"));
        assert_eq!(record.property("jobtitle"), None);
        assert_eq!(record.property("missing"), None);
    }

    #[test]
    fn last_page_has_no_cursor() {
        let response: SearchResponse = serde_json::from_str(r#"{"results": []}"#).unwrap();
        assert_eq!(response.next_after(), None);
    }
}

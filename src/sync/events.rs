//! Analytics events produced by the sync.
//!
//! Each CRM record turns into zero or more [`Event`]s. Events are immutable once built and
//! serialize to the camelCase JSON shape the downstream sink expects, with unset properties
//! left out of the payload entirely.

use crate::hubspot::CrmRecord;
use crate::sync::associations::EmailIndex;
use crate::sync::pagination::ChangeKind;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Shown in place of a participant email that could not be resolved.
pub const UNKNOWN_EMAIL: &str = "Unknown Email";
/// Shown in place of the participant id list of a meeting without participants.
pub const UNKNOWN_PARTICIPANTS: &str = "Unknown";
pub const UNTITLED_MEETING: &str = "Untitled Meeting";

/// Company events are backdated so they sort before the contact events of the same change.
const COMPANY_ACTION_OFFSET_MS: i64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ActionName {
    #[serde(rename = "Contact Created")]
    ContactCreated,
    #[serde(rename = "Contact Updated")]
    ContactUpdated,
    #[serde(rename = "Company Created")]
    CompanyCreated,
    #[serde(rename = "Company Updated")]
    CompanyUpdated,
    #[serde(rename = "Meeting Created")]
    MeetingCreated,
    #[serde(rename = "Meeting Updated")]
    MeetingUpdated,
    #[serde(rename = "Meeting Participant Added")]
    MeetingParticipantAdded,
}

impl ActionName {
    fn contact(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Created => ActionName::ContactCreated,
            ChangeKind::Updated => ActionName::ContactUpdated,
        }
    }

    fn company(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Created => ActionName::CompanyCreated,
            ChangeKind::Updated => ActionName::CompanyUpdated,
        }
    }

    fn meeting(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Created => ActionName::MeetingCreated,
            ChangeKind::Updated => ActionName::MeetingUpdated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_status: Option<String>,
    pub contact_score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanyProperties {
    pub company_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_industry: Option<String>,
}

/// Meeting payload. Participant events carry `participant_id`/`participant_email`, meeting
/// created/updated events carry the joined `participant_ids`/`participant_emails`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeetingProperties {
    pub meeting_id: String,
    pub meeting_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_ids: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_emails: Option<String>,
}

/// Resource-specific part of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EventSubject {
    Contact {
        identity: String,
        #[serde(rename = "userProperties")]
        user_properties: ContactProperties,
    },
    Company {
        #[serde(rename = "companyProperties")]
        company_properties: CompanyProperties,
    },
    Meeting {
        #[serde(rename = "meetingProperties")]
        meeting_properties: MeetingProperties,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    action_name: ActionName,
    action_date: DateTime<Utc>,
    include_in_analytics: u8,
    #[serde(flatten)]
    subject: EventSubject,
}

impl Event {
    fn new(action_name: ActionName, action_date: DateTime<Utc>, subject: EventSubject) -> Self {
        Self {
            action_name,
            action_date,
            include_in_analytics: 0,
            subject,
        }
    }

    #[cfg(test)]
    pub fn action_name(&self) -> ActionName {
        self.action_name
    }

    pub fn action_date(&self) -> DateTime<Utc> {
        self.action_date
    }

    /// Identity of the contact the event belongs to, for contact events.
    #[cfg(test)]
    pub fn identity(&self) -> Option<&str> {
        match &self.subject {
            EventSubject::Contact { identity, .. } => Some(identity),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn meeting_properties(&self) -> Option<&MeetingProperties> {
        match &self.subject {
            EventSubject::Meeting { meeting_properties } => Some(meeting_properties),
            _ => None,
        }
    }
}

fn owned(record: &CrmRecord, name: &str) -> Option<String> {
    record.property(name).map(str::to_string)
}

fn change_date(record: &CrmRecord, kind: ChangeKind) -> DateTime<Utc> {
    match kind {
        ChangeKind::Created => record.created_at,
        ChangeKind::Updated => record.updated_at,
    }
}

/// Build the event of one contact. Contacts without properties or an email are skipped.
pub fn contact_event(
    record: &CrmRecord,
    last_pulled_date: Option<DateTime<Utc>>,
    company_id: Option<&str>,
) -> Option<Event> {
    if !record.has_properties() {
        return None;
    }
    let identity = record.property("email")?.to_string();

    let name = format!(
        "{} {}",
        record.property("firstname").unwrap_or_default(),
        record.property("lastname").unwrap_or_default()
    );
    let name = name.trim();

    let user_properties = ContactProperties {
        company_id: company_id.map(str::to_string),
        contact_name: (!name.is_empty()).then(|| name.to_string()),
        contact_title: owned(record, "jobtitle"),
        contact_source: owned(record, "hs_analytics_source"),
        contact_status: owned(record, "hs_lead_status"),
        contact_score: record
            .property("hubspotscore")
            .and_then(parse_score)
            .unwrap_or(0),
    };

    let kind = ChangeKind::classify(record.created_at, last_pulled_date);
    Some(Event::new(
        ActionName::contact(kind),
        change_date(record, kind),
        EventSubject::Contact {
            identity,
            user_properties,
        },
    ))
}

/// HubSpot scores may come back as decimals; keep the integer part.
fn parse_score(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v.trunc() as i64))
}

/// Build the event of one company. Companies without properties are skipped.
pub fn company_event(record: &CrmRecord, last_pulled_date: Option<DateTime<Utc>>) -> Option<Event> {
    if !record.has_properties() {
        return None;
    }

    let kind = ChangeKind::classify(record.created_at, last_pulled_date);
    let action_date = change_date(record, kind) - Duration::milliseconds(COMPANY_ACTION_OFFSET_MS);

    Some(Event::new(
        ActionName::company(kind),
        action_date,
        EventSubject::Company {
            company_properties: CompanyProperties {
                company_id: record.id.clone(),
                company_domain: owned(record, "domain"),
                company_industry: owned(record, "industry"),
            },
        },
    ))
}

fn meeting_base(record: &CrmRecord) -> MeetingProperties {
    MeetingProperties {
        meeting_id: record.id.clone(),
        meeting_title: record
            .property("hs_meeting_title")
            .unwrap_or(UNTITLED_MEETING)
            .to_string(),
        start_time: owned(record, "hs_meeting_start_time"),
        end_time: owned(record, "hs_meeting_end_time"),
        owner_id: owned(record, "hubspot_owner_id"),
        participant_id: None,
        participant_email: None,
        participant_ids: None,
        participant_emails: None,
    }
}

fn email_or_sentinel(emails: &EmailIndex, contact_id: &str) -> String {
    emails
        .get(contact_id)
        .cloned()
        .unwrap_or_else(|| UNKNOWN_EMAIL.to_string())
}

/// One `Meeting Participant Added` event per associated contact.
///
/// Dated at the meeting start, or at the last update when the start time is unknown.
pub fn meeting_participant_events(
    record: &CrmRecord,
    participants: &[String],
    emails: &EmailIndex,
) -> Vec<Event> {
    let action_date = record
        .property("hs_meeting_start_time")
        .and_then(parse_hubspot_time)
        .unwrap_or(record.updated_at);

    participants
        .iter()
        .map(|contact_id| {
            let meeting_properties = MeetingProperties {
                participant_id: Some(contact_id.clone()),
                participant_email: Some(email_or_sentinel(emails, contact_id)),
                ..meeting_base(record)
            };
            Event::new(
                ActionName::MeetingParticipantAdded,
                action_date,
                EventSubject::Meeting { meeting_properties },
            )
        })
        .collect()
}

/// The `Meeting Created`/`Meeting Updated` event of one meeting. Meetings without
/// properties are skipped.
pub fn meeting_event(
    record: &CrmRecord,
    last_pulled_date: Option<DateTime<Utc>>,
    participants: &[String],
    emails: &EmailIndex,
) -> Option<Event> {
    if !record.has_properties() {
        return None;
    }

    let (participant_ids, participant_emails) = if participants.is_empty() {
        (UNKNOWN_PARTICIPANTS.to_string(), UNKNOWN_EMAIL.to_string())
    } else {
        (
            participants.join(", "),
            participants
                .iter()
                .map(|id| email_or_sentinel(emails, id))
                .collect::<Vec<_>>()
                .join(", "),
        )
    };

    let kind = ChangeKind::classify(record.created_at, last_pulled_date);
    Some(Event::new(
        ActionName::meeting(kind),
        change_date(record, kind),
        EventSubject::Meeting {
            meeting_properties: MeetingProperties {
                participant_ids: Some(participant_ids),
                participant_emails: Some(participant_emails),
                ..meeting_base(record)
            },
        },
    ))
}

/// HubSpot reports datetime properties either as RFC 3339 or as epoch milliseconds.
fn parse_hubspot_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| raw.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis))
}

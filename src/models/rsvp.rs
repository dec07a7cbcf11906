use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::guest::{Guest, Questionnaire, RsvpStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "rsvp_response", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RsvpResponse {
    Yes,
    No,
}

impl From<RsvpResponse> for RsvpStatus {
    fn from(r: RsvpResponse) -> Self {
        match r {
            RsvpResponse::Yes => Self::Yes,
            RsvpResponse::No => Self::No,
        }
    }
}

/// One recorded decision. Rows are never updated after insertion.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rsvp {
    pub id: Uuid,
    pub guest_id: Uuid,
    pub response: RsvpResponse,
    pub party_size: i32,
    pub message: String,
    pub responded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRsvp {
    pub guest_id: Uuid,
    pub response: RsvpResponse,
    pub party_size: i32,
    pub message: String,
    pub responded_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRsvpRequest {
    pub response: RsvpResponse,
    #[serde(default)]
    pub message: String,
    pub updated_details: Option<Questionnaire>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpWithGuest {
    #[serde(flatten)]
    pub rsvp: Rsvp,
    pub guest: Guest,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpStats {
    pub total: i64,
    pub yes: i64,
    pub no: i64,
    pub pending: i64,
    pub total_attending: i64,
}

impl RsvpStats {
    /// Tally the live guest table. The RSVP history is not consulted since
    /// only the guest row holds the latest decision.
    pub fn from_guests<'a>(guests: impl IntoIterator<Item = &'a Guest>) -> Self {
        let mut stats = Self::default();
        for g in guests {
            stats.total += 1;
            match g.rsvp_status {
                RsvpStatus::Yes => {
                    stats.yes += 1;
                    stats.total_attending += i64::from(g.party_size);
                }
                RsvpStatus::No => stats.no += 1,
                RsvpStatus::Pending => stats.pending += 1,
            }
        }
        stats
    }
}

#[derive(Debug, Serialize)]
pub struct RsvpListResponse {
    pub rsvps: Vec<RsvpWithGuest>,
    pub stats: RsvpStats,
}

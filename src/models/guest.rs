use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::AppError;

/// Absolute ceiling on a party, regardless of the guest's allowance.
pub const MAX_PARTY_SIZE: i32 = 10;
pub const DEFAULT_MAX_PARTY_SIZE: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "registration_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Pending,
    Approved,
    Rejected,
}

impl RegistrationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "rsvp_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RsvpStatus {
    Pending,
    Yes,
    No,
}

impl RsvpStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Yes => "yes",
            Self::No => "no",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PartyMember {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub dietary_preference: String,
}

impl PartyMember {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

/// Attendance questionnaire shared by registration and RSVP updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Questionnaire {
    #[serde(default)]
    pub party_size: i32,
    #[serde(default)]
    pub party_members: Vec<PartyMember>,
    #[serde(default)]
    pub main_person_dietary_preference: String,
    #[serde(default)]
    pub dec24_attendance: bool,
    #[serde(default)]
    pub dec25_attendance: bool,
    #[serde(default)]
    pub accommodation_dec23: bool,
    #[serde(default)]
    pub accommodation_dec24: bool,
    #[serde(default)]
    pub accommodation_dec25: bool,
    #[serde(default)]
    pub concerns: String,
}

impl Questionnaire {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.party_size < 0 {
            return Err(AppError::Validation("Party size cannot be negative".into()));
        }
        if self.party_size > MAX_PARTY_SIZE {
            return Err(AppError::Validation(format!(
                "Party size exceeds maximum allowed ({MAX_PARTY_SIZE})"
            )));
        }
        if self.party_members.len() > MAX_PARTY_SIZE as usize {
            return Err(AppError::Validation(format!(
                "At most {MAX_PARTY_SIZE} party members are allowed"
            )));
        }
        Ok(())
    }

    /// Party allowance for a new registration: the default, raised to cover
    /// a larger declared party.
    pub fn allowance(&self) -> i32 {
        self.party_size.max(DEFAULT_MAX_PARTY_SIZE)
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Guest {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub invite_token: Option<String>,
    pub guest_portal_token: Option<String>,
    pub registration_status: RegistrationStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub rsvp_status: RsvpStatus,
    pub party_size: i32,
    pub max_party_size: i32,
    #[sqlx(json)]
    pub party_members: Vec<PartyMember>,
    pub main_person_dietary_preference: String,
    pub dec24_attendance: bool,
    pub dec25_attendance: bool,
    pub accommodation_dec23: bool,
    pub accommodation_dec24: bool,
    pub accommodation_dec25: bool,
    pub concerns: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Guest {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Overwrite the questionnaire projection. Raises the allowance when the
    /// new party is larger than it.
    pub fn apply_questionnaire(&mut self, details: Questionnaire) {
        if details.party_size > self.max_party_size {
            self.max_party_size = details.party_size;
        }
        self.party_size = details.party_size;
        self.party_members = details.party_members;
        self.main_person_dietary_preference = details.main_person_dietary_preference;
        self.dec24_attendance = details.dec24_attendance;
        self.dec25_attendance = details.dec25_attendance;
        self.accommodation_dec23 = details.accommodation_dec23;
        self.accommodation_dec24 = details.accommodation_dec24;
        self.accommodation_dec25 = details.accommodation_dec25;
        self.concerns = details.concerns;
    }
}

/// A validated registration, ready to insert.
#[derive(Debug, Clone)]
pub struct NewGuest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub questionnaire: Questionnaire,
}

#[derive(Debug, Deserialize)]
pub struct EventAttendance {
    #[serde(default)]
    pub attendance: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct AccommodationRequest {
    #[serde(default)]
    pub dec23: bool,
    #[serde(default)]
    pub dec24: bool,
    #[serde(default)]
    pub dec25: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterGuestRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub party_size: i32,
    #[serde(default)]
    pub party_members: Vec<PartyMember>,
    #[serde(default)]
    pub main_person_dietary_preference: String,
    pub dec24: Option<EventAttendance>,
    pub dec25: Option<EventAttendance>,
    #[serde(default)]
    pub accommodation: AccommodationRequest,
    #[serde(default)]
    pub concerns: String,
}

impl RegisterGuestRequest {
    /// Trim and check the required identity fields.
    pub fn into_new_guest(self) -> Result<NewGuest, AppError> {
        let first_name = self.first_name.trim().to_string();
        let last_name = self.last_name.trim().to_string();
        let email = self.email.trim().to_lowercase();

        if first_name.is_empty() || last_name.is_empty() || email.is_empty() {
            return Err(AppError::Validation(
                "First name, last name and email are required".into(),
            ));
        }
        if !email.contains('@') {
            return Err(AppError::Validation("Email address is invalid".into()));
        }

        let questionnaire = Questionnaire {
            party_size: self.party_size,
            party_members: self.party_members,
            main_person_dietary_preference: self.main_person_dietary_preference,
            dec24_attendance: self.dec24.is_some_and(|d| d.attendance),
            dec25_attendance: self.dec25.is_some_and(|d| d.attendance),
            accommodation_dec23: self.accommodation.dec23,
            accommodation_dec24: self.accommodation.dec24,
            accommodation_dec25: self.accommodation.dec25,
            concerns: self.concerns,
        };
        questionnaire.validate()?;

        Ok(NewGuest {
            first_name,
            last_name,
            email,
            phone: self.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
            questionnaire,
        })
    }
}

/// Which guests a bulk deletion applies to.
#[derive(Debug, Clone)]
pub enum GuestSelection {
    All,
    Ids(Vec<Uuid>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSelectedRequest {
    pub guest_ids: Vec<Uuid>,
}

/// Public view served to the guest portal.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestPortalResponse {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl From<Guest> for GuestPortalResponse {
    fn from(g: Guest) -> Self {
        Self {
            first_name: g.first_name,
            last_name: g.last_name,
            email: g.email,
            phone: g.phone,
        }
    }
}

/// Questionnaire state served on the RSVP page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpFormResponse {
    pub first_name: String,
    pub last_name: String,
    pub max_party_size: i32,
    pub has_rsvp: bool,
    pub rsvp_status: RsvpStatus,
    pub party_size: i32,
    pub party_members: Vec<PartyMember>,
    pub main_person_dietary_preference: String,
    pub dec24_attendance: bool,
    pub dec25_attendance: bool,
    pub accommodation_dec23: bool,
    pub accommodation_dec24: bool,
    pub accommodation_dec25: bool,
    pub concerns: String,
}

impl From<Guest> for RsvpFormResponse {
    fn from(g: Guest) -> Self {
        Self {
            first_name: g.first_name,
            last_name: g.last_name,
            max_party_size: g.max_party_size,
            has_rsvp: g.rsvp_status != RsvpStatus::Pending,
            rsvp_status: g.rsvp_status,
            party_size: g.party_size,
            party_members: g.party_members,
            main_person_dietary_preference: g.main_person_dietary_preference,
            dec24_attendance: g.dec24_attendance,
            dec25_attendance: g.dec25_attendance,
            accommodation_dec23: g.accommodation_dec23,
            accommodation_dec24: g.accommodation_dec24,
            accommodation_dec25: g.accommodation_dec25,
            concerns: g.concerns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: serde_json::Value) -> RegisterGuestRequest {
        serde_json::from_value(json).expect("valid request json")
    }

    #[test]
    fn registration_requires_identity_fields() {
        let err = request(serde_json::json!({ "firstName": "Ana", "lastName": " " }))
            .into_new_guest()
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn registration_flattens_nested_questionnaire() {
        let guest = request(serde_json::json!({
            "firstName": " Ana ",
            "lastName": "Silva",
            "email": "Ana@Example.com",
            "phone": "",
            "dec24": { "attendance": true },
            "accommodation": { "dec23": true },
            "partyMembers": [{ "firstName": "Rui", "lastName": "Silva", "dietaryPreference": "vegan" }]
        }))
        .into_new_guest()
        .unwrap();

        assert_eq!(guest.first_name, "Ana");
        assert_eq!(guest.email, "ana@example.com");
        assert_eq!(guest.phone, None);
        assert!(guest.questionnaire.dec24_attendance);
        assert!(!guest.questionnaire.dec25_attendance);
        assert!(guest.questionnaire.accommodation_dec23);
        assert_eq!(guest.questionnaire.party_members[0].full_name(), "Rui Silva");
    }

    #[test]
    fn party_members_reject_unknown_fields() {
        let parsed: Result<Questionnaire, _> = serde_json::from_value(serde_json::json!({
            "partySize": 2,
            "partyMembers": [{ "firstName": "Rui", "age": 7 }]
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn oversized_party_is_rejected() {
        let q = Questionnaire {
            party_size: MAX_PARTY_SIZE + 1,
            ..Default::default()
        };
        assert!(matches!(q.validate(), Err(AppError::Validation(_))));
    }
}

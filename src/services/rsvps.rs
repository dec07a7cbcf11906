use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::error::AppError;
use crate::models::guest::Guest;
use crate::models::rsvp::{NewRsvp, Rsvp, RsvpListResponse, RsvpStats, SubmitRsvpRequest};
use crate::store::Store;
use crate::tasks::{BackgroundTask, TaskQueue};

const CSV_HEADER: [&str; 17] = [
    "First Name",
    "Last Name",
    "Email",
    "Phone",
    "RSVP Status",
    "Party Size",
    "Main Person Dietary",
    "Party Members",
    "Party Member Dietaries",
    "Dec 24 Attendance",
    "Dec 25 Attendance",
    "Accommodation Dec 23",
    "Accommodation Dec 24",
    "Accommodation Dec 25",
    "Special Concerns",
    "RSVP Message",
    "Responded At",
];

fn yes_no(flag: bool) -> &'static str {
    if flag { "Yes" } else { "No" }
}

#[derive(Clone)]
pub struct RsvpRecorder {
    store: Arc<dyn Store>,
    tasks: TaskQueue,
}

impl RsvpRecorder {
    pub fn new(store: Arc<dyn Store>, tasks: TaskQueue) -> Self {
        Self { store, tasks }
    }

    /// Record a decision for the guest holding `invite_token`.
    ///
    /// The guest projection and the new RSVP row are written together; a
    /// failure leaves neither behind.
    pub async fn submit(
        &self,
        invite_token: &str,
        request: SubmitRsvpRequest,
    ) -> Result<Rsvp, AppError> {
        let mut guest = self
            .store
            .guest_by_invite_token(invite_token)
            .await?
            .ok_or_else(|| AppError::NotFound("Invalid RSVP link".into()))?;

        if let Some(details) = request.updated_details {
            details.validate()?;
            guest.apply_questionnaire(details);
        }
        guest.rsvp_status = request.response.into();

        let rsvp = self
            .store
            .record_rsvp(
                &guest,
                NewRsvp {
                    guest_id: guest.id,
                    response: request.response,
                    party_size: guest.party_size,
                    message: request.message,
                    responded_at: Utc::now(),
                },
            )
            .await?;

        tracing::info!(
            guest_id = %guest.id,
            response = guest.rsvp_status.as_str(),
            party_size = guest.party_size,
            "RSVP recorded"
        );
        self.tasks.submit(BackgroundTask::RsvpConfirmation {
            guest,
            response: request.response,
        });
        Ok(rsvp)
    }

    pub async fn list_all(&self) -> Result<RsvpListResponse, AppError> {
        let rsvps = self.store.list_rsvps().await?;
        let guests = self.store.list_guests(None).await?;
        Ok(RsvpListResponse {
            rsvps,
            stats: RsvpStats::from_guests(&guests),
        })
    }

    /// One row per live guest, carrying the message and time of their most
    /// recent RSVP when there is one.
    pub async fn export_csv(&self) -> Result<String, AppError> {
        let guests = self.store.list_guests(None).await?;
        let latest: HashMap<_, _> = self
            .store
            .latest_rsvps()
            .await?
            .into_iter()
            .map(|r| (r.guest_id, r))
            .collect();

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(CSV_HEADER).map_err(csv_error)?;
        for guest in &guests {
            writer
                .write_record(csv_row(guest, latest.get(&guest.id)))
                .map_err(csv_error)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| AppError::Internal(format!("Failed to finish CSV export: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|e| AppError::Internal(format!("CSV export is not UTF-8: {e}")))
    }
}

fn csv_error(e: csv::Error) -> AppError {
    AppError::Internal(format!("Failed to write CSV export: {e}"))
}

fn csv_row(guest: &Guest, rsvp: Option<&Rsvp>) -> Vec<String> {
    let members = guest
        .party_members
        .iter()
        .map(|m| m.full_name())
        .collect::<Vec<_>>()
        .join("; ");
    let dietaries = guest
        .party_members
        .iter()
        .map(|m| m.dietary_preference.as_str())
        .collect::<Vec<_>>()
        .join("; ");

    vec![
        guest.first_name.clone(),
        guest.last_name.clone(),
        guest.email.clone(),
        guest.phone.clone().unwrap_or_default(),
        guest.rsvp_status.as_str().to_string(),
        guest.party_size.to_string(),
        guest.main_person_dietary_preference.clone(),
        members,
        dietaries,
        yes_no(guest.dec24_attendance).to_string(),
        yes_no(guest.dec25_attendance).to_string(),
        yes_no(guest.accommodation_dec23).to_string(),
        yes_no(guest.accommodation_dec24).to_string(),
        yes_no(guest.accommodation_dec25).to_string(),
        guest.concerns.clone(),
        rsvp.map(|r| r.message.clone()).unwrap_or_default(),
        rsvp.map(|r| r.responded_at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default(),
    ]
}

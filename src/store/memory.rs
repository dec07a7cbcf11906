//! In-memory [`Store`] for tests and local development.
//!
//! All state sits behind one mutex, so every method is atomic with respect
//! to every other. Not durable.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Store, Transition};
use crate::error::AppError;
use crate::models::admin::Admin;
use crate::models::guest::{Guest, GuestSelection, NewGuest, RegistrationStatus, RsvpStatus};
use crate::models::message::{Message, MessageStatus, NewMessage};
use crate::models::photo::{NewPhoto, Photo, PhotoFilter, PhotoStatus};
use crate::models::rsvp::{NewRsvp, Rsvp, RsvpWithGuest};

#[derive(Debug, Default)]
struct Data {
    guests: Vec<Guest>,
    rsvps: Vec<Rsvp>,
    photos: Vec<Photo>,
    messages: Vec<Message>,
    admins: Vec<Admin>,
    fail_rsvp_inserts: bool,
    token_collisions: usize,
}

impl Data {
    fn live_guest_mut(&mut self, id: Uuid) -> Option<&mut Guest> {
        self.guests
            .iter_mut()
            .find(|g| g.id == id && g.deleted_at.is_none())
    }

    fn live_guest(&self, pred: impl Fn(&Guest) -> bool) -> Option<Guest> {
        self.guests
            .iter()
            .find(|g| g.deleted_at.is_none() && pred(g))
            .cloned()
    }

    fn selected_guest_ids(&self, selection: &GuestSelection) -> HashSet<Uuid> {
        match selection {
            GuestSelection::All => self.guests.iter().map(|g| g.id).collect(),
            GuestSelection::Ids(ids) => ids.iter().copied().collect(),
        }
    }

    fn selected_portal_tokens(&self, selection: &GuestSelection) -> HashSet<String> {
        let ids = self.selected_guest_ids(selection);
        self.guests
            .iter()
            .filter(|g| ids.contains(&g.id))
            .filter_map(|g| g.guest_portal_token.clone())
            .collect()
    }

    fn token_taken(&self, id: Uuid, token: &str) -> bool {
        self.guests.iter().any(|g| {
            g.id != id
                && (g.invite_token.as_deref() == Some(token)
                    || g.guest_portal_token.as_deref() == Some(token))
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<Data>>,
}

fn poisoned<T>(_: PoisonError<T>) -> AppError {
    AppError::Internal("memory store lock poisoned".into())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Data>, AppError> {
        self.data.lock().map_err(poisoned)
    }

    /// Make every RSVP insert fail after the guest row has been updated, so
    /// the rollback path runs.
    #[cfg(test)]
    pub fn fail_rsvp_inserts(&self, fail: bool) {
        if let Ok(mut data) = self.data.lock() {
            data.fail_rsvp_inserts = fail;
        }
    }

    /// Report a unique violation for the next `n` approvals.
    #[cfg(test)]
    pub fn collide_next_tokens(&self, n: usize) {
        if let Ok(mut data) = self.data.lock() {
            data.token_collisions = n;
        }
    }

    /// Every RSVP row, including those of soft-deleted guests.
    #[cfg(test)]
    pub fn all_rsvps(&self) -> Vec<Rsvp> {
        self.data
            .lock()
            .map(|d| d.rsvps.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        self.lock().map(|_| ())
    }

    async fn insert_guest(&self, guest: NewGuest) -> Result<Guest, AppError> {
        let now = Utc::now();
        let q = guest.questionnaire;
        let guest = Guest {
            id: Uuid::new_v4(),
            first_name: guest.first_name,
            last_name: guest.last_name,
            email: guest.email,
            phone: guest.phone,
            invite_token: None,
            guest_portal_token: None,
            registration_status: RegistrationStatus::Pending,
            approved_at: None,
            rsvp_status: RsvpStatus::Pending,
            party_size: q.party_size,
            max_party_size: q.allowance(),
            party_members: q.party_members,
            main_person_dietary_preference: q.main_person_dietary_preference,
            dec24_attendance: q.dec24_attendance,
            dec25_attendance: q.dec25_attendance,
            accommodation_dec23: q.accommodation_dec23,
            accommodation_dec24: q.accommodation_dec24,
            accommodation_dec25: q.accommodation_dec25,
            concerns: q.concerns,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.lock()?.guests.push(guest.clone());
        Ok(guest)
    }

    async fn guest_by_id(&self, id: Uuid) -> Result<Option<Guest>, AppError> {
        Ok(self.lock()?.live_guest(|g| g.id == id))
    }

    async fn guest_by_invite_token(&self, token: &str) -> Result<Option<Guest>, AppError> {
        Ok(self
            .lock()?
            .live_guest(|g| g.invite_token.as_deref() == Some(token)))
    }

    async fn guest_by_portal_token(&self, token: &str) -> Result<Option<Guest>, AppError> {
        Ok(self
            .lock()?
            .live_guest(|g| g.guest_portal_token.as_deref() == Some(token)))
    }

    async fn list_guests(
        &self,
        status: Option<RegistrationStatus>,
    ) -> Result<Vec<Guest>, AppError> {
        let data = self.lock()?;
        let mut guests: Vec<Guest> = data
            .guests
            .iter()
            .filter(|g| g.deleted_at.is_none())
            .filter(|g| status.is_none_or(|s| g.registration_status == s))
            .cloned()
            .collect();
        guests.sort_by_key(|g| g.created_at);
        Ok(guests)
    }

    async fn approve_guest(
        &self,
        id: Uuid,
        invite_token: &str,
        portal_token: &str,
        approved_at: DateTime<Utc>,
    ) -> Result<Transition<Guest, RegistrationStatus>, AppError> {
        let mut data = self.lock()?;
        let Some(actual) = data.live_guest(|g| g.id == id).map(|g| g.registration_status) else {
            return Ok(Transition::NotFound);
        };
        if actual != RegistrationStatus::Pending {
            return Ok(Transition::StateMismatch { actual });
        }
        if data.token_collisions > 0 {
            data.token_collisions -= 1;
            return Err(AppError::UniqueViolation("guests_invite_token_key".into()));
        }
        if data.token_taken(id, invite_token) || data.token_taken(id, portal_token) {
            return Err(AppError::UniqueViolation("guests_invite_token_key".into()));
        }

        let Some(guest) = data.live_guest_mut(id) else {
            return Ok(Transition::NotFound);
        };
        guest.invite_token = Some(invite_token.to_string());
        guest.guest_portal_token = Some(portal_token.to_string());
        guest.registration_status = RegistrationStatus::Approved;
        guest.approved_at = Some(approved_at);
        guest.updated_at = Utc::now();
        Ok(Transition::Applied(guest.clone()))
    }

    async fn reject_guest(
        &self,
        id: Uuid,
    ) -> Result<Transition<Guest, RegistrationStatus>, AppError> {
        let mut data = self.lock()?;
        let Some(guest) = data.live_guest_mut(id) else {
            return Ok(Transition::NotFound);
        };
        if guest.registration_status != RegistrationStatus::Pending {
            return Ok(Transition::StateMismatch {
                actual: guest.registration_status,
            });
        }
        guest.registration_status = RegistrationStatus::Rejected;
        guest.updated_at = Utc::now();
        Ok(Transition::Applied(guest.clone()))
    }

    async fn delete_rsvps(&self, selection: &GuestSelection) -> Result<u64, AppError> {
        let mut data = self.lock()?;
        let ids = data.selected_guest_ids(selection);
        let before = data.rsvps.len();
        data.rsvps.retain(|r| !ids.contains(&r.guest_id));
        Ok((before - data.rsvps.len()) as u64)
    }

    async fn delete_messages(&self, selection: &GuestSelection) -> Result<u64, AppError> {
        let mut data = self.lock()?;
        let before = data.messages.len();
        match selection {
            GuestSelection::All => data.messages.clear(),
            GuestSelection::Ids(_) => {
                let tokens = data.selected_portal_tokens(selection);
                data.messages.retain(|m| !tokens.contains(&m.guest_token));
            }
        }
        Ok((before - data.messages.len()) as u64)
    }

    async fn delete_guest_photos(&self, selection: &GuestSelection) -> Result<Vec<Photo>, AppError> {
        let mut data = self.lock()?;
        let doomed: Box<dyn Fn(&Photo) -> bool> = match selection {
            GuestSelection::All => Box::new(|p: &Photo| p.guest_token.is_some()),
            GuestSelection::Ids(_) => {
                let tokens = data.selected_portal_tokens(selection);
                Box::new(move |p: &Photo| {
                    p.guest_token.as_ref().is_some_and(|t| tokens.contains(t))
                })
            }
        };
        let (removed, kept): (Vec<Photo>, Vec<Photo>) =
            data.photos.drain(..).partition(|p| doomed(p));
        data.photos = kept;
        Ok(removed)
    }

    async fn delete_guests(
        &self,
        selection: &GuestSelection,
        deleted_at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut data = self.lock()?;
        let ids = data.selected_guest_ids(selection);
        let mut count = 0;
        for guest in data.guests.iter_mut() {
            if guest.deleted_at.is_none() && ids.contains(&guest.id) {
                guest.deleted_at = Some(deleted_at);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn record_rsvp(&self, guest: &Guest, rsvp: NewRsvp) -> Result<Rsvp, AppError> {
        let mut data = self.lock()?;
        let Some(slot) = data.live_guest_mut(guest.id) else {
            return Err(AppError::NotFound("Invalid RSVP link".into()));
        };
        let previous = std::mem::replace(slot, guest.clone());
        slot.updated_at = Utc::now();

        if data.fail_rsvp_inserts {
            if let Some(slot) = data.live_guest_mut(guest.id) {
                *slot = previous;
            }
            return Err(AppError::Internal("Failed to create RSVP".into()));
        }

        let rsvp = Rsvp {
            id: Uuid::new_v4(),
            guest_id: rsvp.guest_id,
            response: rsvp.response,
            party_size: rsvp.party_size,
            message: rsvp.message,
            responded_at: rsvp.responded_at,
        };
        data.rsvps.push(rsvp.clone());
        Ok(rsvp)
    }

    async fn list_rsvps(&self) -> Result<Vec<RsvpWithGuest>, AppError> {
        let data = self.lock()?;
        let guests: HashMap<Uuid, &Guest> = data
            .guests
            .iter()
            .filter(|g| g.deleted_at.is_none())
            .map(|g| (g.id, g))
            .collect();
        let mut rsvps: Vec<RsvpWithGuest> = data
            .rsvps
            .iter()
            .filter_map(|r| {
                let guest = (*guests.get(&r.guest_id)?).clone();
                Some(RsvpWithGuest {
                    rsvp: r.clone(),
                    guest,
                })
            })
            .collect();
        rsvps.sort_by(|a, b| b.rsvp.responded_at.cmp(&a.rsvp.responded_at));
        Ok(rsvps)
    }

    async fn latest_rsvps(&self) -> Result<Vec<Rsvp>, AppError> {
        let data = self.lock()?;
        let mut latest: HashMap<Uuid, &Rsvp> = HashMap::new();
        for rsvp in &data.rsvps {
            let newer = latest
                .get(&rsvp.guest_id)
                .is_none_or(|seen| rsvp.responded_at >= seen.responded_at);
            if newer {
                latest.insert(rsvp.guest_id, rsvp);
            }
        }
        Ok(latest.into_values().cloned().collect())
    }

    async fn insert_photo(&self, photo: NewPhoto) -> Result<Photo, AppError> {
        let mut data = self.lock()?;
        if data.photos.iter().any(|p| p.storage_key == photo.storage_key) {
            return Err(AppError::UniqueViolation("photos_storage_key_key".into()));
        }
        let now = Utc::now();
        let photo = Photo {
            id: Uuid::new_v4(),
            file_name: photo.file_name,
            storage_key: photo.storage_key,
            thumbnail_key: None,
            content_type: photo.content_type,
            file_size: photo.file_size,
            status: PhotoStatus::Uploading,
            guest_token: photo.guest_token,
            guest_name: photo.guest_name,
            album_id: None,
            uploaded_at: None,
            moderated_at: None,
            created_at: now,
            updated_at: now,
        };
        data.photos.push(photo.clone());
        Ok(photo)
    }

    async fn photo_by_id(&self, id: Uuid) -> Result<Option<Photo>, AppError> {
        Ok(self.lock()?.photos.iter().find(|p| p.id == id).cloned())
    }

    async fn complete_photo_upload(
        &self,
        id: Uuid,
        thumbnail_key: &str,
        uploaded_at: DateTime<Utc>,
    ) -> Result<Transition<Photo, PhotoStatus>, AppError> {
        let mut data = self.lock()?;
        let Some(photo) = data.photos.iter_mut().find(|p| p.id == id) else {
            return Ok(Transition::NotFound);
        };
        if photo.status != PhotoStatus::Uploading {
            return Ok(Transition::StateMismatch {
                actual: photo.status,
            });
        }
        photo.status = PhotoStatus::Pending;
        photo.thumbnail_key = Some(thumbnail_key.to_string());
        photo.uploaded_at = Some(uploaded_at);
        photo.updated_at = Utc::now();
        Ok(Transition::Applied(photo.clone()))
    }

    async fn moderate_photo(
        &self,
        id: Uuid,
        status: PhotoStatus,
        moderated_at: DateTime<Utc>,
    ) -> Result<Option<Photo>, AppError> {
        let mut data = self.lock()?;
        Ok(data.photos.iter_mut().find(|p| p.id == id).map(|photo| {
            photo.status = status;
            photo.moderated_at = Some(moderated_at);
            photo.updated_at = Utc::now();
            photo.clone()
        }))
    }

    async fn delete_photo(&self, id: Uuid) -> Result<Option<Photo>, AppError> {
        let mut data = self.lock()?;
        let index = data.photos.iter().position(|p| p.id == id);
        Ok(index.map(|i| data.photos.remove(i)))
    }

    async fn list_photos(&self, filter: PhotoFilter) -> Result<Vec<Photo>, AppError> {
        let data = self.lock()?;
        let mut photos: Vec<Photo> = data
            .photos
            .iter()
            .filter(|p| match filter {
                PhotoFilter::Approved => p.status == PhotoStatus::Approved,
                PhotoFilter::Pending => p.status == PhotoStatus::Pending,
                PhotoFilter::All => true,
            })
            .cloned()
            .collect();
        match filter {
            PhotoFilter::Pending => photos.sort_by_key(|p| p.created_at),
            PhotoFilter::Approved | PhotoFilter::All => {
                photos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            }
        }
        Ok(photos)
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, AppError> {
        let message = Message {
            id: Uuid::new_v4(),
            guest_token: message.guest_token,
            guest_name: message.guest_name,
            content: message.content,
            status: MessageStatus::Unread,
            created_at: Utc::now(),
        };
        self.lock()?.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self) -> Result<Vec<Message>, AppError> {
        let mut messages = self.lock()?.messages.clone();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages)
    }

    async fn mark_message_read(&self, id: Uuid) -> Result<Option<Message>, AppError> {
        let mut data = self.lock()?;
        Ok(data.messages.iter_mut().find(|m| m.id == id).map(|m| {
            m.status = MessageStatus::Read;
            m.clone()
        }))
    }

    async fn insert_admin(&self, email: &str, password_hash: &str) -> Result<Admin, AppError> {
        let mut data = self.lock()?;
        if data.admins.iter().any(|a| a.email == email) {
            return Err(AppError::UniqueViolation("admins_email_key".into()));
        }
        let admin = Admin {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
            last_login_at: None,
        };
        data.admins.push(admin.clone());
        Ok(admin)
    }

    async fn admin_by_email(&self, email: &str) -> Result<Option<Admin>, AppError> {
        Ok(self
            .lock()?
            .admins
            .iter()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn record_admin_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(admin) = self.lock()?.admins.iter_mut().find(|a| a.id == id) {
            admin.last_login_at = Some(at);
        }
        Ok(())
    }
}

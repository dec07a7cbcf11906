//! Relational persistence behind a trait so services can run against
//! Postgres in production and an in-memory store in tests.
//!
//! State-machine transitions (guest approval, upload completion) are
//! compare-and-set writes: the store applies them only when the row is
//! still in the expected state and otherwise reports what it found. Two
//! racing callers therefore never both succeed.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::admin::Admin;
use crate::models::guest::{Guest, GuestSelection, NewGuest, RegistrationStatus};
use crate::models::message::{Message, NewMessage};
use crate::models::photo::{NewPhoto, Photo, PhotoFilter, PhotoStatus};
use crate::models::rsvp::{NewRsvp, Rsvp, RsvpWithGuest};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Outcome of a conditional state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition<T, S> {
    Applied(T),
    NotFound,
    StateMismatch { actual: S },
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> Result<(), AppError>;

    // --- Guests ---
    // Every read skips soft-deleted guests.

    async fn insert_guest(&self, guest: NewGuest) -> Result<Guest, AppError>;

    async fn guest_by_id(&self, id: Uuid) -> Result<Option<Guest>, AppError>;

    async fn guest_by_invite_token(&self, token: &str) -> Result<Option<Guest>, AppError>;

    async fn guest_by_portal_token(&self, token: &str) -> Result<Option<Guest>, AppError>;

    /// Oldest first.
    async fn list_guests(
        &self,
        status: Option<RegistrationStatus>,
    ) -> Result<Vec<Guest>, AppError>;

    /// Set both tokens and flip a pending guest to approved.
    ///
    /// Returns `AppError::UniqueViolation` if either token is already taken.
    async fn approve_guest(
        &self,
        id: Uuid,
        invite_token: &str,
        portal_token: &str,
        approved_at: DateTime<Utc>,
    ) -> Result<Transition<Guest, RegistrationStatus>, AppError>;

    async fn reject_guest(
        &self,
        id: Uuid,
    ) -> Result<Transition<Guest, RegistrationStatus>, AppError>;

    async fn delete_rsvps(&self, selection: &GuestSelection) -> Result<u64, AppError>;

    /// Removes messages sent under the selected guests' portal tokens.
    async fn delete_messages(&self, selection: &GuestSelection) -> Result<u64, AppError>;

    /// Removes photo rows uploaded under the selected guests' portal tokens
    /// and returns them so their objects can be cleaned up.
    async fn delete_guest_photos(&self, selection: &GuestSelection) -> Result<Vec<Photo>, AppError>;

    /// Soft-deletes the selected guests.
    async fn delete_guests(
        &self,
        selection: &GuestSelection,
        deleted_at: DateTime<Utc>,
    ) -> Result<u64, AppError>;

    // --- RSVPs ---

    /// Persist the guest's updated projection and append the RSVP row as a
    /// single transaction. Either both are written or neither is.
    async fn record_rsvp(&self, guest: &Guest, rsvp: NewRsvp) -> Result<Rsvp, AppError>;

    /// Newest first, live guests only.
    async fn list_rsvps(&self) -> Result<Vec<RsvpWithGuest>, AppError>;

    /// The most recent RSVP of every guest that has one.
    async fn latest_rsvps(&self) -> Result<Vec<Rsvp>, AppError>;

    // --- Photos ---

    /// Returns `AppError::UniqueViolation` if the storage key is taken.
    async fn insert_photo(&self, photo: NewPhoto) -> Result<Photo, AppError>;

    async fn photo_by_id(&self, id: Uuid) -> Result<Option<Photo>, AppError>;

    /// uploading -> pending.
    async fn complete_photo_upload(
        &self,
        id: Uuid,
        thumbnail_key: &str,
        uploaded_at: DateTime<Utc>,
    ) -> Result<Transition<Photo, PhotoStatus>, AppError>;

    /// Unconditional status overwrite.
    async fn moderate_photo(
        &self,
        id: Uuid,
        status: PhotoStatus,
        moderated_at: DateTime<Utc>,
    ) -> Result<Option<Photo>, AppError>;

    async fn delete_photo(&self, id: Uuid) -> Result<Option<Photo>, AppError>;

    async fn list_photos(&self, filter: PhotoFilter) -> Result<Vec<Photo>, AppError>;

    // --- Messages ---

    async fn insert_message(&self, message: NewMessage) -> Result<Message, AppError>;

    /// Newest first.
    async fn list_messages(&self) -> Result<Vec<Message>, AppError>;

    async fn mark_message_read(&self, id: Uuid) -> Result<Option<Message>, AppError>;

    // --- Admins ---

    async fn insert_admin(&self, email: &str, password_hash: &str) -> Result<Admin, AppError>;

    async fn admin_by_email(&self, email: &str) -> Result<Option<Admin>, AppError>;

    async fn record_admin_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;
}

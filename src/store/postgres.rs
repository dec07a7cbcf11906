use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{Store, Transition};
use crate::error::AppError;
use crate::models::admin::Admin;
use crate::models::guest::{Guest, GuestSelection, NewGuest, RegistrationStatus};
use crate::models::message::{Message, NewMessage};
use crate::models::photo::{NewPhoto, Photo, PhotoFilter, PhotoStatus};
use crate::models::rsvp::{NewRsvp, Rsvp, RsvpWithGuest};

const RSVP_COLUMNS: &str = "r.id, r.guest_id, r.response, r.party_size, r.message, r.responded_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to run migrations: {e}")))
    }

    async fn guest_status(&self, id: Uuid) -> Result<Option<RegistrationStatus>, AppError> {
        let status = sqlx::query_scalar::<_, RegistrationStatus>(
            "SELECT registration_status FROM guests WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(status)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_guest(&self, guest: NewGuest) -> Result<Guest, AppError> {
        let q = &guest.questionnaire;
        let guest = sqlx::query_as::<_, Guest>(
            "INSERT INTO guests (first_name, last_name, email, phone, party_size, max_party_size,
               party_members, main_person_dietary_preference, dec24_attendance, dec25_attendance,
               accommodation_dec23, accommodation_dec24, accommodation_dec25, concerns)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             RETURNING *",
        )
        .bind(&guest.first_name)
        .bind(&guest.last_name)
        .bind(&guest.email)
        .bind(&guest.phone)
        .bind(q.party_size)
        .bind(q.allowance())
        .bind(Json(&q.party_members))
        .bind(&q.main_person_dietary_preference)
        .bind(q.dec24_attendance)
        .bind(q.dec25_attendance)
        .bind(q.accommodation_dec23)
        .bind(q.accommodation_dec24)
        .bind(q.accommodation_dec25)
        .bind(&q.concerns)
        .fetch_one(&self.pool)
        .await?;
        Ok(guest)
    }

    async fn guest_by_id(&self, id: Uuid) -> Result<Option<Guest>, AppError> {
        let guest = sqlx::query_as::<_, Guest>(
            "SELECT * FROM guests WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(guest)
    }

    async fn guest_by_invite_token(&self, token: &str) -> Result<Option<Guest>, AppError> {
        let guest = sqlx::query_as::<_, Guest>(
            "SELECT * FROM guests WHERE invite_token = $1 AND deleted_at IS NULL",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(guest)
    }

    async fn guest_by_portal_token(&self, token: &str) -> Result<Option<Guest>, AppError> {
        let guest = sqlx::query_as::<_, Guest>(
            "SELECT * FROM guests WHERE guest_portal_token = $1 AND deleted_at IS NULL",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(guest)
    }

    async fn list_guests(
        &self,
        status: Option<RegistrationStatus>,
    ) -> Result<Vec<Guest>, AppError> {
        let guests = match status {
            Some(status) => {
                sqlx::query_as::<_, Guest>(
                    "SELECT * FROM guests
                     WHERE deleted_at IS NULL AND registration_status = $1
                     ORDER BY created_at",
                )
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Guest>(
                    "SELECT * FROM guests WHERE deleted_at IS NULL ORDER BY created_at",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(guests)
    }

    async fn approve_guest(
        &self,
        id: Uuid,
        invite_token: &str,
        portal_token: &str,
        approved_at: DateTime<Utc>,
    ) -> Result<Transition<Guest, RegistrationStatus>, AppError> {
        let updated = sqlx::query_as::<_, Guest>(
            "UPDATE guests SET
               invite_token = $2,
               guest_portal_token = $3,
               registration_status = 'approved',
               approved_at = $4,
               updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL AND registration_status = 'pending'
             RETURNING *",
        )
        .bind(id)
        .bind(invite_token)
        .bind(portal_token)
        .bind(approved_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(guest) = updated {
            return Ok(Transition::Applied(guest));
        }
        Ok(match self.guest_status(id).await? {
            Some(actual) => Transition::StateMismatch { actual },
            None => Transition::NotFound,
        })
    }

    async fn reject_guest(
        &self,
        id: Uuid,
    ) -> Result<Transition<Guest, RegistrationStatus>, AppError> {
        let updated = sqlx::query_as::<_, Guest>(
            "UPDATE guests SET registration_status = 'rejected', updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL AND registration_status = 'pending'
             RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(guest) = updated {
            return Ok(Transition::Applied(guest));
        }
        Ok(match self.guest_status(id).await? {
            Some(actual) => Transition::StateMismatch { actual },
            None => Transition::NotFound,
        })
    }

    async fn delete_rsvps(&self, selection: &GuestSelection) -> Result<u64, AppError> {
        let result = match selection {
            GuestSelection::All => sqlx::query("DELETE FROM rsvps").execute(&self.pool).await?,
            GuestSelection::Ids(ids) => {
                sqlx::query("DELETE FROM rsvps WHERE guest_id = ANY($1)")
                    .bind(ids)
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn delete_messages(&self, selection: &GuestSelection) -> Result<u64, AppError> {
        let result = match selection {
            GuestSelection::All => sqlx::query("DELETE FROM messages").execute(&self.pool).await?,
            GuestSelection::Ids(ids) => {
                sqlx::query(
                    "DELETE FROM messages WHERE guest_token IN
                       (SELECT guest_portal_token FROM guests
                        WHERE id = ANY($1) AND guest_portal_token IS NOT NULL)",
                )
                .bind(ids)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn delete_guest_photos(&self, selection: &GuestSelection) -> Result<Vec<Photo>, AppError> {
        let photos = match selection {
            GuestSelection::All => {
                sqlx::query_as::<_, Photo>(
                    "DELETE FROM photos WHERE guest_token IS NOT NULL RETURNING *",
                )
                .fetch_all(&self.pool)
                .await?
            }
            GuestSelection::Ids(ids) => {
                sqlx::query_as::<_, Photo>(
                    "DELETE FROM photos WHERE guest_token IN
                       (SELECT guest_portal_token FROM guests
                        WHERE id = ANY($1) AND guest_portal_token IS NOT NULL)
                     RETURNING *",
                )
                .bind(ids)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(photos)
    }

    async fn delete_guests(
        &self,
        selection: &GuestSelection,
        deleted_at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = match selection {
            GuestSelection::All => {
                sqlx::query("UPDATE guests SET deleted_at = $1 WHERE deleted_at IS NULL")
                    .bind(deleted_at)
                    .execute(&self.pool)
                    .await?
            }
            GuestSelection::Ids(ids) => {
                sqlx::query(
                    "UPDATE guests SET deleted_at = $1
                     WHERE deleted_at IS NULL AND id = ANY($2)",
                )
                .bind(deleted_at)
                .bind(ids)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn record_rsvp(&self, guest: &Guest, rsvp: NewRsvp) -> Result<Rsvp, AppError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE guests SET
               rsvp_status = $2,
               party_size = $3,
               max_party_size = $4,
               party_members = $5,
               main_person_dietary_preference = $6,
               dec24_attendance = $7,
               dec25_attendance = $8,
               accommodation_dec23 = $9,
               accommodation_dec24 = $10,
               accommodation_dec25 = $11,
               concerns = $12,
               updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(guest.id)
        .bind(guest.rsvp_status)
        .bind(guest.party_size)
        .bind(guest.max_party_size)
        .bind(Json(&guest.party_members))
        .bind(&guest.main_person_dietary_preference)
        .bind(guest.dec24_attendance)
        .bind(guest.dec25_attendance)
        .bind(guest.accommodation_dec23)
        .bind(guest.accommodation_dec24)
        .bind(guest.accommodation_dec25)
        .bind(&guest.concerns)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            // Dropping the transaction rolls it back.
            return Err(AppError::NotFound("Invalid RSVP link".into()));
        }

        let rsvp = sqlx::query_as::<_, Rsvp>(
            "INSERT INTO rsvps (guest_id, response, party_size, message, responded_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, guest_id, response, party_size, message, responded_at",
        )
        .bind(rsvp.guest_id)
        .bind(rsvp.response)
        .bind(rsvp.party_size)
        .bind(&rsvp.message)
        .bind(rsvp.responded_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(rsvp)
    }

    async fn list_rsvps(&self) -> Result<Vec<RsvpWithGuest>, AppError> {
        let rsvps = sqlx::query_as::<_, Rsvp>(&format!(
            "SELECT {RSVP_COLUMNS} FROM rsvps r
             JOIN guests g ON g.id = r.guest_id
             WHERE g.deleted_at IS NULL
             ORDER BY r.responded_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut guest_ids: Vec<Uuid> = rsvps.iter().map(|r| r.guest_id).collect();
        guest_ids.sort();
        guest_ids.dedup();

        let guests = sqlx::query_as::<_, Guest>("SELECT * FROM guests WHERE id = ANY($1)")
            .bind(&guest_ids)
            .fetch_all(&self.pool)
            .await?;
        let guests: std::collections::HashMap<Uuid, Guest> =
            guests.into_iter().map(|g| (g.id, g)).collect();

        Ok(rsvps
            .into_iter()
            .filter_map(|rsvp| {
                let guest = guests.get(&rsvp.guest_id)?.clone();
                Some(RsvpWithGuest { rsvp, guest })
            })
            .collect())
    }

    async fn latest_rsvps(&self) -> Result<Vec<Rsvp>, AppError> {
        let rsvps = sqlx::query_as::<_, Rsvp>(&format!(
            "SELECT DISTINCT ON (r.guest_id) {RSVP_COLUMNS} FROM rsvps r
             ORDER BY r.guest_id, r.responded_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rsvps)
    }

    async fn insert_photo(&self, photo: NewPhoto) -> Result<Photo, AppError> {
        let photo = sqlx::query_as::<_, Photo>(
            "INSERT INTO photos (file_name, storage_key, content_type, file_size, status, guest_token, guest_name)
             VALUES ($1, $2, $3, $4, 'uploading', $5, $6)
             RETURNING *",
        )
        .bind(&photo.file_name)
        .bind(&photo.storage_key)
        .bind(&photo.content_type)
        .bind(photo.file_size)
        .bind(&photo.guest_token)
        .bind(&photo.guest_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(photo)
    }

    async fn photo_by_id(&self, id: Uuid) -> Result<Option<Photo>, AppError> {
        let photo = sqlx::query_as::<_, Photo>("SELECT * FROM photos WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(photo)
    }

    async fn complete_photo_upload(
        &self,
        id: Uuid,
        thumbnail_key: &str,
        uploaded_at: DateTime<Utc>,
    ) -> Result<Transition<Photo, PhotoStatus>, AppError> {
        let updated = sqlx::query_as::<_, Photo>(
            "UPDATE photos SET status = 'pending', thumbnail_key = $2, uploaded_at = $3, updated_at = NOW()
             WHERE id = $1 AND status = 'uploading'
             RETURNING *",
        )
        .bind(id)
        .bind(thumbnail_key)
        .bind(uploaded_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(photo) = updated {
            return Ok(Transition::Applied(photo));
        }
        let actual = sqlx::query_scalar::<_, PhotoStatus>("SELECT status FROM photos WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match actual {
            Some(actual) => Transition::StateMismatch { actual },
            None => Transition::NotFound,
        })
    }

    async fn moderate_photo(
        &self,
        id: Uuid,
        status: PhotoStatus,
        moderated_at: DateTime<Utc>,
    ) -> Result<Option<Photo>, AppError> {
        let photo = sqlx::query_as::<_, Photo>(
            "UPDATE photos SET status = $2, moderated_at = $3, updated_at = NOW()
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .bind(moderated_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(photo)
    }

    async fn delete_photo(&self, id: Uuid) -> Result<Option<Photo>, AppError> {
        let photo = sqlx::query_as::<_, Photo>("DELETE FROM photos WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(photo)
    }

    async fn list_photos(&self, filter: PhotoFilter) -> Result<Vec<Photo>, AppError> {
        let sql = match filter {
            PhotoFilter::Approved => {
                "SELECT * FROM photos WHERE status = 'approved' ORDER BY created_at DESC"
            }
            PhotoFilter::Pending => {
                "SELECT * FROM photos WHERE status = 'pending' ORDER BY created_at ASC"
            }
            PhotoFilter::All => "SELECT * FROM photos ORDER BY created_at DESC",
        };
        let photos = sqlx::query_as::<_, Photo>(sql).fetch_all(&self.pool).await?;
        Ok(photos)
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, AppError> {
        let message = sqlx::query_as::<_, Message>(
            "INSERT INTO messages (guest_token, guest_name, content)
             VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(&message.guest_token)
        .bind(&message.guest_name)
        .bind(&message.content)
        .fetch_one(&self.pool)
        .await?;
        Ok(message)
    }

    async fn list_messages(&self) -> Result<Vec<Message>, AppError> {
        let messages =
            sqlx::query_as::<_, Message>("SELECT * FROM messages ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(messages)
    }

    async fn mark_message_read(&self, id: Uuid) -> Result<Option<Message>, AppError> {
        let message = sqlx::query_as::<_, Message>(
            "UPDATE messages SET status = 'read' WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(message)
    }

    async fn insert_admin(&self, email: &str, password_hash: &str) -> Result<Admin, AppError> {
        let admin = sqlx::query_as::<_, Admin>(
            "INSERT INTO admins (email, password_hash) VALUES ($1, $2) RETURNING *",
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(admin)
    }

    async fn admin_by_email(&self, email: &str) -> Result<Option<Admin>, AppError> {
        let admin = sqlx::query_as::<_, Admin>("SELECT * FROM admins WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(admin)
    }

    async fn record_admin_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE admins SET last_login_at = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

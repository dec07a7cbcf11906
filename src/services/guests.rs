use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::guest::{Guest, GuestSelection, NewGuest, RegistrationStatus};
use crate::storage::StorageBackend;
use crate::store::{Store, Transition};
use crate::tasks::{BackgroundTask, TaskQueue};
use crate::token;

/// Fresh token pairs tried before approval gives up.
const TOKEN_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct GuestRegistry {
    store: Arc<dyn Store>,
    storage: StorageBackend,
    tasks: TaskQueue,
    public_base_url: String,
}

fn not_pending(actual: RegistrationStatus) -> AppError {
    AppError::Conflict(format!(
        "Guest registration is {}, expected pending",
        actual.as_str()
    ))
}

impl GuestRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        storage: StorageBackend,
        tasks: TaskQueue,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            storage,
            tasks,
            public_base_url: public_base_url.into(),
        }
    }

    pub async fn register(&self, guest: NewGuest) -> Result<Guest, AppError> {
        let guest = self.store.insert_guest(guest).await?;
        tracing::info!(guest_id = %guest.id, "Guest registered");
        Ok(guest)
    }

    /// Issue both capability tokens and flip a pending guest to approved.
    ///
    /// A token clash reported by the store is retried with a fresh pair.
    /// The approval notice is queued only after the write has landed.
    pub async fn approve(&self, id: Uuid) -> Result<Guest, AppError> {
        for attempt in 1..=TOKEN_ATTEMPTS {
            let invite_token = token::issue();
            let portal_token = token::issue();

            match self
                .store
                .approve_guest(id, &invite_token, &portal_token, Utc::now())
                .await
            {
                Ok(Transition::Applied(guest)) => {
                    tracing::info!(guest_id = %guest.id, "Guest approved");
                    self.tasks.submit(BackgroundTask::ApprovalNotice {
                        invite_url: format!("{}/rsvp/{invite_token}", self.public_base_url),
                        portal_url: format!("{}/guest-portal/{portal_token}", self.public_base_url),
                        guest: guest.clone(),
                    });
                    return Ok(guest);
                }
                Ok(Transition::NotFound) => return Err(AppError::NotFound("Guest not found".into())),
                Ok(Transition::StateMismatch { actual }) => return Err(not_pending(actual)),
                Err(e) if e.is_unique_violation() => {
                    tracing::warn!(guest_id = %id, attempt, "Token collision during approval, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(AppError::Internal(format!(
            "Could not issue unique tokens for guest {id} after {TOKEN_ATTEMPTS} attempts"
        )))
    }

    pub async fn reject(&self, id: Uuid) -> Result<Guest, AppError> {
        match self.store.reject_guest(id).await? {
            Transition::Applied(guest) => {
                tracing::info!(guest_id = %guest.id, "Guest rejected");
                Ok(guest)
            }
            Transition::NotFound => Err(AppError::NotFound("Guest not found".into())),
            Transition::StateMismatch { actual } => Err(not_pending(actual)),
        }
    }

    pub async fn get_by_invite_token(&self, token: &str) -> Result<Guest, AppError> {
        self.store
            .guest_by_invite_token(token)
            .await?
            .ok_or_else(|| AppError::NotFound("Invalid RSVP link".into()))
    }

    pub async fn get_by_portal_token(&self, token: &str) -> Result<Guest, AppError> {
        self.store
            .guest_by_portal_token(token)
            .await?
            .ok_or_else(|| AppError::NotFound("Invalid guest portal link".into()))
    }

    pub async fn list(&self) -> Result<Vec<Guest>, AppError> {
        self.store.list_guests(None).await
    }

    pub async fn list_pending(&self) -> Result<Vec<Guest>, AppError> {
        self.store.list_guests(Some(RegistrationStatus::Pending)).await
    }

    pub async fn delete_all(&self) -> Result<u64, AppError> {
        self.delete(GuestSelection::All).await
    }

    pub async fn delete_selected(&self, ids: Vec<Uuid>) -> Result<u64, AppError> {
        if ids.is_empty() {
            return Err(AppError::Validation("No guests selected".into()));
        }
        self.delete(GuestSelection::Ids(ids)).await
    }

    /// RSVPs must go before the guests do. Messages, photos and stored
    /// objects are cleaned up best effort.
    async fn delete(&self, selection: GuestSelection) -> Result<u64, AppError> {
        let rsvps = self.store.delete_rsvps(&selection).await?;

        let messages = match self.store.delete_messages(&selection).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(?selection, "Failed to delete guest messages: {e}");
                0
            }
        };

        let photos = match self.store.delete_guest_photos(&selection).await {
            Ok(photos) => photos,
            Err(e) => {
                tracing::warn!(?selection, "Failed to delete guest photos: {e}");
                Vec::new()
            }
        };
        for photo in &photos {
            self.storage.delete_logged(&photo.storage_key).await;
            if let Some(thumb) = &photo.thumbnail_key {
                self.storage.delete_logged(thumb).await;
            }
        }

        let guests = self.store.delete_guests(&selection, Utc::now()).await?;
        tracing::info!(
            guests,
            rsvps,
            messages,
            photos = photos.len(),
            "Guests deleted"
        );
        Ok(guests)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::models::guest::{RsvpStatus, DEFAULT_MAX_PARTY_SIZE};
    use crate::models::message::NewMessage;
    use crate::models::rsvp::RsvpResponse;
    use crate::test_support::{new_guest, submit_request, upload_request, Harness};

    use super::*;

    #[tokio::test]
    async fn registration_starts_pending_without_tokens() {
        let h = Harness::new();
        let guest = h.guests.register(new_guest("Ana")).await.unwrap();

        assert_eq!(guest.first_name, "Ana");
        assert_eq!(guest.registration_status, RegistrationStatus::Pending);
        assert_eq!(guest.rsvp_status, RsvpStatus::Pending);
        assert_eq!(guest.party_size, 0);
        assert_eq!(guest.max_party_size, DEFAULT_MAX_PARTY_SIZE);
        assert!(guest.invite_token.is_none());
        assert!(guest.guest_portal_token.is_none());
    }

    #[tokio::test]
    async fn registered_party_larger_than_default_raises_allowance() {
        let h = Harness::new();
        let mut new = new_guest("Ana");
        new.questionnaire.party_size = 5;
        let guest = h.guests.register(new).await.unwrap();

        assert_eq!(guest.party_size, 5);
        assert_eq!(guest.max_party_size, 5);
        let stored = h.store.guest_by_id(guest.id).await.unwrap().unwrap();
        assert!(stored.party_size <= stored.max_party_size);
    }

    #[tokio::test]
    async fn approval_issues_tokens_and_queues_notice() {
        let mut h = Harness::new();
        let guest = h.guests.register(new_guest("Ana")).await.unwrap();
        let approved = h.guests.approve(guest.id).await.unwrap();

        assert_eq!(approved.registration_status, RegistrationStatus::Approved);
        assert!(approved.approved_at.is_some());
        let invite = approved.invite_token.clone().unwrap();
        let portal = approved.guest_portal_token.clone().unwrap();
        assert_ne!(invite, portal);

        match h.next_task() {
            Some(BackgroundTask::ApprovalNotice {
                guest,
                invite_url,
                portal_url,
            }) => {
                assert_eq!(guest.id, approved.id);
                assert_eq!(invite_url, format!("http://rsvp.test/rsvp/{invite}"));
                assert_eq!(portal_url, format!("http://rsvp.test/guest-portal/{portal}"));
            }
            other => panic!("expected approval notice, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_decision_conflicts_and_changes_nothing() {
        let mut h = Harness::new();
        let guest = h.guests.register(new_guest("Ana")).await.unwrap();
        let approved = h.guests.approve(guest.id).await.unwrap();
        h.next_task();

        assert!(matches!(h.guests.approve(guest.id).await, Err(AppError::Conflict(_))));
        assert!(matches!(h.guests.reject(guest.id).await, Err(AppError::Conflict(_))));

        let current = h.store.guest_by_id(guest.id).await.unwrap().unwrap();
        assert_eq!(current.registration_status, RegistrationStatus::Approved);
        assert_eq!(current.invite_token, approved.invite_token);
        assert_eq!(current.approved_at, approved.approved_at);
        assert!(h.next_task().is_none());
    }

    #[tokio::test]
    async fn rejected_guest_cannot_be_approved() {
        let h = Harness::new();
        let guest = h.guests.register(new_guest("Ana")).await.unwrap();
        let rejected = h.guests.reject(guest.id).await.unwrap();
        assert_eq!(rejected.registration_status, RegistrationStatus::Rejected);
        assert!(rejected.invite_token.is_none());

        let err = h.guests.approve(guest.id).await.unwrap_err();
        assert!(err.to_string().contains("rejected"));
    }

    #[tokio::test]
    async fn unknown_guest_is_not_found() {
        let h = Harness::new();
        assert!(matches!(h.guests.approve(Uuid::new_v4()).await, Err(AppError::NotFound(_))));
        assert!(matches!(h.guests.reject(Uuid::new_v4()).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn concurrent_approvals_have_one_winner() {
        let mut h = Harness::new();
        let guest = h.guests.register(new_guest("Ana")).await.unwrap();

        let (a, b) = tokio::join!(h.guests.approve(guest.id), h.guests.approve(guest.id));
        let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(matches!(
            [a, b].into_iter().find(|r| r.is_err()),
            Some(Err(AppError::Conflict(_)))
        ));

        assert!(matches!(h.next_task(), Some(BackgroundTask::ApprovalNotice { .. })));
        assert!(h.next_task().is_none());
    }

    #[tokio::test]
    async fn token_collisions_are_retried() {
        let h = Harness::new();
        let guest = h.guests.register(new_guest("Ana")).await.unwrap();
        h.store.collide_next_tokens(TOKEN_ATTEMPTS - 1);

        let approved = h.guests.approve(guest.id).await.unwrap();
        assert!(approved.invite_token.is_some());
    }

    #[tokio::test]
    async fn persistent_collisions_give_up() {
        let h = Harness::new();
        let guest = h.guests.register(new_guest("Ana")).await.unwrap();
        h.store.collide_next_tokens(TOKEN_ATTEMPTS);

        assert!(matches!(h.guests.approve(guest.id).await, Err(AppError::Internal(_))));
        let current = h.store.guest_by_id(guest.id).await.unwrap().unwrap();
        assert_eq!(current.registration_status, RegistrationStatus::Pending);
    }

    #[tokio::test]
    async fn tokens_are_unique_across_guests() {
        let h = Harness::new();
        let mut seen = HashSet::new();
        for name in ["Ana", "Bea", "Caio", "Duda", "Edu"] {
            let guest = h.guests.register(new_guest(name)).await.unwrap();
            let guest = h.guests.approve(guest.id).await.unwrap();
            assert!(seen.insert(guest.invite_token.unwrap()));
            assert!(seen.insert(guest.guest_portal_token.unwrap()));
        }
    }

    #[tokio::test]
    async fn token_lookups_hide_deleted_guests() {
        let h = Harness::new();
        let guest = h.approved_guest("Ana").await;
        let invite = guest.invite_token.clone().unwrap();
        let portal = guest.guest_portal_token.clone().unwrap();

        assert_eq!(h.guests.get_by_invite_token(&invite).await.unwrap().id, guest.id);
        assert_eq!(h.guests.get_by_portal_token(&portal).await.unwrap().id, guest.id);

        h.guests.delete_selected(vec![guest.id]).await.unwrap();

        let deleted = h.guests.get_by_invite_token(&invite).await.unwrap_err();
        let wrong = h.guests.get_by_invite_token("nope").await.unwrap_err();
        assert!(matches!(deleted, AppError::NotFound(_)));
        assert_eq!(deleted.to_string(), wrong.to_string());
        assert!(matches!(
            h.guests.get_by_portal_token(&portal).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn pending_list_excludes_decided_guests() {
        let h = Harness::new();
        let ana = h.guests.register(new_guest("Ana")).await.unwrap();
        let bea = h.guests.register(new_guest("Bea")).await.unwrap();
        h.guests.approve(ana.id).await.unwrap();

        let pending = h.guests.list_pending().await.unwrap();
        assert_eq!(pending.iter().map(|g| g.id).collect::<Vec<_>>(), vec![bea.id]);
        assert_eq!(h.guests.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn deleting_a_guest_cascades_to_dependents() {
        let h = Harness::new();
        let ana = h.approved_guest("Ana").await;
        let bea = h.approved_guest("Bea").await;
        let ana_portal = ana.guest_portal_token.clone().unwrap();
        let bea_portal = bea.guest_portal_token.clone().unwrap();

        for guest in [&ana, &bea] {
            h.rsvps
                .submit(guest.invite_token.as_deref().unwrap(), submit_request(RsvpResponse::Yes, None))
                .await
                .unwrap();
            h.store
                .insert_message(NewMessage {
                    guest_token: guest.guest_portal_token.clone().unwrap(),
                    guest_name: guest.full_name(),
                    content: "See you there".into(),
                })
                .await
                .unwrap();
        }
        let ana_photo = h.uploaded_photo(Some(ana_portal.as_str())).await;
        h.uploaded_photo(Some(bea_portal.as_str())).await;

        assert_eq!(h.guests.delete_selected(vec![ana.id]).await.unwrap(), 1);

        assert!(h.store.all_rsvps().iter().all(|r| r.guest_id != ana.id));
        let messages = h.store.list_messages().await.unwrap();
        assert!(messages.iter().all(|m| m.guest_token != ana_portal));
        assert_eq!(messages.len(), 1);
        let photos = h.photos.list_all().await.unwrap();
        assert!(photos.iter().all(|p| p.id != ana_photo.id));
        assert_eq!(photos.len(), 1);

        let deleted = h.storage.deleted_keys();
        assert!(deleted.contains(&ana_photo.storage_key));
        assert!(deleted.contains(ana_photo.thumbnail_key.as_ref().unwrap()));

        let remaining = h.guests.list().await.unwrap();
        assert_eq!(remaining.iter().map(|g| g.id).collect::<Vec<_>>(), vec![bea.id]);
    }

    #[tokio::test]
    async fn storage_failures_do_not_block_guest_deletion() {
        let h = Harness::new();
        let ana = h.approved_guest("Ana").await;
        let photo = h.uploaded_photo(ana.guest_portal_token.as_deref()).await;
        h.storage.fail_deletes_of(&photo.storage_key);

        assert_eq!(h.guests.delete_all().await.unwrap(), 1);
        assert!(h.guests.list().await.unwrap().is_empty());
        assert!(h.photos.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_all_keeps_admin_photos() {
        let h = Harness::new();
        h.approved_guest("Ana").await;
        h.approved_guest("Bea").await;
        h.photos
            .request_upload(upload_request("image/jpeg", 1024, None))
            .await
            .unwrap();

        assert_eq!(h.guests.delete_all().await.unwrap(), 2);
        assert!(h.guests.list().await.unwrap().is_empty());
        assert_eq!(h.photos.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_selection_is_rejected() {
        let h = Harness::new();
        assert!(matches!(
            h.guests.delete_selected(Vec::new()).await,
            Err(AppError::Validation(_))
        ));
    }
}

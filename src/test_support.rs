//! Fixtures shared by the service and router tests.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::Config;
use crate::models::guest::{Guest, NewGuest, Questionnaire};
use crate::models::photo::{Photo, UploadUrlRequest};
use crate::models::rsvp::{RsvpResponse, SubmitRsvpRequest};
use crate::services::{GuestRegistry, PhotoUploadCoordinator, RsvpRecorder};
use crate::storage::{MemoryStorage, StorageBackend};
use crate::store::{MemoryStore, Store};
use crate::tasks::{BackgroundTask, TaskQueue};
use crate::AppState;

pub const BASE_URL: &str = "http://rsvp.test";
pub const JWT_SECRET: &str = "test-secret";

pub fn new_guest(first_name: &str) -> NewGuest {
    NewGuest {
        first_name: first_name.to_string(),
        last_name: "Silva".to_string(),
        email: format!("{}@example.com", first_name.to_lowercase()),
        phone: None,
        questionnaire: Questionnaire::default(),
    }
}

pub fn submit_request(
    response: RsvpResponse,
    updated_details: Option<Questionnaire>,
) -> SubmitRsvpRequest {
    SubmitRsvpRequest {
        response,
        message: String::new(),
        updated_details,
    }
}

pub fn upload_request(file_type: &str, file_size: i64, guest_token: Option<&str>) -> UploadUrlRequest {
    UploadUrlRequest {
        file_name: "party.jpg".to_string(),
        file_type: file_type.to_string(),
        file_size,
        guest_token: guest_token.map(str::to_string),
        guest_name: guest_token.map(|_| "Ana Silva".to_string()),
    }
}

/// Services wired to in-memory collaborators, with the task queue's
/// receiving end kept so tests can inspect what was dispatched.
pub struct Harness {
    pub store: MemoryStore,
    pub storage: MemoryStorage,
    pub guests: GuestRegistry,
    pub rsvps: RsvpRecorder,
    pub photos: PhotoUploadCoordinator,
    tasks: UnboundedReceiver<BackgroundTask>,
}

impl Harness {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let storage = MemoryStorage::new();
        let (queue, tasks) = TaskQueue::channel();

        let shared: Arc<dyn Store> = Arc::new(store.clone());
        let backend = StorageBackend::Memory(storage.clone());

        Self {
            guests: GuestRegistry::new(shared.clone(), backend.clone(), queue.clone(), BASE_URL),
            rsvps: RsvpRecorder::new(shared.clone(), queue.clone()),
            photos: PhotoUploadCoordinator::new(shared, backend, queue),
            store,
            storage,
            tasks,
        }
    }

    pub fn next_task(&mut self) -> Option<BackgroundTask> {
        self.tasks.try_recv().ok()
    }

    pub async fn approved_guest(&self, first_name: &str) -> Guest {
        let guest = self.guests.register(new_guest(first_name)).await.unwrap();
        self.guests.approve(guest.id).await.unwrap()
    }

    /// A photo that has been through both upload phases and awaits moderation.
    pub async fn uploaded_photo(&self, guest_token: Option<&str>) -> Photo {
        let issued = self
            .photos
            .request_upload(upload_request("image/jpeg", 1024, guest_token))
            .await
            .unwrap();
        self.photos
            .complete_upload(issued.photo_id, "party.jpg")
            .await
            .unwrap();
        self.store.photo_by_id(issued.photo_id).await.unwrap().unwrap()
    }

    pub fn state(&self) -> AppState {
        AppState {
            store: Arc::new(self.store.clone()),
            config: Arc::new(Config {
                database_url: None,
                host: "127.0.0.1".to_string(),
                port: 0,
                jwt_secret: JWT_SECRET.to_string(),
                public_base_url: BASE_URL.to_string(),
                s3: None,
                admin_email: None,
                admin_password: None,
            }),
            guests: self.guests.clone(),
            rsvps: self.rsvps.clone(),
            photos: self.photos.clone(),
        }
    }
}

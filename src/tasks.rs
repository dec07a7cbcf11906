//! Fire-and-forget side effects: guest notifications and photo processing.
//!
//! Services hand a [`BackgroundTask`] to the [`TaskQueue`] after their store
//! write has committed. A single worker drains the queue and runs each task
//! on its own tokio task. Nothing is retried and no completion is reported
//! back; failures are logged with the guest or photo they concern. Tasks
//! still queued when the process exits are lost.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::models::guest::Guest;
use crate::models::photo::Photo;
use crate::models::rsvp::RsvpResponse;

#[derive(Debug, Clone)]
pub enum BackgroundTask {
    ApprovalNotice {
        guest: Guest,
        invite_url: String,
        portal_url: String,
    },
    RsvpConfirmation {
        guest: Guest,
        response: RsvpResponse,
    },
    ProcessPhoto {
        photo: Photo,
    },
}

impl BackgroundTask {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApprovalNotice { .. } => "approval_notice",
            Self::RsvpConfirmation { .. } => "rsvp_confirmation",
            Self::ProcessPhoto { .. } => "process_photo",
        }
    }
}

#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<BackgroundTask>,
}

impl TaskQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BackgroundTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Never blocks and never fails the caller.
    pub fn submit(&self, task: BackgroundTask) {
        let kind = task.kind();
        if self.tx.send(task).is_err() {
            tracing::error!(task = kind, "Background task queue closed; task dropped");
        }
    }
}

/// Delivers email/SMS to guests.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_approval(
        &self,
        guest: &Guest,
        invite_url: &str,
        portal_url: &str,
    ) -> Result<(), AppError>;

    async fn confirm_rsvp(&self, guest: &Guest, response: RsvpResponse) -> Result<(), AppError>;
}

/// Thumbnailing, content moderation, EXIF extraction and scanning of an
/// uploaded photo.
#[async_trait]
pub trait PhotoProcessor: Send + Sync {
    async fn process(&self, photo: &Photo) -> Result<(), AppError>;
}

/// Renders notifications into the log instead of sending them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_approval(
        &self,
        guest: &Guest,
        invite_url: &str,
        portal_url: &str,
    ) -> Result<(), AppError> {
        let subject = "Your RSVP is ready!";
        let body = format!(
            "Hi {},\n\nYour registration has been approved. You can now RSVP.\n\n\
             RSVP link: {invite_url}\nYour personal portal: {portal_url}\n\n\
             After you RSVP, use your portal to upload photos and send us messages.",
            guest.first_name
        );
        let sms = format!(
            "Hi {}! Your RSVP is ready: {invite_url}. Your personal portal: {portal_url}",
            guest.first_name
        );
        tracing::info!(
            guest_id = %guest.id,
            email = %guest.email,
            phone = guest.phone.as_deref().unwrap_or(""),
            subject,
            body,
            sms,
            "Approval notification rendered"
        );
        Ok(())
    }

    async fn confirm_rsvp(&self, guest: &Guest, response: RsvpResponse) -> Result<(), AppError> {
        tracing::info!(
            guest_id = %guest.id,
            email = %guest.email,
            response = ?response,
            "RSVP confirmation rendered"
        );
        Ok(())
    }
}

/// Accepts every photo without touching it.
pub struct LogProcessor;

#[async_trait]
impl PhotoProcessor for LogProcessor {
    async fn process(&self, photo: &Photo) -> Result<(), AppError> {
        tracing::info!(photo_id = %photo.id, key = %photo.storage_key, "Photo processing skipped");
        Ok(())
    }
}

pub async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<BackgroundTask>,
    notifier: Arc<dyn Notifier>,
    processor: Arc<dyn PhotoProcessor>,
) {
    while let Some(task) = rx.recv().await {
        let notifier = notifier.clone();
        let processor = processor.clone();
        tokio::spawn(async move {
            execute(task, notifier.as_ref(), processor.as_ref()).await;
        });
    }
    tracing::info!("Background task queue closed");
}

async fn execute(task: BackgroundTask, notifier: &dyn Notifier, processor: &dyn PhotoProcessor) {
    let kind = task.kind();
    match task {
        BackgroundTask::ApprovalNotice {
            guest,
            invite_url,
            portal_url,
        } => {
            if let Err(e) = notifier.notify_approval(&guest, &invite_url, &portal_url).await {
                tracing::error!(guest_id = %guest.id, task = kind, "Failed to send approval notification: {e}");
            }
        }
        BackgroundTask::RsvpConfirmation { guest, response } => {
            if let Err(e) = notifier.confirm_rsvp(&guest, response).await {
                tracing::error!(guest_id = %guest.id, task = kind, "Failed to send RSVP confirmation: {e}");
            }
        }
        BackgroundTask::ProcessPhoto { photo } => {
            if let Err(e) = processor.process(&photo).await {
                tracing::error!(
                    photo_id = %photo.id,
                    key = %photo.storage_key,
                    task = kind,
                    "Photo processing failed: {e}"
                );
            }
        }
    }
}

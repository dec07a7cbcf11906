mod auth;
mod config;
mod error;
mod models;
mod routes;
mod services;
mod storage;
mod store;
mod tasks;
mod token;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use axum::Router;
use clap::{Parser, Subcommand};
use config::Config;
use error::AppError;
use services::{GuestRegistry, PhotoUploadCoordinator, RsvpRecorder};
use storage::{MemoryStorage, S3Storage, StorageBackend};
use store::{MemoryStore, PgStore, Store};
use tasks::{LogNotifier, LogProcessor, TaskQueue};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<Config>,
    pub guests: GuestRegistry,
    pub rsvps: RsvpRecorder,
    pub photos: PhotoUploadCoordinator,
}

#[derive(Parser)]
#[command(name = "rsvp-backend", about = "Guest registration, RSVP and photo moderation API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create an administrator account, prompting for its password
    CreateAdmin {
        #[arg(long)]
        email: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env();

    match Cli::parse().command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::CreateAdmin { email } => create_admin(&config, &email).await,
    }
}

async fn connect(database_url: &str) -> Result<PgStore, AppError> {
    let store = PgStore::connect(database_url).await?;
    store.migrate().await?;
    Ok(store)
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => Arc::new(connect(url).await?),
        None => {
            tracing::warn!("DATABASE_URL not set; keeping all data in memory");
            Arc::new(MemoryStore::new())
        }
    };

    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        ensure_admin(store.as_ref(), email, password).await?;
    }

    let storage = match &config.s3 {
        Some(s3) => {
            tracing::info!(bucket = %s3.bucket, "Using S3 object storage");
            StorageBackend::S3(S3Storage::new(s3))
        }
        None => {
            tracing::warn!("S3_BUCKET not set; issuing memory:// URLs that nothing serves");
            StorageBackend::Memory(MemoryStorage::new())
        }
    };

    let (queue, rx) = TaskQueue::channel();
    tokio::spawn(tasks::run_worker(
        rx,
        Arc::new(LogNotifier),
        Arc::new(LogProcessor),
    ));

    let state = AppState {
        guests: GuestRegistry::new(
            store.clone(),
            storage.clone(),
            queue.clone(),
            config.public_base_url.clone(),
        ),
        rsvps: RsvpRecorder::new(store.clone(), queue.clone()),
        photos: PhotoUploadCoordinator::new(store.clone(), storage, queue),
        store,
        config: Arc::new(config),
    };

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let app = Router::new()
        .merge(routes::api_router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ensure_admin(store: &dyn Store, email: &str, password: &str) -> Result<(), AppError> {
    let email = email.trim().to_lowercase();
    if store.admin_by_email(&email).await?.is_some() {
        return Ok(());
    }
    let hash = auth::password::hash_new_password(password)?;
    let admin = store.insert_admin(&email, &hash).await?;
    tracing::info!(admin_id = %admin.id, email = %admin.email, "Seeded admin account");
    Ok(())
}

async fn create_admin(config: &Config, email: &str) -> Result<(), Box<dyn std::error::Error>> {
    let email = email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(AppError::Validation("Email address is invalid".into()).into());
    }

    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        return Err(AppError::Validation("Passwords do not match".into()).into());
    }
    let hash = auth::password::hash_new_password(&password)?;

    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| AppError::Validation("DATABASE_URL must be set to create an admin".into()))?;
    let store = connect(url).await?;
    match store.insert_admin(&email, &hash).await {
        Ok(admin) => {
            tracing::info!(admin_id = %admin.id, email = %admin.email, "Admin created");
            Ok(())
        }
        Err(e) if e.is_unique_violation() => {
            Err(AppError::Conflict(format!("An admin with email {email} already exists")).into())
        }
        Err(e) => Err(e.into()),
    }
}

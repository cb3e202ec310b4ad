use std::{net::Ipv4Addr, sync::Arc};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use taskboard::{auth, config::Settings, create_app, db, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = Settings::from_env().expect("reading configuration");

    let password_hash =
        Arc::new(auth::hash_password(&settings.password).expect("hashing password"));
    let db = db::init_db(&settings.db_path).expect("initializing database");
    match db::cleanup_expired_sessions(&db) {
        Ok(removed) => info!(removed, "Purged expired sessions"),
        Err(err) => warn!(?err, "Failed to purge expired sessions"),
    }

    let addr = (Ipv4Addr::UNSPECIFIED, settings.port);
    info!(
        db = %settings.db_path,
        admins = settings.admin_emails.len(),
        chatbot = settings.runtime.chatbot_enabled,
        "Starting taskboard"
    );

    let state = AppState {
        db,
        password_hash,
        settings: Arc::new(settings),
    };
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("binding listener");

    info!("running on {addr:?}");

    axum::serve(listener, app).await.expect("failed serving");
}

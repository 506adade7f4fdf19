//! # Rusty-Reddit Binary
//!
//! The entry point that assembles the application based on compile-time features.

use std::sync::Arc;

use anyhow::Context;
use rr_api::{router, AppState};
use rr_config::Settings;
use rr_core::Forum;
use secrecy::ExposeSecret;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// Feature-gated imports: each port is filled by exactly one plugin
#[cfg(feature = "db-sqlite")]
use rr_db_sqlite::SqliteForumRepo;

#[cfg(feature = "auth-simple")]
use rr_auth_simple::SimpleAuthProvider;

#[cfg(feature = "markdown")]
use rr_markdown::CommonMarkRenderer;

#[cfg(not(all(feature = "db-sqlite", feature = "auth-simple", feature = "markdown")))]
compile_error!("rusty-reddit needs the db-sqlite, auth-simple and markdown features");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    init_tracing(&settings.log);
    if let Some(path) = &settings.env_file {
        info!(path = %path.display(), "loaded .env");
    }
    if settings.uses_dev_secret() {
        warn!("using the built-in development session secret");
    }

    // 1. Initialize Database Implementation
    #[cfg(feature = "db-sqlite")]
    let repo = SqliteForumRepo::with_max_connections(&settings.database.url, settings.database.max_connections)
        .await
        .context("opening the sqlite store")?;

    // 2. Initialize Auth Implementation
    #[cfg(feature = "auth-simple")]
    let auth = SimpleAuthProvider::new(
        settings.auth.session_secret.expose_secret().as_bytes(),
        settings.auth.session_ttl_secs,
    );

    // 3. Initialize Markdown Implementation
    #[cfg(feature = "markdown")]
    let markdown = CommonMarkRenderer::new();

    // 4. Wrap in AppState (dynamic dispatch over the ports)
    let forum = Forum::new(Arc::new(repo), Arc::new(auth), Arc::new(markdown));
    let app = router(AppState::new(forum));

    let address = settings.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    info!("Rusty-Reddit listening on http://{address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving http")?;

    info!("Server shut down");
    Ok(())
}

fn init_tracing(log: &rr_config::LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl-c"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

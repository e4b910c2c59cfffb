//! Storefront sync agent
//!
//! Signs in, keeps the product and store collections in sync with the
//! session, and logs what it fetched until shut down.

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_sync::{AppState, Config, Session};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    info!("Starting storefront sync");
    info!("Supabase project: {}", config.supabase_url);

    // Create application state and follow session transitions
    let state = AppState::new(config.clone());
    let watchers = state.watch_sessions();
    let mut stores_rx = state.stores.subscribe();
    let mut products_rx = state.products.subscribe();

    if let Some(token) = &config.access_token {
        let session = Session::from_access_token(token, config.supabase_jwt_secret.as_deref())
            .context("SUPABASE_ACCESS_TOKEN is not a usable session")?;
        state.sessions.set(session);
    } else if let Some((email, password)) = config.credentials() {
        state
            .auth
            .sign_in_with_password(email, password)
            .await
            .context("Sign-in failed")?;
    } else {
        warn!("No SUPABASE_ACCESS_TOKEN or SUPABASE_EMAIL/SUPABASE_PASSWORD; staying signed out");
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = stores_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = stores_rx.borrow_and_update().clone();
                if !snap.loading {
                    info!(
                        count = snap.items.len(),
                        selected = snap.selected.as_ref().map(|s| s.name.as_str()),
                        error = snap.error.as_deref(),
                        "Stores updated"
                    );
                }
            }
            changed = products_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = products_rx.borrow_and_update().clone();
                if !snap.loading {
                    info!(
                        count = snap.items.len(),
                        error = snap.error.as_deref(),
                        "Products updated"
                    );
                }
            }
            _ = &mut shutdown => break,
        }
    }

    state.auth.sign_out().await;
    for watcher in watchers {
        watcher.abort();
    }

    info!("Storefront sync stopped");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}

// Brotherhood - community companion daemon
// Entry point and application setup

use anyhow::Context;
use brotherhood::app::AppState;
use brotherhood::auth::CurrentUser;
use brotherhood::config;
use brotherhood::push::PushMessage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variables naming the signed-in user
const USER_ID_ENV: &str = "BROTHERHOOD_USER_ID";
const USER_NAME_ENV: &str = "BROTHERHOOD_USER_NAME";
const USER_EMAIL_ENV: &str = "BROTHERHOOD_USER_EMAIL";

fn user_from_env() -> Option<CurrentUser> {
    let uid = std::env::var(USER_ID_ENV).ok().filter(|v| !v.trim().is_empty())?;
    Some(CurrentUser {
        uid,
        display_name: std::env::var(USER_NAME_ENV).ok(),
        email: std::env::var(USER_EMAIL_ENV).ok(),
    })
}

async fn route_line(state: &AppState, line: &str) {
    let message = match PushMessage::from_json(line) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Ignoring push line: {}", e);
            return;
        }
    };

    match state.push.handle_background(message).await {
        Ok(Some(shown)) => tracing::info!("Notification shown: {}", shown.title),
        Ok(None) => tracing::debug!("Push message suppressed"),
        Err(e) => tracing::error!("Failed to handle push message: {}", e),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "brotherhood=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Brotherhood");

    let state = AppState::initialize(config::data_dir())
        .await
        .context("failed to initialize application state")?;

    let restored = state.notifications.load().await?;
    tracing::info!("Restored {} notifications", restored);

    match user_from_env() {
        Some(user) => state.auth.sign_in(user),
        None => tracing::warn!("{} not set, running signed out", USER_ID_ENV),
    }
    let follower = state.follow_auth().await;

    state
        .reminders
        .start()
        .await
        .context("failed to start reminder scheduler")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => route_line(&state, &line).await,
                None => {
                    tracing::info!("Push input closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    follower.abort();
    state.shutdown().await?;
    tracing::info!("Brotherhood stopped");
    Ok(())
}

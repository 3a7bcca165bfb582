use std::path::PathBuf;

use blog_core::{
    spawn_poller, ApiClient, AppConfig, NotificationEvent, NotificationStore, PollConfig,
    TokenStore,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = AppConfig::load();
    let tokens = load_token_store(token_path(), std::env::var("BLOG_API_TOKEN").ok()).await;
    if tokens.get().await.is_none() {
        warn!("no API token found; notification endpoints will likely reject requests");
    }

    let client = match ApiClient::from_config(&config.api, tokens) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, base_url = %config.api.base_url, "failed to build API client");
            std::process::exit(1);
        }
    };

    let store = NotificationStore::new(client, config.notifications.clone());
    let mut events = store.subscribe();
    store.initialize().await;
    info!(
        unread = store.unread_count().await,
        base_url = %config.api.base_url,
        "watching notifications"
    );

    let poller = spawn_poller(store.clone(), PollConfig::from(&config.notifications));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(NotificationEvent::Alert(alert)) => {
                    info!(
                        id = %alert.notification.id,
                        kind = %alert.notification.kind,
                        "{}",
                        alert.notification.message
                    );
                    store.mark_alert_shown(&alert.id).await;
                }
                Ok(NotificationEvent::AlertExpired(_)) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "alert receiver lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    if let Err(e) = poller.stop().await {
        warn!(error = %e, "poller did not stop cleanly");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn token_path() -> PathBuf {
    // Linux: ~/.config/blogclient/token
    let dir = AppConfig::config_dir().unwrap_or_else(|_| {
        let mut dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        dir.push(".blogclient");
        dir
    });
    dir.join("token")
}

/// A token from the environment applies to this process only and leaves the
/// persisted token file alone.
async fn load_token_store(path: PathBuf, env_token: Option<String>) -> TokenStore {
    match env_token.as_deref().map(str::trim) {
        Some(token) if !token.is_empty() => {
            info!("using API token from BLOG_API_TOKEN");
            TokenStore::with_token(token)
        }
        _ => TokenStore::load_from(path).await,
    }
}

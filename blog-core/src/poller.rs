use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::NotificationConfig;
use crate::error::PollError;
use crate::notification_store::NotificationStore;

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

impl From<&NotificationConfig> for PollConfig {
    fn from(config: &NotificationConfig) -> Self {
        Self {
            interval: config.poll_interval(),
        }
    }
}

pub struct PollerHandle {
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl PollerHandle {
    pub async fn stop(self) -> Result<(), PollError> {
        let _ = self.cancel_tx.send(());
        self.join.await.map_err(PollError::from)
    }
}

/// One unread-count poll; alerts land in the store and on its event channel.
pub async fn poll_once(store: &NotificationStore) -> u64 {
    let count = store.fetch_unread_count().await;
    debug!(unread = count, "unread count polled");
    count
}

/// Drives `fetch_unread_count` on a fixed interval until stopped. The first
/// tick fires immediately. A zero interval falls back to the default.
pub fn spawn_poller(store: NotificationStore, config: PollConfig) -> PollerHandle {
    let period = if config.interval.is_zero() {
        let fallback = PollConfig::default().interval;
        warn!(?fallback, "zero poll interval, using default");
        fallback
    } else {
        config.interval
    };

    let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel_rx.recv() => {
                    info!("poller shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    poll_once(&store).await;
                }
            }
        }
    });

    PollerHandle { cancel_tx, join }
}

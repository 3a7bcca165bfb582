use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::config::NotificationConfig;
use crate::error::ApiError;
use crate::http::{require_id, ApiClient};
use crate::models::{
    Notification, NotificationAlert, NotificationPreferences, Pagination, PreferencesPatch,
};
use crate::normalize::{normalize_count, normalize_item, normalize_list};

const PATH: &str = "notifications";
const PLURAL: &str = "notifications";

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    Alert(NotificationAlert),
    AlertExpired(String),
}

#[derive(Debug, Clone, Default)]
pub struct NotificationState {
    pub items: Vec<Notification>,
    pub pagination: Pagination,
    pub unread_count: u64,
    pub preferences: NotificationPreferences,
    pub realtime_alerts: Vec<NotificationAlert>,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// Unread polling, alert synthesis, listing and read/delete mutations for the
/// signed-in user's notifications.
#[derive(Debug, Clone)]
pub struct NotificationStore {
    client: ApiClient,
    config: NotificationConfig,
    inner: Arc<RwLock<NotificationState>>,
    events: broadcast::Sender<NotificationEvent>,
    alert_seq: Arc<AtomicU64>,
}

impl NotificationStore {
    pub fn new(client: ApiClient, config: NotificationConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            client,
            config,
            inner: Arc::new(RwLock::new(NotificationState::default())),
            events,
            alert_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> NotificationState {
        self.inner.read().await.clone()
    }

    pub async fn unread_count(&self) -> u64 {
        self.inner.read().await.unread_count
    }

    pub async fn alerts(&self) -> Vec<NotificationAlert> {
        self.inner.read().await.realtime_alerts.clone()
    }

    /// Fetches the first page, the unread counter and the preferences
    /// concurrently. Individual failures are logged and do not abort the rest.
    pub async fn initialize(&self) {
        let (list, count, preferences) = tokio::join!(
            self.fetch_list(1, self.config.page_size, false, false),
            self.fetch_unread_count(),
            self.fetch_preferences(),
        );
        if let Err(e) = list {
            warn!(error = %e, "initial notification listing failed");
        }
        debug!(unread = count, ?preferences, "notification store initialized");
    }

    /// Polls the unread counter. When it grows past a non-zero value, the most
    /// recent notifications are fetched and every one not already held becomes
    /// a realtime alert. Failures are never surfaced; they read as zero.
    pub async fn fetch_unread_count(&self) -> u64 {
        let count = match self.client.get(&[PATH, "unread-count"], &[]).await {
            Ok(body) => match normalize_count(&body) {
                Some(count) => count,
                None => {
                    warn!(%body, "unread count missing from response");
                    return 0;
                }
            },
            Err(e) => {
                debug!(error = %e, "unread count poll failed");
                return 0;
            }
        };

        let previous = {
            let mut state = self.inner.write().await;
            std::mem::replace(&mut state.unread_count, count)
        };

        if count > previous && previous > 0 {
            self.raise_alerts().await;
        }
        count
    }

    async fn raise_alerts(&self) {
        let limit = self.config.recent_batch_size;
        let params = [
            ("page".to_string(), "1".to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        let recent: Vec<Notification> = match self
            .client
            .get(&[PATH], &params)
            .await
            .and_then(|body| normalize_list(body, PLURAL, 1, limit))
        {
            Ok((items, _)) => items,
            Err(e) => {
                warn!(error = %e, "failed to fetch recent notifications for alerts");
                return;
            }
        };

        let alerts: Vec<NotificationAlert> = {
            let mut state = self.inner.write().await;
            let mut known: HashSet<String> = state.items.iter().map(|n| n.id.clone()).collect();
            let unseen: Vec<Notification> = recent
                .into_iter()
                .filter(|n| known.insert(n.id.clone()))
                .collect();
            // Keep newly observed notifications so the next poll does not alert again.
            let mut merged = unseen.clone();
            merged.append(&mut state.items);
            state.items = merged;
            state.pagination.total = state.pagination.total.saturating_add(unseen.len() as u64);

            let alerts: Vec<NotificationAlert> = unseen
                .into_iter()
                .map(|notification| NotificationAlert {
                    id: self.next_alert_id(&notification.id),
                    notification,
                    timestamp: Utc::now(),
                    shown: false,
                })
                .collect();
            state.realtime_alerts.extend(alerts.iter().cloned());
            alerts
        };

        if !alerts.is_empty() {
            info!(count = alerts.len(), "new notification alerts");
        }
        for alert in alerts {
            self.schedule_expiry(alert.id.clone());
            // No subscribers is fine; the alert is still in the state.
            let _ = self.events.send(NotificationEvent::Alert(alert));
        }
    }

    fn next_alert_id(&self, notification_id: &str) -> String {
        let seq = self.alert_seq.fetch_add(1, Ordering::Relaxed);
        format!("{notification_id}-{seq}")
    }

    fn schedule_expiry(&self, alert_id: String) {
        let inner = self.inner.clone();
        let events = self.events.clone();
        let ttl = self.config.alert_ttl();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut state = inner.write().await;
            let before = state.realtime_alerts.len();
            state.realtime_alerts.retain(|a| a.id != alert_id);
            if state.realtime_alerts.len() != before {
                drop(state);
                let _ = events.send(NotificationEvent::AlertExpired(alert_id));
            }
        });
    }

    pub async fn mark_alert_shown(&self, alert_id: &str) {
        let mut state = self.inner.write().await;
        if let Some(alert) = state.realtime_alerts.iter_mut().find(|a| a.id == alert_id) {
            alert.shown = true;
        }
    }

    pub async fn dismiss_alert(&self, alert_id: &str) {
        self.inner
            .write()
            .await
            .realtime_alerts
            .retain(|a| a.id != alert_id);
    }

    pub async fn clear_alerts(&self) {
        self.inner.write().await.realtime_alerts.clear();
    }

    pub async fn clear_error(&self) {
        self.inner.write().await.error = None;
    }

    /// `append` extends the held list for "load more"; otherwise it is replaced.
    pub async fn fetch_list(
        &self,
        page: u32,
        limit: u32,
        unread_only: bool,
        append: bool,
    ) -> Result<(), ApiError> {
        {
            let mut state = self.inner.write().await;
            state.is_loading = true;
            state.error = None;
        }

        let params = [
            ("page".to_string(), page.to_string()),
            ("limit".to_string(), limit.to_string()),
            ("unreadOnly".to_string(), unread_only.to_string()),
        ];
        let result = self
            .client
            .get(&[PATH], &params)
            .await
            .and_then(|body| normalize_list::<Notification>(body, PLURAL, page, limit));

        let mut state = self.inner.write().await;
        state.is_loading = false;
        match result {
            Ok((items, pagination)) => {
                if append {
                    let mut known: HashSet<String> =
                        state.items.iter().map(|n| n.id.clone()).collect();
                    let fresh: Vec<Notification> = items
                        .into_iter()
                        .filter(|n| known.insert(n.id.clone()))
                        .collect();
                    state.items.extend(fresh);
                } else {
                    state.items = items;
                }
                state.pagination = pagination;
                Ok(())
            }
            Err(e) => {
                record_failure(&mut state.error, &e, "Failed to fetch notifications");
                Err(e)
            }
        }
    }

    /// Server first, then the local flag. A failed call leaves local state
    /// untouched and is not rolled back.
    pub async fn mark_as_read(&self, id: &str) -> Result<(), ApiError> {
        require_id(id)?;
        let result = self.client.patch(&[PATH, id, "read"], &json!({})).await;

        let mut state = self.inner.write().await;
        match result {
            Ok(_) => {
                let was_unread = match state.items.iter_mut().find(|n| n.id == id) {
                    Some(notification) => !std::mem::replace(&mut notification.is_read, true),
                    None => true,
                };
                if was_unread {
                    state.unread_count = state.unread_count.saturating_sub(1);
                }
                Ok(())
            }
            Err(e) => {
                record_failure(&mut state.error, &e, "Failed to mark notification as read");
                Err(e)
            }
        }
    }

    pub async fn mark_all_as_read(&self) -> Result<(), ApiError> {
        let result = self
            .client
            .patch(&[PATH, "mark-all-read"], &json!({}))
            .await;

        let mut state = self.inner.write().await;
        match result {
            Ok(_) => {
                for notification in state.items.iter_mut() {
                    notification.is_read = true;
                }
                state.unread_count = 0;
                Ok(())
            }
            Err(e) => {
                record_failure(
                    &mut state.error,
                    &e,
                    "Failed to mark all notifications as read",
                );
                Err(e)
            }
        }
    }

    /// Removes the notification once the server confirmed the delete.
    pub async fn delete_notification(&self, id: &str) -> Result<(), ApiError> {
        require_id(id)?;
        let result = self.client.delete(&[PATH, id]).await;

        let mut state = self.inner.write().await;
        match result {
            Ok(_) => {
                if let Some(pos) = state.items.iter().position(|n| n.id == id) {
                    let removed = state.items.remove(pos);
                    if !removed.is_read {
                        state.unread_count = state.unread_count.saturating_sub(1);
                    }
                    state.pagination.total = state.pagination.total.saturating_sub(1);
                }
                Ok(())
            }
            Err(e) => {
                record_failure(&mut state.error, &e, "Failed to delete notification");
                Err(e)
            }
        }
    }

    /// Always yields a usable preferences object; any failure falls back to
    /// the built-in defaults.
    pub async fn fetch_preferences(&self) -> NotificationPreferences {
        let preferences = match self.client.get(&[PATH, "preferences"], &[]).await {
            Ok(body) => preferences_from(body).unwrap_or_else(|| {
                debug!("preferences response had no channels, using defaults");
                NotificationPreferences::default()
            }),
            Err(e) => {
                warn!(error = %e, "failed to fetch notification preferences, using defaults");
                NotificationPreferences::default()
            }
        };
        self.inner.write().await.preferences = preferences;
        preferences
    }

    pub async fn update_preferences(
        &self,
        patch: PreferencesPatch,
    ) -> Result<NotificationPreferences, ApiError> {
        let body = serde_json::to_value(patch)?;
        let result = self
            .client
            .patch(&[PATH, "preferences"], &body)
            .await;

        let mut state = self.inner.write().await;
        match result {
            Ok(body) => {
                let preferences = preferences_from(body).unwrap_or_else(|| {
                    let mut merged = state.preferences;
                    merged.apply(&patch);
                    merged
                });
                state.preferences = preferences;
                Ok(preferences)
            }
            Err(e) => {
                record_failure(
                    &mut state.error,
                    &e,
                    "Failed to update notification preferences",
                );
                Err(e)
            }
        }
    }
}

/// Server preferences, if the body actually carries at least one channel.
fn preferences_from(body: Value) -> Option<NotificationPreferences> {
    let value: Value = normalize_item(body, "preferences").ok()?;
    let has_channel = ["email", "push", "inApp"]
        .iter()
        .any(|key| value.get(*key).is_some());
    if !has_channel {
        return None;
    }
    serde_json::from_value(value).ok()
}

fn record_failure(slot: &mut Option<String>, err: &ApiError, message: &str) {
    if err.is_suppressed() {
        debug!(error = %err, "suppressed transient api error");
    } else {
        warn!(error = %err, reason = message, "notification request failed");
        *slot = Some(message.to_string());
    }
}

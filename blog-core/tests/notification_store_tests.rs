use std::time::Duration;

use blog_core::{
    ApiClient, ApiError, ChannelPatch, NotificationConfig, NotificationEvent, NotificationPreferences,
    NotificationStore, PreferencesPatch, TokenStore,
};
use reqwest::Client;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store_with(server: &MockServer, alert_ttl_ms: u64) -> NotificationStore {
    let client =
        ApiClient::new(&server.uri(), Client::new(), TokenStore::with_token("t0ken")).unwrap();
    let config = NotificationConfig {
        alert_ttl_ms,
        ..NotificationConfig::default()
    };
    NotificationStore::new(client, config)
}

fn note(id: &str, is_read: bool) -> Value {
    json!({
        "_id": id,
        "type": "like",
        "message": format!("notification {id}"),
        "isRead": is_read
    })
}

async fn mount_list(server: &MockServer, page: &str, limit: &str, items: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/notifications"))
        .and(query_param("page", page))
        .and(query_param("limit", limit))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "notifications": items
        })))
        .mount(server)
        .await;
}

/// Serves the given unread counts in order, one per request.
async fn mount_counts(server: &MockServer, counts: &[u64]) {
    for count in counts {
        Mock::given(method("GET"))
            .and(path("/notifications/unread-count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": count })))
            .up_to_n_times(1)
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn only_unseen_notifications_become_alerts() {
    let server = MockServer::start().await;
    mount_list(
        &server,
        "1",
        "20",
        vec![note("A", false), note("B", false), note("C", true)],
    )
    .await;
    mount_list(
        &server,
        "1",
        "5",
        vec![note("D", false), note("A", false), note("B", false)],
    )
    .await;
    mount_counts(&server, &[2, 3]).await;

    let store = store_with(&server, 5_000);
    let mut events = store.subscribe();
    store.fetch_list(1, 20, false, false).await.unwrap();
    assert_eq!(store.snapshot().await.pagination.total, 3);

    assert_eq!(store.fetch_unread_count().await, 2);
    assert!(store.alerts().await.is_empty());

    assert_eq!(store.fetch_unread_count().await, 3);
    let alerts = store.alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].notification.id, "D");
    assert!(!alerts[0].shown);

    match events.recv().await.unwrap() {
        NotificationEvent::Alert(alert) => assert_eq!(alert.notification.id, "D"),
        other => panic!("unexpected event: {other:?}"),
    }

    let ids: Vec<String> = store
        .snapshot()
        .await
        .items
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(ids, ["D", "A", "B", "C"]);
    assert_eq!(store.snapshot().await.pagination.total, 4);
}

#[tokio::test]
async fn first_poll_never_alerts() {
    let server = MockServer::start().await;
    mount_counts(&server, &[4]).await;
    Mock::given(method("GET"))
        .and(path("/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([note("A", false)])))
        .expect(0)
        .mount(&server)
        .await;

    let store = store_with(&server, 5_000);
    assert_eq!(store.fetch_unread_count().await, 4);
    assert!(store.alerts().await.is_empty());
}

#[tokio::test]
async fn alerts_expire_on_their_own() {
    let server = MockServer::start().await;
    mount_list(&server, "1", "5", vec![note("N", false)]).await;
    mount_counts(&server, &[1, 2]).await;

    let store = store_with(&server, 200);
    let mut events = store.subscribe();
    store.fetch_unread_count().await;
    store.fetch_unread_count().await;

    let alerts = store.alerts().await;
    assert_eq!(alerts.len(), 1);
    store.mark_alert_shown(&alerts[0].id).await;
    assert!(store.alerts().await[0].shown);

    assert!(matches!(events.recv().await.unwrap(), NotificationEvent::Alert(_)));
    let expired = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("alert did not expire")
        .unwrap();
    assert_eq!(expired, NotificationEvent::AlertExpired(alerts[0].id.clone()));
    assert!(store.alerts().await.is_empty());
}

#[tokio::test]
async fn unread_count_errors_read_as_zero() {
    let server = MockServer::start().await;
    mount_counts(&server, &[3]).await;
    Mock::given(method("GET"))
        .and(path("/notifications/unread-count"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = store_with(&server, 5_000);
    assert_eq!(store.fetch_unread_count().await, 3);
    assert_eq!(store.fetch_unread_count().await, 0);

    let state = store.snapshot().await;
    assert_eq!(state.unread_count, 3);
    assert_eq!(state.error, None);
}

#[tokio::test]
async fn load_more_appends_and_page_one_replaces() {
    let server = MockServer::start().await;
    mount_list(&server, "1", "2", vec![note("A", false), note("B", false)]).await;
    mount_list(&server, "2", "2", vec![note("B", false), note("C", true)]).await;

    let store = store_with(&server, 5_000);
    store.fetch_list(1, 2, false, false).await.unwrap();
    store.fetch_list(2, 2, false, true).await.unwrap();
    let ids: Vec<String> = store.snapshot().await.items.into_iter().map(|n| n.id).collect();
    assert_eq!(ids, ["A", "B", "C"]);

    store.fetch_list(1, 2, false, false).await.unwrap();
    let ids: Vec<String> = store.snapshot().await.items.into_iter().map(|n| n.id).collect();
    assert_eq!(ids, ["A", "B"]);
}

#[tokio::test]
async fn read_and_delete_follow_the_server() {
    let server = MockServer::start().await;
    mount_list(
        &server,
        "1",
        "20",
        vec![note("A", false), note("B", false), note("C", false)],
    )
    .await;
    mount_counts(&server, &[3]).await;
    Mock::given(method("PATCH"))
        .and(path("/notifications/A/read"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/notifications/B/read"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/notifications/C"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/notifications/mark-all-read"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(&server, 5_000);
    store.fetch_list(1, 20, false, false).await.unwrap();
    store.fetch_unread_count().await;

    store.mark_as_read("A").await.unwrap();
    let state = store.snapshot().await;
    assert!(state.items[0].is_read);
    assert_eq!(state.unread_count, 2);

    // No rollback and nothing applied locally on failure.
    assert!(store.mark_as_read("B").await.is_err());
    let state = store.snapshot().await;
    assert!(!state.items[1].is_read);
    assert_eq!(state.unread_count, 2);
    assert_eq!(state.error.as_deref(), Some("Failed to mark notification as read"));
    store.clear_error().await;

    store.delete_notification("C").await.unwrap();
    let state = store.snapshot().await;
    assert_eq!(state.items.len(), 2);
    assert_eq!(state.unread_count, 1);

    store.mark_all_as_read().await.unwrap();
    let state = store.snapshot().await;
    assert!(state.items.iter().all(|n| n.is_read));
    assert_eq!(state.unread_count, 0);
}

#[tokio::test]
async fn blank_or_dot_ids_never_reach_the_server() {
    let server = MockServer::start().await;
    let store = store_with(&server, 5_000);

    for id in ["", " ", ".", ".."] {
        assert!(matches!(
            store.mark_as_read(id).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            store.delete_notification(id).await,
            Err(ApiError::Validation(_))
        ));
    }
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
    assert_eq!(store.snapshot().await.error, None);
}

#[tokio::test]
async fn preferences_fall_back_to_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notifications/preferences"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = store_with(&server, 5_000);
    let prefs = store.fetch_preferences().await;
    assert_eq!(prefs, NotificationPreferences::default());
    assert_eq!(store.snapshot().await.error, None);
}

#[tokio::test]
async fn preferences_update_sends_only_the_patch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notifications/preferences"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "preferences": {
                "email": { "likes": true, "comments": true, "follows": true, "mentions": true, "blogUpdates": true },
                "push": { "likes": true, "comments": true, "follows": true, "mentions": true, "blogUpdates": true },
                "inApp": { "likes": true, "comments": true, "follows": true, "mentions": true, "blogUpdates": true }
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/notifications/preferences"))
        .and(body_json(json!({ "inApp": { "blogUpdates": false } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "saved" })))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(&server, 5_000);
    let prefs = store.fetch_preferences().await;
    assert!(prefs.email.likes);

    let patch = PreferencesPatch {
        in_app: Some(ChannelPatch {
            blog_updates: Some(false),
            ..ChannelPatch::default()
        }),
        ..PreferencesPatch::default()
    };
    let updated = store.update_preferences(patch).await.unwrap();
    assert!(!updated.in_app.blog_updates);
    assert!(updated.in_app.likes);
    assert!(updated.email.likes);
    assert_eq!(store.snapshot().await.preferences, updated);
}

#[tokio::test]
async fn initialize_survives_partial_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notifications"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    mount_counts(&server, &[7]).await;
    Mock::given(method("GET"))
        .and(path("/notifications/preferences"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "email": { "likes": true } }
        })))
        .mount(&server)
        .await;

    let store = store_with(&server, 5_000);
    store.initialize().await;

    let state = store.snapshot().await;
    assert_eq!(state.unread_count, 7);
    assert!(state.items.is_empty());
    assert_eq!(state.error.as_deref(), Some("Failed to fetch notifications"));
    assert!(state.preferences.email.likes);
    assert!(!state.is_loading);
}

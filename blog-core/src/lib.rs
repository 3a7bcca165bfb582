pub mod auth;
pub mod cache;
pub mod config;
pub mod entity_store;
pub mod error;
pub mod http;
pub mod models;
pub mod normalize;
pub mod notification_store;
pub mod optimistic;
pub mod poller;
pub mod slug;

pub use auth::TokenStore;
pub use cache::CachedCollection;
pub use config::{ApiConfig, AppConfig, CacheConfig, NotificationConfig};
pub use entity_store::{BlogStore, EntityState, EntityStore, FetchOutcome, Likeable, Resource};
pub use error::{ApiError, ConfigError, PollError};
pub use http::ApiClient;
pub use models::{
    Author, Blog, BlogDraft, ChannelPatch, ChannelPreferences, ListQuery, Notification,
    NotificationAlert, NotificationPreferences, Pagination, PreferencesPatch,
};
pub use notification_store::{NotificationEvent, NotificationState, NotificationStore};
pub use poller::{poll_once, spawn_poller, PollConfig, PollerHandle};
pub use slug::{create_unique_slug, slugify, validate_slug};

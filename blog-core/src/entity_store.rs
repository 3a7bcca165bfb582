use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::cache::CachedCollection;
use crate::config::CacheConfig;
use crate::error::ApiError;
use crate::http::{require_id, ApiClient};
use crate::models::{Blog, ListQuery};
use crate::normalize::{normalize_item, normalize_list};
use crate::optimistic::{LikeAction, LikeEffect};

/// A REST resource the store can list, fetch and mutate.
pub trait Resource: DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection path under the API base, e.g. `blogs`.
    const PATH: &'static str;
    /// Key wrapping the list in envelope responses.
    const PLURAL: &'static str;
    /// Key wrapping a single item; also used in user-facing messages.
    const SINGULAR: &'static str;

    fn id(&self) -> &str;
}

pub trait Likeable: Resource {
    fn like_state(&self) -> (bool, u64);
    fn set_like_state(&mut self, is_liked: bool, likes: u64);
}

#[derive(Debug, Clone)]
pub struct EntityState<R> {
    pub list: CachedCollection<R>,
    pub current: Option<R>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Served from memory, no request was made.
    Cached,
    Fetched,
    /// A newer listing request was issued while this one was in flight; its
    /// response was dropped.
    Superseded,
}

#[derive(Debug)]
struct Inner<R> {
    state: EntityState<R>,
    applied_query: Option<ListQuery>,
    list_seq: u64,
}

/// Listing, detail and mutation state for one resource type.
///
/// Cloning is cheap and every clone shares the same state, so one store is
/// built at startup and handed to whoever needs it.
#[derive(Debug, Clone)]
pub struct EntityStore<R> {
    client: ApiClient,
    inner: Arc<RwLock<Inner<R>>>,
}

pub type BlogStore = EntityStore<Blog>;

impl<R: Resource> EntityStore<R> {
    pub fn new(client: ApiClient, cache_timeout: Duration) -> Self {
        Self {
            client,
            inner: Arc::new(RwLock::new(Inner {
                state: EntityState {
                    list: CachedCollection::new(cache_timeout),
                    current: None,
                },
                applied_query: None,
                list_seq: 0,
            })),
        }
    }

    pub fn from_config(client: ApiClient, config: &CacheConfig) -> Self {
        Self::new(client, config.list_ttl())
    }

    pub async fn snapshot(&self) -> EntityState<R> {
        self.inner.read().await.state.clone()
    }

    pub async fn items(&self) -> Vec<R> {
        self.inner.read().await.state.list.items.clone()
    }

    pub async fn current(&self) -> Option<R> {
        self.inner.read().await.state.current.clone()
    }

    pub async fn error(&self) -> Option<String> {
        self.inner.read().await.state.list.error.clone()
    }

    pub async fn last_fetch_time(&self) -> Option<Instant> {
        self.inner.read().await.state.list.last_fetch_time
    }

    /// Query built from the stored filters and pagination.
    pub async fn current_query(&self) -> ListQuery {
        let inner = self.inner.read().await;
        let list = &inner.state.list;
        ListQuery {
            page: list.pagination.page,
            limit: list.pagination.limit,
            filters: list.filters.clone(),
        }
    }

    pub async fn fetch_list(
        &self,
        query: ListQuery,
        force_refresh: bool,
    ) -> Result<FetchOutcome, ApiError> {
        let seq = {
            let mut inner = self.inner.write().await;
            let same_query = inner.applied_query.as_ref() == Some(&query);
            if !force_refresh && same_query && inner.state.list.is_fresh(Instant::now()) {
                debug!(resource = R::PLURAL, "serving listing from cache");
                return Ok(FetchOutcome::Cached);
            }
            inner.list_seq += 1;
            inner.state.list.is_loading = true;
            inner.state.list.error = None;
            inner.list_seq
        };

        let result = self
            .client
            .get(&[R::PATH], &query.to_params())
            .await
            .and_then(|body| normalize_list::<R>(body, R::PLURAL, query.page, query.limit));

        let mut inner = self.inner.write().await;
        if seq != inner.list_seq {
            debug!(resource = R::PLURAL, seq, "dropping superseded listing response");
            return result.map(|_| FetchOutcome::Superseded);
        }
        inner.state.list.is_loading = false;
        match result {
            Ok((items, pagination)) => {
                debug!(resource = R::PLURAL, count = items.len(), "listing fetched");
                inner.state.list.filters = query.filters.clone();
                inner.state.list.replace(items, pagination, Instant::now());
                inner.applied_query = Some(query);
                Ok(FetchOutcome::Fetched)
            }
            Err(e) => {
                record_failure(
                    &mut inner.state.list.error,
                    &e,
                    format!("Failed to fetch {}", R::PLURAL),
                );
                Err(e)
            }
        }
    }

    /// Re-runs the listing for the stored filters and page.
    pub async fn refresh(&self, force_refresh: bool) -> Result<FetchOutcome, ApiError> {
        let query = self.current_query().await;
        self.fetch_list(query, force_refresh).await
    }

    pub async fn update_filters(&self, filters: BTreeMap<String, String>) {
        self.inner.write().await.state.list.update_filters(filters);
    }

    pub async fn set_page(&self, page: u32) {
        self.inner.write().await.state.list.set_page(page);
    }

    pub async fn invalidate(&self) {
        self.inner.write().await.state.list.invalidate();
    }

    pub async fn clear_error(&self) {
        self.inner.write().await.state.list.error = None;
    }

    pub async fn clear_current(&self) {
        self.inner.write().await.state.current = None;
    }

    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.state.list.reset();
        inner.state.current = None;
        inner.applied_query = None;
    }

    /// Loads one item by id or slug and bumps its view counter in the
    /// background.
    pub async fn fetch_one(&self, id_or_slug: &str) -> Result<R, ApiError> {
        require_id(id_or_slug)?;
        self.begin_request().await;

        let result = self
            .client
            .get(&[R::PATH, id_or_slug], &[])
            .await
            .and_then(|body| normalize_item::<R>(body, R::SINGULAR));

        let mut inner = self.inner.write().await;
        inner.state.list.is_loading = false;
        match result {
            Ok(item) => {
                self.spawn_view_increment(item.id());
                inner.state.current = Some(item.clone());
                Ok(item)
            }
            Err(e) => {
                let message = if e.is_not_found() {
                    format!("{} not found", capitalize(R::SINGULAR))
                } else {
                    format!("Failed to fetch {}", R::SINGULAR)
                };
                record_failure(&mut inner.state.list.error, &e, message);
                Err(e)
            }
        }
    }

    fn spawn_view_increment(&self, id: &str) {
        let client = self.client.clone();
        let id = id.to_owned();
        tokio::spawn(async move {
            if let Err(e) = client.post(&[R::PATH, id.as_str(), "view"], &json!({})).await {
                warn!(error = %e, resource = R::SINGULAR, %id, "view count increment failed");
            }
        });
    }

    pub async fn create<P: Serialize + ?Sized>(&self, payload: &P) -> Result<R, ApiError> {
        let body = serde_json::to_value(payload)?;
        self.begin_request().await;

        let result = self
            .client
            .post(&[R::PATH], &body)
            .await
            .and_then(|body| normalize_item::<R>(body, R::SINGULAR));

        let mut inner = self.inner.write().await;
        let list = &mut inner.state.list;
        list.is_loading = false;
        match result {
            Ok(item) => {
                list.items.insert(0, item.clone());
                list.pagination.total = list.pagination.total.saturating_add(1);
                list.invalidate();
                Ok(item)
            }
            Err(e) => {
                record_failure(
                    &mut list.error,
                    &e,
                    format!("Failed to create {}", R::SINGULAR),
                );
                Err(e)
            }
        }
    }

    pub async fn update<P: Serialize + ?Sized>(&self, id: &str, payload: &P) -> Result<R, ApiError> {
        require_id(id)?;
        let body = serde_json::to_value(payload)?;
        self.begin_request().await;

        let result = self
            .client
            .put(&[R::PATH, id], &body)
            .await
            .and_then(|body| normalize_item::<R>(body, R::SINGULAR));

        let mut inner = self.inner.write().await;
        inner.state.list.is_loading = false;
        match result {
            Ok(item) => {
                for slot in inner.state.list.items.iter_mut().filter(|i| i.id() == id) {
                    *slot = item.clone();
                }
                if inner.state.current.as_ref().is_some_and(|c| c.id() == id) {
                    inner.state.current = Some(item.clone());
                }
                inner.state.list.invalidate();
                Ok(item)
            }
            Err(e) => {
                record_failure(
                    &mut inner.state.list.error,
                    &e,
                    format!("Failed to update {}", R::SINGULAR),
                );
                Err(e)
            }
        }
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        require_id(id)?;
        self.begin_request().await;

        let result = self.client.delete(&[R::PATH, id]).await;

        let mut inner = self.inner.write().await;
        inner.state.list.is_loading = false;
        match result {
            Ok(_) => {
                let list = &mut inner.state.list;
                let before = list.items.len();
                list.items.retain(|i| i.id() != id);
                let removed = (before - list.items.len()) as u64;
                list.pagination.total = list.pagination.total.saturating_sub(removed);
                list.invalidate();
                if inner.state.current.as_ref().is_some_and(|c| c.id() == id) {
                    inner.state.current = None;
                }
                Ok(())
            }
            Err(e) => {
                record_failure(
                    &mut inner.state.list.error,
                    &e,
                    format!("Failed to delete {}", R::SINGULAR),
                );
                Err(e)
            }
        }
    }

    async fn begin_request(&self) {
        let mut inner = self.inner.write().await;
        inner.state.list.is_loading = true;
        inner.state.list.error = None;
    }
}

impl<R: Likeable> EntityStore<R> {
    pub async fn toggle_like(&self, id: &str) -> Result<(), ApiError> {
        self.toggle(id, LikeAction::Like).await
    }

    pub async fn toggle_unlike(&self, id: &str) -> Result<(), ApiError> {
        self.toggle(id, LikeAction::Unlike).await
    }

    /// Applies the toggle locally before the request resolves. A failed
    /// request undoes exactly that step on the list entry and the current
    /// item, then hands the error back to the caller.
    async fn toggle(&self, id: &str, action: LikeAction) -> Result<(), ApiError> {
        require_id(id)?;
        let (list_effect, current_effect) = {
            let mut inner = self.inner.write().await;
            let state = &mut inner.state;
            let list_effect = state
                .list
                .items
                .iter_mut()
                .find(|i| i.id() == id)
                .map(|item| action.apply(item));
            let current_effect = state
                .current
                .as_mut()
                .filter(|c| c.id() == id)
                .map(|item| action.apply(item));
            (list_effect, current_effect)
        };

        let segments = [R::PATH, id, action.endpoint()];
        match self.client.post(&segments, &json!({})).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let mut inner = self.inner.write().await;
                let state = &mut inner.state;
                revert(
                    list_effect,
                    state.list.items.iter_mut().find(|i| i.id() == id),
                );
                revert(current_effect, state.current.as_mut().filter(|c| c.id() == id));
                if e.is_suppressed() {
                    debug!(error = %e, %id, "like toggle failed, rolled back");
                } else {
                    warn!(error = %e, %id, "like toggle failed, rolled back");
                }
                Err(e)
            }
        }
    }
}

fn revert<L: Likeable>(effect: Option<LikeEffect>, item: Option<&mut L>) {
    if let (Some(effect), Some(item)) = (effect, item) {
        effect.revert(item);
    }
}

/// Stores a user-safe message for the failure unless it is one of the
/// transient kinds that are only logged.
fn record_failure(slot: &mut Option<String>, err: &ApiError, message: String) {
    if err.is_suppressed() {
        debug!(error = %err, "suppressed transient api error");
        *slot = None;
    } else {
        warn!(error = %err, reason = %message, "api request failed");
        *slot = Some(message);
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

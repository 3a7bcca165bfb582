use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Bearer token holder, optionally backed by a file so the token survives
/// restarts.
#[derive(Debug, Clone)]
pub struct TokenStore {
    inner: Arc<RwLock<Option<String>>>,
    path: Option<PathBuf>,
}

impl TokenStore {
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
            path: None,
        }
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(token.into()))),
            path: None,
        }
    }

    pub async fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let token = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Some(raw.trim().to_string()).filter(|t| !t.is_empty()),
            Err(e) => {
                debug!(error = %e, path = %path.display(), "no persisted token");
                None
            }
        };
        Self {
            inner: Arc::new(RwLock::new(token)),
            path: Some(path),
        }
    }

    pub async fn get(&self) -> Option<String> {
        self.inner.read().await.clone()
    }

    /// The in-memory token is always updated; persisting is best effort.
    pub async fn set(&self, token: impl Into<String>) {
        let token = token.into();
        *self.inner.write().await = Some(token.clone());
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    warn!(error = %e, dir = %parent.display(), "failed to create token directory");
                    return;
                }
            }
            if let Err(e) = tokio::fs::write(path, token).await {
                warn!(error = %e, path = %path.display(), "failed to persist token");
            }
        }
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
        if let Some(path) = &self.path {
            if let Err(e) = tokio::fs::remove_file(path).await {
                debug!(error = %e, path = %path.display(), "token file not removed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!(
            "blogclient_{tag}_{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        dir
    }

    #[tokio::test]
    async fn token_survives_reload_and_clear_removes_it() {
        let dir = scratch_dir("token");
        let path = dir.join("token");

        let store = TokenStore::load_from(&path).await;
        assert_eq!(store.get().await, None);
        store.set("abc123").await;

        let reloaded = TokenStore::load_from(&path).await;
        assert_eq!(reloaded.get().await.as_deref(), Some("abc123"));

        reloaded.clear().await;
        let after_clear = TokenStore::load_from(&path).await;
        assert_eq!(after_clear.get().await, None);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn unwritable_directory_keeps_the_token_in_memory() {
        let dir = scratch_dir("blocked");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        // A regular file where the token directory should go.
        let blocker = dir.join("not_a_dir");
        tokio::fs::write(&blocker, "x").await.unwrap();
        let path = blocker.join("token");

        let store = TokenStore::load_from(&path).await;
        store.set("abc123").await;
        assert_eq!(store.get().await.as_deref(), Some("abc123"));
        assert!(!path.exists());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}

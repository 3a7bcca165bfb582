use reqwest::{redirect, Client, ClientBuilder, Method, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::{ParseError, Url};

use crate::auth::TokenStore;
use crate::config::ApiConfig;
use crate::error::ApiError;

/// Thin REST client: appends path segments to the API base, attaches the
/// bearer token and folds every failure into an [`ApiError`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    tokens: TokenStore,
}

impl ApiClient {
    pub fn new(base_url: &str, http: Client, tokens: TokenStore) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(ParseError::RelativeUrlWithCannotBeABaseBase));
        }
        Ok(Self {
            http,
            base_url,
            tokens,
        })
    }

    pub fn from_config(config: &ApiConfig, tokens: TokenStore) -> Result<Self, ApiError> {
        let http = ClientBuilder::new()
            .redirect(redirect::Policy::limited(5))
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Self::new(&config.base_url, http, tokens)
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Each segment is percent-encoded on its own, so `/`, `?` and `#` inside
    /// an id cannot change which endpoint is addressed.
    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn get(
        &self,
        segments: &[&str],
        query: &[(String, String)],
    ) -> Result<Value, ApiError> {
        let request = self.http.get(self.url(segments)?).query(query);
        self.send(Method::GET, request).await
    }

    pub async fn post(&self, segments: &[&str], body: &Value) -> Result<Value, ApiError> {
        let request = self.http.post(self.url(segments)?).json(body);
        self.send(Method::POST, request).await
    }

    pub async fn put(&self, segments: &[&str], body: &Value) -> Result<Value, ApiError> {
        let request = self.http.put(self.url(segments)?).json(body);
        self.send(Method::PUT, request).await
    }

    pub async fn patch(&self, segments: &[&str], body: &Value) -> Result<Value, ApiError> {
        let request = self.http.patch(self.url(segments)?).json(body);
        self.send(Method::PATCH, request).await
    }

    pub async fn delete(&self, segments: &[&str]) -> Result<Value, ApiError> {
        let request = self.http.delete(self.url(segments)?);
        self.send(Method::DELETE, request).await
    }

    async fn send(&self, method: Method, request: RequestBuilder) -> Result<Value, ApiError> {
        let request = match self.tokens.get().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        debug!(%method, url = %response.url(), %status, "api response");

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::RateLimited);
        }

        let bytes = response.bytes().await?;
        if !status.is_success() {
            let message = error_message(&bytes).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
            return Err(ApiError::Status { status, message });
        }

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Rejects ids that would address a different resource once placed in a
/// path: blank ids and the `.` / `..` dot-segments.
pub(crate) fn require_id(id: &str) -> Result<(), ApiError> {
    match id.trim() {
        "" => Err(ApiError::Validation("identifier must not be empty".into())),
        "." | ".." => Err(ApiError::Validation(format!("invalid identifier: {id}"))),
        _ => Ok(()),
    }
}

/// Pulls a human readable message out of an error body, if the server sent one.
fn error_message(bytes: &[u8]) -> Option<String> {
    let body: Value = serde_json::from_slice(bytes).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_keeps_its_path_prefix() {
        let client = ApiClient::new(
            "http://localhost:5000/api",
            Client::new(),
            TokenStore::in_memory(),
        )
        .unwrap();
        assert_eq!(
            client.url(&["blogs", "abc", "like"]).unwrap().as_str(),
            "http://localhost:5000/api/blogs/abc/like"
        );

        let slashed = ApiClient::new(
            "http://localhost:5000/api/",
            Client::new(),
            TokenStore::in_memory(),
        )
        .unwrap();
        assert_eq!(
            slashed.url(&["notifications"]).unwrap().as_str(),
            "http://localhost:5000/api/notifications"
        );
    }

    #[test]
    fn ids_stay_inside_one_segment() {
        let client =
            ApiClient::new("http://localhost:5000/api", Client::new(), TokenStore::in_memory())
                .unwrap();
        assert_eq!(
            client.url(&["blogs", "a/../../x"]).unwrap().path(),
            "/api/blogs/a%2F..%2F..%2Fx"
        );
        assert_eq!(
            client.url(&["notifications", "n?all=1#frag", "read"]).unwrap().path(),
            "/api/notifications/n%3Fall=1%23frag/read"
        );
    }

    #[test]
    fn require_id_rejects_blank_and_dot_segments() {
        for id in ["", "   ", ".", ".."] {
            assert!(matches!(require_id(id), Err(ApiError::Validation(_))));
        }
        assert!(require_id("a/../x").is_ok());
        assert!(require_id("64f1c2").is_ok());
    }

    #[test]
    fn error_message_prefers_message_field() {
        assert_eq!(
            error_message(br#"{"message":"Blog not found","error":"x"}"#).as_deref(),
            Some("Blog not found")
        );
        assert_eq!(
            error_message(br#"{"error":"Title is required"}"#).as_deref(),
            Some("Title is required")
        );
        assert_eq!(error_message(b"<html>oops</html>"), None);
    }
}

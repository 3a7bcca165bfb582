use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::entity_store::{Likeable, Resource};

/// Serde impls for types whose wire format has alternate spellings of a
/// field. The derived impls are generated under `#[serde(remote = "Self")]`;
/// these wrappers move each alias onto its canonical key first, so a payload
/// carrying both spellings decodes instead of failing on a duplicate field.
macro_rules! serde_with_aliases {
    ($ty:ty { $($alias:literal => $canonical:literal),+ $(,)? }) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let mut value = Value::deserialize(deserializer)?;
                $(fold_alias(&mut value, $canonical, $alias);)+
                <$ty>::deserialize(value).map_err(de::Error::custom)
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                <$ty>::serialize(self, serializer)
            }
        }
    };
}

/// The canonical key wins when both are present.
fn fold_alias(value: &mut Value, canonical: &str, alias: &str) {
    if let Value::Object(map) = value {
        if let Some(aliased) = map.remove(alias) {
            map.entry(canonical).or_insert(aliased);
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            total: 0,
            total_pages: 0,
        }
    }
}

impl Pagination {
    /// Pagination for a response that did not carry any.
    pub fn synthesized(page: u32, limit: u32, count: usize) -> Self {
        let total = count as u64;
        let total_pages = if limit == 0 {
            u32::from(count > 0)
        } else {
            total.div_ceil(u64::from(limit)) as u32
        };
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

/// Listing request: paging plus the filter map that decides cache identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub limit: u32,
    pub filters: BTreeMap<String, String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self::new(1, 10)
    }
}

impl ListQuery {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page,
            limit,
            filters: BTreeMap::new(),
        }
    }

    pub fn filter(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            self.filters.remove(key);
        } else {
            self.filters.insert(key.to_string(), value);
        }
        self
    }

    pub fn search(self, text: impl Into<String>) -> Self {
        self.filter("search", text)
    }

    pub fn tags(self, tags: impl Into<String>) -> Self {
        self.filter("tags", tags)
    }

    pub fn author(self, author: impl Into<String>) -> Self {
        self.filter("author", author)
    }

    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("page".to_string(), self.page.to_string()),
            ("limit".to_string(), self.limit.to_string()),
        ];
        params.extend(self.filters.iter().map(|(k, v)| (k.clone(), v.clone())));
        params
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(remote = "Self", rename_all = "camelCase", default)]
pub struct Author {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

serde_with_aliases!(Author { "_id" => "id" });

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(remote = "Self", rename_all = "camelCase", default)]
pub struct Blog {
    pub id: String,
    pub title: String,
    pub slug: Option<String>,
    pub content: String,
    pub excerpt: Option<String>,
    pub tags: Vec<String>,
    pub author: Option<Author>,
    pub likes: u64,
    pub is_liked: bool,
    pub views: u64,
    pub comments_count: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

serde_with_aliases!(Blog { "_id" => "id", "likesCount" => "likes" });

impl Resource for Blog {
    const PATH: &'static str = "blogs";
    const PLURAL: &'static str = "blogs";
    const SINGULAR: &'static str = "blog";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Likeable for Blog {
    fn like_state(&self) -> (bool, u64) {
        (self.is_liked, self.likes)
    }

    fn set_like_state(&mut self, is_liked: bool, likes: u64) {
        self.is_liked = is_liked;
        self.likes = likes;
    }
}

/// Payload for `POST /blogs` and `PUT /blogs/:id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlogDraft {
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(remote = "Self", rename_all = "camelCase", default)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub is_read: bool,
    pub sender: Option<Author>,
    pub link: Option<String>,
    pub data: Option<Value>,
    pub created_at: Option<DateTime<Utc>>,
}

serde_with_aliases!(Notification { "_id" => "id", "read" => "isRead" });

/// Transient signal for a notification first observed by an unread-count poll.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAlert {
    pub id: String,
    pub notification: Notification,
    pub timestamp: DateTime<Utc>,
    pub shown: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelPreferences {
    pub likes: bool,
    pub comments: bool,
    pub follows: bool,
    pub mentions: bool,
    pub blog_updates: bool,
}

impl Default for ChannelPreferences {
    fn default() -> Self {
        Self {
            likes: true,
            comments: true,
            follows: true,
            mentions: true,
            blog_updates: true,
        }
    }
}

impl ChannelPreferences {
    pub fn apply(&mut self, patch: &ChannelPatch) {
        let fields = [
            (&mut self.likes, patch.likes),
            (&mut self.comments, patch.comments),
            (&mut self.follows, patch.follows),
            (&mut self.mentions, patch.mentions),
            (&mut self.blog_updates, patch.blog_updates),
        ];
        for (slot, value) in fields {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationPreferences {
    pub email: ChannelPreferences,
    pub push: ChannelPreferences,
    pub in_app: ChannelPreferences,
}

impl Default for NotificationPreferences {
    /// Fallback used whenever the server's preferences cannot be loaded.
    fn default() -> Self {
        Self {
            email: ChannelPreferences {
                likes: false,
                comments: true,
                follows: true,
                mentions: true,
                blog_updates: false,
            },
            push: ChannelPreferences {
                blog_updates: false,
                ..ChannelPreferences::default()
            },
            in_app: ChannelPreferences::default(),
        }
    }
}

impl NotificationPreferences {
    pub fn apply(&mut self, patch: &PreferencesPatch) {
        if let Some(email) = &patch.email {
            self.email.apply(email);
        }
        if let Some(push) = &patch.push {
            self.push.apply(push);
        }
        if let Some(in_app) = &patch.in_app {
            self.in_app.apply(in_app);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likes: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follows: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mentions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blog_updates: Option<bool>,
}

/// Partial preferences update; only the set fields are sent.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<ChannelPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push: Option<ChannelPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_app: Option<ChannelPatch>,
}

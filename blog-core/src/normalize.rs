//! The API is inconsistent about envelopes: listings arrive as a bare array,
//! as `{data: [...]}`, as `{<plural>: [...], pagination}` or with that object
//! nested under `data`. These helpers fold every shape into one result.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;
use crate::models::Pagination;

pub fn normalize_list<T: DeserializeOwned>(
    body: Value,
    plural: &str,
    page: u32,
    limit: u32,
) -> Result<(Vec<T>, Pagination), ApiError> {
    let (items, pagination) = match body {
        Value::Array(items) => (Value::Array(items), None),
        Value::Object(mut map) => {
            let pagination = map.remove("pagination");
            if let Some(items) = map.remove(plural) {
                (items, pagination)
            } else {
                match map.remove("data") {
                    Some(Value::Array(items)) => (Value::Array(items), pagination),
                    Some(Value::Object(mut inner)) => {
                        let pagination = inner.remove("pagination").or(pagination);
                        let items = inner.remove(plural).ok_or_else(|| {
                            ApiError::Decode(format!("`data` has no `{plural}` list"))
                        })?;
                        (items, pagination)
                    }
                    _ => {
                        return Err(ApiError::Decode(format!(
                            "response has no `{plural}` list"
                        )))
                    }
                }
            }
        }
        other => {
            return Err(ApiError::Decode(format!(
                "expected a list of {plural}, got {other}"
            )))
        }
    };

    let items: Vec<T> = serde_json::from_value(items)?;
    let pagination = match pagination {
        Some(value) if !value.is_null() => serde_json::from_value(value)?,
        _ => Pagination::synthesized(page, limit, items.len()),
    };
    Ok((items, pagination))
}

pub fn normalize_item<T: DeserializeOwned>(body: Value, singular: &str) -> Result<T, ApiError> {
    Ok(serde_json::from_value(unwrap_item(body, singular))?)
}

fn unwrap_item(body: Value, singular: &str) -> Value {
    match body {
        Value::Object(mut map) => {
            if let Some(item) = map.remove(singular) {
                return item;
            }
            match map.remove("data") {
                Some(data) => unwrap_item(data, singular),
                None => Value::Object(map),
            }
        }
        other => other,
    }
}

/// Unread counter from `{count}`, `{unreadCount}`, a `data` wrapper or a bare number.
pub fn normalize_count(body: &Value) -> Option<u64> {
    match body {
        Value::Number(n) => n.as_u64(),
        Value::Object(map) => ["count", "unreadCount"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_u64))
            .or_else(|| map.get("data").and_then(normalize_count)),
        _ => None,
    }
}

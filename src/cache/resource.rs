//! Cached resource collections

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The denormalized collections this client caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Feed posts.
    Feed,
    /// Match listings.
    Matches,
    /// Conversation messages.
    Conversations,
    /// Notifications.
    Notifications,
}

impl Resource {
    /// REST collection path segment.
    pub fn path(&self) -> &'static str {
        match self {
            Resource::Feed => "posts",
            Resource::Matches => "matches",
            Resource::Conversations => "conversations",
            Resource::Notifications => "notifications",
        }
    }

    /// Channel event names that carry an item of this resource. Unmapped
    /// events are dispatch-only.
    pub(crate) fn for_event(event: &str) -> Option<Resource> {
        match event {
            "post:created" => Some(Resource::Feed),
            "match:updated" => Some(Resource::Matches),
            "message:created" => Some(Resource::Conversations),
            "notification:created" => Some(Resource::Notifications),
            _ => None,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// One denormalized item as the server returns it.
///
/// `id` and `updatedAt` are what the cache keys and merges on; everything
/// else rides along untouched in `body`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceItem {
    pub id: String,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

/// One page of a collection as fetched from the backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub items: Vec<ResourceItem>,
    pub page: u32,
    /// Explicit end-of-collection flag; absent on older backends, where a
    /// short page is the fallback signal.
    #[serde(default)]
    pub has_more: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_routing() {
        assert_eq!(Resource::for_event("post:created"), Some(Resource::Feed));
        assert_eq!(Resource::for_event("match:updated"), Some(Resource::Matches));
        assert_eq!(
            Resource::for_event("message:created"),
            Some(Resource::Conversations)
        );
        assert_eq!(
            Resource::for_event("notification:created"),
            Some(Resource::Notifications)
        );
        assert_eq!(Resource::for_event("typing:start"), None);
    }

    #[test]
    fn test_item_roundtrip_preserves_body() {
        let raw = json!({
            "id": "post-1",
            "updatedAt": "2026-08-01T10:00:00Z",
            "likeCount": 4,
            "isLiked": false,
        });
        let item: ResourceItem = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(item.id, "post-1");
        assert_eq!(item.body.get("likeCount"), Some(&json!(4)));

        let back = serde_json::to_value(&item).unwrap();
        assert_eq!(back, raw);
    }
}

//! Threads posts, replies and keyword search types.

use crate::error::Result;
use crate::validation;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Fields requested for every post.
pub(crate) const POST_FIELDS: &str = "id,media_product_type,media_type,media_url,permalink,\
owner,username,text,timestamp,shortcode,thumbnail_url,is_quote_post,has_replies";

/// A published post.
///
/// Only `id` is guaranteed; the rest depends on the fields the endpoint returns. A post returned
/// straight from publishing carries nothing but its id.
///
/// See: <https://developers.facebook.com/docs/threads/threads-media>
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    /// Always `THREADS`.
    #[serde(default)]
    pub media_product_type: Option<String>,
    /// `TEXT_POST`, `IMAGE`, `VIDEO`, `CAROUSEL_ALBUM`, `AUDIO` or `REPOST_FACADE`.
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub owner: Option<PostOwner>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// ISO 8601, e.g. `2023-10-17T05:42:03+0000`.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub shortcode: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub is_quote_post: Option<bool>,
    #[serde(default)]
    pub has_replies: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostOwner {
    pub id: String,
}

/// Ordering of keyword search results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchType {
    #[default]
    Top,
    Recent,
}

impl SearchType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Top => "TOP",
            Self::Recent => "RECENT",
        }
    }
}

/// Filters shared by the list endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Page size, `1..=100`. The server picks when unset.
    pub limit: Option<u32>,
    pub since: Option<Timestamp>,
    pub until: Option<Timestamp>,
}

impl ListOptions {
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn since(mut self, since: Timestamp) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: Timestamp) -> Self {
        self.until = Some(until);
        self
    }

    pub(crate) fn validate(&self, now: Timestamp) -> Result<()> {
        if let Some(limit) = self.limit {
            validation::validate_limit("limit", limit, 1, validation::MAX_PAGE_LIMIT)?;
        }
        validation::validate_date_range(self.since, self.until, now)
    }

    /// Query parameters: `limit`, and `since`/`until` as unix seconds.
    pub(crate) fn to_query(self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(limit) = self.limit {
            query.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(since) = self.since {
            query.push(("since".to_string(), since.as_second().to_string()));
        }
        if let Some(until) = self.until {
            query.push(("until".to_string(), until.as_second().to_string()));
        }
        query
    }
}

/// Response of `DELETE /{post-id}`.
#[derive(Debug, Deserialize)]
pub(crate) struct DeleteResponse {
    #[serde(default)]
    pub success: bool,
}

//! Row types for the two exported tables.
//!
//! `Item` is one submitted post, `Comment` is one reply anywhere in a post's thread.
//! Both serialize to CSV in the column order given by their `COLUMNS` constant.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Written in place of an author name when the account is gone or hidden.
pub const DELETED_AUTHOR: &str = "[deleted]";

/// One top-level post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub post_id: String,
    pub title: String,
    pub score: i64,
    pub num_comments: u64,
    #[serde(with = "timestamp_format")]
    pub created_utc: DateTime<Utc>,
    pub url: String,
    /// Self-text; empty for link posts.
    pub body: String,
    pub author: String,
}

impl Item {
    pub const COLUMNS: [&'static str; 8] = [
        "post_id",
        "title",
        "score",
        "num_comments",
        "created_utc",
        "url",
        "body",
        "author",
    ];
}

/// One comment, tagged with the id of the post it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub comment_id: String,
    pub post_id: String,
    pub author: String,
    pub body: String,
    pub score: i64,
    #[serde(with = "timestamp_format")]
    pub created_utc: DateTime<Utc>,
}

impl Comment {
    pub const COLUMNS: [&'static str; 6] = [
        "comment_id",
        "post_id",
        "author",
        "body",
        "score",
        "created_utc",
    ];
}

/// Result of one collection run. Rows are in retrieval order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tables {
    pub items: Vec<Item>,
    pub comments: Vec<Comment>,
}

/// Map a missing, blank, or upstream-deleted author to [DELETED_AUTHOR].
pub fn author_or_sentinel(author: Option<String>) -> String {
    match author {
        Some(name) if !name.trim().is_empty() && name != DELETED_AUTHOR => name,
        _ => DELETED_AUTHOR.to_string(),
    }
}

mod timestamp_format {
    use chrono::{DateTime, Utc};
    use serde::Serializer;

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.format(FORMAT).to_string())
    }
}

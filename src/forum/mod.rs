//! Forum API access: the [ForumApi] seam the collector depends on, the Reddit client
//! that implements it, and the upstream record types it yields.

mod client;
mod error;
mod wire;

pub use client::{RedditClient, RedditClientBuilder};
pub use error::ApiError;

use crate::config::Credentials;
use chrono::{DateTime, Utc};

/// Listing pages are capped at this many posts by the API.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Listing order requested from the forum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingMode {
    /// Reddit "hot".
    RecentActivity,
    /// Reddit "new".
    Newest,
    /// Reddit "top"; needs a [Timeframe].
    TopRanked,
}

impl ListingMode {
    /// Accepts both the Reddit names (hot/new/top) and the long names.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "hot" | "recent_activity" => Some(ListingMode::RecentActivity),
            "new" | "newest" => Some(ListingMode::Newest),
            "top" | "top_ranked" => Some(ListingMode::TopRanked),
            _ => None,
        }
    }
}

/// Window for [ListingMode::TopRanked].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    AllTime,
    Year,
    Month,
    Day,
}

impl Timeframe {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "all" | "all_time" => Some(Timeframe::AllTime),
            "year" => Some(Timeframe::Year),
            "month" => Some(Timeframe::Month),
            "day" => Some(Timeframe::Day),
            _ => None,
        }
    }

    /// Value of the `t` query parameter.
    pub fn as_param(self) -> &'static str {
        match self {
            Timeframe::AllTime => "all",
            Timeframe::Year => "year",
            Timeframe::Month => "month",
            Timeframe::Day => "day",
        }
    }
}

/// A fully resolved listing: the mode with its timeframe folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    Hot,
    New,
    Top(Timeframe),
}

impl Listing {
    /// Path segment after `/r/{forum}/`.
    pub fn sort(self) -> &'static str {
        match self {
            Listing::Hot => "hot",
            Listing::New => "new",
            Listing::Top(_) => "top",
        }
    }

    pub fn timeframe(self) -> Option<Timeframe> {
        match self {
            Listing::Top(t) => Some(t),
            Listing::Hot | Listing::New => None,
        }
    }
}

/// A post as returned by a listing endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub id: String,
    pub title: String,
    pub score: i64,
    pub num_comments: u64,
    pub created_utc: DateTime<Utc>,
    pub url: String,
    pub selftext: String,
    /// `None` when the upstream record carries no author.
    pub author: Option<String>,
}

/// Request for one page of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Cursor from the previous page's [ListingPage::after].
    pub after: Option<String>,
    pub limit: u32,
}

/// One page of a listing. `after` is `None` on the last page.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub items: Vec<Submission>,
    pub after: Option<String>,
}

/// A node in a comment tree: either a loaded comment or a "load more" placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum CommentNode {
    Comment(CommentData),
    More(MoreComments),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentData {
    pub id: String,
    pub author: Option<String>,
    pub body: String,
    pub score: i64,
    pub created_utc: DateTime<Utc>,
    pub replies: Vec<CommentNode>,
}

impl CommentData {
    /// Reddit fullname (`t1_` prefix), as used in `parent_id` fields.
    pub fn fullname(&self) -> String {
        format!("t1_{}", self.id)
    }
}

/// Placeholder for comments the API left out of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoreComments {
    pub id: String,
    /// Fullname of the node this placeholder hangs under (`t1_...` or `t3_...`).
    pub parent_id: String,
    /// Ids of the hidden comments. Empty for a "continue this thread" link.
    pub children: Vec<String>,
    pub count: u64,
}

impl MoreComments {
    /// A deep-thread link that must be loaded from the parent comment's own page.
    pub fn is_continue_thread(&self) -> bool {
        self.children.is_empty()
    }
}

/// Upstream operations the collector needs. Implemented by [RedditClient]; tests use in-memory fakes.
pub trait ForumApi {
    /// Whether the named forum exists and is readable.
    fn forum_exists(&mut self, forum: &str) -> Result<bool, ApiError>;

    fn listing_page(
        &mut self,
        forum: &str,
        listing: Listing,
        page: &PageRequest,
    ) -> Result<ListingPage, ApiError>;

    /// Top-level comment forest for a post, possibly containing [CommentNode::More] placeholders.
    fn comment_forest(&mut self, post_id: &str) -> Result<Vec<CommentNode>, ApiError>;

    /// Nodes that replace `more` in its parent's children. May contain further placeholders.
    fn expand_more(
        &mut self,
        post_id: &str,
        more: &MoreComments,
    ) -> Result<Vec<CommentNode>, ApiError>;
}

/// Build an API handle from credentials. No request is made; the access token is fetched on first use.
pub fn create_client(credentials: &Credentials) -> Result<RedditClient, ApiError> {
    RedditClient::builder(credentials.clone()).build()
}

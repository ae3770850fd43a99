//! Collection run: validate the request, page through the listing, expand every comment tree and
//! flatten it into the two output tables.

use crate::forum::{
    ApiError, CommentData, CommentNode, ForumApi, Listing, ListingMode, PageRequest, Submission,
    Timeframe, MAX_PAGE_SIZE,
};
use crate::model::{author_or_sentinel, Comment, Item, Tables};
use std::collections::{HashSet, VecDeque};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("Forum 'r/{forum}' not found or is private.")]
    ForumNotFound { forum: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] ApiError),
}

/// Parse a listing mode name (hot/new/top or recent_activity/newest/top_ranked).
pub fn parse_mode(s: &str) -> Result<ListingMode, CollectError> {
    ListingMode::parse(s).ok_or_else(|| {
        CollectError::InvalidArgument(format!(
            "unknown listing mode '{}'. Use hot, new, or top.",
            s
        ))
    })
}

/// Parse a timeframe name (all/year/month/day).
pub fn parse_timeframe(s: &str) -> Result<Timeframe, CollectError> {
    Timeframe::parse(s).ok_or_else(|| {
        CollectError::InvalidArgument(format!(
            "unknown timeframe '{}'. Use all, year, month, or day.",
            s
        ))
    })
}

/// Fold mode and timeframe into a [Listing]. `TopRanked` requires a timeframe; others ignore it.
pub fn resolve_listing(
    mode: ListingMode,
    timeframe: Option<Timeframe>,
) -> Result<Listing, CollectError> {
    match mode {
        ListingMode::RecentActivity => Ok(Listing::Hot),
        ListingMode::Newest => Ok(Listing::New),
        ListingMode::TopRanked => timeframe.map(Listing::Top).ok_or_else(|| {
            CollectError::InvalidArgument(
                "a timeframe must be provided for the top listing".to_string(),
            )
        }),
    }
}

/// Lazy cursor over a listing. Pages are fetched only when the buffer runs dry and never ask for
/// more than the remaining limit. Not restartable.
struct ListingCursor<'a> {
    forum: &'a str,
    listing: Listing,
    remaining: u32,
    after: Option<String>,
    buffer: VecDeque<Submission>,
    exhausted: bool,
}

impl<'a> ListingCursor<'a> {
    fn new(forum: &'a str, listing: Listing, limit: u32) -> Self {
        Self {
            forum,
            listing,
            remaining: limit,
            after: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn next<A: ForumApi + ?Sized>(&mut self, api: &mut A) -> Result<Option<Submission>, ApiError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        if self.buffer.is_empty() && !self.exhausted {
            let request = PageRequest {
                after: self.after.take(),
                limit: self.remaining.min(MAX_PAGE_SIZE),
            };
            let page = api.listing_page(self.forum, self.listing, &request)?;
            debug!(
                forum = self.forum,
                count = page.items.len(),
                after = ?page.after,
                "listing page received"
            );
            self.exhausted = page.items.is_empty() || page.after.is_none();
            self.after = page.after;
            self.buffer.extend(page.items);
        }
        let next = self.buffer.pop_front();
        if next.is_some() {
            self.remaining -= 1;
        }
        Ok(next)
    }
}

/// Replace every [CommentNode::More] in `nodes` (at any depth) with what it stands for.
///
/// Replacement nodes are revisited, so placeholders returned by an expansion are expanded too.
/// A placeholder seen twice means the tree can never be completed, so it fails the run.
fn expand_placeholders<A: ForumApi + ?Sized>(
    api: &mut A,
    post_id: &str,
    nodes: &mut Vec<CommentNode>,
    seen: &mut HashSet<(String, String)>,
) -> Result<(), ApiError> {
    let mut i = 0;
    while i < nodes.len() {
        if let CommentNode::More(more) = &nodes[i] {
            let more = more.clone();
            if !seen.insert((more.parent_id.clone(), more.id.clone())) {
                warn!(post_id, more_id = %more.id, "placeholder returned again");
                return Err(ApiError::UnexpectedShape {
                    reason: format!(
                        "placeholder {} under {} in post {} was returned again after expansion",
                        more.id, more.parent_id, post_id
                    ),
                });
            }
            let replacement = api.expand_more(post_id, &more)?;
            debug!(
                post_id,
                more_id = %more.id,
                requested = more.children.len(),
                received = replacement.len(),
                "expanded placeholder"
            );
            nodes.splice(i..=i, replacement);
            continue;
        }
        if let CommentNode::Comment(comment) = &mut nodes[i] {
            expand_placeholders(api, post_id, &mut comment.replies, seen)?;
        }
        i += 1;
    }
    Ok(())
}

/// Flatten a fully expanded forest breadth-first: top-level comments, then each level of replies.
fn flatten_comments(post_id: &str, forest: Vec<CommentNode>) -> Vec<Comment> {
    let mut rows = Vec::new();
    let mut queue: VecDeque<CommentNode> = forest.into();
    while let Some(node) = queue.pop_front() {
        let CommentNode::Comment(CommentData {
            id,
            author,
            body,
            score,
            created_utc,
            replies,
        }) = node
        else {
            continue;
        };
        queue.extend(replies);
        rows.push(Comment {
            comment_id: id,
            post_id: post_id.to_string(),
            author: author_or_sentinel(author),
            body,
            score,
            created_utc,
        });
    }
    rows
}

fn item_row(submission: Submission) -> Item {
    Item {
        post_id: submission.id,
        title: submission.title,
        score: submission.score,
        num_comments: submission.num_comments,
        created_utc: submission.created_utc,
        url: submission.url,
        body: submission.selftext,
        author: author_or_sentinel(submission.author),
    }
}

/// Collect up to `limit` posts from `forum` and every comment under them.
pub fn collect<A: ForumApi + ?Sized>(
    api: &mut A,
    forum: &str,
    limit: u32,
    mode: ListingMode,
    timeframe: Option<Timeframe>,
) -> Result<Tables, CollectError> {
    collect_with_progress(api, forum, limit, mode, timeframe, None)
}

/// As [collect], calling `progress(done, limit)` after each post is fully processed.
pub fn collect_with_progress<A: ForumApi + ?Sized>(
    api: &mut A,
    forum: &str,
    limit: u32,
    mode: ListingMode,
    timeframe: Option<Timeframe>,
    progress: Option<&dyn Fn(u32, u32)>,
) -> Result<Tables, CollectError> {
    let forum = forum.trim();
    if forum.is_empty() {
        return Err(CollectError::InvalidArgument(
            "forum name must not be empty".to_string(),
        ));
    }
    if limit == 0 {
        return Err(CollectError::InvalidArgument(
            "limit must be at least 1".to_string(),
        ));
    }
    let listing = resolve_listing(mode, timeframe)?;

    if !api.forum_exists(forum)? {
        return Err(CollectError::ForumNotFound {
            forum: forum.to_string(),
        });
    }

    info!(forum, sort = listing.sort(), limit, "collecting");
    let mut tables = Tables::default();
    let mut cursor = ListingCursor::new(forum, listing, limit);
    let mut done = 0u32;
    while let Some(submission) = cursor.next(api)? {
        let post_id = submission.id.clone();
        tables.items.push(item_row(submission));

        let mut forest = api.comment_forest(&post_id)?;
        let mut seen = HashSet::new();
        expand_placeholders(api, &post_id, &mut forest, &mut seen)?;
        let comments = flatten_comments(&post_id, forest);
        debug!(post_id = %post_id, comments = comments.len(), "post collected");
        tables.comments.extend(comments);

        done += 1;
        if let Some(cb) = progress {
            cb(done, limit);
        }
    }
    info!(
        forum,
        posts = tables.items.len(),
        comments = tables.comments.len(),
        "collection finished"
    );
    Ok(tables)
}

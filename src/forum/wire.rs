//! Reddit JSON shapes and their conversion into [Submission] and [CommentNode].
//!
//! Every object comes wrapped as `{"kind": ..., "data": ...}`. Comment `replies` is either a
//! nested Listing or an empty string.

use crate::forum::error::ApiError;
use crate::forum::{CommentData, CommentNode, ListingPage, MoreComments, Submission};
use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListingData<T> {
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default = "Vec::new")]
    pub children: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LinkData {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: u64,
    created_utc: f64,
    #[serde(default)]
    url: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    author: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub(crate) enum CommentThing {
    #[serde(rename = "t1")]
    Comment(CommentWire),
    #[serde(rename = "more")]
    More(MoreWire),
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentWire {
    id: String,
    #[serde(default)]
    parent_id: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    score: i64,
    created_utc: f64,
    #[serde(default)]
    replies: Option<Replies>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Replies {
    Listing(Envelope<ListingData<CommentThing>>),
    Empty(IgnoredAny),
}

#[derive(Debug, Deserialize)]
pub(crate) struct MoreWire {
    id: String,
    #[serde(default)]
    parent_id: String,
    #[serde(default)]
    children: Vec<String>,
    #[serde(default)]
    count: u64,
}

/// `GET /api/morechildren?api_type=json` response.
#[derive(Debug, Deserialize)]
pub(crate) struct MoreChildrenResponse {
    pub json: MoreChildrenJson,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MoreChildrenJson {
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
    #[serde(default)]
    pub data: Option<MoreChildrenData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MoreChildrenData {
    #[serde(default)]
    pub things: Vec<CommentThing>,
}

/// Only the kind matters for the existence probe.
#[derive(Debug, Deserialize)]
pub(crate) struct AboutEnvelope {
    pub kind: String,
}

fn timestamp(secs: f64) -> Result<DateTime<Utc>, ApiError> {
    DateTime::<Utc>::from_timestamp(secs.trunc() as i64, 0).ok_or_else(|| {
        ApiError::UnexpectedShape {
            reason: format!("created_utc out of range: {}", secs),
        }
    })
}

impl LinkData {
    fn into_submission(self) -> Result<Submission, ApiError> {
        Ok(Submission {
            created_utc: timestamp(self.created_utc)?,
            id: self.id,
            title: self.title,
            score: self.score,
            num_comments: self.num_comments,
            url: self.url,
            selftext: self.selftext,
            author: self.author,
        })
    }
}

impl CommentThing {
    fn parent_id(&self) -> &str {
        match self {
            CommentThing::Comment(c) => &c.parent_id,
            CommentThing::More(m) => &m.parent_id,
        }
    }

    fn into_node(self) -> Result<CommentNode, ApiError> {
        match self {
            CommentThing::Comment(c) => {
                let replies = match c.replies {
                    Some(Replies::Listing(listing)) => forest(listing.data.children)?,
                    Some(Replies::Empty(_)) | None => Vec::new(),
                };
                Ok(CommentNode::Comment(CommentData {
                    created_utc: timestamp(c.created_utc)?,
                    id: c.id,
                    author: c.author,
                    body: c.body,
                    score: c.score,
                    replies,
                }))
            }
            CommentThing::More(m) => Ok(CommentNode::More(MoreComments {
                id: m.id,
                parent_id: m.parent_id,
                children: m.children,
                count: m.count,
            })),
        }
    }
}

/// Convert one listing page of posts.
pub(crate) fn listing_page(
    envelope: Envelope<ListingData<Envelope<LinkData>>>,
) -> Result<ListingPage, ApiError> {
    if envelope.kind != "Listing" {
        return Err(ApiError::UnexpectedShape {
            reason: format!("expected a Listing, got kind '{}'", envelope.kind),
        });
    }
    let items = envelope
        .data
        .children
        .into_iter()
        .map(|thing| thing.data.into_submission())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ListingPage {
        items,
        after: envelope.data.after.filter(|a| !a.is_empty()),
    })
}

/// Convert an already-nested list of comment things.
pub(crate) fn forest(things: Vec<CommentThing>) -> Result<Vec<CommentNode>, ApiError> {
    things.into_iter().map(CommentThing::into_node).collect()
}

/// Rebuild a subtree from the flat, depth-first `things` list returned by morechildren.
///
/// A thing whose parent appears earlier in the list is nested under it; every other thing is a
/// root and keeps its relative order.
pub(crate) fn assemble_thread(things: Vec<CommentThing>) -> Result<Vec<CommentNode>, ApiError> {
    let parents: Vec<String> = things.iter().map(|t| t.parent_id().to_string()).collect();
    let mut slots: Vec<Option<CommentNode>> = Vec::with_capacity(things.len());
    for thing in things {
        slots.push(Some(thing.into_node()?));
    }

    let mut position: HashMap<String, usize> = HashMap::new();
    for (i, slot) in slots.iter().enumerate() {
        if let Some(CommentNode::Comment(c)) = slot {
            position.insert(c.fullname(), i);
        }
    }

    let mut children_of: Vec<Vec<usize>> = vec![Vec::new(); slots.len()];
    let mut roots = Vec::new();
    for (i, parent) in parents.iter().enumerate() {
        match position.get(parent) {
            Some(&p) if p < i => children_of[p].push(i),
            _ => roots.push(i),
        }
    }

    // Children always sit after their parent, so filling from the back completes each subtree first.
    for i in (0..slots.len()).rev() {
        let kids: Vec<CommentNode> = children_of[i]
            .iter()
            .filter_map(|&k| slots[k].take())
            .collect();
        if let Some(CommentNode::Comment(c)) = slots[i].as_mut() {
            c.replies.extend(kids);
        }
    }

    Ok(roots.into_iter().filter_map(|i| slots[i].take()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(nodes: &[CommentNode]) -> Vec<String> {
        nodes
            .iter()
            .map(|n| match n {
                CommentNode::Comment(c) => c.id.clone(),
                CommentNode::More(m) => format!("more:{}", m.id),
            })
            .collect()
    }

    #[test]
    fn listing_page_parses_posts_and_cursor() -> Result<(), Box<dyn std::error::Error>> {
        let json = r#"{"kind":"Listing","data":{"after":"t3_b","children":[
            {"kind":"t3","data":{"id":"a","title":"First","score":10,"num_comments":2,"created_utc":1700000000.0,"url":"https://x/a","selftext":"body","author":"alice"}},
            {"kind":"t3","data":{"id":"b","title":"Second","score":1,"num_comments":0,"created_utc":1700000100.0,"url":"https://x/b","selftext":"","author":null}}
        ]}}"#;
        let envelope: Envelope<ListingData<Envelope<LinkData>>> = serde_json::from_str(json)?;
        let page = listing_page(envelope)?;
        assert_eq!(page.after.as_deref(), Some("t3_b"));
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].author.as_deref(), Some("alice"));
        assert_eq!(page.items[0].created_utc.timestamp(), 1_700_000_000);
        assert!(page.items[1].author.is_none());
        Ok(())
    }

    #[test]
    fn listing_page_last_page_has_no_cursor() -> Result<(), Box<dyn std::error::Error>> {
        let json = r#"{"kind":"Listing","data":{"after":null,"children":[]}}"#;
        let page = listing_page(serde_json::from_str(json)?)?;
        assert!(page.after.is_none());
        assert!(page.items.is_empty());
        Ok(())
    }

    #[test]
    fn nested_replies_and_empty_string_replies() -> Result<(), Box<dyn std::error::Error>> {
        let json = r#"[
            {"kind":"t1","data":{"id":"c1","parent_id":"t3_p","author":"bob","body":"top","score":5,"created_utc":1.0,
             "replies":{"kind":"Listing","data":{"after":null,"children":[
                {"kind":"t1","data":{"id":"c2","parent_id":"t1_c1","author":"[deleted]","body":"[removed]","score":0,"created_utc":2.0,"replies":""}},
                {"kind":"more","data":{"id":"m1","parent_id":"t1_c1","children":["c3","c4"],"count":2}}
             ]}}}},
            {"kind":"t1","data":{"id":"c5","parent_id":"t3_p","body":"no author","score":1,"created_utc":3.0,"replies":""}}
        ]"#;
        let things: Vec<CommentThing> = serde_json::from_str(json)?;
        let nodes = forest(things)?;
        assert_eq!(ids(&nodes), vec!["c1", "c5"]);
        match &nodes[0] {
            CommentNode::Comment(c) => {
                assert_eq!(ids(&c.replies), vec!["c2", "more:m1"]);
                if let CommentNode::More(m) = &c.replies[1] {
                    assert_eq!(m.children, vec!["c3", "c4"]);
                    assert_eq!(m.parent_id, "t1_c1");
                }
            }
            other => panic!("expected comment, got {:?}", other),
        }
        match &nodes[1] {
            CommentNode::Comment(c) => assert!(c.author.is_none()),
            other => panic!("expected comment, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn assemble_thread_nests_by_parent() -> Result<(), Box<dyn std::error::Error>> {
        let json = r#"[
            {"kind":"t1","data":{"id":"a","parent_id":"t1_root","body":"a","created_utc":1.0,"replies":""}},
            {"kind":"t1","data":{"id":"b","parent_id":"t1_a","body":"b","created_utc":1.0,"replies":""}},
            {"kind":"t1","data":{"id":"c","parent_id":"t1_b","body":"c","created_utc":1.0,"replies":""}},
            {"kind":"t1","data":{"id":"d","parent_id":"t1_root","body":"d","created_utc":1.0,"replies":""}},
            {"kind":"more","data":{"id":"e","parent_id":"t1_a","children":["e"],"count":1}}
        ]"#;
        let things: Vec<CommentThing> = serde_json::from_str(json)?;
        let nodes = assemble_thread(things)?;
        assert_eq!(ids(&nodes), vec!["a", "d"]);
        let CommentNode::Comment(a) = &nodes[0] else {
            panic!("expected comment");
        };
        assert_eq!(ids(&a.replies), vec!["b", "more:e"]);
        let CommentNode::Comment(b) = &a.replies[0] else {
            panic!("expected comment");
        };
        assert_eq!(ids(&b.replies), vec!["c"]);
        Ok(())
    }

    #[test]
    fn morechildren_response_parses_things() -> Result<(), Box<dyn std::error::Error>> {
        let json = r#"{"json":{"errors":[],"data":{"things":[
            {"kind":"t1","data":{"id":"x","parent_id":"t3_p","body":"x","created_utc":1.0,"replies":""}}
        ]}}}"#;
        let response: MoreChildrenResponse = serde_json::from_str(json)?;
        assert!(response.json.errors.is_empty());
        let things = response.json.data.map(|d| d.things).unwrap_or_default();
        assert_eq!(things.len(), 1);
        Ok(())
    }

    #[test]
    fn unknown_thing_kind_is_a_decode_error() {
        let json = r#"[{"kind":"t9","data":{}}]"#;
        assert!(serde_json::from_str::<Vec<CommentThing>>(json).is_err());
    }
}

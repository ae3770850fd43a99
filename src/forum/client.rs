//! Blocking Reddit API client: lazy application-only OAuth, politeness delay between requests,
//! and retries with backoff for transient failures.

use crate::config::Credentials;
use crate::forum::error::ApiError;
use crate::forum::wire;
use crate::forum::{
    CommentNode, ForumApi, Listing, ListingPage, MoreComments, PageRequest, MAX_PAGE_SIZE,
};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const API_BASE: &str = "https://oauth.reddit.com";
const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const DEFAULT_DELAY_SECS: u64 = 1;

/// Default number of attempts per request (initial plus retries).
const DEFAULT_RETRY_COUNT: u32 = 3;
/// Default backoff delays in seconds after each failed attempt.
const DEFAULT_BACKOFF_SECS: [u64; 3] = [1, 2, 4];
/// Backoff for HTTP 429: the rate-limit window needs longer to recover.
const BACKOFF_429_SECS: [u64; 3] = [10, 30, 60];

/// morechildren accepts at most this many ids per call.
const MORECHILDREN_BATCH: usize = 100;
/// Refresh the token this long before it actually expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

/// Authenticated handle to the Reddit API. Holds the cached access token between calls.
#[derive(Debug)]
pub struct RedditClient {
    inner: Client,
    credentials: Credentials,
    api_base: String,
    token_url: String,
    token: Option<AccessToken>,
    delay: Duration,
    last_request: Option<Instant>,
    retry_count: u32,
    backoff_secs: Vec<u64>,
}

impl RedditClient {
    pub fn builder(credentials: Credentials) -> RedditClientBuilder {
        RedditClientBuilder::new(credentials)
    }

    /// Whether an access token has been obtained yet.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn wait_delay(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
    }

    fn backoff(&self, attempt: u32, rate_limited: bool) -> Duration {
        let idx = attempt.saturating_sub(1) as usize;
        let secs = if rate_limited {
            BACKOFF_429_SECS
                .get(idx)
                .copied()
                .unwrap_or(BACKOFF_429_SECS[BACKOFF_429_SECS.len() - 1])
        } else {
            self.backoff_secs
                .get(idx)
                .or_else(|| self.backoff_secs.last())
                .copied()
                .unwrap_or(1)
        };
        Duration::from_secs(secs)
    }

    /// Send a request, retrying timeouts, connection errors, 5xx and 429 up to the configured
    /// attempt count. Other statuses are returned to the caller as-is.
    fn send_with_retry<F>(&mut self, url: &str, build: F) -> Result<Response, ApiError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let max_attempts = self.retry_count.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.wait_delay();
            let result = build(&self.inner).send();
            self.last_request = Some(Instant::now());
            match result {
                Ok(response) => {
                    let status = response.status();
                    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS;
                    if (status.is_server_error() || rate_limited) && attempt < max_attempts {
                        let wait = self.backoff(attempt, rate_limited);
                        warn!(
                            url,
                            status = status.as_u16(),
                            attempt,
                            "transient HTTP status, retrying in {}s",
                            wait.as_secs()
                        );
                        std::thread::sleep(wait);
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => {
                    if (e.is_timeout() || e.is_connect()) && attempt < max_attempts {
                        let wait = self.backoff(attempt, false);
                        warn!(url, attempt, error = %e, "request failed, retrying in {}s", wait.as_secs());
                        std::thread::sleep(wait);
                        continue;
                    }
                    return Err(ApiError::Network {
                        url: url.to_string(),
                        source: e,
                    });
                }
            }
        }
    }

    /// Current bearer token, requesting a new one when none is cached or it has expired.
    fn access_token(&mut self) -> Result<String, ApiError> {
        if let Some(token) = &self.token {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }
        debug!(token_url = %self.token_url, "requesting application-only access token");
        let token_url = self.token_url.clone();
        let client_id = self.credentials.client_id.clone();
        let client_secret = self.credentials.client_secret.clone();
        let response = self.send_with_retry(&token_url, |c| {
            c.post(&token_url)
                .basic_auth(&client_id, Some(&client_secret))
                .form(&[("grant_type", "client_credentials")])
        })?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Authentication {
                reason: format!(
                    "HTTP {} from token endpoint; check client_id and client_secret",
                    status.as_u16()
                ),
            });
        }
        if !status.is_success() {
            return Err(ApiError::HttpStatus {
                status: status.as_u16(),
                url: token_url,
            });
        }
        let body: TokenResponse = read_json(response, &token_url)?;
        let value = match (body.access_token, body.error) {
            (Some(v), _) if !v.is_empty() => v,
            (_, Some(err)) => return Err(ApiError::Authentication { reason: err }),
            _ => {
                return Err(ApiError::Authentication {
                    reason: "token endpoint returned no access_token".to_string(),
                })
            }
        };
        let lifetime = Duration::from_secs(body.expires_in.unwrap_or(3600));
        self.token = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        });
        Ok(value)
    }

    /// Authenticated GET against the API base. A 401 drops the cached token and retries once.
    fn get(&mut self, path: &str, query: &[(&str, String)]) -> Result<Response, ApiError> {
        let url = format!("{}{}", self.api_base, path);
        let mut reauthenticated = false;
        loop {
            let token = self.access_token()?;
            let response = self.send_with_retry(&url, |c| {
                c.get(&url)
                    .bearer_auth(&token)
                    .query(query)
                    .query(&[("raw_json", "1")])
            })?;
            if response.status() == StatusCode::UNAUTHORIZED && !reauthenticated {
                debug!(url = %url, "access token rejected, requesting a new one");
                self.token = None;
                reauthenticated = true;
                continue;
            }
            return Ok(response);
        }
    }

    fn get_json<T: DeserializeOwned>(
        &mut self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let response = self.get(path, query)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::HttpStatus {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        let url = response.url().to_string();
        read_json(response, &url)
    }

    /// The comment listing of `/comments/{post}` or `/comments/{post}/_/{comment}`.
    fn comment_listing(&mut self, path: &str) -> Result<Vec<wire::CommentThing>, ApiError> {
        let (_post, comments): (
            IgnoredAny,
            wire::Envelope<wire::ListingData<wire::CommentThing>>,
        ) = self.get_json(path, &[])?;
        Ok(comments.data.children)
    }

    /// Load a "continue this thread" stub from the parent comment's own page.
    fn continue_thread(
        &mut self,
        post_id: &str,
        more: &MoreComments,
    ) -> Result<Vec<CommentNode>, ApiError> {
        let parent = more
            .parent_id
            .strip_prefix("t1_")
            .unwrap_or(&more.parent_id)
            .to_string();
        let path = format!("/comments/{}/_/{}", post_id, parent);
        let nodes = wire::forest(self.comment_listing(&path)?)?;
        let replies = nodes.into_iter().find_map(|node| match node {
            CommentNode::Comment(c) if c.id == parent => Some(c.replies),
            _ => None,
        });
        replies.ok_or_else(|| ApiError::UnexpectedShape {
            reason: format!(
                "comment {} missing from its own thread page {}",
                parent, path
            ),
        })
    }
}

fn read_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, ApiError> {
    let bytes = response.bytes().map_err(|e| ApiError::BodyRead {
        url: url.to_string(),
        source: e,
    })?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        source: e,
    })
}

impl ForumApi for RedditClient {
    fn forum_exists(&mut self, forum: &str) -> Result<bool, ApiError> {
        let response = self.get(&format!("/r/{}/about", forum), &[])?;
        let status = response.status();
        // Missing forums redirect to search; private, banned and quarantined ones are 403/404.
        if status.is_redirection()
            || matches!(
                status,
                StatusCode::FORBIDDEN | StatusCode::NOT_FOUND | StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS
            )
        {
            debug!(forum, status = status.as_u16(), "forum probe failed");
            return Ok(false);
        }
        if !status.is_success() {
            return Err(ApiError::HttpStatus {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        let url = response.url().to_string();
        let about: wire::AboutEnvelope = read_json(response, &url)?;
        Ok(about.kind == "t5")
    }

    fn listing_page(
        &mut self,
        forum: &str,
        listing: Listing,
        page: &PageRequest,
    ) -> Result<ListingPage, ApiError> {
        let path = format!("/r/{}/{}", forum, listing.sort());
        let mut query = vec![("limit", page.limit.min(MAX_PAGE_SIZE).to_string())];
        if let Some(after) = &page.after {
            query.push(("after", after.clone()));
        }
        if let Some(timeframe) = listing.timeframe() {
            query.push(("t", timeframe.as_param().to_string()));
        }
        debug!(forum, sort = listing.sort(), after = ?page.after, "fetching listing page");
        let envelope = self.get_json(&path, &query)?;
        wire::listing_page(envelope)
    }

    fn comment_forest(&mut self, post_id: &str) -> Result<Vec<CommentNode>, ApiError> {
        let things = self.comment_listing(&format!("/comments/{}", post_id))?;
        wire::forest(things)
    }

    fn expand_more(
        &mut self,
        post_id: &str,
        more: &MoreComments,
    ) -> Result<Vec<CommentNode>, ApiError> {
        if more.is_continue_thread() {
            return self.continue_thread(post_id, more);
        }
        let mut things = Vec::new();
        for batch in more.children.chunks(MORECHILDREN_BATCH) {
            let query = [
                ("api_type", "json".to_string()),
                ("link_id", format!("t3_{}", post_id)),
                ("children", batch.join(",")),
                ("limit_children", "false".to_string()),
            ];
            let response: wire::MoreChildrenResponse =
                self.get_json("/api/morechildren", &query)?;
            if !response.json.errors.is_empty() {
                return Err(ApiError::UnexpectedShape {
                    reason: format!(
                        "morechildren returned errors: {:?}",
                        response.json.errors
                    ),
                });
            }
            if let Some(data) = response.json.data {
                things.extend(data.things);
            }
        }
        wire::assemble_thread(things)
    }
}

/// Builder for RedditClient with optional delay, timeout, retry settings and endpoint overrides.
#[derive(Debug)]
pub struct RedditClientBuilder {
    credentials: Credentials,
    api_base: String,
    token_url: String,
    delay_secs: u64,
    timeout_secs: Option<u64>,
    retry_count: u32,
    retry_backoff_secs: Vec<u64>,
}

impl RedditClientBuilder {
    fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            api_base: API_BASE.to_string(),
            token_url: TOKEN_URL.to_string(),
            delay_secs: DEFAULT_DELAY_SECS,
            timeout_secs: None,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_backoff_secs: DEFAULT_BACKOFF_SECS.to_vec(),
        }
    }

    /// Base URL for API calls (default https://oauth.reddit.com).
    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Token endpoint (default https://www.reddit.com/api/v1/access_token).
    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Set delay between requests in seconds. Default 1.
    pub fn delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    /// Set request timeout in seconds. Unset keeps reqwest's default.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Set number of HTTP attempts for transient failures (default 3).
    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = n.max(1);
        self
    }

    /// Set backoff delays in seconds before each retry. If shorter than needed, the last value is reused.
    pub fn retry_backoff_secs(mut self, secs: Vec<u64>) -> Self {
        self.retry_backoff_secs = secs;
        self
    }

    /// Build the blocking client. Makes no request.
    pub fn build(self) -> Result<RedditClient, ApiError> {
        // Redirects are surfaced so the existence probe can see search redirects.
        let mut builder = Client::builder()
            .user_agent(self.credentials.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none());
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let inner = builder
            .build()
            .map_err(|e| ApiError::ClientBuild { source: e })?;
        Ok(RedditClient {
            inner,
            credentials: self.credentials,
            api_base: self.api_base,
            token_url: self.token_url,
            token: None,
            delay: Duration::from_secs(self.delay_secs),
            last_request: None,
            retry_count: self.retry_count,
            backoff_secs: self.retry_backoff_secs,
        })
    }
}

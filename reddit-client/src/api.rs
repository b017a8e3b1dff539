use crate::auth::RedditAuth;
use crate::metrics::{ApiMetrics, CallOutcome, CallRecord, MetricsCollector};
use crate::source::{ContentSource, ListingQuery};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use memebot_core::{is_valid_subreddit_name, BotConfig, CandidatePost, RedditApiError};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const REDDIT_API_BASE: &str = "https://oauth.reddit.com";
const REDDIT_WEB_BASE: &str = "https://reddit.com";
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

/// Post fields as Reddit sends them. Reddit omits or nulls fields freely, so
/// everything has a default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub subreddit: String,
    pub url: Option<String>,
    pub permalink: String,
    pub created_utc: Option<f64>,
    pub score: i64,
    pub is_self: bool,
    pub post_hint: Option<String>,
    pub over_18: bool,
    pub domain: Option<String>,
}

impl From<RedditPostData> for CandidatePost {
    fn from(post_data: RedditPostData) -> Self {
        let permalink = if post_data.permalink.starts_with('/') {
            format!("{}{}", REDDIT_WEB_BASE, post_data.permalink)
        } else {
            post_data.permalink
        };
        let media_url = if post_data.is_self {
            None
        } else {
            post_data.url.filter(|u| !u.trim().is_empty())
        };
        // Reddit exposes only a coarse hint, not a real content type.
        let mime_hint = match post_data.post_hint.as_deref() {
            Some("image") => Some("image/*".to_string()),
            _ => None,
        };
        let created_at = post_data
            .created_utc
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0));

        Self {
            title: post_data.title,
            permalink,
            media_url,
            mime_hint,
            subreddit: post_data.subreddit,
            author: post_data.author.unwrap_or_else(|| "[deleted]".to_string()),
            score: post_data.score,
            is_self: post_data.is_self,
            created_at,
        }
    }
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    auth: RedditAuth,
    metrics: MetricsCollector,
    user_agent: String,
}

impl RedditApiClient {
    pub fn new(
        client_id: String,
        client_secret: String,
        user_agent: String,
        timeout: Duration,
    ) -> Result<Self, RedditApiError> {
        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| RedditApiError::Transport {
                details: format!("failed to create HTTP client: {}", e),
            })?;
        let auth = RedditAuth::new(client_id, client_secret, http_client.clone())?;

        Ok(Self {
            http_client,
            auth,
            metrics: MetricsCollector::new(),
            user_agent,
        })
    }

    pub fn from_config(config: &BotConfig) -> Result<Self, RedditApiError> {
        let missing = |name: &str| RedditApiError::AuthenticationFailed {
            reason: format!("{} is not configured", name),
        };
        let client_id = config
            .reddit_client_id
            .clone()
            .ok_or_else(|| missing("REDDIT_CLIENT_ID"))?;
        let client_secret = config
            .reddit_client_secret
            .clone()
            .ok_or_else(|| missing("REDDIT_CLIENT_SECRET"))?;

        Self::new(
            client_id,
            client_secret,
            config.user_agent.clone(),
            config.request_timeout(),
        )
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        metrics_key: &str,
        query_params: &[(&str, String)],
    ) -> Result<Response, RedditApiError> {
        let access_token = self.auth.access_token().await?;
        let url = format!("{}{}", REDDIT_API_BASE, endpoint);
        let start_time = Instant::now();

        let request_builder = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(access_token)
            .query(query_params);

        info!("Making Reddit API request: {} {}", method, endpoint);
        let result = match request_builder.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    debug!("Request successful: {} {}", status, endpoint);
                    Ok(response)
                } else {
                    error!("Request failed with status: {} for {}", status, endpoint);
                    Err(self.status_error(&response, endpoint).await)
                }
            }
            Err(e) => {
                error!("Network error for {} {}: {}", method, endpoint, e);
                if e.is_timeout() {
                    Err(RedditApiError::RequestTimeout)
                } else {
                    Err(RedditApiError::Transport {
                        details: e.to_string(),
                    })
                }
            }
        };

        let status_code = match &result {
            Ok(response) => Some(response.status().as_u16()),
            Err(RedditApiError::RateLimitExceeded { .. }) => Some(429),
            Err(RedditApiError::ServerError { status_code }) => Some(*status_code),
            Err(_) => None,
        };
        let outcome = match &result {
            Ok(_) => CallOutcome::Success,
            Err(RedditApiError::RateLimitExceeded { .. }) => CallOutcome::RateLimited,
            Err(_) => CallOutcome::Failed,
        };
        self.metrics
            .record(CallRecord {
                route: metrics_key.to_string(),
                status_code,
                elapsed: start_time.elapsed(),
                outcome,
            })
            .await;

        result
    }

    async fn status_error(&self, response: &Response, endpoint: &str) -> RedditApiError {
        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<f64>().ok())
                    .map(|secs| secs.ceil() as u64)
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                warn!("Rate limited, retry after {} seconds", retry_after);
                RedditApiError::RateLimitExceeded { retry_after }
            }
            StatusCode::UNAUTHORIZED => {
                self.auth.invalidate().await;
                RedditApiError::InvalidToken
            }
            StatusCode::FORBIDDEN => RedditApiError::Forbidden {
                resource: endpoint.to_string(),
            },
            StatusCode::NOT_FOUND => RedditApiError::SubredditNotFound {
                subreddit: subreddit_from_endpoint(endpoint),
            },
            status if status.is_server_error() => RedditApiError::ServerError {
                status_code: status.as_u16(),
            },
            status => RedditApiError::InvalidResponse {
                details: format!("unexpected status {}", status),
            },
        }
    }

    pub async fn get_listing(
        &self,
        query: &ListingQuery,
    ) -> Result<RedditListing<RedditPostData>, RedditApiError> {
        if !is_valid_subreddit_name(&query.subreddit) {
            warn!("Refusing request for malformed subreddit {:?}", query.subreddit);
            return Err(RedditApiError::SubredditNotFound {
                subreddit: query.subreddit.clone(),
            });
        }
        let (endpoint, metrics_key, params) = build_request(query);

        let response = self
            .make_request(Method::GET, &endpoint, metrics_key, &params)
            .await?;

        let listing: RedditListing<RedditPostData> = response.json().await.map_err(|e| {
            error!("Failed to parse listing for r/{}: {}", query.subreddit, e);
            RedditApiError::InvalidResponse {
                details: format!("Failed to parse posts for r/{}", query.subreddit),
            }
        })?;

        info!(
            "Retrieved {} posts from r/{}",
            listing.data.children.len(),
            query.subreddit
        );
        Ok(listing)
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub async fn get_metrics(&self) -> ApiMetrics {
        self.metrics.snapshot().await
    }
}

#[async_trait]
impl ContentSource for RedditApiClient {
    async fn fetch_listing(
        &self,
        query: &ListingQuery,
    ) -> Result<Vec<CandidatePost>, RedditApiError> {
        let listing = self.get_listing(query).await?;
        Ok(listing_into_posts(listing))
    }
}

pub fn listing_into_posts(listing: RedditListing<RedditPostData>) -> Vec<CandidatePost> {
    listing
        .data
        .children
        .into_iter()
        .filter(|child| child.kind == "t3")
        .map(|child| CandidatePost::from(child.data))
        .collect()
}

/// Endpoint path, metrics key and query parameters for one listing call.
fn build_request(query: &ListingQuery) -> (String, &'static str, Vec<(&'static str, String)>) {
    let mut params = vec![("limit", query.limit.to_string()), ("raw_json", "1".to_string())];

    match &query.query {
        Some(search) => {
            params.push(("q", search.clone()));
            params.push(("restrict_sr", "1".to_string()));
            params.push(("sort", query.sort.as_str().to_string()));
            if let Some(t) = query.time_filter {
                params.push(("t", t.as_str().to_string()));
            }
            (format!("/r/{}/search", query.subreddit), "search", params)
        }
        None => {
            if let Some(t) = query.time_filter {
                params.push(("t", t.as_str().to_string()));
            }
            (
                format!("/r/{}/{}", query.subreddit, query.sort.as_str()),
                "listing",
                params,
            )
        }
    }
}

fn subreddit_from_endpoint(endpoint: &str) -> String {
    endpoint
        .strip_prefix("/r/")
        .and_then(|rest| rest.split('/').next())
        .unwrap_or(endpoint)
        .to_string()
}

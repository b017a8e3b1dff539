use memebot_core::RedditApiError;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthType, AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, TokenResponse, TokenUrl,
};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Tokens are refreshed this long before Reddit says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

/// Application-only OAuth2 (client credentials grant). No user ever logs in.
#[derive(Debug)]
pub struct RedditAuth {
    oauth_client: BasicClient,
    http_client: reqwest::Client,
    token: RwLock<Option<CachedToken>>,
}

impl RedditAuth {
    pub fn new(
        client_id: String,
        client_secret: String,
        http_client: reqwest::Client,
    ) -> Result<Self, RedditApiError> {
        let auth_url = AuthUrl::new(REDDIT_AUTH_URL.to_string()).map_err(|e| {
            RedditApiError::AuthenticationFailed {
                reason: format!("invalid auth URL: {}", e),
            }
        })?;
        let token_url = TokenUrl::new(REDDIT_TOKEN_URL.to_string()).map_err(|e| {
            RedditApiError::AuthenticationFailed {
                reason: format!("invalid token URL: {}", e),
            }
        })?;

        let oauth_client = BasicClient::new(
            ClientId::new(client_id),
            Some(ClientSecret::new(client_secret)),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::BasicAuth);

        Ok(Self {
            oauth_client,
            http_client,
            token: RwLock::new(None),
        })
    }

    /// Returns a valid bearer token, requesting a new one when the cached
    /// token is missing or about to expire.
    pub async fn access_token(&self) -> Result<String, RedditApiError> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_fresh() {
                return Ok(token.access_token.clone());
            }
        }

        let mut guard = self.token.write().await;
        if let Some(token) = guard.as_ref() {
            if token.is_fresh() {
                return Ok(token.access_token.clone());
            }
        }

        info!("Requesting Reddit application access token");
        let http_client = &self.http_client;
        let response = self
            .oauth_client
            .exchange_client_credentials()
            .request_async(|request| send_token_request(http_client, request))
            .await
            .map_err(|e| RedditApiError::AuthenticationFailed {
                reason: e.to_string(),
            })?;

        let lifetime = response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let token = CachedToken {
            access_token: response.access_token().secret().clone(),
            expires_at: Instant::now() + lifetime,
        };
        debug!("Reddit access token valid for {:?}", lifetime);

        let access_token = token.access_token.clone();
        *guard = Some(token);
        Ok(access_token)
    }

    /// Drops the cached token so the next call re-authenticates.
    pub async fn invalidate(&self) {
        *self.token.write().await = None;
    }

    pub async fn has_valid_token(&self) -> bool {
        self.token
            .read()
            .await
            .as_ref()
            .map(CachedToken::is_fresh)
            .unwrap_or(false)
    }

    #[cfg(test)]
    pub(crate) async fn set_token(&self, access_token: &str, lifetime: Duration) {
        *self.token.write().await = Some(CachedToken {
            access_token: access_token.to_string(),
            expires_at: Instant::now() + lifetime,
        });
    }
}

// The oauth2 crate's bundled client sends no User-Agent, which Reddit rejects.
async fn send_token_request(
    client: &reqwest::Client,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let response = client
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}

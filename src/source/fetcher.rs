//! HTTP fetcher for the bike-share member site
//!
//! One fetcher owns one cookie jar, so one fetcher is one browser session.
//! Features:
//! - Cookie persistence across requests (session + anti-forgery cookies)
//! - Rate limiting with governor
//! - Final URL reporting after redirects, used to detect logouts

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{
    cookie::{CookieStore, Jar},
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE},
    Client, Response,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use url::Url;

use crate::config::SourceConfig;
use crate::utils::error::FetchError;

/// A fetched page and where it was actually served from
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after following redirects
    pub url: Url,
    pub status: u16,
    pub body: String,
}

/// Session-scoped HTTP fetcher
pub struct SiteFetcher {
    /// HTTP client with configured timeout, compression and cookie jar
    client: Client,

    /// Cookie jar shared with the client
    jar: Arc<Jar>,

    /// Rate limiter to control request frequency
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl SiteFetcher {
    /// Create a fetcher with a fresh cookie jar
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(config: &SourceConfig) -> Result<Self, FetchError> {
        let jar = Arc::new(Jar::default());

        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.as_str())
            .default_headers(Self::default_headers())
            .gzip(true)
            .cookie_provider(Arc::clone(&jar))
            .build()?;

        let rate = NonZeroU32::new(config.rate_limit).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            jar,
            rate_limiter,
        })
    }

    /// GET a page, following redirects
    pub async fn get(&self, url: &Url) -> Result<Page, FetchError> {
        self.rate_limiter.until_ready().await;
        tracing::debug!(url = %url, "Fetching page");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        Self::into_page(response).await
    }

    /// POST a urlencoded form, following redirects
    pub async fn post_form(&self, url: &Url, form: &[(&str, &str)]) -> Result<Page, FetchError> {
        self.rate_limiter.until_ready().await;
        tracing::debug!(url = %url, "Submitting form");

        let response = self
            .client
            .post(url.clone())
            .form(form)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        Self::into_page(response).await
    }

    /// Value of a cookie the site set for `url`
    pub fn cookie(&self, url: &Url, name: &str) -> Option<String> {
        let header = self.jar.cookies(url)?;
        let header = header.to_str().ok()?;

        header.split(';').find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then(|| value.to_string())
        })
    }

    async fn into_page(response: Response) -> Result<Page, FetchError> {
        let status = response.status();
        let url = response.url().clone();

        if !status.is_success() {
            return Err(FetchError::ServerError(status.as_u16()));
        }

        let body = response.text().await.map_err(FetchError::from_reqwest)?;

        Ok(Page {
            url,
            status: status.as_u16(),
            body,
        })
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,application/json;q=0.8,*/*;q=0.7",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers
    }
}

//! Session-authenticated scraping client for the bike-share member site
//!
//! The site exposes no API: logging in means fetching the login form for an
//! anti-forgery token, posting credentials, and checking where the post-login
//! redirect lands. Every page fetch afterwards may find the session logged out
//! (the site serves its login page instead), in which case the client logs in
//! again and repeats the same request.
//!
//! Each network step is attempted up to `max_attempts` times with exponential
//! backoff; exhausting a step raises [`Error::UpstreamUnavailable`] naming it.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{SourceConfig, TokenStrategy};
use crate::error::{Error, Result, SourceStep};
use crate::models::{SourceCredentials, Station, StationIndex, Trip, TripId};
use crate::parser::{extract_last_page, extract_member_id, extract_token, parse_stations, TripParser};
use crate::source::fetcher::{Page, SiteFetcher};
use crate::source::session::SessionState;
use crate::source::TripSource;
use crate::utils::error::{FetchError, ParseError};
use crate::utils::retry::{with_retry, RetryConfig};

/// Resolved endpoints of the member site
#[derive(Debug, Clone)]
struct SiteUrls {
    login: Url,
    login_check: Url,
    profile: Url,
    trips: Url,
    stations: Url,
}

impl SiteUrls {
    fn new(config: &SourceConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| Error::config(format!("source.base_url: {e}")))?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| Error::config(format!("invalid source path '{path}': {e}")))
        };

        Ok(Self {
            login: join(&config.login_path)?,
            login_check: join(&config.login_check_path)?,
            profile: join(&config.profile_path)?,
            trips: join(&config.trips_path)?,
            stations: Url::parse(&config.stations_url)
                .map_err(|e| Error::config(format!("source.stations_url: {e}")))?,
        })
    }

    /// Trip history URL for a member, optionally for a given page
    fn trip_page(&self, member_id: &str, page: Option<u32>) -> Result<Url> {
        let mut url = self
            .trips
            .join(member_id)
            .map_err(|e| Error::upstream(SourceStep::MemberId, e))?;
        if let Some(page) = page {
            url.query_pairs_mut()
                .append_pair("pageNumber", &page.to_string());
        }
        Ok(url)
    }
}

/// Whether two URLs name the same page, ignoring query and fragment
fn same_path(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin() && a.path() == b.path()
}

/// Why a single login submission did not authenticate
enum LoginFailure {
    Rejected(String),
    Transport(FetchError),
}

impl std::fmt::Display for LoginFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected(reason) => write!(f, "{reason}"),
            Self::Transport(e) => write!(f, "{e}"),
        }
    }
}

/// Bike-share scraping client
///
/// Not safe for concurrent use: the site's session state lives in this
/// client's cookie jar, so every operation takes `&mut self`.
pub struct SourceClient {
    fetcher: SiteFetcher,
    urls: SiteUrls,
    token_strategy: TokenStrategy,
    retry: RetryConfig,
    parser: TripParser,
    credentials: Option<SourceCredentials>,
    state: SessionState,
    stations: Option<Arc<StationIndex>>,
}

impl SourceClient {
    /// Create a client without logging in
    pub fn new(config: &SourceConfig, credentials: Option<SourceCredentials>) -> Result<Self> {
        let tz = config.tz().map_err(|e| Error::config(e.to_string()))?;
        let fetcher = SiteFetcher::new(config).map_err(|e| Error::other(e.to_string()))?;

        Ok(Self {
            fetcher,
            urls: SiteUrls::new(config)?,
            token_strategy: config.token_strategy.clone(),
            retry: config.retry(),
            parser: TripParser::new(tz),
            credentials,
            state: SessionState::NeedToken,
            stations: None,
        })
    }

    /// Current login state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Store credentials and establish an authenticated session
    ///
    /// # Errors
    /// `AuthenticationFailed` if the site keeps rejecting the credentials,
    /// `UpstreamUnavailable` if the token or login step cannot be reached
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        self.credentials = Some(SourceCredentials {
            username: username.to_string(),
            password: password.to_string(),
        });
        self.state = SessionState::NeedToken;
        self.authenticate_session().await
    }

    async fn authenticate_session(&mut self) -> Result<()> {
        let Some(credentials) = self.credentials.clone() else {
            return Err(Error::LoggedOut);
        };

        let attempts = self.retry.max_attempts.max(1);
        let mut last_failure = LoginFailure::Rejected("no attempt made".to_string());

        for attempt in 0..attempts {
            self.state = SessionState::NeedToken;
            let token = match self.fetch_token().await {
                Ok(token) => token,
                Err(e) => {
                    self.state = SessionState::Failed;
                    return Err(e);
                }
            };
            self.state = SessionState::HaveToken(token.clone());

            match self.submit_login(&credentials, &token).await {
                Ok(()) => {
                    self.state = SessionState::Authenticated;
                    info!(attempt, "Logged into bike-share site");
                    return Ok(());
                }
                Err(failure) => {
                    warn!(attempt, error = %failure, "Login attempt failed");
                    last_failure = failure;
                }
            }

            if attempt + 1 < attempts {
                self.retry.backoff(attempt).await;
            }
        }

        self.state = SessionState::Failed;
        Err(match last_failure {
            LoginFailure::Rejected(reason) => Error::AuthenticationFailed { reason },
            LoginFailure::Transport(e) => Error::upstream(SourceStep::Login, e),
        })
    }

    /// Obtain a one-time anti-forgery token from the login page
    async fn fetch_token(&self) -> Result<String> {
        let fetcher = &self.fetcher;
        let login = &self.urls.login;
        let strategy = &self.token_strategy;

        with_retry(&self.retry, |_| async move {
            let page = fetcher.get(login).await.map_err(|e| e.to_string())?;
            if !same_path(&page.url, login) {
                return Err(format!("login page redirected to {}", page.url));
            }

            let token = match strategy {
                TokenStrategy::HiddenField { name } => {
                    extract_token(&page.body, name).map_err(|e| e.to_string())?
                }
                TokenStrategy::Cookie { name } => fetcher
                    .cookie(login, name)
                    .ok_or_else(|| ParseError::TokenNotFound.to_string())?,
            };
            debug!("Retrieved login token");
            Ok(token)
        })
        .await
        .map_err(|reason| Error::upstream(SourceStep::Token, reason))
    }

    async fn submit_login(
        &self,
        credentials: &SourceCredentials,
        token: &str,
    ) -> std::result::Result<(), LoginFailure> {
        let form = [
            ("_username", credentials.username.as_str()),
            ("_password", credentials.password.as_str()),
            ("_failure_path", "eightd_bike_profile__login"),
            ("ed_from_login_popup", "true"),
            (self.token_strategy.form_field(), token),
        ];

        let page = self
            .fetcher
            .post_form(&self.urls.login_check, &form)
            .await
            .map_err(LoginFailure::Transport)?;

        if page.url == self.urls.profile {
            Ok(())
        } else {
            Err(LoginFailure::Rejected(format!(
                "login redirected to {} instead of the profile page",
                page.url
            )))
        }
    }

    /// Fetch an authenticated page and extract a value from it
    ///
    /// Re-authenticates whenever the site answers with its login page, and
    /// retries the same request until the step's attempts are exhausted.
    async fn fetch_authenticated<T, F>(&mut self, step: SourceStep, url: &Url, extract: F) -> Result<T>
    where
        F: Fn(&str) -> std::result::Result<T, ParseError>,
    {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::from("no attempt made");

        for attempt in 0..attempts {
            if !self.state.is_authenticated() {
                self.authenticate_session().await?;
            }

            match self.fetcher.get(url).await {
                Ok(page) if same_path(&page.url, &self.urls.login) => {
                    warn!(%step, attempt, "Session logged out, logging in again");
                    self.state = SessionState::NeedToken;
                    last_error = FetchError::LoggedOut.to_string();
                    continue;
                }
                Ok(Page { url: landed, .. }) if landed != *url => {
                    last_error = FetchError::UnexpectedUrl(landed.to_string()).to_string();
                }
                Ok(page) => match extract(&page.body) {
                    Ok(value) => return Ok(value),
                    Err(e) => last_error = e.to_string(),
                },
                Err(e) => last_error = e.to_string(),
            }

            warn!(%step, attempt, error = %last_error, "Source step failed");
            if attempt + 1 < attempts {
                self.retry.backoff(attempt).await;
            }
        }

        Err(Error::upstream(step, last_error))
    }

    /// Station roster indexed for trip parsing, fetched once per client
    async fn station_index(&mut self) -> Result<Arc<StationIndex>> {
        if let Some(index) = &self.stations {
            return Ok(Arc::clone(index));
        }
        self.fetch_stations().await?;
        self.stations
            .clone()
            .ok_or_else(|| Error::upstream(SourceStep::Stations, "station roster missing"))
    }

    async fn fetch_stations(&mut self) -> Result<Vec<Station>> {
        let fetcher = &self.fetcher;
        let url = &self.urls.stations;

        let stations = with_retry(&self.retry, |_| async move {
            let page = fetcher.get(url).await.map_err(|e| e.to_string())?;
            parse_stations(&page.body).map_err(|e| e.to_string())
        })
        .await
        .map_err(|reason| Error::upstream(SourceStep::Stations, reason))?;

        debug!(count = stations.len(), "Retrieved stations");
        self.stations = Some(Arc::new(StationIndex::new(stations.clone())));
        Ok(stations)
    }

    async fn member_id(&mut self) -> Result<String> {
        let profile = self.urls.profile.clone();
        let member_id = self
            .fetch_authenticated(SourceStep::MemberId, &profile, extract_member_id)
            .await?;
        debug!(member_id = %member_id, "Retrieved member id");
        Ok(member_id)
    }

    async fn last_page(&mut self, member_id: &str) -> Result<u32> {
        let url = self.urls.trip_page(member_id, None)?;
        let last = self
            .fetch_authenticated(SourceStep::LastPage, &url, |body| {
                Ok(extract_last_page(body).unwrap_or(0))
            })
            .await?;
        debug!(last_page = last, "Retrieved last trip page number");
        Ok(last)
    }

    async fn page_trips(
        &mut self,
        member_id: &str,
        page: u32,
        stations: &StationIndex,
    ) -> Result<Vec<Trip>> {
        let url = self.urls.trip_page(member_id, Some(page))?;
        let parser = self.parser.clone();
        let trips = self
            .fetch_authenticated(SourceStep::TripPage(page), &url, |body| {
                parser.parse_page(body, stations)
            })
            .await?;
        debug!(page, count = trips.len(), "Retrieved trips from page");
        Ok(trips)
    }
}

#[async_trait]
impl TripSource for SourceClient {
    async fn authenticate(&mut self) -> Result<()> {
        if self.state.is_authenticated() {
            return Ok(());
        }
        self.authenticate_session().await
    }

    async fn stations(&mut self) -> Result<Vec<Station>> {
        self.fetch_stations().await
    }

    /// Walk trip history newest-first until a trip at or below `min_id`
    async fn trips(&mut self, min_id: TripId) -> Result<Vec<Trip>> {
        if self.credentials.is_none() {
            return Err(Error::LoggedOut);
        }

        let stations = self.station_index().await?;
        let member_id = self.member_id().await?;
        let last = self.last_page(&member_id).await?;

        let mut trips = Vec::new();
        for page in 0..=last {
            for trip in self.page_trips(&member_id, page, &stations).await? {
                if trip.id <= min_id {
                    debug!(count = trips.len(), page, "Reached already imported trips");
                    return Ok(trips);
                }
                trips.push(trip);
            }
        }

        debug!(count = trips.len(), "Retrieved trips");
        Ok(trips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_urls_join() {
        let urls = SiteUrls::new(&SourceConfig::default()).unwrap();
        assert_eq!(urls.login.as_str(), "https://member.citibikenyc.com/profile/login");
        assert_eq!(urls.profile.as_str(), "https://member.citibikenyc.com/profile/");

        let page = urls.trip_page("abc123", Some(2)).unwrap();
        assert_eq!(
            page.as_str(),
            "https://member.citibikenyc.com/profile/trips/abc123?pageNumber=2"
        );
        let first = urls.trip_page("abc123", None).unwrap();
        assert_eq!(first.as_str(), "https://member.citibikenyc.com/profile/trips/abc123");
    }

    #[test]
    fn test_same_path_ignores_query() {
        let a = Url::parse("https://example.com/profile/login?_target=x").unwrap();
        let b = Url::parse("https://example.com/profile/login").unwrap();
        let c = Url::parse("https://example.com/profile/").unwrap();
        assert!(same_path(&a, &b));
        assert!(!same_path(&a, &c));
    }

    #[tokio::test]
    async fn test_trips_without_credentials_is_logged_out() {
        let mut client = SourceClient::new(&SourceConfig::default(), None).unwrap();
        let result = client.trips(0).await;
        assert!(matches!(result, Err(Error::LoggedOut)));
        assert!(matches!(client.authenticate().await, Err(Error::LoggedOut)));
    }
}

//! Authenticated, cookie-carrying HTTP session against the listing site

use geofinds_domain::{ListingError, TokenKind};
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER};
use reqwest::{Client, Proxy, Response, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use super::markers;
use super::rate_limit::RequestLimiter;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/110.0";

/// Connection settings for the listing site
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Site root, e.g. `https://www.geocaching.com`
    pub base_url: String,
    /// Disable the one-request-per-second limiter and the randomized pauses
    pub unthrottle: bool,
    /// Route all traffic through this proxy
    pub proxy_url: Option<String>,
    pub timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.geocaching.com".to_string(),
            unthrottle: false,
            proxy_url: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Sign-in credentials, held only in memory
#[derive(Clone)]
pub struct Credentials {
    pub username: SecretString,
    pub password: SecretString,
}

fn transport(purpose: &str, e: reqwest::Error) -> ListingError {
    ListingError::Transport(format!("{}: {}", purpose, e))
}

/// HTTP session shared by every request the client makes
pub struct Session {
    client: Client,
    base_url: String,
    limiter: RequestLimiter,
}

impl Session {
    pub fn new(config: &SessionConfig) -> Result<Self, ListingError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let site = Url::parse(&base_url)
            .map_err(|e| ListingError::Transport(format!("Invalid base URL {}: {}", base_url, e)))?;

        // Ask for the largest page size the site offers
        let jar = Arc::new(Jar::default());
        jar.add_cookie_str("BMItemsPerPage=1000; Path=/", &site);

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-GB,en;q=0.5"),
        );

        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .cookie_provider(jar)
            .timeout(config.timeout);

        if let Some(proxy_url) = config.proxy_url.as_deref().filter(|p| !p.is_empty()) {
            tracing::info!(proxy = %proxy_url, "Connecting through proxy");
            let proxy = Proxy::all(proxy_url)
                .map_err(|e| ListingError::Transport(format!("Invalid proxy URL: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ListingError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        let limiter = if config.unthrottle {
            RequestLimiter::unthrottled()
        } else {
            RequestLimiter::new(Duration::from_secs(1))
        };

        Ok(Self {
            client,
            base_url,
            limiter,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn limiter(&self) -> &RequestLimiter {
        &self.limiter
    }

    /// Sign in: read the anti-forgery token, then submit the credentials form
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<(), ListingError> {
        let signin_url = self.url("/account/signin");

        let page = self
            .get_text("sign-in page", &signin_url, &[], "text/html")
            .await?;
        let token = markers::extract(TokenKind::RequestVerification, &page, "sign-in page")?;

        let form = [
            ("__RequestVerificationToken", token),
            ("ReturnUrl", "/play"),
            (
                "UsernameOrEmail",
                credentials.username.expose_secret(),
            ),
            ("Password", credentials.password.expose_secret()),
        ];

        self.limiter.acquire().await;
        tracing::debug!(url = %signin_url, "Request: sign-in submission");
        let response = self
            .client
            .post(&signin_url)
            .header(ACCEPT, "text/html")
            .header(REFERER, self.url("/account/signin?returnUrl=%2fplay"))
            .form(&form)
            .send()
            .await
            .map_err(|e| ListingError::Authentication(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ListingError::Authentication(format!(
                "Sign-in returned {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ListingError::Authentication(format!("Couldn't read body: {}", e)))?;

        if markers::is_auth_rejected(&body) {
            return Err(ListingError::Authentication(
                "Anti-Forgery Token is invalid".to_string(),
            ));
        }

        if !markers::is_logged_in(&body) {
            return Err(ListingError::Authentication(
                "Sign-in response does not show a signed-in session".to_string(),
            ));
        }

        tracing::info!(site = %self.base_url, "Authenticated");
        Ok(())
    }

    /// Rate-limited GET returning the body as text
    pub async fn get_text(
        &self,
        purpose: &'static str,
        url: &str,
        query: &[(&str, String)],
        accept: &'static str,
    ) -> Result<String, ListingError> {
        let response = self.get(purpose, url, query, accept).await?;
        response.text().await.map_err(|e| transport(purpose, e))
    }

    /// Rate-limited GET decoding a JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        purpose: &'static str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ListingError> {
        let body = self.get_text(purpose, url, query, "application/json").await?;
        serde_json::from_str(&body)
            .map_err(|e| ListingError::Decode(format!("{}: {}", purpose, e)))
    }

    async fn get(
        &self,
        purpose: &'static str,
        url: &str,
        query: &[(&str, String)],
        accept: &'static str,
    ) -> Result<Response, ListingError> {
        self.limiter.acquire().await;
        tracing::debug!(url = %url, "Request: {}", purpose);

        let response = self
            .client
            .get(url)
            .query(query)
            .header(ACCEPT, accept)
            .header(REFERER, self.url("/play"))
            .send()
            .await
            .map_err(|e| transport(purpose, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ListingError::Transport(format!(
                "{} returned {}",
                purpose, status
            )));
        }

        Ok(response)
    }
}

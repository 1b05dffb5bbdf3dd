//! HTTP fetching and response classification.

use std::time::Duration;

use reqwest::header::{HeaderValue, CONTENT_TYPE, LOCATION};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use url::Url;

use crate::config::{BasicAuth, Settings};
use crate::models::{is_accepted, Response};
use crate::url_utils;

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Host is not in the crawl allow-list: {0}")]
    CannotCrawl(String),

    #[error("Resource not found (404)")]
    NotFound,

    #[error("Retry request: 5XX HTTP response returned")]
    Retry5xx,

    #[error("Retry request: 429 HTTP response returned")]
    Retry429,

    #[error("Redirect response missing Location header")]
    MissingLocation,

    #[error("Content type not accepted: {0}")]
    ContentTypeNotAccepted(String),

    #[error("Unexpected HTTP status: {0}")]
    UnexpectedStatus(StatusCode),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl CrawlError {
    /// Transient failures go back on the queue; everything else is dropped.
    pub fn should_requeue(&self) -> bool {
        matches!(self, CrawlError::Retry5xx | CrawlError::Retry429)
    }
}

/// The fetching half of the pipeline: one shared HTTP client plus the
/// allow-list discipline and status classification of a crawl request.
#[derive(Debug, Clone)]
pub struct Crawler {
    client: Client,
    roots: Vec<Url>,
    basic_auth: Option<BasicAuth>,
    rate_limit_token: Option<String>,
}

impl Crawler {
    pub fn new(
        user_agent: &str,
        roots: Vec<Url>,
        basic_auth: Option<BasicAuth>,
        rate_limit_token: Option<String>,
    ) -> Result<Self, CrawlError> {
        // Redirects are never followed transparently: the 3xx branch in
        // `crawl` synthesizes a body so the destination gets harvested.
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            roots,
            basic_auth,
            rate_limit_token,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, CrawlError> {
        Self::new(
            &settings.user_agent(),
            settings.root_urls.clone(),
            settings.basic_auth.clone(),
            settings.rate_limit_token.clone(),
        )
    }

    /// Fetch a URL and classify the outcome.
    ///
    /// 2xx bodies with an accepted content type come back as a [`Response`];
    /// 3xx responses come back as a synthesized HTML body pointing at the
    /// `Location` target so the redirect destination enters the frontier.
    pub async fn crawl(&self, url: &Url) -> Result<Response, CrawlError> {
        let mut request = self.client.get(url.clone());

        if let Some(auth) = &self.basic_auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }
        if let Some(token) = &self.rate_limit_token {
            request = request.header("Rate-Limit-Token", token);
        }

        let response = request.send().await?;
        let final_url = response.url().clone();

        if !url_utils::host_allowed(&final_url, &self.roots) {
            return Err(CrawlError::CannotCrawl(final_url.to_string()));
        }

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CrawlError::Retry429);
        }
        if status.is_server_error() {
            return Err(CrawlError::Retry5xx);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(CrawlError::NotFound);
        }
        if matches!(status.as_u16(), 301 | 302 | 303 | 307) {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or(CrawlError::MissingLocation)?;

            return Ok(Response {
                body: redirect_body(location).into_bytes(),
                mime: mime::TEXT_HTML,
                final_url,
                from_redirect: true,
            });
        }
        if !status.is_success() {
            return Err(CrawlError::UnexpectedStatus(status));
        }

        let mime = parse_content_type(response.headers().get(CONTENT_TYPE));
        if !is_accepted(&mime) {
            return Err(CrawlError::ContentTypeNotAccepted(mime.to_string()));
        }

        let body = response.bytes().await?;

        Ok(Response {
            body: body.to_vec(),
            mime,
            final_url,
            from_redirect: false,
        })
    }
}

fn parse_content_type(header: Option<&HeaderValue>) -> mime::Mime {
    header
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

/// Tiny HTML body standing in for a redirect: a meta-refresh plus an anchor,
/// so the extractor harvests the destination like any other link.
fn redirect_body(location: &str) -> String {
    format!(
        "<html><head><meta http-equiv=\"refresh\" content=\"1;url={location}\"></head>\
         <body><a href=\"{location}\">Redirecting to {location}</a></body></html>"
    )
}

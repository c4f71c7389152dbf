use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::queue::{Page, RecordSource, SourceFetchError};

use super::error_mapping::{map_reqwest_error, map_status};
use super::retry::{run_with_retry, RetryPolicy};

pub const DEFAULT_MAX_REQUESTS_PER_SECOND: NonZeroU32 = nonzero!(10u32);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const PAGE_RESOURCE: &str = "records page";

/// Request budget shared by every fetch (and every retry) issued through one source.
pub type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

pub fn build_rate_limiter(max_requests_per_second: NonZeroU32) -> SharedRateLimiter {
    Arc::new(RateLimiter::direct(Quota::per_second(
        max_requests_per_second,
    )))
}

#[derive(Error, Debug)]
pub enum HttpSourceError {
    #[error("invalid archive API url {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error(transparent)]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub retry_policy: RetryPolicy,
    pub max_requests_per_second: Option<NonZeroU32>,
}

impl HttpSourceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_policy: RetryPolicy::default(),
            max_requests_per_second: Some(DEFAULT_MAX_REQUESTS_PER_SECOND),
        }
    }
}

/// Wire shape of `GET {base_url}/records`.
#[derive(Deserialize, Serialize, Debug)]
#[serde(bound(deserialize = "R: DeserializeOwned"))]
pub struct PageBody<R> {
    #[serde(default = "Vec::new")]
    pub records: Vec<R>,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

/// Record source backed by the archive REST API.
///
/// Paging is offset based: `offset` and `limit` go on the query string next to the serialized
/// filter. Retries and rate limiting live here so the queue controller never has to care.
pub struct HttpRecordSource {
    client: reqwest::Client,
    base_url: String,
    retry_policy: RetryPolicy,
    rate_limiter: Option<SharedRateLimiter>,
}

impl HttpRecordSource {
    pub fn new(config: HttpSourceConfig) -> Result<Self, HttpSourceError> {
        let base_url = normalize_base_url(&config.base_url)?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url,
            retry_policy: config.retry_policy,
            rate_limiter: config.max_requests_per_second.map(build_rate_limiter),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch_once<R, F>(
        &self,
        offset: usize,
        page_size: usize,
        filter: &F,
    ) -> Result<Page<R>, SourceFetchError>
    where
        R: DeserializeOwned,
        F: Serialize + ?Sized,
    {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let url = format!("{}/records", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("offset", offset), ("limit", page_size)])
            .query(filter)
            .send()
            .await
            .map_err(|err| map_reqwest_error(err, PAGE_RESOURCE))?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status.as_u16(), PAGE_RESOURCE));
        }

        let body = response
            .json::<PageBody<R>>()
            .await
            .map_err(|err| map_reqwest_error(err, PAGE_RESOURCE))?;
        Ok(Page::new(body.records, body.has_more))
    }
}

impl<R, F> RecordSource<R, F> for HttpRecordSource
where
    R: DeserializeOwned + Send + 'static,
    F: Serialize + Sync,
{
    fn fetch_page<'a>(
        &'a self,
        offset: usize,
        page_size: usize,
        filter: &'a F,
    ) -> BoxFuture<'a, Result<Page<R>, SourceFetchError>> {
        Box::pin(async move {
            let result = run_with_retry(
                &self.retry_policy,
                offset as u64,
                |_| self.fetch_once(offset, page_size, filter),
                |err| err.is_retryable(),
            )
            .await;

            match result {
                Ok((page, attempts)) => {
                    if attempts > 1 {
                        debug!(
                            event = "record_source_recovered",
                            offset, attempts, "page fetch succeeded after retry"
                        );
                    }
                    Ok(page)
                }
                Err(exhausted) => {
                    warn!(
                        event = "record_source_gave_up",
                        offset,
                        attempts = exhausted.attempts,
                        budget_spent = exhausted.budget_spent,
                        error_kind = exhausted.error.kind.as_str(),
                        "page fetch failed"
                    );
                    Err(exhausted.error)
                }
            }
        })
    }
}

pub(crate) fn normalize_base_url(raw: &str) -> Result<String, HttpSourceError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = reqwest::Url::parse(trimmed).map_err(|err| HttpSourceError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(HttpSourceError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {}", parsed.scheme()),
        });
    }
    Ok(trimmed.to_string())
}

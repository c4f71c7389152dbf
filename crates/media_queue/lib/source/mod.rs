mod error_mapping;
mod http;
mod retry;

pub use error_mapping::{map_reqwest_error, map_status};
pub use http::{
    build_rate_limiter, HttpRecordSource, HttpSourceConfig, HttpSourceError, PageBody,
    SharedRateLimiter, DEFAULT_MAX_REQUESTS_PER_SECOND,
};
pub(crate) use http::normalize_base_url;
pub use retry::{backoff_delay, run_with_retry, RetryExhausted, RetryPolicy};

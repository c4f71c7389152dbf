use tracing::debug;

use crate::queue::{SourceFetchError, SourceFetchErrorKind};

/// Classifies a non-success HTTP status from the archive API.
pub fn map_status(status: u16, resource: &str) -> SourceFetchError {
    let kind = match status {
        401 => SourceFetchErrorKind::Unauthorized,
        403 => SourceFetchErrorKind::Forbidden,
        408 => SourceFetchErrorKind::Network,
        429 => SourceFetchErrorKind::RateLimited,
        500..=599 => SourceFetchErrorKind::UpstreamUnavailable,
        _ => SourceFetchErrorKind::Other,
    };
    SourceFetchError::new(kind, format!("HTTP {status} while fetching {resource}"))
}

/// Classifies a transport or decode failure raised by `reqwest`.
pub fn map_reqwest_error(err: reqwest::Error, resource: &str) -> SourceFetchError {
    debug!(
        event = "record_source_transport_error",
        resource,
        is_timeout = err.is_timeout(),
        is_connect = err.is_connect(),
        is_decode = err.is_decode(),
        status = err.status().map(|status| status.as_u16()),
        "reqwest error details"
    );

    if let Some(status) = err.status() {
        return map_status(status.as_u16(), resource);
    }

    if err.is_decode() {
        return SourceFetchError::new(
            SourceFetchErrorKind::MalformedResponse,
            format!("could not decode {resource}: {err}"),
        );
    }

    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        return SourceFetchError::new(
            SourceFetchErrorKind::Network,
            format!("network error while fetching {resource}: {err}"),
        );
    }

    SourceFetchError::new(SourceFetchErrorKind::Other, format!("{err:#}"))
}

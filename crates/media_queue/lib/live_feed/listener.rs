use eventsource_client::{Client, ClientBuilder, SSE};
use flume::Sender;
use futures_util::StreamExt;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::server::monitoring::LIVE_FEED_METRICS;
use crate::source::normalize_base_url;

pub const RECORD_EVENT: &str = "record";
const KEEP_ALIVE_EVENT: &str = "keep-alive";

#[derive(Error, Debug)]
pub enum LiveFeedError {
    #[error("invalid live feed url: {0}")]
    InvalidUrl(String),
    #[error("connection error: {0}")]
    Connect(String),
}

/// Subscribes to the archive's server-sent event stream of newly-created records.
pub struct LiveFeedListener {
    stream_url: String,
}

impl LiveFeedListener {
    /// Builds `{base_url}/records/stream` with the session filter on the query string, so the
    /// feed only pushes records the current session would have paged in.
    ///
    /// The base URL is validated the same way the HTTP record source validates it.
    pub fn new<F>(base_url: &str, filter: &F) -> Result<Self, LiveFeedError>
    where
        F: Serialize + ?Sized,
    {
        let base = normalize_base_url(base_url)
            .map_err(|err| LiveFeedError::InvalidUrl(err.to_string()))?;
        let mut url = Url::parse(&format!("{base}/records/stream"))
            .map_err(|err| LiveFeedError::InvalidUrl(err.to_string()))?;

        let pairs = filter_query_pairs(filter)?;
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }

        Ok(Self {
            stream_url: url.to_string(),
        })
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    /// Forwards decoded records to `tx` until the stream ends, the receiver goes away, or
    /// `cancel_token` fires.
    pub async fn listen<R>(
        &self,
        tx: Sender<R>,
        cancel_token: CancellationToken,
    ) -> Result<(), LiveFeedError>
    where
        R: DeserializeOwned + Send,
    {
        let client = ClientBuilder::for_url(&self.stream_url)
            .map_err(|err| LiveFeedError::Connect(format!("{err:?}")))?
            .build();
        let mut stream = client.stream();
        info!(event = "live_feed_subscribed", url = %self.stream_url, "listening for new records");

        loop {
            tokio::select! {
                next = stream.next() => {
                    let Some(event) = next else {
                        info!(event = "live_feed_ended", "live feed stream ended");
                        break;
                    };
                    match event {
                        Ok(SSE::Event(ev)) if ev.event_type == RECORD_EVENT => {
                            if let Some(metrics) = LIVE_FEED_METRICS.get() {
                                metrics.events_received_total.inc();
                            }
                            match serde_json::from_str::<R>(&ev.data) {
                                Ok(record) => {
                                    if tx.send_async(record).await.is_err() {
                                        debug!(event = "live_feed_receiver_closed", "no consumer left for live records");
                                        break;
                                    }
                                }
                                Err(err) => {
                                    if let Some(metrics) = LIVE_FEED_METRICS.get() {
                                        metrics.decode_failures_total.inc();
                                    }
                                    warn!(event = "live_feed_decode_failed", error = %err, "could not decode live record");
                                }
                            }
                        }
                        Ok(SSE::Event(ev)) if ev.event_type == KEEP_ALIVE_EVENT => {
                            debug!("keep-alive");
                        }
                        Ok(SSE::Event(ev)) => {
                            debug!(event = "live_feed_event_ignored", event_type = %ev.event_type, "ignoring event");
                        }
                        Ok(_) => {}
                        Err(err) => {
                            error!(event = "live_feed_stream_error", error = ?err, "live feed stream error");
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    info!(event = "live_feed_cancelled", "cancellation token triggered, leaving live feed");
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Flattens a filter into query pairs. Unset fields are skipped.
fn filter_query_pairs<F>(filter: &F) -> Result<Vec<(String, String)>, LiveFeedError>
where
    F: Serialize + ?Sized,
{
    let fields = match serde_json::to_value(filter) {
        Ok(Value::Object(fields)) => fields,
        Ok(Value::Null) => return Ok(Vec::new()),
        Ok(other) => {
            return Err(LiveFeedError::InvalidUrl(format!(
                "filter must serialize to an object, got {other}"
            )))
        }
        Err(err) => return Err(LiveFeedError::InvalidUrl(err.to_string())),
    };

    Ok(fields
        .into_iter()
        .filter_map(|(name, value)| match value {
            Value::Null => None,
            Value::String(text) => Some((name, text)),
            other => Some((name, other.to_string())),
        })
        .collect())
}

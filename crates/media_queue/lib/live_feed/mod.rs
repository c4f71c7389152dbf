pub mod listener;

pub use listener::{LiveFeedError, LiveFeedListener, RECORD_EVENT};

use flume::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::queue::{MediaQueue, Record, RecordSource};
use crate::server::monitoring::LIVE_FEED_METRICS;

/// Drains pushed records into the queue's head until the channel closes or `cancel_token`
/// fires. Returns how many records were actually prepended.
pub async fn pump_live_records<R, F, S>(
    queue: MediaQueue<R, F, S>,
    records: Receiver<R>,
    cancel_token: CancellationToken,
) -> usize
where
    R: Record + Send + Sync + 'static,
    F: Send + Sync + 'static,
    S: RecordSource<R, F> + 'static,
{
    let mut prepended = 0usize;
    loop {
        tokio::select! {
            next = records.recv_async() => {
                let Ok(record) = next else {
                    debug!(event = "live_pump_channel_closed", "live record channel closed");
                    break;
                };
                let record_id = record.record_id();
                if queue.prepend_record(record) {
                    prepended += 1;
                    if let Some(metrics) = LIVE_FEED_METRICS.get() {
                        metrics.records_prepended_total.inc();
                    }
                    debug!(event = "live_record_prepended", record_id = ?record_id, cursor = queue.cursor(), "prepended live record");
                } else {
                    if let Some(metrics) = LIVE_FEED_METRICS.get() {
                        metrics.records_ignored_total.inc();
                    }
                    debug!(event = "live_record_ignored", record_id = ?record_id, "live record already queued");
                }
            }
            _ = cancel_token.cancelled() => {
                break;
            }
        }
    }

    info!(event = "live_pump_stopped", prepended, "live record pump stopped");
    prepended
}

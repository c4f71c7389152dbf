use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::server::monitoring::QUEUE_METRICS;

use super::record::Record;
use super::source::RecordSource;
use super::state::{LoadTicket, QueueState};
use super::types::{LoadOutcome, QueueConfig, QueueSnapshot, SkipReason};

/// Navigable cursor over a server-backed, growing sequence of records.
///
/// Navigation and real-time insertion are synchronous. The only asynchronous work is a page
/// fetch, and at most one is ever in flight: the guard is checked and set inside one critical
/// section before the fetch is issued. Background prefetches run on the ambient tokio runtime.
///
/// The handle is cheap to clone; clones share one session.
pub struct MediaQueue<R, F, S>
where
    R: Record,
{
    inner: Arc<Inner<R, F, S>>,
}

struct Inner<R, F, S>
where
    R: Record,
{
    source: S,
    filter: F,
    config: QueueConfig,
    state: Mutex<QueueState<R>>,
    revision: watch::Sender<u64>,
    shutdown: CancellationToken,
}

impl<R, F, S> Inner<R, F, S>
where
    R: Record,
{
    fn lock(&self) -> MutexGuard<'_, QueueState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        self.revision
            .send_modify(|revision| *revision = revision.wrapping_add(1));
    }
}

/// Holds the in-flight guard for one load. If the load future is dropped before the response
/// is applied, the guard is released so later loads are not skipped forever.
struct InFlightGuard<'a, R, F, S>
where
    R: Record,
{
    inner: &'a Inner<R, F, S>,
    ticket: Option<LoadTicket>,
}

impl<R, F, S> InFlightGuard<'_, R, F, S>
where
    R: Record,
{
    fn disarm(&mut self) {
        self.ticket = None;
    }
}

impl<R, F, S> Drop for InFlightGuard<'_, R, F, S>
where
    R: Record,
{
    fn drop(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };
        debug!(
            event = "queue_fetch_abandoned",
            offset = ticket.offset,
            generation = ticket.generation,
            "load dropped before its page arrived"
        );
        self.inner.lock().abandon_load(ticket);
        self.inner.touch();
    }
}

impl<R, F, S> Clone for MediaQueue<R, F, S>
where
    R: Record,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, F, S> MediaQueue<R, F, S>
where
    R: Record + Send + Sync + 'static,
    F: Send + Sync + 'static,
    S: RecordSource<R, F> + 'static,
{
    /// Starts a session from an initial batch (typically the server-rendered first page).
    pub fn new(source: S, filter: F, initial: Vec<R>, config: QueueConfig) -> Self {
        let (state, duplicates) = QueueState::new(initial);
        if duplicates > 0 {
            debug!(
                event = "queue_initial_duplicates_dropped",
                duplicates, "dropped duplicate records from initial batch"
            );
        }
        let (revision, _) = watch::channel(0);

        Self {
            inner: Arc::new(Inner {
                source,
                filter,
                config,
                state: Mutex::new(state),
                revision,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<R>> {
        self.inner.lock()
    }

    fn touch(&self) {
        self.inner.touch();
    }

    pub fn config(&self) -> QueueConfig {
        self.inner.config
    }

    pub fn filter(&self) -> &F {
        &self.inner.filter
    }

    pub fn cursor(&self) -> usize {
        self.lock().cursor()
    }

    pub fn len(&self) -> usize {
        self.lock().sequence().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_exhausted(&self) -> bool {
        self.lock().is_exhausted()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().is_loading()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_closed()
    }

    /// Receiver that observes a revision counter bumped after every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// Fetches the next page unless a fetch is already running, the source is exhausted, or
    /// the session is closed.
    ///
    /// Failures never escape as errors: they are logged, kept as the snapshot's `last_error`,
    /// and returned as [`LoadOutcome::Failed`]. Retrying is the caller's decision.
    ///
    /// Dropping the future mid-fetch releases the in-flight guard, so callers may race it
    /// against a timeout or a shutdown signal.
    pub async fn load_more(&self) -> LoadOutcome {
        match self.begin_load() {
            Ok(ticket) => self.run_load(ticket).await,
            Err(reason) => LoadOutcome::Skipped(reason),
        }
    }

    fn begin_load(&self) -> Result<LoadTicket, SkipReason> {
        let ticket = self.lock().begin_load()?;
        if let Some(metrics) = QUEUE_METRICS.get() {
            metrics.fetches_started_total.inc();
        }
        self.touch();
        Ok(ticket)
    }

    async fn run_load(&self, ticket: LoadTicket) -> LoadOutcome {
        let page_size = self.inner.config.effective_page_size();
        debug!(
            event = "queue_fetch_started",
            offset = ticket.offset,
            page_size,
            generation = ticket.generation,
            "requesting next page"
        );

        let mut guard = InFlightGuard {
            inner: &self.inner,
            ticket: Some(ticket),
        };
        let result = self
            .inner
            .source
            .fetch_page(ticket.offset, page_size, &self.inner.filter)
            .await;

        let (outcome, len) = {
            let mut state = self.lock();
            guard.disarm();
            let outcome = state.complete_load(ticket, result);
            (outcome, state.sequence().len())
        };

        self.record_outcome(&ticket, &outcome, len);
        if outcome != LoadOutcome::Discarded {
            self.touch();
        }
        outcome
    }

    fn record_outcome(&self, ticket: &LoadTicket, outcome: &LoadOutcome, len: usize) {
        let metrics = QUEUE_METRICS.get();
        match outcome {
            LoadOutcome::Loaded {
                admitted,
                duplicates,
                exhausted,
            } => {
                debug!(
                    event = "queue_fetch_completed",
                    offset = ticket.offset,
                    admitted,
                    duplicates,
                    exhausted,
                    len,
                    "page admitted"
                );
                if *exhausted {
                    info!(event = "queue_exhausted", len, "record source has no more pages");
                }
                if let Some(metrics) = metrics {
                    metrics.records_admitted_total.inc_by(*admitted as u64);
                    metrics.duplicates_dropped_total.inc_by(*duplicates as u64);
                    metrics.sequence_length.set(len as i64);
                }
            }
            LoadOutcome::Failed(err) => {
                warn!(
                    event = "queue_fetch_failed",
                    offset = ticket.offset,
                    error_kind = err.kind.as_str(),
                    error = %err.message,
                    "page fetch failed; queue left unchanged"
                );
                if let Some(metrics) = metrics {
                    metrics.fetches_failed_total.inc();
                }
            }
            LoadOutcome::Discarded => {
                debug!(
                    event = "queue_fetch_discarded",
                    offset = ticket.offset,
                    generation = ticket.generation,
                    "dropping response for a closed session"
                );
                if let Some(metrics) = metrics {
                    metrics.fetches_discarded_total.inc();
                }
            }
            LoadOutcome::Skipped(_) => {}
        }
    }

    /// Starts a background load if the guard allows one. Never blocks the caller.
    fn spawn_prefetch(&self) {
        let Ok(ticket) = self.begin_load() else {
            return;
        };

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                warn!(
                    event = "queue_prefetch_abandoned",
                    error = %err,
                    "no async runtime available for prefetch"
                );
                self.lock().abandon_load(ticket);
                self.touch();
                return;
            }
        };

        let queue = self.clone();
        let shutdown = self.inner.shutdown.clone();
        runtime.spawn(async move {
            tokio::select! {
                _ = queue.run_load(ticket) => {}
                _ = shutdown.cancelled() => {
                    debug!(
                        event = "queue_prefetch_cancelled",
                        offset = ticket.offset,
                        "session closed before prefetch completed"
                    );
                }
            }
        });
    }

    fn after_move(&self, wants_prefetch: bool) {
        self.touch();
        if wants_prefetch {
            self.spawn_prefetch();
        }
    }

    pub fn go_to_next(&self) {
        let wants_prefetch = {
            let mut state = self.lock();
            state.go_to_next();
            state.wants_prefetch(self.inner.config.lookahead_window)
        };
        self.after_move(wants_prefetch);
    }

    /// Moves back one record. Loading is only ever needed ahead, so this never prefetches.
    pub fn go_to_previous(&self) {
        self.lock().go_to_previous();
        self.touch();
    }

    /// Jumps to `index`, clamped into the sequence, then applies the lookahead trigger.
    pub fn set_cursor(&self, index: usize) {
        let wants_prefetch = {
            let mut state = self.lock();
            state.set_cursor(index);
            state.wants_prefetch(self.inner.config.lookahead_window)
        };
        self.after_move(wants_prefetch);
    }

    /// Inserts a newly-arrived record at the head. Returns `false` if its id was already
    /// admitted. The cursor keeps pointing at the record the user was viewing.
    pub fn prepend_record(&self, record: R) -> bool {
        let (inserted, len) = {
            let mut state = self.lock();
            let inserted = state.prepend(record);
            (inserted, state.sequence().len())
        };
        if inserted {
            if let Some(metrics) = QUEUE_METRICS.get() {
                metrics.records_admitted_total.inc();
                metrics.sequence_length.set(len as i64);
            }
            self.touch();
        }
        inserted
    }

    /// Ends the session. In-flight fetches are cancelled or, if they still complete, discarded.
    pub fn close(&self) {
        let generation = {
            let mut state = self.lock();
            state.close();
            state.generation()
        };
        self.inner.shutdown.cancel();
        info!(event = "queue_closed", generation, "media queue session closed");
        self.touch();
    }
}

impl<R, F, S> MediaQueue<R, F, S>
where
    R: Record + Clone + Send + Sync + 'static,
    F: Send + Sync + 'static,
    S: RecordSource<R, F> + 'static,
{
    pub fn current(&self) -> Option<R> {
        self.lock().current().cloned()
    }

    pub fn snapshot(&self) -> QueueSnapshot<R> {
        let state = self.lock();
        QueueSnapshot {
            sequence: state.sequence().to_vec(),
            cursor: state.cursor(),
            exhausted: state.is_exhausted(),
            loading: state.is_loading(),
            last_error: state.last_error().cloned(),
        }
    }
}

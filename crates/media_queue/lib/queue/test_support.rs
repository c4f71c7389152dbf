use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Semaphore;

use super::error::{SourceFetchError, SourceFetchErrorKind};
use super::record::Record;
use super::types::Page;
use super::{MediaQueue, RecordSource};

pub(crate) type TestFilter = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TestRecord {
    pub id: i64,
    pub caption: String,
}

impl Record for TestRecord {
    type Id = i64;

    fn record_id(&self) -> i64 {
        self.id
    }
}

pub(crate) fn rec(id: i64) -> TestRecord {
    TestRecord {
        id,
        caption: format!("record-{id}"),
    }
}

pub(crate) fn recs(ids_in: &[i64]) -> Vec<TestRecord> {
    ids_in.iter().copied().map(rec).collect()
}

pub(crate) fn ids(records: &[TestRecord]) -> Vec<i64> {
    records.iter().map(|record| record.id).collect()
}

pub(crate) fn page(ids_in: &[i64], has_more: bool) -> Result<Page<TestRecord>, SourceFetchError> {
    Ok(Page::new(recs(ids_in), has_more))
}

pub(crate) fn network_failure() -> Result<Page<TestRecord>, SourceFetchError> {
    Err(SourceFetchError::new(
        SourceFetchErrorKind::Network,
        "connection reset by peer",
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FetchCall {
    pub offset: usize,
    pub page_size: usize,
    pub filter: TestFilter,
}

/// Scripted record source. Responses are served in order; an optional gate holds every fetch
/// until the test releases it, which keeps a load observably in flight.
#[derive(Default)]
pub(crate) struct MockSource {
    responses: Mutex<VecDeque<Result<Page<TestRecord>, SourceFetchError>>>,
    calls: Mutex<Vec<FetchCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    gate: Option<Semaphore>,
}

impl MockSource {
    pub(crate) fn with_responses(
        responses: Vec<Result<Page<TestRecord>, SourceFetchError>>,
    ) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            ..Self::default()
        }
    }

    pub(crate) fn gated(responses: Vec<Result<Page<TestRecord>, SourceFetchError>>) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::with_responses(responses)
        }
    }

    pub(crate) fn release(&self, fetches: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(fetches);
        }
    }

    pub(crate) fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().expect("calls mutex poisoned").len()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl RecordSource<TestRecord, TestFilter> for MockSource {
    fn fetch_page<'a>(
        &'a self,
        offset: usize,
        page_size: usize,
        filter: &'a TestFilter,
    ) -> BoxFuture<'a, Result<Page<TestRecord>, SourceFetchError>> {
        Box::pin(async move {
            self.calls
                .lock()
                .expect("calls mutex poisoned")
                .push(FetchCall {
                    offset,
                    page_size,
                    filter: filter.clone(),
                });
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(gate) = &self.gate {
                gate.acquire().await.expect("gate semaphore closed").forget();
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.responses
                .lock()
                .expect("responses mutex poisoned")
                .pop_front()
                .unwrap_or_else(|| {
                    Err(SourceFetchError::new(
                        SourceFetchErrorKind::Other,
                        format!("no scripted response for offset {offset}"),
                    ))
                })
        })
    }
}

/// Waits (bounded) until `condition` holds, re-checking on every queue revision.
pub(crate) async fn wait_until<S>(
    queue: &MediaQueue<TestRecord, TestFilter, S>,
    mut condition: impl FnMut(&MediaQueue<TestRecord, TestFilter, S>) -> bool,
) where
    S: RecordSource<TestRecord, TestFilter> + 'static,
{
    let mut revisions = queue.subscribe();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            revisions.borrow_and_update();
            if condition(queue) {
                return;
            }
            revisions
                .changed()
                .await
                .expect("queue revision sender dropped");
        }
    })
    .await
    .expect("queue did not reach expected state in time");
}

/// Lets spawned prefetch tasks on the current-thread runtime make progress.
pub(crate) async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

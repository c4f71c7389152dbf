use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{
    stream::{self, BoxStream},
    StreamExt,
};
use media_core::{MediaFilter, MediaKind, MediaRecord};
use media_queue_lib::{
    live_feed::{pump_live_records, LiveFeedListener, RECORD_EVENT},
    queue::{LoadOutcome, MediaQueue, QueueConfig, SourceFetchErrorKind},
    source::{HttpRecordSource, HttpSourceConfig, PageBody, RetryPolicy},
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

type ArchiveQueue = MediaQueue<MediaRecord, MediaFilter, Arc<HttpRecordSource>>;

#[derive(Default)]
struct MockArchiveState {
    /// Served in list order; index 0 is the newest record.
    records: Mutex<Vec<Value>>,
    requests: Mutex<Vec<HashMap<String, String>>>,
    scripted_failures: Mutex<VecDeque<u16>>,
    /// Inserted at the head right after the first page is served, shifting later offsets.
    insert_after_first_page: Mutex<Option<Value>>,
    live_events: Vec<(String, String)>,
}

impl MockArchiveState {
    fn with_records(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            records: Mutex::new(ids.into_iter().map(record_json).collect()),
            ..Self::default()
        }
    }

    fn offsets(&self) -> Vec<usize> {
        self.requests
            .lock()
            .expect("requests mutex poisoned")
            .iter()
            .map(|params| {
                params
                    .get("offset")
                    .and_then(|raw| raw.parse().ok())
                    .expect("every request should carry an offset")
            })
            .collect()
    }

    fn request_count(&self) -> usize {
        self.requests.lock().expect("requests mutex poisoned").len()
    }
}

/// In-process archive API used by the end-to-end tests.
struct MockArchive {
    base_url: String,
    state: Arc<MockArchiveState>,
    task: tokio::task::JoinHandle<()>,
}

impl MockArchive {
    async fn start(state: MockArchiveState) -> Self {
        let state = Arc::new(state);
        let app = Router::new()
            .route("/api/records", get(records_handler))
            .route("/api/records/stream", get(stream_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock archive listener");
        let addr = listener
            .local_addr()
            .expect("mock archive listener should have a local address");
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("mock archive server failed");
        });

        Self {
            base_url: format!("http://{addr}/api"),
            state,
            task,
        }
    }

    fn source(&self) -> Arc<HttpRecordSource> {
        let config = HttpSourceConfig {
            retry_policy: RetryPolicy {
                max_attempts: 3,
                ..RetryPolicy::no_retry()
            },
            max_requests_per_second: None,
            ..HttpSourceConfig::new(self.base_url.clone())
        };
        Arc::new(HttpRecordSource::new(config).expect("mock archive url should be valid"))
    }

    fn queue(&self, filter: MediaFilter, page_size: usize, lookahead_window: usize) -> ArchiveQueue {
        MediaQueue::new(
            self.source(),
            filter,
            Vec::new(),
            QueueConfig {
                page_size,
                lookahead_window,
            },
        )
    }
}

impl Drop for MockArchive {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn record_json(id: i64) -> Value {
    json!({
        "id": id,
        "channelId": 5,
        "channelName": "harbor-cams",
        "text": format!("frame {id}"),
        "postedAt": 1_700_000_000 + id,
        "media": [{"url": format!("https://cdn.example/{id}.jpg"), "kind": "photo"}]
    })
}

async fn records_handler(
    State(state): State<Arc<MockArchiveState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state
        .requests
        .lock()
        .expect("requests mutex poisoned")
        .push(params.clone());

    let scripted = state
        .scripted_failures
        .lock()
        .expect("failures mutex poisoned")
        .pop_front();
    if let Some(status) = scripted {
        let code = StatusCode::from_u16(status).expect("scripted status should be valid");
        return (code, "scripted failure").into_response();
    }

    let offset: usize = params
        .get("offset")
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0);
    let limit: usize = params
        .get("limit")
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(20);

    let body = {
        let records = state.records.lock().expect("records mutex poisoned");
        let page: Vec<Value> = records.iter().skip(offset).take(limit).cloned().collect();
        let has_more = offset + page.len() < records.len();
        PageBody {
            records: page,
            has_more,
        }
    };

    let inserted = state
        .insert_after_first_page
        .lock()
        .expect("insert mutex poisoned")
        .take();
    if let Some(inserted) = inserted {
        state
            .records
            .lock()
            .expect("records mutex poisoned")
            .insert(0, inserted);
    }

    Json(body).into_response()
}

async fn stream_handler(
    State(state): State<Arc<MockArchiveState>>,
) -> Sse<BoxStream<'static, Result<Event, Infallible>>> {
    let events: Vec<Result<Event, Infallible>> = state
        .live_events
        .iter()
        .map(|(name, data)| Ok(Event::default().event(name.as_str()).data(data.as_str())))
        .collect();
    Sse::new(stream::iter(events).chain(stream::pending()).boxed())
}

async fn wait_for(queue: &ArchiveQueue, mut condition: impl FnMut(&ArchiveQueue) -> bool) {
    let mut revisions = queue.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
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

fn sequence_ids(queue: &ArchiveQueue) -> Vec<i64> {
    queue
        .snapshot()
        .sequence
        .iter()
        .map(|record| record.id)
        .collect()
}

#[tokio::test]
async fn navigation_pages_through_archive_and_dedupes_shifted_pages() {
    let archive = MockArchive::start(MockArchiveState {
        insert_after_first_page: Mutex::new(Some(record_json(0))),
        ..MockArchiveState::with_records(1..=7)
    })
    .await;
    let queue = archive.queue(MediaFilter::default(), 3, 1);

    assert_eq!(queue.load_more().await.admitted(), 3);
    for _ in 0..20 {
        if queue.is_exhausted() {
            break;
        }
        queue.go_to_next();
        wait_for(&queue, |q| !q.is_loading()).await;
    }

    assert!(queue.is_exhausted());
    assert_eq!(sequence_ids(&queue), vec![1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(archive.state.offsets(), vec![0, 3, 5]);

    let current = queue.current().expect("cursor should reference a record");
    assert_eq!(current.channel_name.as_deref(), Some("harbor-cams"));
    assert_eq!(current.media[0].kind, MediaKind::Photo);
}

#[tokio::test]
async fn filter_and_paging_travel_as_query_parameters() {
    let archive = MockArchive::start(MockArchiveState::with_records(1..=2)).await;
    let filter = MediaFilter {
        channel_id: Some(5),
        media_kind: Some(MediaKind::Video),
        query: Some("storm".to_string()),
        ..MediaFilter::default()
    };
    let queue = archive.queue(filter, 10, 0);

    let outcome = queue.load_more().await;

    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            admitted: 2,
            duplicates: 0,
            exhausted: true
        }
    );
    let requests = archive.state.requests.lock().expect("requests mutex poisoned");
    let params = &requests[0];
    assert_eq!(params.get("offset").map(String::as_str), Some("0"));
    assert_eq!(params.get("limit").map(String::as_str), Some("10"));
    assert_eq!(params.get("channelId").map(String::as_str), Some("5"));
    assert_eq!(params.get("mediaKind").map(String::as_str), Some("video"));
    assert_eq!(params.get("query").map(String::as_str), Some("storm"));
    assert!(!params.contains_key("since"));
}

#[tokio::test]
async fn transient_upstream_failure_is_retried_inside_the_source() {
    let archive = MockArchive::start(MockArchiveState {
        scripted_failures: Mutex::new(VecDeque::from([503, 429])),
        ..MockArchiveState::with_records(1..=4)
    })
    .await;
    let queue = archive.queue(MediaFilter::default(), 2, 0);

    let outcome = queue.load_more().await;

    assert_eq!(outcome.admitted(), 2);
    assert_eq!(archive.state.request_count(), 3);
    assert!(!queue.is_exhausted());
}

#[tokio::test]
async fn permanent_failure_leaves_queue_unchanged_and_retry_succeeds() {
    let archive = MockArchive::start(MockArchiveState {
        scripted_failures: Mutex::new(VecDeque::from([403])),
        ..MockArchiveState::with_records(1..=2)
    })
    .await;
    let queue = archive.queue(MediaFilter::default(), 5, 0);

    match queue.load_more().await {
        LoadOutcome::Failed(err) => assert_eq!(err.kind, SourceFetchErrorKind::Forbidden),
        other => panic!("expected failed load, got {other:?}"),
    }
    assert!(queue.is_empty());
    assert!(!queue.is_exhausted());
    assert!(queue.snapshot().last_error.is_some());
    assert_eq!(archive.state.request_count(), 1);

    assert_eq!(queue.load_more().await.admitted(), 2);
    assert!(queue.snapshot().last_error.is_none());
}

#[tokio::test]
async fn live_feed_records_are_prepended_without_moving_the_view() {
    let live_record = json!({"id": 100, "channelName": "harbor-cams", "media": null});
    let archive = MockArchive::start(MockArchiveState {
        live_events: vec![
            ("keep-alive".to_string(), "null".to_string()),
            (RECORD_EVENT.to_string(), live_record.to_string()),
            ("audit".to_string(), "{}".to_string()),
            (RECORD_EVENT.to_string(), record_json(2).to_string()),
        ],
        ..MockArchiveState::with_records(1..=3)
    })
    .await;
    let queue = archive.queue(MediaFilter::default(), 3, 0);
    queue.load_more().await;
    queue.set_cursor(1);

    let cancel = CancellationToken::new();
    let (tx, rx) = flume::unbounded::<MediaRecord>();
    let listener = LiveFeedListener::new(&archive.base_url, &MediaFilter::default())
        .expect("live feed url should build");
    let listener_cancel = cancel.clone();
    let listener_task = tokio::spawn(async move { listener.listen(tx, listener_cancel).await });
    let pump_task = tokio::spawn(pump_live_records(queue.clone(), rx, cancel.clone()));

    wait_for(&queue, |q| q.len() == 4).await;
    assert_eq!(sequence_ids(&queue), vec![100, 1, 2, 3]);
    assert_eq!(queue.cursor(), 2);
    assert_eq!(queue.current().map(|record| record.id), Some(2));

    cancel.cancel();
    listener_task
        .await
        .expect("listener task should not panic")
        .expect("listener should stop cleanly");
    let prepended = pump_task.await.expect("pump task should not panic");
    assert_eq!(prepended, 1);
    assert_eq!(archive.state.request_count(), 1);
}

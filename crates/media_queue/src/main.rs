use std::error::Error;
use std::sync::Arc;

use dotenv::dotenv;
use media_core::{MediaFilter, MediaRecord};
use media_queue_lib::{
    cli::{describe_record, parse_args, Cli, Command, HELP},
    config::Config,
    live_feed::{pump_live_records, LiveFeedListener},
    logging::{format_error_report, init_logging},
    queue::{LoadOutcome, MediaQueue, QueueConfig},
    server::{register_metrics, setup_server_with_addr},
    source::{HttpRecordSource, HttpSourceConfig, RetryPolicy},
    state::AppState,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type Session = MediaQueue<MediaRecord, MediaFilter, Arc<HttpRecordSource>>;
type BoxError = Box<dyn Error + Send + Sync>;

/// Cancels the shared token on SIGTERM or SIGINT.
async fn handle_shutdown_signals(shutdown_token: CancellationToken) -> Result<(), BoxError> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received, shutting down."),
        _ = sigint.recv() => info!("SIGINT received, shutting down."),
        _ = shutdown_token.cancelled() => return Ok(()),
    }

    shutdown_token.cancel();
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = parse_args();
    let mode = if cli.live { "live" } else { "browse" };
    init_logging("media_queue", mode, "media_queue=info,media_queue_lib=info,warn");

    if let Err(err) = run(cli).await {
        error!(
            event = "media_queue_failed",
            report = %format_error_report(&*err),
            "media queue session failed"
        );
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    let config = Config::from_lookup(|name| match (name, &cli.api_url) {
        ("MEDIA_API_URL", Some(api_url)) => Some(api_url.clone()),
        _ => std::env::var(name).ok(),
    })?;
    let queue_config = QueueConfig {
        page_size: cli.page_size.unwrap_or(config.page_size),
        lookahead_window: cli.lookahead.unwrap_or(config.lookahead_window),
    };
    let filter = cli.filter();
    info!(
        event = "session_starting",
        api_url = %config.api_url,
        page_size = queue_config.page_size,
        lookahead_window = queue_config.lookahead_window,
        filter = ?filter,
        "starting browsing session"
    );

    let state = Arc::new(AppState::new(CancellationToken::new()));
    let shutdown_handle = tokio::spawn(handle_shutdown_signals(state.shutdown_token.clone()));
    register_metrics(&state).await;
    let server_handle = match cli.metrics_addr {
        Some(addr) => Some(setup_server_with_addr(state.clone(), addr).await?),
        None => None,
    };

    let source = Arc::new(HttpRecordSource::new(HttpSourceConfig {
        retry_policy: RetryPolicy {
            max_attempts: config.max_attempts,
            ..RetryPolicy::default()
        },
        max_requests_per_second: Some(config.max_requests_per_second),
        ..HttpSourceConfig::new(config.api_url.clone())
    })?);
    let queue: Session = MediaQueue::new(source, filter.clone(), Vec::new(), queue_config);

    let first_page = tokio::select! {
        outcome = queue.load_more() => Some(outcome),
        _ = state.shutdown_token.cancelled() => None,
    };
    if let Some(LoadOutcome::Failed(err)) = first_page {
        return Err(err.into());
    }

    let mut live_handles = Vec::new();
    if cli.live {
        let (tx, rx) = flume::unbounded::<MediaRecord>();
        let listener = LiveFeedListener::new(&config.api_url, &filter)?;
        let listener_token = state.shutdown_token.clone();
        live_handles.push(tokio::spawn(async move {
            if let Err(err) = listener.listen(tx, listener_token).await {
                warn!(event = "live_feed_failed", error = %err, "live feed stopped");
            }
        }));
        let pump_queue = queue.clone();
        let pump_token = state.shutdown_token.clone();
        live_handles.push(tokio::spawn(async move {
            pump_live_records(pump_queue, rx, pump_token).await;
        }));
    }

    println!("{HELP}");
    render(&queue);
    browse(&queue, &state.shutdown_token).await?;

    queue.close();
    state.shutdown_token.cancel();
    for handle in live_handles {
        handle.await?;
    }
    shutdown_handle.await??;
    if let Some(handle) = server_handle {
        handle.await?;
    }
    Ok(())
}

async fn browse(queue: &Session, shutdown_token: &CancellationToken) -> Result<(), BoxError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = shutdown_token.cancelled() => return Ok(()),
        };
        let Some(line) = line else {
            return Ok(());
        };

        match Command::parse(&line) {
            Ok(Command::Next) => queue.go_to_next(),
            Ok(Command::Previous) => queue.go_to_previous(),
            Ok(Command::Jump(index)) => queue.set_cursor(index),
            Ok(Command::LoadMore) => {
                let outcome = tokio::select! {
                    outcome = queue.load_more() => outcome,
                    _ = shutdown_token.cancelled() => return Ok(()),
                };
                report_load(outcome);
            }
            Ok(Command::Status) => {
                print_status(queue);
                continue;
            }
            Ok(Command::Help) => {
                println!("{HELP}");
                continue;
            }
            Ok(Command::Quit) => return Ok(()),
            Err(message) => {
                println!("{message}");
                continue;
            }
        }
        render(queue);
    }
}

fn report_load(outcome: LoadOutcome) {
    match outcome {
        LoadOutcome::Loaded { admitted, .. } => println!("loaded {admitted} new records"),
        LoadOutcome::Failed(err) => println!("load failed: {err} (l to retry)"),
        LoadOutcome::Skipped(reason) => println!("nothing to load ({reason:?})"),
        LoadOutcome::Discarded => {}
    }
}

fn render(queue: &Session) {
    match queue.current() {
        Some(record) => println!(
            "{}",
            describe_record(&record, queue.cursor() + 1, queue.len(), queue.is_exhausted())
        ),
        None => println!("(no records)"),
    }
}

fn print_status(queue: &Session) {
    let snapshot = queue.snapshot();
    println!(
        "cursor {} of {} | exhausted: {} | loading: {}",
        snapshot.cursor,
        snapshot.sequence.len(),
        snapshot.exhausted,
        snapshot.loading
    );
    if let Some(err) = &snapshot.last_error {
        println!("last error: {err}");
    }
}

use std::fmt::Write as _;
use std::net::SocketAddr;

use clap::Parser;
use media_core::{MediaFilter, MediaKind, MediaRecord};

use crate::build_info;

#[derive(Parser, Debug, Clone)]
#[command(
    about = "Browse an archived media stream one record at a time",
    version = build_info::VERSION_WITH_COMMIT,
    long_version = build_info::VERSION_WITH_COMMIT
)]
pub struct Cli {
    #[arg(long = "api-url")]
    /// Archive API root. Overrides MEDIA_API_URL.
    pub api_url: Option<String>,

    #[arg(long)]
    /// Only records from this channel
    pub channel: Option<i64>,

    #[arg(long = "media-kind")]
    /// Only records carrying this media kind (photo, video, audio, document)
    pub media_kind: Option<MediaKind>,

    #[arg(long)]
    /// Full-text search query
    pub query: Option<String>,

    #[arg(long)]
    /// Only records posted at or after this unix timestamp
    pub since: Option<i64>,

    #[arg(long)]
    /// Only records posted at or before this unix timestamp
    pub until: Option<i64>,

    #[arg(long = "page-size")]
    /// Records per page. Overrides MEDIA_QUEUE_PAGE_SIZE.
    pub page_size: Option<usize>,

    #[arg(long)]
    /// Prefetch once this many records or fewer remain ahead. Overrides MEDIA_QUEUE_LOOKAHEAD.
    pub lookahead: Option<usize>,

    #[arg(long, default_value_t = false)]
    /// Follow the live feed and splice new records in at the head
    pub live: bool,

    #[arg(long = "metrics-addr")]
    /// Serve /health and /metrics on this address
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    pub fn filter(&self) -> MediaFilter {
        MediaFilter {
            channel_id: self.channel,
            media_kind: self.media_kind,
            query: self.query.clone().filter(|query| !query.trim().is_empty()),
            since: self.since,
            until: self.until,
        }
    }
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

/// One line of interactive input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Next,
    Previous,
    Jump(usize),
    LoadMore,
    Status,
    Quit,
    Help,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let Some(head) = parts.next() else {
            return Ok(Self::Next);
        };

        let command = match head {
            "n" | "next" => Self::Next,
            "p" | "prev" | "previous" => Self::Previous,
            "g" | "go" => {
                let raw = parts.next().ok_or("usage: g <index>")?;
                let index = raw
                    .parse()
                    .map_err(|_| format!("not a record index: {raw}"))?;
                Self::Jump(index)
            }
            "l" | "load" => Self::LoadMore,
            "s" | "status" => Self::Status,
            "q" | "quit" | "exit" => Self::Quit,
            "h" | "help" | "?" => Self::Help,
            other => return Err(format!("unknown command: {other} (h for help)")),
        };

        if parts.next().is_some() {
            return Err(format!("unexpected arguments after {head}"));
        }
        Ok(command)
    }
}

pub const HELP: &str = "n next | p previous | g <i> jump | l load more | s status | q quit";

/// Renders the record under the cursor: a position header with the first line of text, then
/// the cover attachment. `position` is 1-based; a trailing `+` means more pages may follow.
pub fn describe_record(
    record: &MediaRecord,
    position: usize,
    total: usize,
    exhausted: bool,
) -> String {
    let more = if exhausted { "" } else { "+" };
    let channel = record.channel_name.as_deref().unwrap_or("unknown channel");
    let text = record.text.as_deref().and_then(|text| text.lines().next()).unwrap_or("");
    let mut out = format!("[{position}/{total}{more}] #{} {channel}: {text}", record.id);

    if let Some(cover) = record.cover() {
        let _ = write!(out, "\n    {} {}", cover.kind.as_str(), cover.url);
        let rest = record.media.len() - 1;
        if rest > 0 {
            let _ = write!(out, " (+{rest} more)");
        }
    }
    out
}

use super::error::SourceFetchError;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const DEFAULT_LOOKAHEAD_WINDOW: usize = 5;

/// Paging and prefetch knobs for one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Records requested per fetch. Values below 1 are treated as 1.
    pub page_size: usize,
    /// Prefetch starts once `len - cursor` drops to this many records or fewer.
    pub lookahead_window: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            lookahead_window: DEFAULT_LOOKAHEAD_WINDOW,
        }
    }
}

impl QueueConfig {
    pub(crate) fn effective_page_size(&self) -> usize {
        self.page_size.max(1)
    }
}

/// One page returned by a record source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<R> {
    pub records: Vec<R>,
    pub has_more: bool,
}

impl<R> Page<R> {
    pub fn new(records: Vec<R>, has_more: bool) -> Self {
        Self { records, has_more }
    }
}

/// Why a load request did not reach the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InFlight,
    Exhausted,
    Closed,
}

/// Result of one `load_more` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Skipped(SkipReason),
    Loaded {
        admitted: usize,
        duplicates: usize,
        exhausted: bool,
    },
    Failed(SourceFetchError),
    /// The session moved to a newer generation while the fetch was in flight.
    Discarded,
}

impl LoadOutcome {
    pub fn admitted(&self) -> usize {
        match self {
            Self::Loaded { admitted, .. } => *admitted,
            _ => 0,
        }
    }
}

/// Point-in-time view handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot<R> {
    pub sequence: Vec<R>,
    pub cursor: usize,
    pub exhausted: bool,
    pub loading: bool,
    pub last_error: Option<SourceFetchError>,
}

impl<R> QueueSnapshot<R> {
    pub fn current(&self) -> Option<&R> {
        self.sequence.get(self.cursor)
    }
}

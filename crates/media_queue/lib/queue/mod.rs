mod controller;
mod error;
mod record;
mod source;
mod state;
mod types;

pub use controller::MediaQueue;
pub use error::{SourceFetchError, SourceFetchErrorKind};
pub use record::Record;
pub use source::RecordSource;
pub use types::{
    LoadOutcome, Page, QueueConfig, QueueSnapshot, SkipReason, DEFAULT_LOOKAHEAD_WINDOW,
    DEFAULT_PAGE_SIZE,
};

#[cfg(test)]
pub(crate) mod test_support;

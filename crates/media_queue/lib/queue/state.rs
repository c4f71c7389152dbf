use std::collections::HashSet;

use super::error::SourceFetchError;
use super::record::Record;
use super::types::{LoadOutcome, Page, SkipReason};

/// Issued when a load passes the in-flight guard; the response must hand it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LoadTicket {
    pub generation: u64,
    pub offset: usize,
}

/// Synchronous queue state. Every transition here is total and never suspends.
///
/// Invariants:
/// - `membership` holds exactly the ids of `sequence`, and no id appears twice.
/// - `cursor < max(1, sequence.len())`.
/// - `loading` is true for at most one outstanding ticket of the current generation.
pub(crate) struct QueueState<R: Record> {
    sequence: Vec<R>,
    membership: HashSet<R::Id>,
    cursor: usize,
    loading: bool,
    exhausted: bool,
    closed: bool,
    generation: u64,
    last_error: Option<SourceFetchError>,
}

impl<R: Record> QueueState<R> {
    /// Builds state from an initial batch. Returns the number of duplicates dropped.
    pub(crate) fn new(initial: Vec<R>) -> (Self, usize) {
        let mut state = Self {
            sequence: Vec::with_capacity(initial.len()),
            membership: HashSet::with_capacity(initial.len()),
            cursor: 0,
            loading: false,
            exhausted: false,
            closed: false,
            generation: 0,
            last_error: None,
        };
        let duplicates = state.append_all(initial).1;
        (state, duplicates)
    }

    pub(crate) fn sequence(&self) -> &[R] {
        &self.sequence
    }

    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    pub(crate) fn is_loading(&self) -> bool {
        self.loading
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn last_error(&self) -> Option<&SourceFetchError> {
        self.last_error.as_ref()
    }

    pub(crate) fn current(&self) -> Option<&R> {
        self.sequence.get(self.cursor)
    }

    /// Appends records not seen before, in order. Returns `(admitted, duplicates)`.
    fn append_all(&mut self, records: Vec<R>) -> (usize, usize) {
        let mut admitted = 0usize;
        let mut duplicates = 0usize;
        for record in records {
            if self.membership.insert(record.record_id()) {
                self.sequence.push(record);
                admitted += 1;
            } else {
                duplicates += 1;
            }
        }
        (admitted, duplicates)
    }

    /// Check-and-set of the in-flight guard.
    pub(crate) fn begin_load(&mut self) -> Result<LoadTicket, SkipReason> {
        if self.closed {
            return Err(SkipReason::Closed);
        }
        if self.loading {
            return Err(SkipReason::InFlight);
        }
        if self.exhausted {
            return Err(SkipReason::Exhausted);
        }

        self.loading = true;
        Ok(LoadTicket {
            generation: self.generation,
            offset: self.sequence.len(),
        })
    }

    /// Applies a fetch response. Records are admitted only after the whole page arrived.
    pub(crate) fn complete_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<Page<R>, SourceFetchError>,
    ) -> LoadOutcome {
        if ticket.generation != self.generation {
            return LoadOutcome::Discarded;
        }

        self.loading = false;
        match result {
            Ok(page) => {
                let (admitted, duplicates) = self.append_all(page.records);
                if !page.has_more {
                    self.exhausted = true;
                }
                self.last_error = None;
                LoadOutcome::Loaded {
                    admitted,
                    duplicates,
                    exhausted: self.exhausted,
                }
            }
            Err(err) => {
                self.last_error = Some(err.clone());
                LoadOutcome::Failed(err)
            }
        }
    }

    /// Releases the guard for a ticket that never reached the source.
    pub(crate) fn abandon_load(&mut self, ticket: LoadTicket) {
        if ticket.generation == self.generation {
            self.loading = false;
        }
    }

    /// Inserts a pushed record at the head, keeping the cursor on the same logical record.
    pub(crate) fn prepend(&mut self, record: R) -> bool {
        if !self.membership.insert(record.record_id()) {
            return false;
        }

        let was_empty = self.sequence.is_empty();
        self.sequence.insert(0, record);
        if !was_empty {
            self.cursor += 1;
        }
        true
    }

    pub(crate) fn go_to_next(&mut self) {
        self.cursor = (self.cursor + 1).min(self.last_index());
    }

    pub(crate) fn go_to_previous(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub(crate) fn set_cursor(&mut self, index: usize) {
        self.cursor = index.min(self.last_index());
    }

    /// Lookahead trigger: few enough records remain ahead and a load could start.
    pub(crate) fn wants_prefetch(&self, lookahead_window: usize) -> bool {
        let remaining = self.sequence.len().saturating_sub(self.cursor);
        remaining <= lookahead_window && !self.exhausted && !self.loading && !self.closed
    }

    /// Ends the session: later loads are skipped and in-flight responses become stale.
    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.loading = false;
        self.generation = self.generation.wrapping_add(1);
    }

    fn last_index(&self) -> usize {
        self.sequence.len().saturating_sub(1)
    }
}

use std::fmt::Debug;
use std::hash::Hash;

use media_core::MediaRecord;

/// Anything the queue can hold. The controller only ever looks at the identifier.
pub trait Record {
    type Id: Eq + Hash + Clone + Debug + Send + Sync + 'static;

    fn record_id(&self) -> Self::Id;
}

impl Record for MediaRecord {
    type Id = i64;

    fn record_id(&self) -> i64 {
        self.id
    }
}

use std::sync::Arc;

use futures::future::BoxFuture;

use super::error::SourceFetchError;
use super::types::Page;

/// Paginated provider of records for one filter.
///
/// `offset` is the number of records the caller already holds; `has_more` on the returned page
/// is the only exhaustion signal the controller trusts.
pub trait RecordSource<R, F>: Send + Sync {
    fn fetch_page<'a>(
        &'a self,
        offset: usize,
        page_size: usize,
        filter: &'a F,
    ) -> BoxFuture<'a, Result<Page<R>, SourceFetchError>>;
}

impl<R, F, T> RecordSource<R, F> for Arc<T>
where
    T: RecordSource<R, F> + ?Sized,
{
    fn fetch_page<'a>(
        &'a self,
        offset: usize,
        page_size: usize,
        filter: &'a F,
    ) -> BoxFuture<'a, Result<Page<R>, SourceFetchError>> {
        (**self).fetch_page(offset, page_size, filter)
    }
}

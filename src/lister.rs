use crate::error::Result;
use crate::storage::ObjectStore;
use crate::verbose;
use std::collections::VecDeque;
use std::sync::Arc;

/// Lazy, cursor-paginated sequence of object keys.
///
/// One page is buffered at a time; each refill asks the store for keys
/// strictly after the cursor and, while the listing is truncated, advances
/// the cursor to the last key of the fetched page. The sequence is finite
/// and not restartable — resuming is done externally by constructing a new
/// lister with a persisted cursor.
pub struct KeyLister {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: Option<String>,
    cursor: Option<String>,
    page: VecDeque<String>,
    page_size: i32,
    exhausted: bool,
}

impl KeyLister {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: String,
        prefix: Option<String>,
        start_cursor: Option<String>,
        page_size: i32,
    ) -> Self {
        Self {
            store,
            bucket,
            prefix,
            cursor: start_cursor,
            page: VecDeque::new(),
            page_size,
            exhausted: false,
        }
    }

    /// Yields the next key, or `None` once the bucket listing is exhausted.
    /// A page-fetch failure surfaces as `Err` and aborts enumeration.
    pub async fn next(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(key) = self.page.pop_front() {
                return Ok(Some(key));
            }
            if self.exhausted {
                return Ok(None);
            }

            let page = self
                .store
                .list_objects(
                    &self.bucket,
                    self.prefix.as_deref(),
                    self.cursor.as_deref(),
                    self.page_size,
                )
                .await?;
            verbose!(
                "Fetched a page of {} keys from {} (truncated: {})",
                page.keys.len(),
                self.bucket,
                page.is_truncated
            );

            if page.is_truncated && !page.keys.is_empty() {
                self.cursor = page.keys.last().cloned();
            } else {
                self.exhausted = true;
            }
            self.page.extend(page.keys);
        }
    }
}

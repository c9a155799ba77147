// ABOUTME: ChunkedCursor - offset pagination over an arbitrary ordered query
// ABOUTME: Fetches one page at a time, stopping on an empty page or a caller stop

use crate::connection::{Connection, Page};
use crate::value::Value;
use anyhow::{Context, Result};

/// Pages through a query with `LIMIT ? OFFSET ?`.
///
/// # Precondition
///
/// The query must carry a deterministic `ORDER BY`. Offset pagination over
/// an unordered result may skip or repeat rows; the cursor cannot detect it.
/// Every `?` outside quotes and comments is a bound parameter. On PostgreSQL
/// a literal question mark (such as the jsonb `?` operator) is written `??`.
///
/// Pages are fetched strictly one after another. A page is never requested
/// before the previous one has been handed back to the caller, and nothing is
/// retained once it has been. The cursor does not own a connection: each
/// call to [`next_page`](Self::next_page) borrows one, so the same handle may
/// be written to between pages.
#[derive(Debug, Clone)]
pub struct ChunkedCursor {
    statement: String,
    params: Vec<Value>,
    page_size: usize,
    page_index: usize,
    exhausted: bool,
}

impl ChunkedCursor {
    pub fn new(query: &str, params: Vec<Value>, page_size: usize) -> Self {
        debug_assert!(page_size > 0, "page size must be positive");
        Self {
            statement: paged_statement(query),
            params,
            page_size: page_size.max(1),
            page_index: 0,
            exhausted: false,
        }
    }

    /// The statement actually executed for every page.
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Index of the page the next call will fetch.
    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Stop the traversal; later calls return `None`.
    pub fn stop(&mut self) {
        self.exhausted = true;
    }

    /// Fetch the next page.
    ///
    /// Returns the first empty page once, then `None` on every later call.
    pub fn next_page(&mut self, conn: &mut dyn Connection) -> Result<Option<Page>> {
        if self.exhausted {
            return Ok(None);
        }

        let offset = self.page_index * self.page_size;
        let mut params = self.params.clone();
        params.push(Value::Int(self.page_size as i64));
        params.push(Value::Int(offset as i64));

        tracing::debug!(
            "Fetching page {} (limit {}, offset {}): {}",
            self.page_index,
            self.page_size,
            offset,
            crate::utils::abbreviate_sql(&self.statement)
        );

        let page = conn
            .query(&self.statement, &params)
            .with_context(|| format!("Failed to fetch page {}", self.page_index))?;

        self.page_index += 1;
        if page.is_empty() {
            self.exhausted = true;
        }
        Ok(Some(page))
    }
}

/// Append the pagination clause, dropping any trailing `;` first.
pub fn paged_statement(query: &str) -> String {
    let body = query.trim_end().trim_end_matches(';').trim_end();
    format!("{} LIMIT ? OFFSET ?", body)
}

/// Visit every page of `query` in offset order.
///
/// `on_page` receives each page with its index and returns whether to
/// continue. Traversal ends after the first empty page (which is still
/// delivered), when `on_page` returns `false`, or on the first error.
/// Returns the number of pages delivered.
pub fn for_each_page<F>(
    conn: &mut dyn Connection,
    query: &str,
    params: Vec<Value>,
    page_size: usize,
    mut on_page: F,
) -> Result<usize>
where
    F: FnMut(Page, usize) -> Result<bool>,
{
    let mut cursor = ChunkedCursor::new(query, params, page_size);
    let mut delivered = 0;

    while let Some(page) = cursor.next_page(conn)? {
        let index = delivered;
        delivered += 1;
        if !on_page(page, index)? {
            cursor.stop();
        }
    }

    Ok(delivered)
}

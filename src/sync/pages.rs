//! Page cursor for the platform's list endpoints.
//!
//! Every list response carries `number_of_pages` alongside the items, and
//! the value may change between requests while a sync is running. The
//! cursor re-reads it from each response, so the loop is bounded by
//! whatever the platform last reported rather than by the first answer.

/// Cursor over a paginated endpoint. Start at page 1, call
/// [`Paginator::current`] for the next page to fetch, then
/// [`Paginator::advance`] with the response. An empty page or an
/// [`Paginator::abort`] ends the iteration.
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    page: i64,
    number_of_pages: i64,
}

impl Paginator {
    pub fn new() -> Self {
        Self {
            page: 1,
            number_of_pages: 1,
        }
    }

    /// The page to fetch next, or `None` when the cursor is exhausted.
    pub fn current(&self) -> Option<i64> {
        (self.page <= self.number_of_pages).then_some(self.page)
    }

    /// Record a fetched page: adopt the freshly reported page count and
    /// move on. A page with zero items ends the iteration regardless of
    /// the reported count.
    pub fn advance(&mut self, number_of_pages: i64, items_on_page: usize) {
        if items_on_page == 0 {
            self.number_of_pages = 0;
        } else {
            self.number_of_pages = number_of_pages;
            self.page += 1;
        }
    }

    /// End the iteration early, used when a page fetch fails.
    pub fn abort(&mut self) {
        self.number_of_pages = 0;
    }
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new()
    }
}

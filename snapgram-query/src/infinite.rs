//! Cursor paginated results, loaded one page at a time.

use snapgram_common::model::{Identified, Page};

/// Loaded pages together with the cursor each was requested with.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct InfinitePages<T> {
    pages: Vec<Page<T>>,
    cursors: Vec<Option<String>>,
}

impl<T> Default for InfinitePages<T> {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            cursors: Vec::new(),
        }
    }
}

impl<T> InfinitePages<T> {
    pub fn pages(&self) -> &[Page<T>] {
        &self.pages
    }

    pub fn cursors(&self) -> &[Option<String>] {
        &self.cursors
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flat_map(|page| &page.items)
    }

    pub fn push(&mut self, cursor: Option<String>, page: Page<T>) {
        self.cursors.push(cursor);
        self.pages.push(page);
    }

    /// Whether an empty page was loaded, so nothing follows.
    pub fn is_exhausted(&self) -> bool {
        self.pages.last().is_some_and(Page::is_empty)
    }
}

impl<T: Identified> InfinitePages<T> {
    /// The id of the last item loaded. `None` before the first page and
    /// after an empty page.
    pub fn next_cursor(&self) -> Option<&str> {
        self.pages
            .last()
            .and_then(Page::last)
            .map(Identified::cursor_id)
    }

    pub fn has_next_page(&self) -> bool {
        !self.is_exhausted()
    }

    /// Loads up to `pages` pages from the start, stopping after the first
    /// empty page. At least one page is loaded.
    pub async fn load<F, Fut, E>(pages: usize, mut fetch_page: F) -> Result<Self, E>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<Page<T>, E>>,
    {
        let mut loaded = Self::default();
        let mut cursor = None;

        for _ in 0..pages.max(1) {
            let page = fetch_page(cursor.clone()).await?;
            loaded.push(cursor, page);
            if loaded.is_exhausted() {
                break;
            }
            cursor = loaded.next_cursor().map(str::to_owned);
        }

        Ok(loaded)
    }
}

//! Selection state and deduplicating query construction.

use packdeck_core::{
    CatalogQuery, CatalogResult, QueryKey, SortDirection, SortField, SortSpec,
};

/// What the user is currently looking at: page, ordering and filter.
///
/// Changing the ordering or the filter returns to the first page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSelection {
    page: u64,
    sort: SortSpec,
    search: String,
}

impl Default for CatalogSelection {
    fn default() -> Self {
        Self {
            page: 1,
            sort: SortSpec::default(),
            search: String::new(),
        }
    }
}

impl CatalogSelection {
    /// First page, ascending by name, unfiltered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current page.
    #[must_use]
    pub const fn page(&self) -> u64 {
        self.page
    }

    /// Current ordering.
    #[must_use]
    pub const fn sort(&self) -> SortSpec {
        self.sort
    }

    /// Current filter text as typed.
    #[must_use]
    pub fn search(&self) -> &str {
        &self.search
    }

    /// Jump to `page`; zero is clamped to the first page.
    pub fn set_page(&mut self, page: u64) {
        self.page = page.max(1);
    }

    /// Advance one page.
    pub const fn next_page(&mut self) {
        self.page = self.page.saturating_add(1);
    }

    /// Go back one page, stopping at the first.
    pub fn previous_page(&mut self) {
        self.page = self.page.saturating_sub(1).max(1);
    }

    /// Order by `field`.
    pub fn set_sort_field(&mut self, field: SortField) {
        if self.sort.field != field {
            self.sort.field = field;
            self.page = 1;
        }
    }

    /// Order in `direction`.
    pub fn set_sort_direction(&mut self, direction: SortDirection) {
        if self.sort.direction != direction {
            self.sort.direction = direction;
            self.page = 1;
        }
    }

    /// Replace the filter text.
    pub fn set_search(&mut self, search: impl Into<String>) {
        let search = search.into();
        if self.search != search {
            self.search = search;
            self.page = 1;
        }
    }
}

/// Builds queries from selections and suppresses repeats of the last one.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    page_size: u64,
    last_key: Option<QueryKey>,
}

impl QueryBuilder {
    /// Builder requesting `page_size` packs per page.
    #[must_use]
    pub const fn new(page_size: u64) -> Self {
        Self {
            page_size,
            last_key: None,
        }
    }

    /// Page size applied to every query.
    #[must_use]
    pub const fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Key of the most recently issued query.
    #[must_use]
    pub const fn last_key(&self) -> Option<&QueryKey> {
        self.last_key.as_ref()
    }

    /// Build the query for `selection`.
    ///
    /// Returns `Ok(None)` when the query equals the previously issued one.
    ///
    /// # Errors
    ///
    /// Returns [`packdeck_core::CatalogFetchError::InvalidQuery`] when the
    /// page size is out of range.
    pub fn issue(&mut self, selection: &CatalogSelection) -> CatalogResult<Option<CatalogQuery>> {
        let query = CatalogQuery::new(
            selection.page(),
            self.page_size,
            selection.sort(),
            selection.search(),
        )?;
        let key = query.key();
        if self.last_key.as_ref() == Some(&key) {
            return Ok(None);
        }
        self.last_key = Some(key);
        Ok(Some(query))
    }

    /// Forget the last issued key so the next selection is always issued.
    pub fn reset(&mut self) {
        self.last_key = None;
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::error::{CatalogFetchError, CatalogResult};

/// Largest page size accepted by the catalog.
const MAX_PAGE_SIZE: u64 = 100;

/// Attribute the catalog can be ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    /// Pack name.
    #[default]
    Name,
    /// Play count.
    Popularity,
    /// Aggregate difficulty.
    Overall,
    /// Stream skillset.
    Stream,
    /// Jumpstream skillset.
    Jumpstream,
    /// Handstream skillset.
    Handstream,
    /// Jacks skillset.
    Jacks,
    /// Chordjacks skillset.
    Chordjacks,
    /// Stamina skillset.
    Stamina,
    /// Technical skillset.
    Technical,
}

impl SortField {
    /// Every field, in presentation order.
    pub const ALL: [Self; 10] = [
        Self::Name,
        Self::Popularity,
        Self::Overall,
        Self::Stream,
        Self::Jumpstream,
        Self::Handstream,
        Self::Jacks,
        Self::Chordjacks,
        Self::Stamina,
        Self::Technical,
    ];

    /// Wire value understood by the catalog.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Popularity => "popularity",
            Self::Overall => "overall",
            Self::Stream => "stream",
            Self::Jumpstream => "jumpstream",
            Self::Handstream => "handstream",
            Self::Jacks => "jacks",
            Self::Chordjacks => "chordjacks",
            Self::Stamina => "stamina",
            Self::Technical => "technical",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Popularity => "Popularity",
            Self::Overall => "Overall",
            Self::Stream => "Stream",
            Self::Jumpstream => "Jumpstream",
            Self::Handstream => "Handstream",
            Self::Jacks => "Jacks",
            Self::Chordjacks => "Chordjacks",
            Self::Stamina => "Stamina",
            Self::Technical => "Technical",
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortField {
    type Err = CatalogFetchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|field| field.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| CatalogFetchError::invalid_query("sort", "unknown_field", trimmed))
    }
}

/// Ordering direction for a sort field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

/// A sort field with its direction.
///
/// Encoded as the bare field name for ascending order and with a leading `-`
/// for descending order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    /// Field to order by.
    pub field: SortField,
    /// Direction to order in.
    pub direction: SortDirection,
}

impl SortSpec {
    /// Construct an ascending sort on `field`.
    #[must_use]
    pub const fn ascending(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Ascending,
        }
    }

    /// Construct a descending sort on `field`.
    #[must_use]
    pub const fn descending(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Descending,
        }
    }

    /// Parse the wire encoding (`"overall"`, `"-overall"`).
    ///
    /// # Errors
    ///
    /// Returns [`CatalogFetchError::InvalidQuery`] for unknown field names.
    pub fn parse(value: &str) -> CatalogResult<Self> {
        let trimmed = value.trim();
        match trimmed.strip_prefix('-') {
            Some(rest) => Ok(Self::descending(rest.parse()?)),
            None => Ok(Self::ascending(trimmed.parse()?)),
        }
    }

    /// Wire encoding of this sort.
    #[must_use]
    pub fn encode(self) -> String {
        match self.direction {
            SortDirection::Ascending => self.field.as_str().to_owned(),
            SortDirection::Descending => format!("-{}", self.field.as_str()),
        }
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for SortSpec {
    type Err = CatalogFetchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

/// Selectable sort entry for presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOption {
    /// Wire value of the field.
    pub value: String,
    /// Human-readable label.
    pub label: String,
}

/// The fixed set of sort options offered by the catalog.
#[must_use]
pub fn sort_options() -> Vec<SortOption> {
    SortField::ALL
        .into_iter()
        .map(|field| SortOption {
            value: field.as_str().to_owned(),
            label: field.label().to_owned(),
        })
        .collect()
}

/// Canonical identity of a [`CatalogQuery`].
///
/// Two queries with equal parameters produce equal keys regardless of how
/// they were constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(String);

impl QueryKey {
    /// Encoded query string backing this key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validated request for one page of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogQuery {
    page: u64,
    page_size: u64,
    sort: SortSpec,
    search: String,
}

impl CatalogQuery {
    /// Build a query. Search text is trimmed; an empty result means "no filter".
    ///
    /// # Errors
    ///
    /// Returns [`CatalogFetchError::InvalidQuery`] when `page` is zero or
    /// `page_size` falls outside `1..=100`.
    pub fn new(page: u64, page_size: u64, sort: SortSpec, search: &str) -> CatalogResult<Self> {
        if page == 0 {
            return Err(CatalogFetchError::invalid_query(
                "page",
                "must_be_positive",
                page.to_string(),
            ));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(CatalogFetchError::invalid_query(
                "limit",
                "out_of_range",
                page_size.to_string(),
            ));
        }
        Ok(Self {
            page,
            page_size,
            sort,
            search: search.trim().to_owned(),
        })
    }

    /// One-based page number.
    #[must_use]
    pub const fn page(&self) -> u64 {
        self.page
    }

    /// Requested number of packs per page.
    #[must_use]
    pub const fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Requested ordering.
    #[must_use]
    pub const fn sort(&self) -> SortSpec {
        self.sort
    }

    /// Trimmed search text; empty when no filter applies.
    #[must_use]
    pub fn search(&self) -> &str {
        &self.search
    }

    /// Parameters in the order the catalog expects them. The search filter is
    /// omitted when empty.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.to_string()),
            ("limit", self.page_size.to_string()),
            ("sort", self.sort.encode()),
        ];
        if !self.search.is_empty() {
            pairs.push(("filter[search]", self.search.clone()));
        }
        pairs
    }

    /// Canonical key: the URL-encoded parameter string.
    #[must_use]
    pub fn key(&self) -> QueryKey {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        serializer.extend_pairs(self.query_pairs());
        QueryKey(serializer.finish())
    }
}

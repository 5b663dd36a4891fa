use std::collections::HashSet;
use std::fmt;

use packdeck_events::PackId;
use serde::de::{self, Deserializer, Unexpected};
use serde::{Deserialize, Serialize};

/// One downloadable song pack as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pack {
    /// Catalog identifier.
    pub id: PackId,
    /// Display name.
    pub name: String,
    /// Total number of plays across the pack.
    #[serde(default)]
    pub play_count: u64,
    /// Number of songs in the pack.
    #[serde(default)]
    pub song_count: u64,
    /// Full-size banner image.
    #[serde(default)]
    pub banner_path: String,
    /// Tiny banner thumbnail.
    #[serde(default, rename = "bannerTinyThumb")]
    pub banner_tiny_thumb: String,
    /// Responsive banner source set.
    #[serde(default, rename = "bannerSrcSet")]
    pub banner_src_set: String,
    /// Whether the pack is flagged as not safe for work.
    #[serde(default)]
    pub contains_nsfw: bool,
    /// Human-readable archive size, e.g. `"1.2 GB"`.
    #[serde(default)]
    pub size: String,
    /// Aggregate difficulty.
    #[serde(default, deserialize_with = "score")]
    pub overall: f64,
    /// Stream skillset score.
    #[serde(default, deserialize_with = "score")]
    pub stream: f64,
    /// Jumpstream skillset score.
    #[serde(default, deserialize_with = "score")]
    pub jumpstream: f64,
    /// Handstream skillset score.
    #[serde(default, deserialize_with = "score")]
    pub handstream: f64,
    /// Jacks skillset score.
    #[serde(default, deserialize_with = "score")]
    pub jacks: f64,
    /// Chordjacks skillset score.
    #[serde(default, deserialize_with = "score")]
    pub chordjacks: f64,
    /// Stamina skillset score.
    #[serde(default, deserialize_with = "score")]
    pub stamina: f64,
    /// Technical skillset score.
    #[serde(default, deserialize_with = "score")]
    pub technical: f64,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Direct archive URL.
    pub download: String,
    /// Magnet link, when the catalog publishes one.
    #[serde(default)]
    pub magnet: String,
}

/// Catalog tag attached to a pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag category.
    #[serde(rename = "type")]
    pub kind: String,
    /// Tag label.
    pub name: String,
}

/// Navigation links for the current page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLinks {
    /// First page.
    pub first: Option<String>,
    /// Last page.
    pub last: Option<String>,
    /// Previous page, if any.
    pub prev: Option<String>,
    /// Next page, if any.
    pub next: Option<String>,
}

/// Paging metadata returned alongside results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    /// One-based page number of these results.
    pub current_page: u64,
    /// Index of the first item on the page; absent for empty results.
    #[serde(default)]
    pub from: Option<u64>,
    /// Last available page.
    pub last_page: u64,
    /// Pagination links for rendering a pager.
    #[serde(default)]
    pub links: Vec<PageMetaLink>,
    /// Base path of the listing endpoint.
    #[serde(default)]
    pub path: String,
    /// Page size used by the provider.
    pub per_page: u64,
    /// Index of the last item on the page; absent for empty results.
    #[serde(default)]
    pub to: Option<u64>,
    /// Total number of matching packs.
    pub total: u64,
}

/// One entry of the pager link list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetaLink {
    /// Target URL, absent for disabled entries.
    pub url: Option<String>,
    /// Label shown for the entry.
    pub label: String,
    /// Whether the entry is the current page.
    pub active: bool,
}

/// One page of catalog results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogPage {
    /// Packs on this page.
    pub data: Vec<Pack>,
    /// Navigation links.
    #[serde(default)]
    pub links: PageLinks,
    /// Paging metadata.
    pub meta: PageMeta,
}

impl CatalogPage {
    /// Ids of the packs on this page, in listing order.
    #[must_use]
    pub fn pack_ids(&self) -> Vec<PackId> {
        self.data.iter().map(|pack| pack.id).collect()
    }

    /// Ids of the packs on this page as a set.
    #[must_use]
    pub fn visible_ids(&self) -> HashSet<PackId> {
        self.data.iter().map(|pack| pack.id).collect()
    }

    /// Look up a pack on this page.
    #[must_use]
    pub fn find(&self, id: PackId) -> Option<&Pack> {
        self.data.iter().find(|pack| pack.id == id)
    }

    /// Whether a later page exists.
    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.meta.current_page < self.meta.last_page
    }
}

// Scores arrive either as JSON numbers or as decimal strings.
fn score<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    struct ScoreVisitor;

    impl de::Visitor<'_> for ScoreVisitor {
        type Value = f64;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a number or a numeric string")
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<f64, E> {
            Ok(value)
        }

        #[allow(clippy::cast_precision_loss)]
        fn visit_i64<E: de::Error>(self, value: i64) -> Result<f64, E> {
            Ok(value as f64)
        }

        #[allow(clippy::cast_precision_loss)]
        fn visit_u64<E: de::Error>(self, value: u64) -> Result<f64, E> {
            Ok(value as f64)
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<f64, E> {
            value
                .trim()
                .parse()
                .map_err(|_| E::invalid_value(Unexpected::Str(value), &self))
        }

        fn visit_unit<E: de::Error>(self) -> Result<f64, E> {
            Ok(0.0)
        }
    }

    deserializer.deserialize_any(ScoreVisitor)
}

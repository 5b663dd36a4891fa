//! HTTP implementation of [`CatalogProvider`] for the pack listing API.

use async_trait::async_trait;
use packdeck_config::AppConfig;
use packdeck_core::{CatalogFetchError, CatalogPage, CatalogProvider, CatalogQuery, CatalogResult};
use reqwest::header::{ACCEPT, ORIGIN};
use tracing::debug;
use url::Url;

/// Path of the listing endpoint below the API base URL.
pub const PACKS_PATH: &str = "/api/packs";
/// `Accept` header sent with catalog requests.
pub const ACCEPT_HEADER_VALUE: &str = "application/json, text/plain, */*";

/// Lists packs from a remote catalog.
#[derive(Debug, Clone)]
pub struct HttpCatalogProvider {
    client: reqwest::Client,
    endpoint: Url,
    origin: String,
}

impl HttpCatalogProvider {
    /// Provider for the catalog rooted at `api_base`, presenting `origin`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogFetchError::InvalidQuery`] when `api_base` is not a
    /// valid base URL.
    pub fn new(
        client: reqwest::Client,
        api_base: &str,
        origin: impl Into<String>,
    ) -> CatalogResult<Self> {
        let raw = format!("{}{PACKS_PATH}", api_base.trim_end_matches('/'));
        let endpoint = Url::parse(&raw).map_err(|_| CatalogFetchError::InvalidQuery {
            field: "api_url",
            reason: "invalid_url",
            value: Some(api_base.to_owned()),
        })?;
        Ok(Self {
            client,
            endpoint,
            origin: origin.into(),
        })
    }

    /// Provider configured from the application settings.
    ///
    /// # Errors
    ///
    /// See [`Self::new`].
    pub fn from_config(client: reqwest::Client, config: &AppConfig) -> CatalogResult<Self> {
        Self::new(client, &config.api_url, config.origin.clone())
    }

    /// Listing endpoint without query parameters.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Full request URL for `query`; its query string is the query's key.
    #[must_use]
    pub fn request_url(&self, query: &CatalogQuery) -> Url {
        let mut url = self.endpoint.clone();
        url.set_query(Some(query.key().as_str()));
        url
    }
}

#[async_trait]
impl CatalogProvider for HttpCatalogProvider {
    async fn list_packs(&self, query: &CatalogQuery) -> CatalogResult<CatalogPage> {
        let url = self.request_url(query);
        debug!(url = %url, "requesting catalog page");

        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, ACCEPT_HEADER_VALUE)
            .header(ORIGIN, &self.origin)
            .send()
            .await
            .map_err(|err| CatalogFetchError::Transport {
                url: url.to_string(),
                source: Box::new(err),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogFetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| CatalogFetchError::Transport {
                url: url.to_string(),
                source: Box::new(err),
            })?;
        serde_json::from_slice(&body).map_err(|err| CatalogFetchError::Decode {
            url: url.to_string(),
            source: Box::new(err),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packdeck_core::{SortField, SortSpec};

    #[test]
    fn request_url_carries_the_query_key() -> anyhow::Result<()> {
        let provider =
            HttpCatalogProvider::new(reqwest::Client::new(), "https://api.test/", "https://site.test")?;
        assert_eq!(provider.endpoint().as_str(), "https://api.test/api/packs");

        let query = CatalogQuery::new(2, 12, SortSpec::descending(SortField::Overall), "  ")?;
        assert_eq!(
            provider.request_url(&query).as_str(),
            "https://api.test/api/packs?page=2&limit=12&sort=-overall"
        );

        let search = CatalogQuery::new(1, 12, SortSpec::default(), "jack wave")?;
        assert_eq!(
            provider.request_url(&search).query(),
            Some(search.key().as_str())
        );
        Ok(())
    }

    #[test]
    fn invalid_base_is_rejected() {
        let result = HttpCatalogProvider::new(reqwest::Client::new(), "not a url", "x");
        assert!(matches!(
            result,
            Err(CatalogFetchError::InvalidQuery {
                field: "api_url",
                ..
            })
        ));
    }
}

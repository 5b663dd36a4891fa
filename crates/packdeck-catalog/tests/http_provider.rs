use httpmock::prelude::*;
use packdeck_catalog::{ACCEPT_HEADER_VALUE, HttpCatalogProvider};
use packdeck_core::{CatalogFetchError, CatalogProvider, CatalogQuery, SortField, SortSpec};
use serde_json::json;

fn provider(server: &MockServer) -> anyhow::Result<HttpCatalogProvider> {
    Ok(HttpCatalogProvider::new(
        reqwest::Client::new(),
        &server.base_url(),
        "https://etternaonline.com",
    )?)
}

fn listing() -> serde_json::Value {
    json!({
        "data": [
            {
                "id": 101,
                "name": "Jack Wave",
                "play_count": 5,
                "song_count": 12,
                "size": "120 MB",
                "overall": "25.5",
                "stream": 20.0,
                "jumpstream": "21",
                "handstream": "22",
                "jacks": "28.75",
                "chordjacks": "26",
                "stamina": "19",
                "technical": "18",
                "tags": [],
                "download": "https://files.test/101.zip",
                "magnet": ""
            }
        ],
        "links": { "first": null, "last": null, "prev": null, "next": null },
        "meta": {
            "current_page": 1,
            "from": 1,
            "last_page": 1,
            "links": [],
            "path": "/api/packs",
            "per_page": 12,
            "to": 1,
            "total": 1
        }
    })
}

#[tokio::test]
async fn lists_packs_with_expected_parameters_and_headers() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/packs")
                .query_param("page", "1")
                .query_param("limit", "12")
                .query_param("sort", "-jacks")
                .query_param("filter[search]", "jack wave")
                .header("accept", ACCEPT_HEADER_VALUE)
                .header("origin", "https://etternaonline.com");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(listing());
        })
        .await;

    let query = CatalogQuery::new(1, 12, SortSpec::descending(SortField::Jacks), " jack wave ")?;
    let page = provider(&server)?.list_packs(&query).await?;
    mock.assert_async().await;

    assert_eq!(page.pack_ids(), vec![101]);
    assert!((page.data[0].jacks - 28.75).abs() < f64::EPSILON);
    assert_eq!(page.meta.total, 1);
    Ok(())
}

#[tokio::test]
async fn error_statuses_are_reported() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/packs");
            then.status(502);
        })
        .await;

    let query = CatalogQuery::new(1, 12, SortSpec::default(), "")?;
    let err = provider(&server)?
        .list_packs(&query)
        .await
        .expect_err("502 must fail");
    assert!(matches!(err, CatalogFetchError::HttpStatus { status: 502, .. }));
    Ok(())
}

#[tokio::test]
async fn malformed_bodies_fail_to_decode() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/packs");
            then.status(200).body("{\"data\": 5}");
        })
        .await;

    let query = CatalogQuery::new(1, 12, SortSpec::default(), "")?;
    let err = provider(&server)?
        .list_packs(&query)
        .await
        .expect_err("malformed body must fail");
    assert!(matches!(err, CatalogFetchError::Decode { .. }));
    Ok(())
}

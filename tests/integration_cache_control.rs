//! Request `Cache-Control` handling (scenarios 4 and 5): `no-cache` forces revalidation but
//! still writes; `no-store` bypasses the cache entirely.

mod common;

use std::sync::atomic::Ordering;

use axum::body::Body;
use axum::http::Request;
use common::{build_test_app, test_data};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn cache_status(router: &axum::Router, uri: &str, cache_control: Option<&str>) -> String {
    let mut builder = Request::get(uri);
    if let Some(value) = cache_control {
        builder = builder.header("Cache-Control", value);
    }
    let response = router
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    response
        .headers()
        .get("x-cache")
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default()
}

#[tokio::test]
async fn no_cache_forces_revalidation_but_still_writes() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(test_data::json_user(1)))
        .mount(&mock_server)
        .await;

    let (_state, calls, router) = build_test_app(&mock_server.uri());

    assert_eq!(cache_status(&router, "/a", None).await, "MISS");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(
        cache_status(&router, "/a", Some("no-cache")).await,
        "MISS"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert_eq!(cache_status(&router, "/a", None).await, "HIT");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn no_store_never_reads_or_writes_the_cache() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/d"))
        .respond_with(ResponseTemplate::new(200).set_body_json(test_data::json_user(2)))
        .mount(&mock_server)
        .await;

    let (_state, calls, router) = build_test_app(&mock_server.uri());

    assert_eq!(
        cache_status(&router, "/d", Some("no-store")).await,
        "BYPASS"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(
        cache_status(&router, "/d", Some("no-store")).await,
        "BYPASS"
    );
    assert_eq!(
        calls.load(Ordering::SeqCst),
        2,
        "no-store must never populate the cache"
    );
}

mod support;

use std::fs;

use axum::http::{StatusCode, header};
use support::{Harness, jpeg, lists, png};

#[tokio::test]
async fn local_source_is_resized_cached_and_revalidated() {
    let harness = Harness::new(|_| {});
    harness.write_source("images/photo.png", &png(40, 20));

    let first = harness.get("/?src=/images/photo.png&w=10&h=10", &[]).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(first.headers[header::ACCEPT_RANGES], "none");
    assert_eq!(
        first.headers[header::CONTENT_LENGTH],
        first.body.len().to_string().as_str()
    );
    let decoded = image::load_from_memory(&first.body).expect("decodable thumbnail");
    assert_eq!((decoded.width(), decoded.height()), (10, 10));
    assert_eq!(harness.cache_entries().len(), 1);

    let etag = first.headers[header::ETAG]
        .to_str()
        .expect("etag")
        .to_string();
    let revalidated = harness
        .get(
            "/?src=/images/photo.png&w=10&h=10",
            &[(header::IF_NONE_MATCH, etag.as_str())],
        )
        .await;
    assert_eq!(revalidated.status, StatusCode::NOT_MODIFIED);
    assert!(revalidated.body.is_empty());
}

#[tokio::test]
async fn disabled_browser_cache_serves_entries_uncached() {
    let harness = Harness::new(|settings| settings.browser_cache.disabled = true);
    harness.write_source("images/photo.png", &png(40, 20));

    let first = harness.get("/?src=/images/photo.png&w=10&h=10", &[]).await;
    assert_eq!(first.status, StatusCode::OK);
    let cache_control = first.headers[header::CACHE_CONTROL]
        .to_str()
        .expect("cache-control");
    assert!(cache_control.starts_with("no-store"), "{cache_control}");
    assert_eq!(first.headers[header::PRAGMA], "no-cache");

    let etag = first.headers[header::ETAG]
        .to_str()
        .expect("etag")
        .to_string();
    let second = harness
        .get(
            "/?src=/images/photo.png&w=10&h=10",
            &[(header::IF_NONE_MATCH, etag.as_str())],
        )
        .await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body, first.body);
}

#[tokio::test]
async fn jpeg_width_only_request_keeps_aspect_ratio() {
    let harness = Harness::new(|_| {});
    harness.write_source("photos/wide.jpg", &jpeg(800, 600));

    let reply = harness.get("/?src=/photos/wide.jpg&w=200&h=0&zc=1", &[]).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers[header::CONTENT_TYPE], "image/jpeg");
    let decoded = image::load_from_memory(&reply.body).expect("decodable thumbnail");
    assert_eq!((decoded.width(), decoded.height()), (200, 150));
}

#[tokio::test]
async fn parameter_order_does_not_split_the_cache() {
    let harness = Harness::new(|_| {});
    harness.write_source("a.png", &png(30, 30));

    let one = harness.get("/?src=a.png&w=12&h=8", &[]).await;
    let two = harness.get("/?h=8&w=12&src=a.png", &[]).await;
    assert_eq!(one.status, StatusCode::OK);
    assert_eq!(two.status, StatusCode::OK);
    assert_eq!(one.body, two.body);
    assert_eq!(harness.cache_entries().len(), 1);
}

#[tokio::test]
async fn corrupt_entry_is_regenerated() {
    let harness = Harness::new(|_| {});
    harness.write_source("a.png", &png(16, 16));

    let first = harness.get("/?src=a.png&w=8&h=8", &[]).await;
    assert_eq!(first.status, StatusCode::OK);
    let entries = harness.cache_entries();
    assert_eq!(entries.len(), 1);
    fs::write(&entries[0], b"this is not a cache entry").expect("corrupt entry");

    let second = harness.get("/?src=a.png&w=8&h=8", &[]).await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body, first.body);
    let rewritten = fs::read(&entries[0]).expect("entry rewritten");
    assert!(rewritten.starts_with(thumbd::cache::PREAMBLE));
}

#[tokio::test]
async fn missing_src_lists_the_error() {
    let harness = Harness::new(|_| {});

    let reply = harness.get("/?src=&w=10", &[]).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(lists(&reply, "No image specified"));
    assert!(lists(&reply, "src=&w=10"));
}

#[tokio::test]
async fn unknown_local_file_is_reported() {
    let harness = Harness::new(|_| {});

    let reply = harness.get("/?src=/nowhere/at-all.png", &[]).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(lists(
        &reply,
        "Could not find the internal image you specified."
    ));
}

#[tokio::test]
async fn configured_not_found_image_replaces_the_listing() {
    let fallback = tempfile::TempDir::new().expect("fallback dir");
    let path = fallback.path().join("missing.png");
    fs::write(&path, png(2, 2)).expect("fallback image");

    let harness = Harness::new(|settings| settings.responses.not_found_image = Some(path));
    let reply = harness.get("/?src=/gone.png", &[]).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(reply.headers[header::PRAGMA], "no-cache");
}

#[tokio::test]
async fn foreign_referrers_get_the_hotlink_image() {
    let harness = Harness::new(|settings| settings.responses.block_external_leechers = true);
    harness.write_source("a.png", &png(10, 10));

    let leech = harness
        .get("/?src=a.png", &[(header::REFERER, "https://elsewhere.example/page")])
        .await;
    assert_eq!(leech.status, StatusCode::OK);
    assert_eq!(leech.headers[header::CONTENT_TYPE], "image/gif");
    assert!(leech.body.starts_with(b"GIF89a"));
    assert!(harness.cache_entries().is_empty());

    let own = harness
        .get("/?src=a.png", &[(header::REFERER, "http://www.thumbs.test/gallery")])
        .await;
    assert_eq!(own.status, StatusCode::OK);
    assert_eq!(own.headers[header::CONTENT_TYPE], "image/png");
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let harness = Harness::new(|_| {});
    let reply = harness.get("/?src=", &[]).await;
    assert!(reply.headers.contains_key("x-request-id"));
}

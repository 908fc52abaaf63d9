//! Streaming cache entries with conditional-request headers.

use std::{
    io,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_stream::stream;
use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};
use tokio::io::AsyncReadExt;

use crate::{cache::OpenEntry, config::BrowserCacheSettings};

const CHUNK_SIZE: usize = 64 * 1024;
const NO_STORE: &str = "no-store, no-cache, must-revalidate, max-age=0";

const HTTP_DATE: &[FormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Writes image responses for cache entries and fallback images.
#[derive(Debug, Clone)]
pub struct ResponseServer {
    browser_cache: BrowserCacheSettings,
}

impl ResponseServer {
    pub fn new(browser_cache: BrowserCacheSettings) -> Self {
        Self { browser_cache }
    }

    /// The entry's mtime in whole seconds, quoted.
    pub fn etag(modified: SystemTime) -> String {
        let seconds = modified
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        format!("\"{seconds}\"")
    }

    pub fn is_not_modified(&self, request: &HeaderMap, modified: SystemTime) -> bool {
        if self.browser_cache.disabled {
            return false;
        }
        request
            .get(header::IF_NONE_MATCH)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == Self::etag(modified))
    }

    pub fn not_modified(&self) -> Response {
        let mut response = StatusCode::NOT_MODIFIED.into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        response
    }

    /// Stream the payload of a validated entry.
    pub fn serve(&self, entry: OpenEntry) -> Response {
        let OpenEntry { file, header, meta } = entry;
        let body = stream! {
            let mut file = tokio::fs::File::from_std(file);
            let mut buffer = vec![0u8; CHUNK_SIZE];
            loop {
                match file.read(&mut buffer).await {
                    Ok(0) => break,
                    Ok(read) => yield Ok::<Bytes, io::Error>(Bytes::copy_from_slice(&buffer[..read])),
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                }
            }
        };

        let mut response = Response::new(Body::from_stream(body));
        let headers = response.headers_mut();
        image_headers(headers, header.kind.mime(), header.payload_len);
        insert(headers, header::ETAG, &Self::etag(meta.modified));
        self.cache_headers(headers, SystemTime::now());
        response
    }

    /// In-memory image that must never be cached by the client.
    pub fn serve_uncached(&self, status: StatusCode, mime: &str, bytes: Vec<u8>) -> Response {
        let len = bytes.len() as u64;
        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        let headers = response.headers_mut();
        image_headers(headers, mime, len);
        no_store_headers(headers, SystemTime::now());
        response
    }

    fn cache_headers(&self, headers: &mut HeaderMap, now: SystemTime) {
        if self.browser_cache.disabled {
            no_store_headers(headers, now);
            return;
        }
        let max_age = self.browser_cache.max_age;
        insert(
            headers,
            header::CACHE_CONTROL,
            &format!("max-age={}, must-revalidate", max_age.as_secs()),
        );
        insert(headers, header::EXPIRES, &http_date(now + max_age));
    }
}

fn image_headers(headers: &mut HeaderMap, mime: &str, len: u64) {
    insert(headers, header::CONTENT_TYPE, mime);
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("none"));
    insert(headers, header::CONTENT_LENGTH, &len.to_string());
}

fn no_store_headers(headers: &mut HeaderMap, now: SystemTime) {
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    insert(headers, header::EXPIRES, &http_date(now));
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(at: SystemTime) -> String {
    let seconds = at
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    OffsetDateTime::from_unix_timestamp(i64::try_from(seconds).unwrap_or(i64::MAX))
        .ok()
        .and_then(|moment| moment.format(HTTP_DATE).ok())
        .unwrap_or_default()
}

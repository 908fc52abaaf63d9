use std::sync::Arc;

use axum::{
    Router,
    extract::{RawQuery, State},
    http::{HeaderMap, header},
    middleware,
    response::Response,
    routing::get,
};
use tracing::info;

use crate::{
    application::{
        error::ThumbError,
        thumbnail::{ThumbnailService, normalize_src, strip_http_scheme},
    },
    cache::{CacheStore, KeyDeriver},
    config::Settings,
    domain::QueryParams,
};

use super::{
    fallback::FallbackResponder,
    middleware::{log_responses, set_request_context},
    response::ResponseServer,
};

#[derive(Clone)]
pub struct HttpState {
    pub thumbnails: Arc<ThumbnailService>,
    pub responses: Arc<ResponseServer>,
    pub fallback: Arc<FallbackResponder>,
    pub block_external_leechers: bool,
}

impl HttpState {
    pub fn new(
        settings: &Settings,
        store: Arc<CacheStore>,
        keys: KeyDeriver,
    ) -> Result<Self, ThumbError> {
        let responses = ResponseServer::new(settings.browser_cache.clone());
        Ok(Self {
            thumbnails: Arc::new(ThumbnailService::new(settings, store, keys)?),
            fallback: Arc::new(FallbackResponder::new(
                settings.responses.clone(),
                responses.clone(),
            )),
            responses: Arc::new(responses),
            block_external_leechers: settings.responses.block_external_leechers,
        })
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(thumbnail))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn thumbnail(
    State(state): State<HttpState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let raw = query.unwrap_or_default();
    let params = QueryParams::parse(&raw);
    let host = request_host(&headers);

    state.thumbnails.run_cleanup().await;

    let src = match normalize_src(params.get("src"), host.as_deref()) {
        Ok(src) => src,
        Err(err) => return state.fallback.respond(&err, &raw).await,
    };

    if state.block_external_leechers && is_foreign_referrer(&headers, host.as_deref()) {
        info!(
            target = "thumbd::http::public",
            op = "thumbnail::hotlink",
            result = "blocked",
            referer = headers
                .get(header::REFERER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or(""),
            "Blocked hotlinked request"
        );
        return state.fallback.hotlink();
    }

    let prepared = match state.thumbnails.prepare(&params, &src).await {
        Ok(prepared) => prepared,
        Err(err) => return state.fallback.respond(&err, &raw).await,
    };
    let entry = match state.thumbnails.entry(&prepared).await {
        Ok(entry) => entry,
        Err(err) => return state.fallback.respond(&err, &raw).await,
    };

    if state
        .responses
        .is_not_modified(&headers, entry.meta.modified)
    {
        return state.responses.not_modified();
    }
    state.responses.serve(entry)
}

fn request_host(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(|host| host.trim().to_ascii_lowercase())
        .filter(|host| !host.is_empty())
}

/// A `Referer` is present and does not point at `http(s)://(www.)?{host}`.
fn is_foreign_referrer(headers: &HeaderMap, host: Option<&str>) -> bool {
    let Some(referer) = headers
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
    else {
        return false;
    };
    let Some(host) = host else {
        return true;
    };
    let Some(rest) = strip_http_scheme(referer) else {
        return true;
    };
    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    let matches_host = rest
        .get(..host.len())
        .is_some_and(|candidate| candidate.eq_ignore_ascii_case(host))
        && matches!(rest.as_bytes().get(host.len()), None | Some(b'/'));
    !matches_host
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn with_referer(referer: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::REFERER,
            HeaderValue::from_str(referer).expect("header"),
        );
        headers
    }

    #[test]
    fn own_site_referrers_are_allowed() {
        let host = Some("example.com");
        assert!(!is_foreign_referrer(&HeaderMap::new(), host));
        assert!(!is_foreign_referrer(&with_referer("https://example.com/page"), host));
        assert!(!is_foreign_referrer(&with_referer("HTTP://www.example.com"), host));
    }

    #[test]
    fn other_referrers_are_foreign() {
        let host = Some("example.com");
        assert!(is_foreign_referrer(&with_referer("https://evil.net/"), host));
        assert!(is_foreign_referrer(&with_referer("https://example.com.evil.net/"), host));
        assert!(is_foreign_referrer(&with_referer("ftp://example.com/"), host));
    }
}

//! Responses for failed requests: fallback images, an HTML error list, or the hotlink image.

use std::path::Path;

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use tracing::warn;

use crate::{
    application::error::{ErrorReport, ThumbError},
    config::ResponseSettings,
    domain::sniff_mime,
};

use super::response::ResponseServer;

const SOURCE: &str = "infra::http::fallback";

/// "No hotlinking" banner served to foreign referrers.
const HOTLINK_GIF: &str = "R0lGODlhUAAMAIAAAP8AAP///yH5BAAHAP8ALAAAAABQAAwAAAJpjI+py+0Po5y0OgAMjjv01YUZOGplhWXfNa6JCLnWkXplrcBmW+spbwvaVr/cDyg7IoFC2KbYVC2NQ5MQ4ZNao9Ynzjl9ScNYpneb\
DULB3RP6JuPuaGfuuV4fumf8PuvqFyhYtjdoeFgAADs=";

#[derive(Debug, Clone)]
pub struct FallbackResponder {
    settings: ResponseSettings,
    server: ResponseServer,
}

impl FallbackResponder {
    pub fn new(settings: ResponseSettings, server: ResponseServer) -> Self {
        Self { settings, server }
    }

    /// Render `error` as the configured substitute image or an error listing.
    pub async fn respond(&self, error: &ThumbError, query: &str) -> Response {
        let status = error.status_code();
        let report = ErrorReport::from_error(SOURCE, status, error);
        let mut messages = report.messages.clone();

        if error.is_not_found()
            && let Some(path) = self.settings.not_found_image.as_deref()
        {
            match self.image(status, path).await {
                Some(mut response) => {
                    report.attach(&mut response);
                    return response;
                }
                None => messages.push(
                    "Additionally, the 404 image that is configured could not be found or there was an error serving it.".to_string(),
                ),
            }
        }

        if let Some(path) = self.settings.error_image.as_deref() {
            match self.image(status, path).await {
                Some(mut response) => {
                    report.attach(&mut response);
                    return response;
                }
                None => messages.push(
                    "Additionally, the error image that is configured could not be found or there was an error serving it.".to_string(),
                ),
            }
        }

        let mut response = if self.settings.display_error_messages {
            let mut response = (StatusCode::BAD_REQUEST, error_listing(&messages, query))
                .into_response();
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            );
            response
        } else {
            StatusCode::BAD_REQUEST.into_response()
        };
        ErrorReport {
            messages,
            ..report
        }
        .attach(&mut response);
        response
    }

    pub fn hotlink(&self) -> Response {
        match STANDARD.decode(HOTLINK_GIF) {
            Ok(gif) => self.server.serve_uncached(StatusCode::OK, "image/gif", gif),
            Err(err) => {
                let mut response = StatusCode::FORBIDDEN.into_response();
                ErrorReport::from_error(SOURCE, StatusCode::FORBIDDEN, &err).attach(&mut response);
                response
            }
        }
    }

    async fn image(&self, status: StatusCode, path: &Path) -> Option<Response> {
        match tokio::fs::read(path).await {
            Ok(bytes) if !bytes.is_empty() => {
                let mime = sniff_mime(&bytes);
                Some(self.server.serve_uncached(status, &mime, bytes))
            }
            Ok(_) => None,
            Err(err) => {
                warn!(
                    target = "thumbd::http::fallback",
                    op = "fallback::image",
                    result = "error",
                    path = %path.display(),
                    error = %err,
                    "Configured fallback image is unreadable"
                );
                None
            }
        }
    }
}

fn error_listing(messages: &[String], query: &str) -> String {
    let items: String = messages
        .iter()
        .map(|message| format!("<li>{}</li>", ammonia::clean_text(message)))
        .collect();
    format!(
        "<h1>A thumbd error has occurred</h1>The following error(s) occurred:<br /><ul>{items}</ul><br /><br />Query String : {}<br />thumbd version : {}",
        ammonia::clean_text(query),
        env!("CARGO_PKG_VERSION"),
    )
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use tempfile::TempDir;

    use super::*;
    use crate::config::BrowserCacheSettings;

    fn responder(settings: ResponseSettings) -> FallbackResponder {
        FallbackResponder::new(
            settings,
            ResponseServer::new(BrowserCacheSettings::default()),
        )
    }

    #[test]
    fn hotlink_image_is_a_gif() {
        let response = responder(ResponseSettings::default()).hotlink();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/gif");
    }

    #[test]
    fn listing_escapes_messages_and_query() {
        let html = error_listing(&["<script>".to_string()], "src=<b>");
        assert!(html.contains("<li>&lt;script&gt;</li>"));
        assert!(html.contains("Query String : src&#61;&lt;b&gt;"));
    }

    #[tokio::test]
    async fn missing_error_image_falls_back_to_listing() {
        let response = responder(ResponseSettings {
            error_image: Some("/definitely/not/here.png".into()),
            ..ResponseSettings::default()
        })
        .respond(&ThumbError::input("No image specified"), "src=")
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = String::from_utf8(body.to_vec()).expect("utf8");
        assert!(body.contains(&ammonia::clean_text("No image specified")));
        assert!(body.contains(&ammonia::clean_text(
            "error image that is configured could not be found"
        )));
    }

    #[tokio::test]
    async fn not_found_image_is_served_with_404() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("404.gif");
        std::fs::write(&path, b"GIF89a-not-really").expect("write");

        let response = responder(ResponseSettings {
            not_found_image: Some(path),
            ..ResponseSettings::default()
        })
        .respond(&ThumbError::not_found("gone"), "")
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/gif");
        assert!(
            response
                .headers()
                .get(header::CACHE_CONTROL)
                .is_some_and(|value| value.to_str().unwrap_or("").starts_with("no-store"))
        );
    }

    #[tokio::test]
    async fn hidden_messages_give_empty_400() {
        let response = responder(ResponseSettings {
            display_error_messages: false,
            ..ResponseSettings::default()
        })
        .respond(&ThumbError::input("bad"), "")
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert!(body.is_empty());
    }
}

use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::{
    application::{fetch::FetchError, transform::TransformError, webshot::WebshotError},
    cache::CacheError,
    infra::sources::SourceError,
};

/// Error chain attached to a failing response for the logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Request-level failure taxonomy.
#[derive(Debug, Error)]
pub enum ThumbError {
    #[error("{0}")]
    Input(String),
    #[error("{0}")]
    NotFound(String),
    #[error("the source image could not be decoded")]
    Decode(#[source] TransformError),
    #[error("the thumbnail could not be produced")]
    Transform(#[source] TransformError),
    #[error("the thumbnail cache failed")]
    Cache(#[from] CacheError),
    #[error("error reading the URL you specified from remote host")]
    Fetch(#[source] FetchError),
    #[error("the webshot could not be taken")]
    Webshot(#[from] WebshotError),
    #[error("{0}")]
    Config(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl ThumbError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Selects the not-found fallback image over the generic error image.
    pub fn is_not_found(&self) -> bool {
        match self {
            ThumbError::NotFound(_) => true,
            ThumbError::Fetch(err) => err.is_not_found(),
            ThumbError::Webshot(err) => err.is_not_found(),
            _ => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        if self.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::BAD_REQUEST
        }
    }
}

impl From<TransformError> for ThumbError {
    fn from(error: TransformError) -> Self {
        match error {
            TransformError::TooLarge { .. } => ThumbError::Input(error.to_string()),
            TransformError::Unsupported { .. } | TransformError::Decode { .. } => {
                ThumbError::Decode(error)
            }
            TransformError::Encode { .. } => ThumbError::Transform(error),
        }
    }
}

impl From<FetchError> for ThumbError {
    fn from(error: FetchError) -> Self {
        if error.is_policy() {
            ThumbError::Input(error.to_string())
        } else {
            ThumbError::Fetch(error)
        }
    }
}

impl From<SourceError> for ThumbError {
    fn from(error: SourceError) -> Self {
        if error.is_not_found() {
            ThumbError::NotFound(error.to_string())
        } else {
            ThumbError::Input(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_collects_source_chain() {
        let err = ThumbError::from(CacheError::Corrupt {
            path: "/tmp/x.cache".into(),
            reason: "delimiter mismatch",
        });
        let report = ErrorReport::from_error("test", err.status_code(), &err);
        assert_eq!(report.status, StatusCode::BAD_REQUEST);
        assert_eq!(report.messages.len(), 2);
        assert!(report.messages[1].contains("delimiter mismatch"));
    }

    #[test]
    fn not_found_variants_map_to_404() {
        assert!(ThumbError::not_found("gone").is_not_found());
        assert_eq!(
            ThumbError::from(FetchError::NotFound {
                url: "http://example.com/a.png".into()
            })
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert!(!ThumbError::input("bad").is_not_found());
    }

    #[test]
    fn policy_fetch_errors_are_input_errors() {
        let err = ThumbError::from(FetchError::Disabled);
        assert!(matches!(err, ThumbError::Input(_)));
        let err = ThumbError::from(FetchError::Timeout);
        assert!(matches!(err, ThumbError::Fetch(_)));
    }
}

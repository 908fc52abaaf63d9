//! Bounded acquisition of external images.
//!
//! The body is streamed to a staging file while a running byte count is
//! checked against the cap, so oversized downloads abort mid-transfer. The
//! client-wide timeout bounds the whole exchange.

use std::{io, path::PathBuf, time::Duration, time::Instant};

use reqwest::{Client, StatusCode, redirect::Policy};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use url::Url;

use crate::domain::ImageKind;

const TARGET: &str = "thumbd::fetch";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("you are not allowed to fetch images from an external website")]
    Disabled,
    #[error("invalid URL supplied: {0}")]
    InvalidUrl(String),
    #[error("you may not fetch images from host `{host}`")]
    HostNotAllowed { host: String },
    #[error("remote image `{url}` was not found")]
    NotFound { url: String },
    #[error("external image is redirecting ({status}); try the target URL directly")]
    Redirect { status: StatusCode },
    #[error("too many redirects")]
    TooManyRedirects,
    #[error("remote host answered {status}")]
    Status { status: StatusCode },
    #[error("remote file exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("timed out fetching the remote image")]
    Timeout,
    #[error("the remote file is not a valid image (detected `{mime}`)")]
    NotAnImage { mime: String },
    #[error("transport error")]
    Transport(#[source] reqwest::Error),
    #[error("failed to stage the download")]
    Io(#[from] io::Error),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }

    /// Refusals decided before any network traffic.
    pub fn is_policy(&self) -> bool {
        matches!(
            self,
            FetchError::Disabled | FetchError::InvalidUrl(_) | FetchError::HostNotAllowed { .. }
        )
    }

    fn code(&self) -> &'static str {
        match self {
            FetchError::Disabled => "disabled",
            FetchError::InvalidUrl(_) => "invalid_url",
            FetchError::HostNotAllowed { .. } => "host_not_allowed",
            FetchError::NotFound { .. } => "not_found",
            FetchError::Redirect { .. } => "redirect",
            FetchError::TooManyRedirects => "too_many_redirects",
            FetchError::Status { .. } => "status",
            FetchError::TooLarge { .. } => "too_large",
            FetchError::Timeout => "timeout",
            FetchError::NotAnImage { .. } => "not_an_image",
            FetchError::Transport(_) => "transport",
            FetchError::Io(_) => "io",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FetchError::Timeout
        } else if error.is_redirect() {
            FetchError::TooManyRedirects
        } else {
            FetchError::Transport(error)
        }
    }
}

/// Settings the gate needs, resolved from configuration.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub allow_external: bool,
    pub allowed_sites: Vec<String>,
    pub max_bytes: u64,
    pub timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: String,
    /// Directory for in-flight downloads; the cache directory in practice.
    pub staging_dir: PathBuf,
    pub staging_prefix: String,
}

#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub kind: ImageKind,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct FetchGate {
    client: Client,
    policy: FetchPolicy,
}

impl FetchGate {
    pub fn new(policy: FetchPolicy) -> Result<Self, FetchError> {
        let redirect = if policy.max_redirects == 0 {
            Policy::none()
        } else {
            allow_listed_redirects(policy.max_redirects, policy.allowed_sites.clone())
        };
        let client = Client::builder()
            .timeout(policy.timeout)
            .redirect(redirect)
            .user_agent(policy.user_agent.clone())
            .build()
            .map_err(FetchError::Transport)?;
        Ok(Self { client, policy })
    }

    /// Parse `raw` and check it against the external-source policy.
    pub fn check_url(&self, raw: &str) -> Result<Url, FetchError> {
        if !self.policy.allow_external {
            return Err(FetchError::Disabled);
        }
        let url = Url::parse(raw).map_err(|err| FetchError::InvalidUrl(err.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(format!(
                "unsupported scheme `{}`",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| FetchError::InvalidUrl("missing host".to_string()))?
            .to_ascii_lowercase();
        if !host_allowed(&host, &self.policy.allowed_sites) {
            return Err(FetchError::HostNotAllowed { host });
        }
        Ok(url)
    }

    /// Download `url` and verify it is a supported image.
    pub async fn fetch(&self, url: &Url) -> Result<FetchedImage, FetchError> {
        let started_at = Instant::now();
        let result = self.fetch_inner(url).await;
        match &result {
            Ok(fetched) => info!(
                target = TARGET,
                op = "fetch::get",
                result = "ok",
                url = %url,
                bytes = fetched.bytes.len(),
                kind = fetched.kind.tag(),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                "External image fetched"
            ),
            Err(err) => {
                metrics::counter!("thumbd_fetch_failure_total", "reason" => err.code())
                    .increment(1);
                warn!(
                    target = TARGET,
                    op = "fetch::get",
                    result = "error",
                    error_code = err.code(),
                    url = %url,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error = %err,
                    "External image fetch failed"
                );
            }
        }
        result
    }

    async fn fetch_inner(&self, url: &Url) -> Result<FetchedImage, FetchError> {
        let mut response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                url: url.to_string(),
            });
        }
        if status.is_redirection() {
            return Err(FetchError::Redirect { status });
        }
        if !status.is_success() {
            return Err(FetchError::Status { status });
        }

        let staging = tempfile::Builder::new()
            .prefix(&self.policy.staging_prefix)
            .suffix(".tmp")
            .tempfile_in(&self.policy.staging_dir)?;
        let (file, path) = staging.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let limit = self.policy.max_bytes;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            written += chunk.len() as u64;
            if written > limit {
                return Err(FetchError::TooLarge { limit });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        let bytes = tokio::fs::read(&path).await?;
        let kind = ImageKind::detect(&bytes).ok_or_else(|| FetchError::NotAnImage {
            mime: crate::domain::sniff_mime(&bytes),
        })?;
        Ok(FetchedImage { kind, bytes })
    }
}

/// Follow at most `max` hops, and only to allowed hosts. A hop elsewhere is
/// not followed, so its 3xx surfaces as [`FetchError::Redirect`].
fn allow_listed_redirects(max: usize, allowed_sites: Vec<String>) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > max {
            return attempt.error("too many redirects");
        }
        let allowed = attempt
            .url()
            .host_str()
            .is_some_and(|host| host_allowed(&host.to_ascii_lowercase(), &allowed_sites));
        if allowed {
            attempt.follow()
        } else {
            attempt.stop()
        }
    })
}

/// Exact host or any subdomain of an allowed site. An empty list allows nothing.
pub fn host_allowed(host: &str, allowed_sites: &[String]) -> bool {
    allowed_sites.iter().any(|site| {
        let site = site.trim().trim_start_matches('.').to_ascii_lowercase();
        !site.is_empty()
            && (host == site
                || host
                    .strip_suffix(site.as_str())
                    .is_some_and(|rest| rest.ends_with('.')))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sites(list: &[&str]) -> Vec<String> {
        list.iter().map(|site| site.to_string()).collect()
    }

    #[test]
    fn empty_allow_list_refuses_everything() {
        assert!(!host_allowed("example.com", &[]));
    }

    #[test]
    fn subdomains_match_but_lookalikes_do_not() {
        let allowed = sites(&["flickr.com", ".Imgur.com"]);
        assert!(host_allowed("flickr.com", &allowed));
        assert!(host_allowed("farm1.flickr.com", &allowed));
        assert!(host_allowed("i.imgur.com", &allowed));
        assert!(!host_allowed("evilflickr.com", &allowed));
        assert!(!host_allowed("flickr.com.evil.net", &allowed));
    }

    fn gate(allow_external: bool, allowed: &[&str]) -> FetchGate {
        FetchGate::new(FetchPolicy {
            allow_external,
            allowed_sites: sites(allowed),
            max_bytes: 1024,
            timeout: Duration::from_secs(5),
            max_redirects: 2,
            user_agent: "thumbd-test".to_string(),
            staging_dir: std::env::temp_dir(),
            staging_prefix: "thumbd_tmp_".to_string(),
        })
        .expect("client")
    }

    #[test]
    fn check_url_applies_policy() {
        assert!(matches!(
            gate(false, &["example.com"]).check_url("http://example.com/a.png"),
            Err(FetchError::Disabled)
        ));
        let gate = gate(true, &["example.com"]);
        assert!(gate.check_url("https://cdn.example.com/a.png").is_ok());
        assert!(matches!(
            gate.check_url("ftp://example.com/a.png"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            gate.check_url("http://other.org/a.png"),
            Err(FetchError::HostNotAllowed { .. })
        ));
    }
}

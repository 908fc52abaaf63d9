//! Website screenshots via CutyCapt, optionally under `xvfb-run`.
//!
//! Every value reaches the child process as its own argv element; the URL is
//! additionally restricted to a conservative character set.

use std::{
    fs, io,
    io::ErrorKind,
    path::PathBuf,
    process::{Command, Stdio},
    time::Instant,
};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::config::WebshotSettings;

const TARGET: &str = "thumbd::webshot";

#[derive(Debug, Error)]
pub enum WebshotError {
    #[error("webshots are disabled on this server")]
    Disabled,
    #[error("{name} is not installed at `{}`", path.display())]
    MissingBinary { name: &'static str, path: PathBuf },
    #[error("invalid URL supplied for webshot")]
    InvalidUrl,
    #[error("failed to start the screenshot command")]
    Spawn(#[source] io::Error),
    #[error("screenshot command exited with {exit_code:?}: {stderr}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("the command to create a webshot produced no image")]
    NoOutput,
    #[error("failed to stage webshot output")]
    Io(#[from] io::Error),
}

impl WebshotError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, WebshotError::NoOutput)
    }
}

#[derive(Debug, Clone)]
pub struct WebshotRenderer {
    settings: WebshotSettings,
    staging_dir: PathBuf,
    staging_prefix: String,
}

impl WebshotRenderer {
    pub fn new(settings: WebshotSettings, staging_dir: PathBuf, staging_prefix: String) -> Self {
        Self {
            settings,
            staging_dir,
            staging_prefix,
        }
    }

    /// Keep only characters that are safe in a URL and never meaningful to a shell.
    pub fn sanitize_url(url: &str) -> Result<String, WebshotError> {
        let cleaned: String = url
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric() || "-._:/?&+;=".contains(*ch))
            .collect();
        let rest = cleaned
            .strip_prefix("http://")
            .or_else(|| cleaned.strip_prefix("https://"))
            .ok_or(WebshotError::InvalidUrl)?;
        if !rest
            .chars()
            .next()
            .is_some_and(|ch| ch.is_ascii_alphanumeric() || ch == '.' || ch == '-')
        {
            return Err(WebshotError::InvalidUrl);
        }
        Ok(cleaned)
    }

    fn command(&self, url: &str, output: &std::path::Path) -> Command {
        let settings = &self.settings;
        let mut command = if settings.xvfb_running {
            let mut command = Command::new(&settings.cutycapt_path);
            command.env("DISPLAY", ":100.0");
            command
        } else {
            let mut command = Command::new(&settings.xvfb_path);
            command
                .arg(format!(
                    "--server-args=-screen 0, {}x{}x{}",
                    settings.screen_x, settings.screen_y, settings.color_depth
                ))
                .arg(&settings.cutycapt_path);
            command
        };
        if let Some(proxy) = settings.proxy.as_deref().filter(|proxy| !proxy.is_empty()) {
            command.arg(format!("--http-proxy={proxy}"));
        }
        let on_off = |flag: bool| if flag { "on" } else { "off" };
        command
            .arg(format!("--max-wait={}", settings.timeout.as_millis()))
            .arg(format!("--user-agent={}", settings.user_agent))
            .arg(format!("--javascript={}", on_off(settings.javascript)))
            .arg(format!("--java={}", on_off(settings.java)))
            .arg(format!("--plugins={}", on_off(settings.plugins)))
            .arg("--js-can-open-windows=off")
            .arg(format!("--url={url}"))
            .arg(format!("--out-format={}", settings.image_format))
            .arg(format!("--out={}", output.display()));
        command
    }

    /// Render `url` and return the screenshot bytes. Blocking.
    pub fn capture(&self, url: &Url) -> Result<Vec<u8>, WebshotError> {
        if !self.settings.enabled {
            return Err(WebshotError::Disabled);
        }
        if !self.settings.cutycapt_path.is_file() {
            return Err(WebshotError::MissingBinary {
                name: "CutyCapt",
                path: self.settings.cutycapt_path.clone(),
            });
        }
        if !self.settings.xvfb_running && !self.settings.xvfb_path.is_file() {
            return Err(WebshotError::MissingBinary {
                name: "xvfb-run",
                path: self.settings.xvfb_path.clone(),
            });
        }
        let url = Self::sanitize_url(url.as_str())?;

        let started_at = Instant::now();
        let output = tempfile::Builder::new()
            .prefix(&self.staging_prefix)
            .suffix(".tmp")
            .tempfile_in(&self.staging_dir)?;

        let result = self
            .command(&url, output.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output();
        let result = match result {
            Ok(result) => result,
            Err(err) => {
                warn!(
                    target = TARGET,
                    op = "webshot::capture",
                    result = "error",
                    error_code = "spawn",
                    error = %err,
                    "Failed to spawn screenshot command"
                );
                return Err(WebshotError::Spawn(err));
            }
        };
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).into_owned();
            warn!(
                target = TARGET,
                op = "webshot::capture",
                result = "error",
                error_code = "exit_status",
                exit_code = result.status.code().map(i64::from).unwrap_or(-1),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                stderr = %stderr,
                "Screenshot command failed"
            );
            return Err(WebshotError::Failed {
                exit_code: result.status.code(),
                stderr,
            });
        }

        let bytes = match fs::read(output.path()) {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => return Err(WebshotError::NoOutput),
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(WebshotError::NoOutput),
            Err(err) => return Err(WebshotError::Io(err)),
        };
        info!(
            target = TARGET,
            op = "webshot::capture",
            result = "ok",
            url = %url,
            bytes = bytes.len(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Webshot captured"
        );
        Ok(bytes)
    }
}

//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::NonZeroU64,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::{CanvasColor, ZoomCrop};

mod cli;

pub use cli::{CacheOverrides, CleanArgs, CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "thumbd";
const ENV_PREFIX: &str = "THUMBD";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_FILE_SIZE: u64 = 15 * 1024 * 1024;
const DEFAULT_CACHE_DIR: &str = "./cache";
const DEFAULT_CACHE_PREFIX: &str = "thumbd";
const DEFAULT_CACHE_SUFFIX: &str = ".cache";
const DEFAULT_CLEAN_INTERVAL_SECS: i64 = 86_400;
const DEFAULT_CACHE_MAX_AGE_SECS: u64 = 86_400;
const DEFAULT_FAILURE_BACKOFF_SECS: u64 = 3_600;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;
const DEFAULT_MAX_REDIRECTS: usize = 10;
const DEFAULT_FETCH_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.1) AppleWebKit/534.30 (KHTML, like Gecko) Chrome/12.0.742.122 Safari/534.30";
const DEFAULT_WIDTH: u32 = 100;
const DEFAULT_HEIGHT: u32 = 100;
const DEFAULT_MAX_WIDTH: u32 = 1920;
const DEFAULT_MAX_HEIGHT: u32 = 1920;
const DEFAULT_ZOOM_CROP: i64 = 1;
const DEFAULT_QUALITY: u8 = 90;
const DEFAULT_CANVAS_COLOR: &str = "ffffff";
const DEFAULT_BROWSER_CACHE_MAX_AGE_SECS: u64 = 864_000;
pub(crate) const DEFAULT_OPTIPNG_PATH: &str = "/usr/bin/optipng";
pub(crate) const DEFAULT_PNGCRUSH_PATH: &str = "/usr/bin/pngcrush";
const DEFAULT_CUTYCAPT_PATH: &str = "/usr/local/bin/CutyCapt";
const DEFAULT_XVFB_PATH: &str = "/usr/bin/xvfb-run";
const DEFAULT_WEBSHOT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows; U; Windows NT 6.1; en-US; rv:1.9.2.18) Gecko/20110614 Firefox/3.6.18";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub source: SourceSettings,
    pub cache: CacheSettings,
    pub fetch: FetchSettings,
    pub transform: TransformSettings,
    pub browser_cache: BrowserCacheSettings,
    pub optimizer: OptimizerSettings,
    pub webshot: WebshotSettings,
    pub responses: ResponseSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub document_root: PathBuf,
    pub max_file_size: NonZeroU64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            document_root: PathBuf::from("."),
            max_file_size: NonZeroU64::new(DEFAULT_MAX_FILE_SIZE).unwrap_or(NonZeroU64::MIN),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub directory: PathBuf,
    pub prefix: String,
    pub suffix: String,
    /// `None` when cleanup is disabled.
    pub clean_interval: Option<Duration>,
    pub max_age: Duration,
    pub failure_backoff: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from(DEFAULT_CACHE_DIR),
            prefix: DEFAULT_CACHE_PREFIX.to_string(),
            suffix: DEFAULT_CACHE_SUFFIX.to_string(),
            clean_interval: Some(Duration::from_secs(DEFAULT_CLEAN_INTERVAL_SECS as u64)),
            max_age: Duration::from_secs(DEFAULT_CACHE_MAX_AGE_SECS),
            failure_backoff: Duration::from_secs(DEFAULT_FAILURE_BACKOFF_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub allow_external: bool,
    pub allowed_sites: Vec<String>,
    pub timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            allow_external: false,
            allowed_sites: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: DEFAULT_FETCH_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformSettings {
    pub default_width: u32,
    pub default_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub default_zoom_crop: ZoomCrop,
    pub default_quality: u8,
    pub default_filters: String,
    pub default_sharpen: bool,
    pub default_canvas_color: CanvasColor,
    pub png_is_transparent: bool,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            default_width: DEFAULT_WIDTH,
            default_height: DEFAULT_HEIGHT,
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            default_zoom_crop: ZoomCrop::from_code(DEFAULT_ZOOM_CROP),
            default_quality: DEFAULT_QUALITY,
            default_filters: String::new(),
            default_sharpen: false,
            default_canvas_color: CanvasColor::WHITE,
            png_is_transparent: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserCacheSettings {
    pub disabled: bool,
    pub max_age: Duration,
}

impl Default for BrowserCacheSettings {
    fn default() -> Self {
        Self {
            disabled: false,
            max_age: Duration::from_secs(DEFAULT_BROWSER_CACHE_MAX_AGE_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptimizerSettings {
    pub optipng_enabled: bool,
    pub optipng_path: PathBuf,
    pub pngcrush_enabled: bool,
    pub pngcrush_path: PathBuf,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            optipng_enabled: false,
            optipng_path: PathBuf::from(DEFAULT_OPTIPNG_PATH),
            pngcrush_enabled: false,
            pngcrush_path: PathBuf::from(DEFAULT_PNGCRUSH_PATH),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebshotSettings {
    pub enabled: bool,
    pub cutycapt_path: PathBuf,
    pub xvfb_path: PathBuf,
    pub screen_x: u32,
    pub screen_y: u32,
    pub color_depth: u32,
    pub image_format: String,
    pub timeout: Duration,
    pub user_agent: String,
    pub javascript: bool,
    pub java: bool,
    pub plugins: bool,
    pub proxy: Option<String>,
    /// An X server is already listening on display `:100`.
    pub xvfb_running: bool,
}

impl Default for WebshotSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            cutycapt_path: PathBuf::from(DEFAULT_CUTYCAPT_PATH),
            xvfb_path: PathBuf::from(DEFAULT_XVFB_PATH),
            screen_x: 1024,
            screen_y: 768,
            color_depth: 24,
            image_format: "png".to_string(),
            timeout: Duration::from_secs(20),
            user_agent: DEFAULT_WEBSHOT_USER_AGENT.to_string(),
            javascript: true,
            java: false,
            plugins: true,
            proxy: None,
            xvfb_running: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResponseSettings {
    pub not_found_image: Option<PathBuf>,
    pub error_image: Option<PathBuf>,
    pub display_error_messages: bool,
    pub block_external_leechers: bool,
}

impl Default for ResponseSettings {
    fn default() -> Self {
        Self {
            not_found_image: None,
            error_image: None,
            display_error_messages: true,
            block_external_leechers: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("fetch.allowed_sites")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Clean(args)) => raw.apply_cache_overrides(&args.cache),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    source: RawSourceSettings,
    cache: RawCacheSettings,
    fetch: RawFetchSettings,
    transform: RawTransformSettings,
    browser_cache: RawBrowserCacheSettings,
    optimizer: RawOptimizerSettings,
    webshot: RawWebshotSettings,
    responses: RawResponseSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(root) = overrides.document_root.as_ref() {
            self.source.document_root = Some(root.clone());
        }
        if let Some(allow) = overrides.allow_external {
            self.fetch.allow_external = Some(allow);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }

        self.apply_cache_overrides(&overrides.cache);
    }

    fn apply_cache_overrides(&mut self, overrides: &CacheOverrides) {
        if let Some(directory) = overrides.cache_directory.as_ref() {
            self.cache.directory = Some(directory.clone());
        }
        if let Some(seconds) = overrides.cache_max_age_seconds {
            self.cache.max_age_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            source,
            cache,
            fetch,
            transform,
            browser_cache,
            optimizer,
            webshot,
            responses,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            source: build_source_settings(source)?,
            cache: build_cache_settings(cache)?,
            fetch: build_fetch_settings(fetch)?,
            transform: build_transform_settings(transform)?,
            browser_cache: build_browser_cache_settings(browser_cache),
            optimizer: build_optimizer_settings(optimizer)?,
            webshot: build_webshot_settings(webshot)?,
            responses: build_response_settings(responses),
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_source_settings(source: RawSourceSettings) -> Result<SourceSettings, LoadError> {
    let document_root = source.document_root.unwrap_or_else(|| PathBuf::from("."));
    if document_root.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "source.document_root",
            "path must not be empty",
        ));
    }

    let max_file_size = NonZeroU64::new(source.max_file_size.unwrap_or(DEFAULT_MAX_FILE_SIZE))
        .ok_or_else(|| LoadError::invalid("source.max_file_size", "must be greater than zero"))?;

    Ok(SourceSettings {
        document_root,
        max_file_size,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let directory = cache
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cache.directory",
            "path must not be empty",
        ));
    }

    let prefix = cache
        .prefix
        .unwrap_or_else(|| DEFAULT_CACHE_PREFIX.to_string());
    if prefix.is_empty() || prefix.contains(['/', '\\']) {
        return Err(LoadError::invalid(
            "cache.prefix",
            "must be a non-empty file name fragment",
        ));
    }

    let suffix = cache
        .suffix
        .unwrap_or_else(|| DEFAULT_CACHE_SUFFIX.to_string());
    if suffix.is_empty() || suffix.contains(['/', '\\']) {
        return Err(LoadError::invalid(
            "cache.suffix",
            "must be a non-empty file name fragment",
        ));
    }

    let clean_interval_secs = cache
        .clean_interval_seconds
        .unwrap_or(DEFAULT_CLEAN_INTERVAL_SECS);
    let clean_interval =
        u64::try_from(clean_interval_secs).ok().map(Duration::from_secs);

    let max_age_secs = cache.max_age_seconds.unwrap_or(DEFAULT_CACHE_MAX_AGE_SECS);
    if max_age_secs == 0 {
        return Err(LoadError::invalid(
            "cache.max_age_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        directory,
        prefix,
        suffix,
        clean_interval,
        max_age: Duration::from_secs(max_age_secs),
        failure_backoff: Duration::from_secs(
            cache
                .failure_backoff_seconds
                .unwrap_or(DEFAULT_FAILURE_BACKOFF_SECS),
        ),
    })
}

fn build_fetch_settings(fetch: RawFetchSettings) -> Result<FetchSettings, LoadError> {
    let timeout_secs = fetch.timeout_seconds.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "fetch.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let allowed_sites = fetch
        .allowed_sites
        .unwrap_or_default()
        .into_iter()
        .map(|site| site.trim().to_ascii_lowercase())
        .filter(|site| !site.is_empty())
        .collect();

    Ok(FetchSettings {
        allow_external: fetch.allow_external.unwrap_or(false),
        allowed_sites,
        timeout: Duration::from_secs(timeout_secs),
        max_redirects: fetch.max_redirects.unwrap_or(DEFAULT_MAX_REDIRECTS),
        user_agent: fetch
            .user_agent
            .unwrap_or_else(|| DEFAULT_FETCH_USER_AGENT.to_string()),
    })
}

fn build_transform_settings(
    transform: RawTransformSettings,
) -> Result<TransformSettings, LoadError> {
    let default_width = transform.default_width.unwrap_or(DEFAULT_WIDTH);
    let default_height = transform.default_height.unwrap_or(DEFAULT_HEIGHT);
    let max_width = non_zero(
        transform.max_width.unwrap_or(DEFAULT_MAX_WIDTH),
        "transform.max_width",
    )?;
    let max_height = non_zero(
        transform.max_height.unwrap_or(DEFAULT_MAX_HEIGHT),
        "transform.max_height",
    )?;

    let zoom_crop = transform.default_zoom_crop.unwrap_or(DEFAULT_ZOOM_CROP);
    if !(0..=3).contains(&zoom_crop) {
        return Err(LoadError::invalid(
            "transform.default_zoom_crop",
            "must be between 0 and 3",
        ));
    }

    let quality = transform.default_quality.unwrap_or(DEFAULT_QUALITY);
    if quality > 100 {
        return Err(LoadError::invalid(
            "transform.default_quality",
            "must be between 0 and 100",
        ));
    }

    let color = transform
        .default_canvas_color
        .unwrap_or_else(|| DEFAULT_CANVAS_COLOR.to_string());
    let default_canvas_color = CanvasColor::parse_hex(&color).ok_or_else(|| {
        LoadError::invalid(
            "transform.default_canvas_color",
            "expected 3 or 6 hexadecimal digits",
        )
    })?;

    Ok(TransformSettings {
        default_width,
        default_height,
        max_width,
        max_height,
        default_zoom_crop: ZoomCrop::from_code(zoom_crop),
        default_quality: quality,
        default_filters: transform.default_filters.unwrap_or_default(),
        default_sharpen: transform.default_sharpen.unwrap_or(false),
        default_canvas_color,
        png_is_transparent: transform.png_is_transparent.unwrap_or(false),
    })
}

fn build_browser_cache_settings(browser_cache: RawBrowserCacheSettings) -> BrowserCacheSettings {
    BrowserCacheSettings {
        disabled: browser_cache.disabled.unwrap_or(false),
        max_age: Duration::from_secs(
            browser_cache
                .max_age_seconds
                .unwrap_or(DEFAULT_BROWSER_CACHE_MAX_AGE_SECS),
        ),
    }
}

fn build_optimizer_settings(
    optimizer: RawOptimizerSettings,
) -> Result<OptimizerSettings, LoadError> {
    let optipng_path = optimizer
        .optipng_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OPTIPNG_PATH));
    if optipng_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "optimizer.optipng_path",
            "path must not be empty",
        ));
    }
    let pngcrush_path = optimizer
        .pngcrush_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PNGCRUSH_PATH));
    if pngcrush_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "optimizer.pngcrush_path",
            "path must not be empty",
        ));
    }

    Ok(OptimizerSettings {
        optipng_enabled: optimizer.optipng_enabled.unwrap_or(false),
        optipng_path,
        pngcrush_enabled: optimizer.pngcrush_enabled.unwrap_or(false),
        pngcrush_path,
    })
}

fn build_webshot_settings(webshot: RawWebshotSettings) -> Result<WebshotSettings, LoadError> {
    let defaults = WebshotSettings::default();

    let image_format = webshot
        .image_format
        .unwrap_or(defaults.image_format)
        .to_ascii_lowercase();
    if !matches!(image_format.as_str(), "png" | "jpg" | "jpeg") {
        return Err(LoadError::invalid(
            "webshot.image_format",
            "must be png, jpg or jpeg",
        ));
    }

    let timeout_secs = webshot.timeout_seconds.unwrap_or(defaults.timeout.as_secs());
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "webshot.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(WebshotSettings {
        enabled: webshot.enabled.unwrap_or(defaults.enabled),
        cutycapt_path: webshot.cutycapt_path.unwrap_or(defaults.cutycapt_path),
        xvfb_path: webshot.xvfb_path.unwrap_or(defaults.xvfb_path),
        screen_x: non_zero(webshot.screen_x.unwrap_or(defaults.screen_x), "webshot.screen_x")?,
        screen_y: non_zero(webshot.screen_y.unwrap_or(defaults.screen_y), "webshot.screen_y")?,
        color_depth: non_zero(
            webshot.color_depth.unwrap_or(defaults.color_depth),
            "webshot.color_depth",
        )?,
        image_format,
        timeout: Duration::from_secs(timeout_secs),
        user_agent: webshot.user_agent.unwrap_or(defaults.user_agent),
        javascript: webshot.javascript.unwrap_or(defaults.javascript),
        java: webshot.java.unwrap_or(defaults.java),
        plugins: webshot.plugins.unwrap_or(defaults.plugins),
        proxy: webshot.proxy.filter(|proxy| !proxy.trim().is_empty()),
        xvfb_running: webshot.xvfb_running.unwrap_or(defaults.xvfb_running),
    })
}

fn build_response_settings(responses: RawResponseSettings) -> ResponseSettings {
    let non_empty = |path: Option<PathBuf>| path.filter(|path| !path.as_os_str().is_empty());
    ResponseSettings {
        not_found_image: non_empty(responses.not_found_image),
        error_image: non_empty(responses.error_image),
        display_error_messages: responses.display_error_messages.unwrap_or(true),
        block_external_leechers: responses.block_external_leechers.unwrap_or(false),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSourceSettings {
    document_root: Option<PathBuf>,
    max_file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    directory: Option<PathBuf>,
    prefix: Option<String>,
    suffix: Option<String>,
    clean_interval_seconds: Option<i64>,
    max_age_seconds: Option<u64>,
    failure_backoff_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFetchSettings {
    allow_external: Option<bool>,
    allowed_sites: Option<Vec<String>>,
    timeout_seconds: Option<u64>,
    max_redirects: Option<usize>,
    user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTransformSettings {
    default_width: Option<u32>,
    default_height: Option<u32>,
    max_width: Option<u32>,
    max_height: Option<u32>,
    default_zoom_crop: Option<i64>,
    default_quality: Option<u8>,
    default_filters: Option<String>,
    default_sharpen: Option<bool>,
    default_canvas_color: Option<String>,
    png_is_transparent: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBrowserCacheSettings {
    disabled: Option<bool>,
    max_age_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOptimizerSettings {
    optipng_enabled: Option<bool>,
    optipng_path: Option<PathBuf>,
    pngcrush_enabled: Option<bool>,
    pngcrush_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWebshotSettings {
    enabled: Option<bool>,
    cutycapt_path: Option<PathBuf>,
    xvfb_path: Option<PathBuf>,
    screen_x: Option<u32>,
    screen_y: Option<u32>,
    color_depth: Option<u32>,
    image_format: Option<String>,
    timeout_seconds: Option<u64>,
    user_agent: Option<String>,
    javascript: Option<bool>,
    java: Option<bool>,
    plugins: Option<bool>,
    proxy: Option<String>,
    xvfb_running: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawResponseSettings {
    not_found_image: Option<PathBuf>,
    error_image: Option<PathBuf>,
    display_error_messages: Option<bool>,
    block_external_leechers: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero(value: u32, key: &'static str) -> Result<u32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(value)
}

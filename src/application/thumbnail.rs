//! Request orchestration: cache lookup, source acquisition, transform and publish.

use std::{sync::Arc, time::Instant};

use tracing::{debug, info, warn};

use crate::{
    application::{
        error::ThumbError,
        fetch::{FetchGate, FetchPolicy},
        transform::{ImageTransformer, PngOptimizer, TransformLimits},
        webshot::WebshotRenderer,
    },
    cache::{CacheKey, CacheStore, CleanupOutcome, KeyDeriver, Lookup, OpenEntry},
    config::Settings,
    domain::{
        Alignment, ImageKind, QueryParams, SourceDescriptor, ThumbnailRequest, TransformDefaults,
        TransformParams, request::truthy,
    },
    infra::sources::LocalSourceResolver,
};

const TARGET: &str = "thumbd::thumbnail";

/// A validated request together with its cache key.
#[derive(Debug, Clone)]
pub struct PreparedThumbnail {
    pub request: ThumbnailRequest,
    pub key: CacheKey,
}

pub struct ThumbnailService {
    store: Arc<CacheStore>,
    keys: KeyDeriver,
    transformer: Arc<ImageTransformer>,
    fetch: FetchGate,
    resolver: LocalSourceResolver,
    webshot: Option<Arc<WebshotRenderer>>,
    defaults: TransformDefaults,
}

impl ThumbnailService {
    pub fn new(
        settings: &Settings,
        store: Arc<CacheStore>,
        keys: KeyDeriver,
    ) -> Result<Self, ThumbError> {
        let cache = store.config();
        let fetch = FetchGate::new(FetchPolicy {
            allow_external: settings.fetch.allow_external,
            allowed_sites: settings.fetch.allowed_sites.clone(),
            max_bytes: settings.source.max_file_size.get(),
            timeout: settings.fetch.timeout,
            max_redirects: settings.fetch.max_redirects,
            user_agent: settings.fetch.user_agent.clone(),
            staging_dir: cache.directory.clone(),
            staging_prefix: cache.temp_prefix(),
        })
        .map_err(|err| ThumbError::Config(format!("failed to build HTTP client: {err}")))?;

        let resolver = LocalSourceResolver::new(
            &settings.source.document_root,
            settings.source.max_file_size.get(),
        )
        .map_err(|err| ThumbError::Config(err.to_string()))?;

        let transform = &settings.transform;
        let transformer = ImageTransformer::new(
            TransformLimits {
                max_width: transform.max_width,
                max_height: transform.max_height,
                default_width: transform.default_width,
                default_height: transform.default_height,
                max_source_bytes: settings.source.max_file_size.get(),
                png_is_transparent: transform.png_is_transparent,
            },
            PngOptimizer::select(&settings.optimizer),
        );

        let webshot = settings.webshot.enabled.then(|| {
            Arc::new(WebshotRenderer::new(
                settings.webshot.clone(),
                cache.directory.clone(),
                cache.temp_prefix(),
            ))
        });

        Ok(Self {
            keys,
            transformer: Arc::new(transformer),
            fetch,
            resolver,
            webshot,
            defaults: TransformDefaults {
                zoom_crop: transform.default_zoom_crop,
                quality: transform.default_quality,
                filters: transform.default_filters.clone(),
                sharpen: transform.default_sharpen,
                canvas_color: transform.default_canvas_color,
            },
            store,
        })
    }

    /// Classify the source, validate it and derive the cache key.
    pub async fn prepare(
        &self,
        query: &QueryParams,
        src: &str,
    ) -> Result<PreparedThumbnail, ThumbError> {
        let mut params = TransformParams::from_query(query, &self.defaults);
        let wants_webshot = query.get("webshot").is_some_and(truthy);

        let (source, webshot) = if is_external(src) {
            let url = self.fetch.check_url(src)?;
            if wants_webshot {
                if self.webshot.is_none() {
                    return Err(ThumbError::input("Webshots are disabled on this server."));
                }
                params.align = Alignment::TOP;
            }
            (SourceDescriptor::External { url }, wants_webshot)
        } else {
            let resolver = self.resolver.clone();
            let src = src.to_string();
            let source = blocking(move || resolver.resolve(&src).map_err(ThumbError::from)).await?;
            (source, false)
        };

        let key = self.keys.derive(&source, query.raw());
        Ok(PreparedThumbnail {
            request: ThumbnailRequest {
                source,
                params,
                query: query.raw().to_string(),
                webshot,
            },
            key,
        })
    }

    /// Open the entry for `prepared`, producing it first when missing or corrupt.
    pub async fn entry(&self, prepared: &PreparedThumbnail) -> Result<OpenEntry, ThumbError> {
        let started_at = Instant::now();
        if self.store.config().enabled {
            match self.lookup(&prepared.key).await? {
                Lookup::Present(_) => {
                    if let Some(entry) = self.open(&prepared.key).await? {
                        metrics::counter!("thumbd_cache_hit_total").increment(1);
                        debug!(
                            target = TARGET,
                            op = "thumbnail::entry",
                            result = "cache_hit",
                            key = %prepared.key,
                            "Serving cached thumbnail"
                        );
                        return Ok(entry);
                    }
                }
                Lookup::Sentinel { age } => {
                    metrics::counter!("thumbd_cache_sentinel_total").increment(1);
                    debug!(
                        target = TARGET,
                        op = "thumbnail::entry",
                        result = "sentinel",
                        key = %prepared.key,
                        age_secs = age.as_secs(),
                        "Recent fetch failure still within backoff window"
                    );
                    return Err(ThumbError::not_found("An error occured fetching image."));
                }
                Lookup::Absent => {}
            }
        }

        metrics::counter!("thumbd_cache_miss_total").increment(1);
        self.generate(prepared).await?;
        let entry = self.open(&prepared.key).await?.ok_or_else(|| {
            ThumbError::unexpected("freshly written cache entry failed validation")
        })?;
        info!(
            target = TARGET,
            op = "thumbnail::entry",
            result = "cache_miss",
            key = %prepared.key,
            external = prepared.request.source.is_external(),
            webshot = prepared.request.webshot,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Thumbnail generated"
        );
        Ok(entry)
    }

    async fn lookup(&self, key: &CacheKey) -> Result<Lookup, ThumbError> {
        let store = Arc::clone(&self.store);
        let key = key.clone();
        blocking(move || store.lookup(&key).map_err(ThumbError::from)).await
    }

    /// `None` when the entry was corrupt; it has been deleted by then.
    async fn open(&self, key: &CacheKey) -> Result<Option<OpenEntry>, ThumbError> {
        let store = Arc::clone(&self.store);
        let key = key.clone();
        blocking(move || match store.open_entry(&key) {
            Ok(entry) => Ok(Some(entry)),
            Err(err) if err.is_corrupt() => {
                metrics::counter!("thumbd_cache_corrupt_total").increment(1);
                Ok(None)
            }
            Err(err) => Err(ThumbError::from(err)),
        })
        .await
    }

    /// Obtain source bytes, transform them and publish the entry.
    pub async fn generate(&self, prepared: &PreparedThumbnail) -> Result<(), ThumbError> {
        let request = &prepared.request;
        let (bytes, kind) = match &request.source {
            SourceDescriptor::Local { path, .. } => {
                let bytes = tokio::fs::read(path).await.map_err(|err| {
                    ThumbError::input(format!("could not read the source image: {err}"))
                })?;
                let kind = detect_kind(&bytes)?;
                (bytes, kind)
            }
            SourceDescriptor::External { url } if request.webshot => {
                let renderer = self
                    .webshot
                    .clone()
                    .ok_or_else(|| ThumbError::input("Webshots are disabled on this server."))?;
                let url = url.clone();
                let bytes =
                    blocking(move || renderer.capture(&url).map_err(ThumbError::from)).await?;
                let kind = detect_kind(&bytes)?;
                (bytes, kind)
            }
            SourceDescriptor::External { url } => match self.fetch.fetch(url).await {
                Ok(fetched) => (fetched.bytes, fetched.kind),
                Err(err) => {
                    self.mark_failure(&prepared.key).await;
                    return Err(err.into());
                }
            },
        };

        let transformer = Arc::clone(&self.transformer);
        let store = Arc::clone(&self.store);
        let key = prepared.key.clone();
        let params = request.params.clone();
        blocking(move || {
            let output = transformer.transform(&bytes, kind.mime(), &params)?;
            store.put(&key, &output.entry_bytes())?;
            Ok(())
        })
        .await
    }

    async fn mark_failure(&self, key: &CacheKey) {
        let store = Arc::clone(&self.store);
        let key = key.clone();
        let result = blocking(move || store.mark_failure(&key).map_err(ThumbError::from)).await;
        if let Err(err) = result {
            warn!(
                target = TARGET,
                op = "thumbnail::mark_failure",
                result = "error",
                error = %err,
                "Failed to record fetch failure sentinel"
            );
        }
    }

    /// Opportunistic cleanup; failures are logged and never fail the request.
    pub async fn run_cleanup(&self) {
        let store = Arc::clone(&self.store);
        match blocking(move || store.cleanup().map_err(ThumbError::from)).await {
            Ok(CleanupOutcome::Cleaned { removed }) => debug!(
                target = TARGET,
                op = "thumbnail::cleanup",
                result = "cleaned",
                removed,
                "Cache cleanup finished"
            ),
            Ok(_) => {}
            Err(err) => warn!(
                target = TARGET,
                op = "thumbnail::cleanup",
                result = "error",
                error = %err,
                "Cache cleanup failed"
            ),
        }
    }
}

/// Strip a self-referencing origin from `src` and reject empty references.
pub fn normalize_src(raw: Option<&str>, host: Option<&str>) -> Result<String, ThumbError> {
    let raw = raw.unwrap_or_default();
    let src = match host {
        Some(host) if !host.is_empty() => strip_own_origin(raw, host),
        _ => raw,
    };
    if src.len() <= 3 {
        return Err(ThumbError::input("No image specified"));
    }
    Ok(src.to_string())
}

fn strip_own_origin<'a>(src: &'a str, host: &str) -> &'a str {
    let Some(rest) = strip_http_scheme(src) else {
        return src;
    };
    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    match rest.get(..host.len()) {
        Some(candidate) if candidate.eq_ignore_ascii_case(host) => &rest[host.len()..],
        _ => src,
    }
}

/// `http(s)://` followed by at least one host character.
pub fn is_external(src: &str) -> bool {
    strip_http_scheme(src)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|ch| ch != '/')
}

/// The remainder of `url` after an `http://` or `https://` scheme, in any case.
pub fn strip_http_scheme(url: &str) -> Option<&str> {
    ["http://", "https://"].into_iter().find_map(|scheme| {
        url.get(..scheme.len())
            .filter(|head| head.eq_ignore_ascii_case(scheme))
            .map(|_| &url[scheme.len()..])
    })
}

fn detect_kind(bytes: &[u8]) -> Result<ImageKind, ThumbError> {
    ImageKind::detect(bytes).ok_or_else(|| {
        ThumbError::from(crate::application::transform::TransformError::Unsupported {
            mime: crate::domain::sniff_mime(bytes),
        })
    })
}

/// Run blocking filesystem or CPU work off the async executor.
async fn blocking<T, F>(work: F) -> Result<T, ThumbError>
where
    F: FnOnce() -> Result<T, ThumbError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ThumbError::unexpected(format!("blocking task failed: {err}")))?
}

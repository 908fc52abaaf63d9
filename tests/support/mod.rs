#![allow(dead_code)]

use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
    sync::Arc,
};

use axum::{
    Router,
    body::{Body, Bytes, to_bytes},
    http::{HeaderMap, HeaderName, Request, StatusCode, header},
};
use image::{ImageFormat, Rgba, RgbaImage};
use tempfile::TempDir;
use thumbd::{
    cache::{CacheConfig, CacheStore, KeyDeriver},
    config::Settings,
    infra::http::{HttpState, build_router},
};
use tower::ServiceExt;

pub const HOST: &str = "thumbs.test";

pub struct Harness {
    pub docroot: TempDir,
    pub cache: TempDir,
    pub router: Router,
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl Harness {
    pub fn new(configure: impl FnOnce(&mut Settings)) -> Self {
        let docroot = TempDir::new().expect("docroot");
        let cache = TempDir::new().expect("cache dir");

        let mut settings = Settings::default();
        settings.source.document_root = docroot.path().to_path_buf();
        settings.cache.directory = cache.path().to_path_buf();
        settings.cache.clean_interval = None;
        configure(&mut settings);

        let store = CacheStore::open(CacheConfig::from(&settings.cache)).expect("cache store");
        let state = HttpState::new(&settings, Arc::new(store), KeyDeriver::new("tests"))
            .expect("http state");
        Self {
            docroot,
            cache,
            router: build_router(state),
        }
    }

    pub fn write_source(&self, relative: &str, bytes: &[u8]) -> PathBuf {
        let path = self.docroot.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("source dir");
        }
        fs::write(&path, bytes).expect("write source");
        path
    }

    pub async fn get(&self, uri: &str, headers: &[(HeaderName, &str)]) -> Reply {
        let mut request = Request::builder().uri(uri).header(header::HOST, HOST);
        for (name, value) in headers {
            request = request.header(name, *value);
        }
        let response = self
            .router
            .clone()
            .oneshot(request.body(Body::empty()).expect("request"))
            .await
            .expect("router response");
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        Reply {
            status,
            headers,
            body,
        }
    }

    /// Cache entries, excluding the index guard and the cleanup marker.
    pub fn cache_entries(&self) -> Vec<PathBuf> {
        list_with_suffix(self.cache.path(), ".cache")
    }
}

pub fn list_with_suffix(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .expect("read cache dir")
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.to_string_lossy().ends_with(suffix))
        .collect();
    entries.sort();
    entries
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 255]));
    let mut out = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .expect("encode png");
    out
}

/// The error listing contains `message`, HTML-escaped the way it is rendered.
pub fn lists(reply: &Reply, message: &str) -> bool {
    reply.text().contains(&ammonia::clean_text(message))
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([30, 120, 220]));
    let mut out = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .expect("encode jpeg");
    out
}

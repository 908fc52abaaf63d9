//! thumbd: an on-the-fly image thumbnail server.
//!
//! Requests name a local or external source image and transform parameters;
//! results are kept in a content-addressed disk cache. See [`cache`] for the
//! entry layout and [`application::thumbnail`] for the request flow.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;

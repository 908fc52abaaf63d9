//! Application services: thumbnail orchestration and its collaborators.

pub mod error;
pub mod fetch;
pub mod thumbnail;
pub mod transform;
pub mod webshot;

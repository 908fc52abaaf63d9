pub mod fallback;
mod middleware;
mod public;
pub mod response;

pub use fallback::FallbackResponder;
pub use public::{HttpState, build_router};
pub use response::ResponseServer;

//! Remote Feed Fetching
//!
//! - [`FetchCoordinator`]: cache + request dedup + stale-while-revalidate
//! - [`JsonTransport`]: network seam, with the reqwest-backed
//!   [`HttpTransport`]. The in-memory `ScriptedTransport` is built with
//!   `--features scripted-transport`

mod coordinator;
#[cfg(any(test, feature = "scripted-transport"))]
mod scripted;
mod transport;

pub use coordinator::FetchCoordinator;
#[cfg(any(test, feature = "scripted-transport"))]
pub use scripted::ScriptedTransport;
pub use transport::{HttpTransport, JsonTransport};

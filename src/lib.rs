pub mod config;
pub mod scheduler;
pub mod service;
pub mod services;
pub mod storage;
pub mod stream;
pub mod supervisor;
pub mod util;

use serde::{Deserialize, Serialize};

/// One availability measurement for one target, produced once per probe.
///
/// This is the sole unit of transfer on the event stream: the pinger
/// serializes it to JSON, the inserter parses it back. Never mutated after
/// creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    /// When the probe was dispatched (RFC 3339, UTC). Captured immediately
    /// before the fetch, so this is dispatch time, not completion time.
    pub timestamp: String,

    /// Local address of the reporting host.
    pub source: String,

    /// The probed URL.
    pub url: String,

    /// Total fetch duration in microseconds.
    pub elapsed_us: u64,

    /// HTTP status code of the response.
    pub status: u16,

    /// Whether the match pattern was found anywhere in the response body.
    pub matched: bool,
}

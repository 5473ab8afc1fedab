//! xpand - expand an X data archive into full tweet JSON
//!
//! The archive export only carries a trimmed copy of each tweet. This crate
//! re-fetches every tweet through the API and keeps the results in a local
//! cache next to the archive, so repeated runs only fetch what is missing.
//!
//! # Modules
//!
//! - [`parser`] - Archive `data/*.js` parsing
//! - [`cache`] - On-disk store of expanded tweets
//! - [`client`] - Tweet lookup trait and the HTTP implementation
//! - [`engine`] - Fetch/cache reconciliation with rate-limit backoff
//! - [`auth`] - Credential and profile files
//! - [`error`] - Error types with user-facing hints

pub mod auth;
pub mod cache;
pub mod cancel;
pub mod cli;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod oauth;
pub mod parser;

pub use cache::TweetCache;
pub use cancel::CancelToken;
pub use client::{TweetFetcher, TwitterClient};
pub use engine::{EngineConfig, EngineEvent, Reconciler};
pub use error::{FetchError, Result, ResultExt, XpandError, format_error, format_xpand_error};
pub use model::*;
pub use parser::ArchiveParser;

/// Format an unsigned integer with thousands separators.
#[must_use]
pub fn format_number_u64(value: u64) -> String {
    let mut out = String::with_capacity(24);

    for (idx, ch) in value.to_string().chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    out.chars().rev().collect()
}

/// Format a usize with thousands separators.
#[must_use]
pub fn format_number_usize(value: usize) -> String {
    format_number_u64(u64::try_from(value).unwrap_or(u64::MAX))
}

/// Render a duration as `1h 02m`, `15m 00s` or `42s`.
#[must_use]
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

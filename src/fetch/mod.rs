// src/fetch/mod.rs

//! Single-attempt remote fetches.
//!
//! A [`RemoteFetcher`] never retries on its own; the retry policy lives in
//! [`crate::acquire`]. Outcomes are classified so that "not published yet"
//! (the expected steady state while waiting) can be told apart from genuine
//! transport trouble and from requests that can never succeed.
//!
//! - [`http`] is the reqwest-backed production fetcher.
//! - [`mock`] replays scripted outcomes per URI and counts calls.

use std::fmt::{self, Debug};

use crate::errors::Result;
use crate::store::ArtifactWriter;
use crate::types::BoxFuture;

pub mod http;
pub mod mock;

pub use http::HttpFetcher;
pub use mock::ScriptedFetcher;

/// Classified result of one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The payload was streamed into the writer in full.
    Success,
    /// Remote 404 or equivalent: not published yet.
    NotFoundYet,
    /// Network trouble or a 5xx; worth retrying.
    TransientError(String),
    /// The request itself is wrong; retrying cannot help.
    FatalError(String),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success)
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchOutcome::Success => f.write_str("success"),
            FetchOutcome::NotFoundYet => f.write_str("not-found-yet"),
            FetchOutcome::TransientError(msg) => write!(f, "transient-error: {msg}"),
            FetchOutcome::FatalError(msg) => write!(f, "fatal-error: {msg}"),
        }
    }
}

/// One download attempt against a remote archive.
pub trait RemoteFetcher: Send + Sync + Debug {
    /// Stream `uri` into `writer`. The caller commits the writer on
    /// [`FetchOutcome::Success`] and drops it otherwise.
    ///
    /// `Err` is reserved for local storage failures while writing.
    fn fetch<'a>(
        &'a self,
        uri: &'a str,
        writer: &'a mut ArtifactWriter,
    ) -> BoxFuture<'a, Result<FetchOutcome>>;

    /// Check whether `uri` is published without downloading it.
    fn probe<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, FetchOutcome>;
}

/// Join an archive base URI and a file name.
pub fn join_uri(base: &str, file: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_uri_tolerates_trailing_slash() {
        assert_eq!(join_uri("https://a/b/", "f.fit"), "https://a/b/f.fit");
        assert_eq!(join_uri("https://a/b", "f.fit"), "https://a/b/f.fit");
    }
}

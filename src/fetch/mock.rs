// src/fetch/mock.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{FetchOutcome, RemoteFetcher};
use crate::errors::Result;
use crate::store::ArtifactWriter;
use crate::types::BoxFuture;

#[derive(Debug, Clone)]
enum Script {
    /// `NotFoundYet` for the first `misses` calls, then the body.
    PublishAfter { misses: u32, body: Vec<u8> },
    AlwaysTransient,
    Fatal(String),
}

#[derive(Debug, Default)]
struct ScriptState {
    scripts: HashMap<String, Script>,
    calls: HashMap<String, u32>,
    total: u32,
}

/// Fetcher that replays per-URI scripts. Unknown URIs are never published.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFetcher {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish_now(&self, uri: &str, body: impl Into<Vec<u8>>) {
        self.publish_after(uri, 0, body);
    }

    /// Answer `NotFoundYet` `misses` times, then serve `body`.
    pub fn publish_after(&self, uri: &str, misses: u32, body: impl Into<Vec<u8>>) {
        self.set(
            uri,
            Script::PublishAfter {
                misses,
                body: body.into(),
            },
        );
    }

    pub fn always_transient(&self, uri: &str) {
        self.set(uri, Script::AlwaysTransient);
    }

    pub fn fatal(&self, uri: &str, message: &str) {
        self.set(uri, Script::Fatal(message.to_string()));
    }

    /// Calls (fetch + probe) made for `uri` so far.
    pub fn calls(&self, uri: &str) -> u32 {
        let state = self.lock();
        state.calls.get(uri).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.lock().total
    }

    fn set(&self, uri: &str, script: Script) {
        self.lock().scripts.insert(uri.to_string(), script);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the call and decide its outcome; the body comes back on success.
    fn next(&self, uri: &str) -> (FetchOutcome, Vec<u8>) {
        let mut state = self.lock();
        state.total += 1;
        let call = {
            let n = state.calls.entry(uri.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        match state.scripts.get(uri) {
            Some(Script::PublishAfter { misses, body }) if call > *misses => {
                (FetchOutcome::Success, body.clone())
            }
            Some(Script::PublishAfter { .. }) | None => (FetchOutcome::NotFoundYet, Vec::new()),
            Some(Script::AlwaysTransient) => (
                FetchOutcome::TransientError("connection reset".to_string()),
                Vec::new(),
            ),
            Some(Script::Fatal(msg)) => (FetchOutcome::FatalError(msg.clone()), Vec::new()),
        }
    }
}

impl RemoteFetcher for ScriptedFetcher {
    fn fetch<'a>(
        &'a self,
        uri: &'a str,
        writer: &'a mut ArtifactWriter,
    ) -> BoxFuture<'a, Result<FetchOutcome>> {
        Box::pin(async move {
            let (outcome, body) = self.next(uri);
            if outcome.is_success() {
                writer.write(&body).await?;
            }
            Ok(outcome)
        })
    }

    fn probe<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, FetchOutcome> {
        Box::pin(async move { self.next(uri).0 })
    }
}

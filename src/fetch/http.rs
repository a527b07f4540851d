// src/fetch/http.rs

//! reqwest-backed fetcher for the instrument archive.

use reqwest::{Client, StatusCode};
use tracing::{debug, trace};

use super::{FetchOutcome, RemoteFetcher};
use crate::config::model::HttpConfig;
use crate::errors::Result;
use crate::store::ArtifactWriter;
use crate::types::BoxFuture;

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl RemoteFetcher for HttpFetcher {
    fn fetch<'a>(
        &'a self,
        uri: &'a str,
        writer: &'a mut ArtifactWriter,
    ) -> BoxFuture<'a, Result<FetchOutcome>> {
        Box::pin(async move {
            let mut response = match self.client.get(uri).send().await {
                Ok(r) => r,
                Err(e) => return Ok(classify_error(&e)),
            };

            if let Some(outcome) = classify_status(response.status()) {
                debug!(uri, status = %response.status(), outcome = %outcome, "fetch not successful");
                return Ok(outcome);
            }

            loop {
                match response.chunk().await {
                    Ok(Some(bytes)) => writer.write(&bytes).await?,
                    Ok(None) => break,
                    Err(e) => {
                        return Ok(FetchOutcome::TransientError(format!(
                            "reading body of {uri}: {e}"
                        )));
                    }
                }
            }

            trace!(uri, bytes = writer.bytes_written(), "fetch complete");
            Ok(FetchOutcome::Success)
        })
    }

    fn probe<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, FetchOutcome> {
        Box::pin(async move {
            match self.client.head(uri).send().await {
                Ok(response) => {
                    classify_status(response.status()).unwrap_or(FetchOutcome::Success)
                }
                Err(e) => classify_error(&e),
            }
        })
    }
}

/// `None` for success statuses.
pub fn classify_status(status: StatusCode) -> Option<FetchOutcome> {
    if status.is_success() {
        return None;
    }
    let outcome = match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => FetchOutcome::NotFoundYet,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            FetchOutcome::TransientError(format!("HTTP {status}"))
        }
        s if s.is_server_error() => FetchOutcome::TransientError(format!("HTTP {s}")),
        s => FetchOutcome::FatalError(format!("HTTP {s}")),
    };
    Some(outcome)
}

fn classify_error(err: &reqwest::Error) -> FetchOutcome {
    if err.is_builder() || err.is_redirect() {
        FetchOutcome::FatalError(err.to_string())
    } else {
        FetchOutcome::TransientError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(StatusCode::OK), None);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), Some(FetchOutcome::NotFoundYet));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY),
            Some(FetchOutcome::TransientError(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            Some(FetchOutcome::TransientError(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN),
            Some(FetchOutcome::FatalError(_))
        ));
    }
}

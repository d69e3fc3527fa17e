//! Score byte acquisition.
//!
//! A load supplies either an in-memory payload or a source URL. Input
//! validation happens before any network activity, so a missing input never
//! costs a round trip.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::domain::error::SourceError;
use crate::domain::types::ScoreInput;

/// Acquires document bytes for the load sequencer.
#[derive(Debug, Clone)]
pub struct ScoreFetcher {
    http: Client,
}

impl ScoreFetcher {
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SourceError::Transport {
                message: err.to_string(),
            })?;
        Ok(Self { http })
    }

    /// Resolve the input to raw bytes.
    ///
    /// An in-memory payload wins over a URL when both are supplied; neither
    /// supplied fails with [`SourceError::MissingInput`] before any I/O.
    pub async fn acquire(&self, input: &ScoreInput) -> Result<Bytes, SourceError> {
        if let Some(payload) = &input.payload {
            if input.url.is_some() {
                warn!("both payload and URL supplied, using the in-memory payload");
            }
            return Ok(payload.clone());
        }

        let Some(raw_url) = &input.url else {
            return Err(SourceError::MissingInput);
        };
        let url = Url::parse(raw_url).map_err(|err| SourceError::Transport {
            message: format!("invalid score URL `{raw_url}`: {err}"),
        })?;

        debug!(url = %url, "fetching score document");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| SourceError::Transport {
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Fetch {
                status: status
                    .canonical_reason()
                    .map(str::to_owned)
                    .unwrap_or_else(|| status.to_string()),
            });
        }

        response.bytes().await.map_err(|err| SourceError::Transport {
            message: err.to_string(),
        })
    }
}

//! Version oracle client.
//!
//! One network round trip per reconciliation tick: GET the version
//! endpoint, parse the advertised artifact identity. Any transport
//! error, non-200 status, or malformed body means "no information this
//! tick"; the caller logs it and retries on the next schedule.

use serde::Deserialize;
use std::time::Duration;
use warden_common::AgentError;

/// What the remote authority currently advertises.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteState {
    pub version: f64,
    pub filename: String,
    /// The authority omits this field in some deployments; absent means
    /// an update is on offer.
    #[serde(rename = "update", default = "default_update")]
    pub update_available: bool,
}

fn default_update() -> bool {
    true
}

impl RemoteState {
    /// Whether this response carries an artifact worth comparing
    /// against. `{"version": 0.0, "filename": "", "update": false}` is
    /// the authority's "nothing published" shape.
    pub fn usable(&self) -> bool {
        self.update_available && !self.filename.is_empty()
    }
}

/// Client for the remote authority's version endpoint.
pub struct VersionOracle {
    client: reqwest::Client,
    url: String,
}

impl VersionOracle {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(format!("wardend/{}", env!("CARGO_PKG_VERSION")))
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            url: url.into(),
        }
    }

    /// Fetch the advertised remote state. The body is read fully within
    /// the client timeout; exceeding it is just another network error.
    pub async fn fetch(&self) -> Result<RemoteState, AgentError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(AgentError::network)?;

        if !resp.status().is_success() {
            return Err(AgentError::Network(format!(
                "version oracle returned {}",
                resp.status()
            )));
        }

        resp.json::<RemoteState>().await.map_err(AgentError::network)
    }
}

//! Odds-alert provider.
//!
//! - `AlertFeed`: the seam the poller fetches raw alert batches through
//! - `HttpAlertFeed`: reqwest implementation of the hosted feed
//! - `poller`: the per-account polling loop

pub mod poller;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::types::EdgeRunnerError;

pub const DEFAULT_ALERTS_URL: &str = "https://swordfish-production.up.railway.app/alerts";

/// Query parameter carrying the id of the last alert already seen.
const CURSOR_PARAM: &str = "dropNotificationsCursor";

/// Source of raw alert batches, oldest first.
///
/// Elements are returned undecoded so one malformed alert never costs the
/// whole batch; the poller decodes them individually.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertFeed: Send + Sync {
    async fn fetch(
        &self,
        user_id: &str,
        cursor: Option<String>,
    ) -> Result<Vec<serde_json::Value>, EdgeRunnerError>;
}

#[derive(Debug, Deserialize)]
struct AlertsEnvelope {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

pub struct HttpAlertFeed {
    http: Client,
    base_url: String,
}

impl HttpAlertFeed {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("EDGERUNNER/0.1.0 (value-betting-agent)")
            .build()
            .context("Failed to build HTTP client for alert feed")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// `<base>/<user_id>[?dropNotificationsCursor=<cursor>]`
pub fn alerts_url(
    base_url: &str,
    user_id: &str,
    cursor: Option<&str>,
) -> Result<Url, EdgeRunnerError> {
    let raw = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(user_id)
    );
    let mut url = Url::parse(&raw)
        .map_err(|e| EdgeRunnerError::Validation(format!("bad alerts URL {raw}: {e}")))?;
    if let Some(c) = cursor {
        url.query_pairs_mut().append_pair(CURSOR_PARAM, c);
    }
    Ok(url)
}

#[async_trait]
impl AlertFeed for HttpAlertFeed {
    async fn fetch(
        &self,
        user_id: &str,
        cursor: Option<String>,
    ) -> Result<Vec<serde_json::Value>, EdgeRunnerError> {
        let url = alerts_url(&self.base_url, user_id, cursor.as_deref())?;
        debug!(url = %url, "Fetching alerts");

        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(EdgeRunnerError::Network(format!(
                "alert feed returned HTTP {status}"
            )));
        }

        let envelope: AlertsEnvelope = resp.json().await?;
        Ok(envelope.data)
    }
}

//! HTTP completion reporter -- `POST {base_url}/sessions/{id}/complete`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use super::{CompletionReport, CompletionReporter, ReportAck};
use crate::error::ReporterError;
use crate::storage::ReporterConfig;

pub struct HttpCompletionReporter {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpCompletionReporter {
    /// # Errors
    /// Returns [`ReporterError::InvalidUrl`] if `base_url` cannot carry a path,
    /// or a network error if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ReporterError> {
        let invalid = |message: String| ReporterError::InvalidUrl {
            url: base_url.to_string(),
            message,
        };
        let base_url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid("URL cannot carry a path".into()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    pub fn from_config(config: &ReporterConfig, token: Option<String>) -> Result<Self, ReporterError> {
        Self::new(&config.base_url, token, config.timeout())
    }

    /// Endpoint for a given session id.
    pub fn endpoint(&self, session_id: &str) -> Result<Url, ReporterError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ReporterError::InvalidUrl {
                url: self.base_url.to_string(),
                message: "URL cannot carry a path".into(),
            })?
            .pop_if_empty()
            .extend(["sessions", session_id, "complete"]);
        Ok(url)
    }
}

#[async_trait]
impl CompletionReporter for HttpCompletionReporter {
    async fn report(&self, report: &CompletionReport) -> Result<ReportAck, ReporterError> {
        let url = self.endpoint(&report.session_id)?;
        tracing::debug!(%url, completions = report.completions.len(), "sending completion report");

        let mut request = self.client.post(url).json(report);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let resp = request.send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ReporterError::Rejected { status, body });
        }

        let bytes = resp.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(ReportAck::default());
        }
        serde_json::from_slice(&bytes).map_err(|e| ReporterError::Rejected {
            status: 200,
            body: format!("unreadable response: {e}"),
        })
    }
}

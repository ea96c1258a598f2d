//! HTTP client for the remote telemetry API.
//!
//! [`HttpRemote`] implements all three collaborator traits against one base
//! URL:
//!
//! | Trait | Request |
//! |-------|---------|
//! | [`TelemetrySink`] | `POST {base}/api/telemetry` |
//! | [`HistorySource`] | `GET {base}/api/observations?type=&from=&to=` |
//! | [`CredentialSource`] | `GET {base}/api/profile` |
//!
//! # Example
//!
//! ```no_run
//! use vitalsync_core::remote::{HttpRemote, RemoteOptions};
//! use vitalsync_core::TelemetrySink;
//! use vitalsync_types::{Credentials, Reading, TelemetryPayload};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let remote = HttpRemote::new("https://telemetry.example.com", RemoteOptions::default())?;
//!
//! let reading = Reading::new("temperature", 36.6, time::OffsetDateTime::now_utc());
//! let payload = TelemetryPayload::from_reading(&reading, &Credentials::new("dev-1", None));
//! remote.push(&payload).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

use vitalsync_types::{Credentials, TelemetryPayload, normalize_export_key};

use crate::error::{Error, Result};
use crate::observation::{RemoteObservation, flatten_observations};
use crate::traits::{CredentialSource, HistorySource, TelemetrySink};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for [`HttpRemote`].
#[derive(Debug, Clone)]
pub struct RemoteOptions {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Bearer token sent with every request.
    pub api_token: Option<String>,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            api_token: None,
        }
    }
}

impl RemoteOptions {
    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the bearer token.
    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }
}

/// HTTP client for the remote telemetry API.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
    timeout: Duration,
    api_token: Option<String>,
}

impl HttpRemote {
    /// Create a client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the telemetry API (e.g., "https://telemetry.example.com")
    pub fn new(base_url: &str, options: RemoteOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(Error::Http)?;
        Self::with_client(base_url, client, options)
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(base_url: &str, client: Client, options: RemoteOptions) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::InvalidUrl(format!(
                "URL must start with http:// or https://, got: {}",
                base_url
            )));
        }

        Ok(Self {
            client,
            base_url,
            timeout: options.timeout,
            api_token: options.api_token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<reqwest::Response> {
        self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(self.timeout)
            } else {
                Error::NotReachable {
                    url: url.to_string(),
                    source: e,
                }
            }
        })
    }

    async fn error_for(response: reqwest::Response) -> Error {
        let status = response.status();
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or_else(|| status.to_string());

        Error::Api {
            status: status.as_u16(),
            message,
        }
    }

    async fn read_json(response: reqwest::Response) -> Result<serde_json::Value> {
        if response.status().is_success() {
            response
                .json()
                .await
                .map_err(|e| Error::InvalidResponse(e.to_string()))
        } else {
            Err(Self::error_for(response).await)
        }
    }
}

fn format_time(at: OffsetDateTime) -> Result<String> {
    at.format(&Rfc3339)
        .map_err(|e| Error::InvalidUrl(format!("cannot format query time {}: {}", at, e)))
}

#[async_trait]
impl TelemetrySink for HttpRemote {
    async fn push(&self, payload: &TelemetryPayload) -> Result<()> {
        let url = format!("{}/api/telemetry", self.base_url);
        let response = self.send(&url, self.client.post(&url).json(payload)).await?;

        if response.status().is_success() {
            debug!("Pushed telemetry at {}", payload.timestamp);
            Ok(())
        } else {
            Err(Self::error_for(response).await)
        }
    }
}

#[async_trait]
impl HistorySource for HttpRemote {
    async fn fetch_history(
        &self,
        vital_type: &str,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<RemoteObservation>> {
        let key = normalize_export_key(vital_type);
        let url = format!("{}/api/observations", self.base_url);
        let query = [
            ("type", key.clone()),
            ("from", format_time(from)?),
            ("to", format_time(to)?),
        ];

        let response = self.send(&url, self.client.get(&url).query(&query)).await?;
        let body = Self::read_json(response).await?;
        flatten_observations(&body, &key)
    }
}

#[async_trait]
impl CredentialSource for HttpRemote {
    async fn resolve(&self) -> Result<Option<Credentials>> {
        let url = format!("{}/api/profile", self.base_url);
        let response = self.send(&url, self.client.get(&url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = Self::read_json(response).await?;
        let credentials: Credentials = serde_json::from_value(body)?;
        Ok(Some(credentials))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let remote = HttpRemote::new("https://telemetry.example.com", RemoteOptions::default());
        assert!(remote.is_ok());
        assert_eq!(remote.unwrap().base_url(), "https://telemetry.example.com");
    }

    #[test]
    fn test_client_normalizes_url() {
        let remote = HttpRemote::new("http://localhost:8080/", RemoteOptions::default()).unwrap();
        assert_eq!(remote.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_invalid_url() {
        let result = HttpRemote::new("telemetry.example.com", RemoteOptions::default());
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_blank_token_is_dropped() {
        let options = RemoteOptions::default().api_token("  ");
        let remote = HttpRemote::new("http://localhost:8080", options).unwrap();
        assert!(remote.api_token.is_none());
    }

    #[test]
    fn test_options_builder() {
        let options = RemoteOptions::default()
            .timeout(Duration::from_secs(3))
            .api_token("secret");
        assert_eq!(options.timeout, Duration::from_secs(3));
        assert_eq!(options.api_token.as_deref(), Some("secret"));
        assert_eq!(RemoteOptions::default().timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_format_time_is_rfc3339() {
        let formatted = format_time(OffsetDateTime::UNIX_EPOCH).unwrap();
        assert_eq!(formatted, "1970-01-01T00:00:00Z");
    }
}

//! The remote catalog service.

use async_trait::async_trait;

use super::entry::CatalogEntry;
use crate::client::CallError;

/// Source of catalog entries for a chemical system.
///
/// Implementations report failures as [`CallError`]s and leave retrying to
/// the [`RetryingClient`](crate::client::RetryingClient).
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Fetches all entries for the given element symbols.
    async fn fetch_entries(&self, symbols: &[String]) -> Result<Vec<CatalogEntry>, CallError>;
}

#[async_trait]
impl<T: CatalogService + ?Sized> CatalogService for &T {
    async fn fetch_entries(&self, symbols: &[String]) -> Result<Vec<CatalogEntry>, CallError> {
        (**self).fetch_entries(symbols).await
    }
}

#[cfg(feature = "http")]
pub use http::{HttpCatalog, HttpCatalogConfig};

#[cfg(feature = "http")]
mod http {
    use reqwest::header::RETRY_AFTER;
    use reqwest::StatusCode;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    use super::{async_trait, CallError, CatalogEntry, CatalogService};
    use crate::client::ConnectionErrorKind;

    /// Connection settings for [`HttpCatalog`].
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct HttpCatalogConfig {
        /// Service root, without a trailing slash.
        #[serde(default = "default_base_url")]
        pub base_url: String,
        /// Environment variable holding the API key.
        #[serde(default = "default_api_key_env")]
        pub api_key_env: String,
        /// Per-request timeout in seconds.
        #[serde(default = "default_timeout")]
        pub timeout_seconds: u64,
    }

    fn default_base_url() -> String {
        "https://api.materialsproject.org".to_string()
    }

    fn default_api_key_env() -> String {
        "MP_API_KEY".to_string()
    }

    fn default_timeout() -> u64 {
        60
    }

    impl Default for HttpCatalogConfig {
        fn default() -> Self {
            Self {
                base_url: default_base_url(),
                api_key_env: default_api_key_env(),
                timeout_seconds: default_timeout(),
            }
        }
    }

    /// Catalog backed by a JSON-over-HTTP endpoint.
    ///
    /// `GET {base_url}/entries?symbols=Fe,Zn` must answer with a JSON array of
    /// entries.
    #[derive(Debug, Clone)]
    pub struct HttpCatalog {
        client: reqwest::Client,
        base_url: String,
        api_key: Option<String>,
    }

    impl HttpCatalog {
        /// Creates a catalog client. The API key is read from the configured
        /// environment variable, if set.
        pub fn new(config: &HttpCatalogConfig) -> Result<Self, CallError> {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()
                .map_err(|e| CallError::other(format!("failed to build HTTP client: {e}")))?;
            Ok(Self {
                client,
                base_url: config.base_url.trim_end_matches('/').to_string(),
                api_key: std::env::var(&config.api_key_env).ok(),
            })
        }

        fn entries_url(&self) -> String {
            format!("{}/entries", self.base_url)
        }
    }

    #[async_trait]
    impl CatalogService for HttpCatalog {
        async fn fetch_entries(&self, symbols: &[String]) -> Result<Vec<CatalogEntry>, CallError> {
            let mut request = self
                .client
                .get(self.entries_url())
                .query(&[("symbols", symbols.join(","))]);
            if let Some(key) = &self.api_key {
                request = request.header("X-API-KEY", key);
            }

            let response = request.send().await.map_err(map_transport_error)?;
            let status = response.status();
            if !status.is_success() {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);
                let message = response.text().await.unwrap_or_default();
                return Err(status_error(status, message, retry_after));
            }

            response
                .json::<Vec<CatalogEntry>>()
                .await
                .map_err(map_transport_error)
        }
    }

    fn status_error(status: StatusCode, message: String, retry_after: Option<Duration>) -> CallError {
        let message = if message.is_empty() {
            status.canonical_reason().unwrap_or("unknown status").to_string()
        } else {
            message
        };
        match retry_after {
            Some(pause) => CallError::status_with_retry_after(status.as_u16(), message, pause),
            None => CallError::status(status.as_u16(), message),
        }
    }

    fn map_transport_error(err: reqwest::Error) -> CallError {
        let message = err.to_string();
        if let Some(status) = err.status() {
            return CallError::status(status.as_u16(), message);
        }
        if err.is_timeout() {
            CallError::connection(ConnectionErrorKind::Timeout, message)
        } else if err.is_connect() {
            CallError::connection(ConnectionErrorKind::Refused, message)
        } else if err.is_body() {
            CallError::connection(ConnectionErrorKind::TruncatedRead, message)
        } else if err.is_request() {
            CallError::connection(ConnectionErrorKind::Protocol, message)
        } else if err.is_decode() {
            // A body that stops mid-document decodes as an early EOF.
            if message.contains("EOF") {
                CallError::connection(ConnectionErrorKind::TruncatedRead, message)
            } else {
                CallError::other(message)
            }
        } else {
            CallError::other(message)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_config_defaults() {
            let config: HttpCatalogConfig = serde_json::from_str("{}").unwrap();
            assert_eq!(config.api_key_env, "MP_API_KEY");
            assert_eq!(config.timeout_seconds, 60);
        }

        #[test]
        fn test_entries_url_trims_slash() {
            let config = HttpCatalogConfig {
                base_url: "http://localhost:8080/".to_string(),
                ..HttpCatalogConfig::default()
            };
            let catalog = HttpCatalog::new(&config).unwrap();
            assert_eq!(catalog.entries_url(), "http://localhost:8080/entries");
        }

        #[test]
        fn test_status_error_keeps_retry_after() {
            let err = status_error(
                StatusCode::TOO_MANY_REQUESTS,
                String::new(),
                Some(Duration::from_secs(30)),
            );
            assert_eq!(
                err,
                CallError::status_with_retry_after(429, "Too Many Requests", Duration::from_secs(30))
            );
        }
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;

/// Public glossary repository the widget was originally served from.
pub const DEFAULT_REMOTE_URL: &str = "https://raw.githubusercontent.com/openadvocate/readclearly/master";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("glossary {0} not found")]
    NotFound(String),
    #[error("timed out fetching glossary {0}")]
    Timeout(String),
    #[error("failed to fetch glossary {name}: {message}")]
    Transport { name: String, message: String },
}

/// Source of raw glossary tables that are not available locally.
#[async_trait]
pub trait GlossaryProvider: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Fetches `<base_url>/<name>/glossary.csv` over HTTP.
pub struct HttpGlossaryProvider {
    http: Client,
    base_url: String,
}

impl HttpGlossaryProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let base_url = base_url.into();
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("readclearly/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Transport {
                name: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, name: &str) -> String {
        format!("{}/{}/glossary.csv", self.base_url, name)
    }
}

#[async_trait]
impl GlossaryProvider for HttpGlossaryProvider {
    async fn fetch(&self, name: &str) -> Result<Vec<u8>, ProviderError> {
        let transport = |message: String| ProviderError::Transport {
            name: name.to_string(),
            message,
        };

        let response = self.http.get(self.url_for(name)).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(name.to_string())
            } else {
                transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(name.to_string()));
        }
        if !status.is_success() {
            return Err(transport(format!("unexpected status {status}")));
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(name.to_string())
            } else {
                transport(e.to_string())
            }
        })?;
        if body.is_empty() {
            return Err(ProviderError::NotFound(name.to_string()));
        }
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_repository_urls() {
        let provider =
            HttpGlossaryProvider::new("https://example.org/glossaries/", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            provider.url_for("housing"),
            "https://example.org/glossaries/housing/glossary.csv"
        );
    }
}

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, CONTENT_TYPE};

use crate::types::{FetchError, FetchFailureKind, FetchMetadata, FetchOutput};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub allowed_content_types: Vec<String>,
    pub user_agent: String,
    pub accept_language: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            allowed_content_types: vec![
                "text/html".to_string(),
                "application/xhtml+xml".to_string(),
            ],
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
            accept_language: "ja,en-US;q=0.7,en;q=0.3".to_string(),
        }
    }
}

/// Document source boundary. The engine never fetches directly; runs are
/// parameterized by this trait so tests can script page content.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError>;
}

/// HTTP fetcher with timeout, redirect and size limits. `file://` URLs
/// are read from the local filesystem (debugging against saved fixtures).
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    settings: FetchSettings,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self { settings }
    }

    fn build_client(&self) -> Result<reqwest::Client, FetchError> {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.settings.accept_language) {
            headers.insert(ACCEPT_LANGUAGE, value);
        }
        reqwest::Client::builder()
            .user_agent(self.settings.user_agent.clone())
            .default_headers(headers)
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(
                self.settings.redirect_limit,
            ))
            .build()
            .map_err(|err| FetchError::new(FetchFailureKind::Network, err.to_string()))
    }

    fn is_content_type_allowed(&self, content_type: &str) -> bool {
        let ct = content_type
            .split(';')
            .next()
            .unwrap_or(content_type)
            .trim();
        self.settings
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ct))
    }

    async fn fetch_local_file(&self, url: &str) -> Result<FetchOutput, FetchError> {
        let path = url.trim_start_matches("file://");
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| FetchError::new(FetchFailureKind::Io, err.to_string()))?;
        if bytes.len() as u64 > self.settings.max_bytes {
            return Err(FetchError::new(
                FetchFailureKind::TooLarge {
                    max_bytes: self.settings.max_bytes,
                    actual: Some(bytes.len() as u64),
                },
                "local file too large",
            ));
        }
        let byte_len = bytes.len() as u64;
        Ok(FetchOutput {
            bytes,
            metadata: FetchMetadata {
                original_url: url.to_string(),
                final_url: url.to_string(),
                content_type: None,
                byte_len,
            },
        })
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError> {
        if url.starts_with("file://") {
            return self.fetch_local_file(url).await;
        }

        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FetchFailureKind::InvalidUrl, err.to_string()))?;
        let client = self.build_client()?;

        let response = client.get(parsed).send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FetchFailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(FetchError::new(
                    FetchFailureKind::TooLarge {
                        max_bytes: self.settings.max_bytes,
                        actual: Some(content_len),
                    },
                    "response too large",
                ));
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        if let Some(ct) = content_type.as_deref() {
            if !self.is_content_type_allowed(ct) {
                return Err(FetchError::new(
                    FetchFailureKind::UnsupportedContentType {
                        content_type: ct.to_string(),
                    },
                    "unsupported content type",
                ));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(FetchError::new(
                    FetchFailureKind::TooLarge {
                        max_bytes: self.settings.max_bytes,
                        actual: Some(next_len),
                    },
                    "response too large",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        let byte_len = bytes.len() as u64;
        Ok(FetchOutput {
            bytes,
            metadata: FetchMetadata {
                original_url: url.to_string(),
                final_url,
                content_type,
                byte_len,
            },
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FetchFailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FetchFailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FetchFailureKind::Network, err.to_string())
}

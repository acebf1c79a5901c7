//! Page and file retrieval.

use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

use crate::error::{ScrapeError, ScrapeResult};

/// Desktop browser user agent; the catalog serves reduced pages to unknown clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0.0.0";

/// Retrieves pages and binary files by URL.
pub trait PageFetcher {
    fn fetch_text(&self, url: &str) -> ScrapeResult<String>;

    fn fetch_bytes(&self, url: &str) -> ScrapeResult<Vec<u8>>;
}

/// [`PageFetcher`] over a blocking HTTP client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> ScrapeResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|source| ScrapeError::Request {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }

    fn get(&self, url: &str) -> ScrapeResult<reqwest::blocking::Response> {
        debug!(url, "GET");
        let request_error = |source| ScrapeError::Request {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            client: Client::builder()
                .user_agent(DEFAULT_USER_AGENT)
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch_text(&self, url: &str) -> ScrapeResult<String> {
        self.get(url)?
            .text()
            .map_err(|source| ScrapeError::Request {
                url: url.to_string(),
                source,
            })
    }

    fn fetch_bytes(&self, url: &str) -> ScrapeResult<Vec<u8>> {
        self.get(url)?
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|source| ScrapeError::Request {
                url: url.to_string(),
                source,
            })
    }
}

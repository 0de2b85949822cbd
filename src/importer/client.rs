use url::Url;

use super::error::{ImportError, ImportResult};
use super::page::Page;
use crate::config::FetchConfig;

const BODY_EXCERPT_LEN: usize = 200;

/// HTTP client for fetching listing pages from a source instance.
#[derive(Clone)]
pub struct SourceClient {
    http: reqwest::Client,
}

impl SourceClient {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("import-table/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http })
    }

    /// GET one page and decode it. Never retries.
    pub async fn fetch_page(&self, url: &Url) -> ImportResult<Page> {
        log::debug!("fetching page {}", url);

        let response = self
            .http
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| ImportError::Fetch {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImportError::FetchStatus {
                url: url.to_string(),
                status,
                body: excerpt(&body),
            });
        }

        let body = response.bytes().await.map_err(|source| ImportError::Fetch {
            url: url.to_string(),
            source,
        })?;

        Page::from_slice(url.as_str(), &body)
    }
}

fn excerpt(body: &str) -> String {
    match body.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_truncates_long_bodies() {
        let long = "x".repeat(500);
        let short = excerpt(&long);
        assert_eq!(short.chars().count(), BODY_EXCERPT_LEN + 1);
        assert_eq!(excerpt("oops"), "oops");
    }
}

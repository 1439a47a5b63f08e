use async_trait::async_trait;
use portwatch_core::{PortwatchError, Result};
use std::time::Duration;
use tracing::debug;

/// Where the raw CSV body comes from.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_csv(&self) -> Result<String>;
}

/// Plain HTTP GET against a fixed URL with a request timeout.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("portwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PortwatchError::Fetch(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RemoteSource for HttpSource {
    fn name(&self) -> &str {
        &self.url
    }

    async fn fetch_csv(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| PortwatchError::Fetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| PortwatchError::Fetch(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PortwatchError::Fetch(e.to_string()))?;

        debug!(bytes = bytes.len(), url = %self.url, "Downloaded CSV body");

        decode_body(&bytes)
    }
}

/// UTF-8 decode, tolerating a leading byte order mark.
pub fn decode_body(bytes: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| PortwatchError::Fetch(format!("response is not UTF-8: {}", e)))?;
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_body_strips_bom() {
        let body = b"\xEF\xBB\xBFDATE,PORTNAME\n";
        assert_eq!(decode_body(body).unwrap(), "DATE,PORTNAME\n");
    }

    #[test]
    fn test_decode_body_rejects_invalid_utf8() {
        assert!(matches!(
            decode_body(&[0xff, 0xfe, 0x00]),
            Err(PortwatchError::Fetch(_))
        ));
    }

    #[test]
    fn test_http_source_keeps_url() {
        let source = HttpSource::new("http://localhost:9/data.csv", Duration::from_secs(1)).unwrap();
        assert_eq!(source.url(), "http://localhost:9/data.csv");
        assert_eq!(source.name(), source.url());
    }
}

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{FixtureError, Result};

/// Materialized response: status, headers and the full body.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Scrape transport. Exists so tests can substitute a fake; carries no logic
/// beyond the single GET.
#[async_trait]
pub trait HttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(concat!("exporter-testkit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FixtureError::Http(e.to_string()))?;
        Ok(ReqwestClient { inner })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|e| FixtureError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| FixtureError::Http(e.to_string()))?;

        Ok(HttpResponse { status, headers, body })
    }
}

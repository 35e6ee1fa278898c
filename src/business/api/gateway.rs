//! Panel gateway: the transport seam between the sync engine and the panel's HTTP API

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use std::time::Duration;

use crate::error::Result;
use crate::logger::log;

/// HTTP method used by the panel API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single request to the panel
#[derive(Debug, Clone)]
pub struct PanelRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(&'static str, String)>,
    /// Last cache token, sent as `If-None-Match`
    pub if_none_match: Option<String>,
    pub body: Option<serde_json::Value>,
}

impl PanelRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            if_none_match: None,
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            if_none_match: None,
            body: Some(body),
        }
    }

    pub fn query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    pub fn if_none_match(mut self, token: Option<String>) -> Self {
        self.if_none_match = token.filter(|t| !t.is_empty());
        self
    }
}

/// Raw panel response: status, cache token and body
#[derive(Debug, Clone)]
pub struct PanelResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub body: Bytes,
}

/// Perform a request against the panel.
///
/// Implementations own retry, timeout and TLS policy. Any HTTP status is returned as a
/// response; only transport failures are errors.
#[async_trait]
pub trait PanelGateway: Send + Sync {
    /// Base URL used to build diagnostics
    fn base_url(&self) -> &str;

    async fn execute(&self, request: PanelRequest) -> Result<PanelResponse>;
}

/// `reqwest`-backed gateway with query-key authentication
pub struct HttpGateway {
    client: reqwest::Client,
    api_host: String,
    api_key: String,
    retry_count: u32,
    debug: bool,
}

impl HttpGateway {
    pub fn new(
        api_host: &str,
        api_key: &str,
        timeout: Duration,
        retry_count: u32,
        debug: bool,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(format!("sspanel-node/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_host: api_host.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            retry_count,
            debug,
        })
    }

    async fn send_once(&self, url: &str, request: &PanelRequest) -> reqwest::Result<PanelResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };

        builder = builder
            .query(&[("key", &self.api_key), ("muKey", &self.api_key)])
            .query(&request.query);

        if let Some(token) = &request.if_none_match {
            builder = builder.header(IF_NONE_MATCH, token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        Ok(PanelResponse { status, etag, body })
    }
}

#[async_trait]
impl PanelGateway for HttpGateway {
    fn base_url(&self) -> &str {
        &self.api_host
    }

    async fn execute(&self, request: PanelRequest) -> Result<PanelResponse> {
        let url = format!("{}{}", self.api_host, request.path);
        let mut attempt = 0;

        loop {
            match self.send_once(&url, &request).await {
                Ok(response) => {
                    if self.debug {
                        log::debug!(
                            url = %url,
                            status = response.status,
                            body = %String::from_utf8_lossy(&response.body),
                            "Panel response"
                        );
                    }
                    return Ok(response);
                }
                Err(e) if attempt < self.retry_count => {
                    attempt += 1;
                    log::debug!(url = %url, attempt = attempt, error = %e, "Retrying panel request");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

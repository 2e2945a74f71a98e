//! JSON-over-HTTP transport used by the label and DICOMweb clients.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// `None` for an empty body.
    pub body: Option<Value>,
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{method} {url} returned status {status}")]
    Status {
        method: HttpMethod,
        url: String,
        status: u16,
    },

    #[error("{method} {url} failed: {message}")]
    Transport {
        method: HttpMethod,
        url: String,
        message: String,
    },

    #[error("Response from {url} is not valid JSON: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("HTTP worker failed: {0}")]
    Worker(String),
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Blocking `ureq` agent driven from tokio's blocking pool.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
        }
    }

    fn execute_blocking(
        agent: &ureq::Agent,
        request: HttpRequest,
    ) -> Result<HttpResponse, HttpError> {
        let HttpRequest {
            method,
            url,
            query,
            body,
        } = request;
        let transport_error = |err: ureq::Error| match err {
            ureq::Error::StatusCode(status) => HttpError::Status {
                method,
                url: url.clone(),
                status,
            },
            other => HttpError::Transport {
                method,
                url: url.clone(),
                message: other.to_string(),
            },
        };

        let result = match method {
            HttpMethod::Get => {
                let mut builder = agent.get(url.as_str());
                for (key, value) in &query {
                    builder = builder.query(key, value);
                }
                builder.call()
            }
            HttpMethod::Delete => {
                let mut builder = agent.delete(url.as_str());
                for (key, value) in &query {
                    builder = builder.query(key, value);
                }
                builder.call()
            }
            HttpMethod::Post | HttpMethod::Patch => {
                let mut builder = if method == HttpMethod::Post {
                    agent.post(url.as_str())
                } else {
                    agent.patch(url.as_str())
                };
                for (key, value) in &query {
                    builder = builder.query(key, value);
                }
                match &body {
                    Some(body) => builder.send_json(body),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result.map_err(transport_error)?;
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(transport_error)?;
        let body = if text.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(&text).map_err(|source| HttpError::Decode {
                url: url.clone(),
                source,
            })?)
        };
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpTransport for UreqTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        debug!(method = %request.method, url = %request.url, "HTTP request");
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || Self::execute_blocking(&agent, request))
            .await
            .map_err(|err| HttpError::Worker(err.to_string()))?
    }
}

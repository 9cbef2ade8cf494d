//! Request/response abstraction
//!
//! [`RequestExecutor`] turns an [`Exchange`] (method, endpoint, path and
//! query parameters, optional JSON body) into a wire request by applying the
//! shared [`RequestTemplate`], sends it, applies the [`ResponseTemplate`]
//! and hands back a [`Response`]. Templates are built once and shared
//! read-only between every scenario worker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::transport::{HttpRequest, Method, RawResponse, ReqwestTransport, Transport};
use crate::common::error::short_type_name;
use crate::common::{Config, Error, Result};

/// How much of each exchange to log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogDetail {
    None,
    Headers,
    #[default]
    All,
}

impl LogDetail {
    /// Parse a configured value; unknown values mean `All`
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Self::None,
            "headers" => Self::Headers,
            _ => Self::All,
        }
    }
}

/// Settings applied to every outbound request
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub base_uri: String,
    pub headers: Vec<(String, String)>,
    pub log: LogDetail,
}

impl RequestTemplate {
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Accept".to_string(), "application/json".to_string()),
            ],
            log: LogDetail::All,
        }
    }

    /// Base URI from `base.url`, headers from `content.type`/`accept.header`
    pub fn from_config(config: &Config) -> Result<Self> {
        let base_uri = config
            .base_url()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| Error::Configuration("base.url is not set".to_string()))?;

        Ok(Self {
            base_uri,
            headers: vec![
                ("Content-Type".to_string(), config.content_type()),
                ("Accept".to_string(), config.accept_header()),
            ],
            log: LogDetail::parse(&config.http_log_detail()),
        })
    }
}

/// Settings applied to every response
#[derive(Debug, Clone, Default)]
pub struct ResponseTemplate {
    pub log: LogDetail,
}

/// Retry policy for transport-level failures. HTTP error statuses are
/// never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u64,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            retries: 0,
            delay: Duration::ZERO,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            retries: config.retry_count(),
            delay: Duration::from_millis(config.retry_delay_ms()),
        }
    }
}

/// One HTTP exchange to perform
#[derive(Debug, Clone)]
pub struct Exchange {
    method: Method,
    endpoint: String,
    path_params: Vec<(String, String)>,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<serde_json::Value>,
}

impl Exchange {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            path_params: Vec::new(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Get, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Delete, endpoint)
    }

    /// Substitute `{name}` in the endpoint
    pub fn path_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.path_params.push((name.into(), value.to_string()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a JSON body
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn body_value(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Endpoint with path parameters substituted
    pub fn resolved_endpoint(&self) -> Result<String> {
        let mut endpoint = self.endpoint.clone();
        for (name, value) in &self.path_params {
            endpoint = endpoint.replace(&format!("{{{name}}}"), &encode_path_segment(value)?);
        }
        if let (Some(open), Some(_)) = (endpoint.find('{'), endpoint.find('}')) {
            let name: String = endpoint[open + 1..].chars().take_while(|c| *c != '}').collect();
            return Err(Error::Configuration(format!(
                "Unresolved path parameter '{name}' in endpoint '{}'",
                self.endpoint
            )));
        }
        Ok(endpoint)
    }
}

/// A received response
#[derive(Debug, Clone)]
pub struct Response {
    method: Method,
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
    elapsed: Duration,
}

impl Response {
    pub fn from_raw(method: Method, url: impl Into<String>, raw: RawResponse, elapsed: Duration) -> Self {
        Self {
            method,
            url: url.into(),
            status: raw.status,
            headers: raw.headers,
            body: raw.body,
            elapsed,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Raw body text
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decode the body into `T`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        extract_as(self)
    }
}

/// Fail with a status mismatch (actual code and raw body included) unless
/// the response carries `expected`
pub fn validate_status(response: &Response, expected: u16) -> Result<()> {
    if response.status != expected {
        return Err(Error::StatusMismatch {
            expected,
            actual: response.status,
            body: response.body.clone(),
        });
    }
    tracing::info!(status = expected, "Status code validation passed");
    Ok(())
}

/// Decode a response body into `T`; an empty body is a decode error
pub fn extract_as<T: DeserializeOwned>(response: &Response) -> Result<T> {
    if response.body.trim().is_empty() {
        return Err(Error::decode::<T>("response body is empty"));
    }
    serde_json::from_str(&response.body).map_err(|e| {
        tracing::error!(target_type = short_type_name::<T>(), error = %e, "Failed to extract response");
        Error::decode::<T>(e)
    })
}

/// Join a base with path segments using exactly one `/` at every joint
///
/// Leading and trailing slashes on any input are irrelevant; empty segments
/// are skipped. The base's interior (e.g. `https://`) is left untouched.
pub fn join_path(base: &str, segments: &[&str]) -> String {
    let mut out = base.trim_end_matches('/').to_string();
    for piece in segments
        .iter()
        .flat_map(|segment| segment.split('/'))
        .filter(|piece| !piece.is_empty())
    {
        out.push('/');
        out.push_str(piece);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Percent-encode a value so it stays a single path segment
fn encode_path_segment(value: &str) -> Result<String> {
    let mut url = reqwest::Url::parse("http://segment.invalid/")
        .map_err(|e| Error::Internal(format!("segment encoder base: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| Error::Internal("segment encoder base cannot hold a path".to_string()))?
        .pop_if_empty()
        .push(value);
    Ok(url.path().trim_start_matches('/').to_string())
}

/// Builds, executes and logs HTTP exchanges against the configured base URI
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    request: Arc<RequestTemplate>,
    response: Arc<ResponseTemplate>,
    retry: RetryPolicy,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>, request: RequestTemplate, response: ResponseTemplate) -> Self {
        Self {
            transport,
            request: Arc::new(request),
            response: Arc::new(response),
            retry: RetryPolicy::none(),
        }
    }

    /// Executor over a blocking reqwest client configured from `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = ReqwestTransport::new(Duration::from_millis(config.timeout_ms()))?;
        let request = RequestTemplate::from_config(config)?;
        let response = ResponseTemplate {
            log: request.log,
        };
        tracing::info!(base_uri = %request.base_uri, "HTTP executor configured");
        Ok(Self::new(Arc::new(transport), request, response).with_retry(RetryPolicy::from_config(config)))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn request_template(&self) -> &RequestTemplate {
        &self.request
    }

    /// Full URL for an endpoint path
    pub fn url_for(&self, endpoint: &str) -> String {
        join_path(&self.request.base_uri, &[endpoint])
    }

    /// Perform an exchange
    pub fn execute(&self, exchange: Exchange) -> Result<Response> {
        let endpoint = exchange.resolved_endpoint()?;
        let url = self.url_for(&endpoint);

        let mut headers = self.request.headers.clone();
        for (name, value) in exchange.headers {
            headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
            headers.push((name, value));
        }
        let body = exchange.body.as_ref().map(serde_json::to_vec).transpose()?;

        let request = HttpRequest {
            method: exchange.method,
            url,
            headers,
            query: exchange.query,
            body,
        };
        self.log_request(&request);

        let started = Instant::now();
        let mut attempt = 0;
        let raw = loop {
            match self.transport.send(&request) {
                Ok(raw) => break raw,
                Err(e) if e.retryable && attempt < self.retry.retries => {
                    attempt += 1;
                    tracing::warn!(
                        method = %request.method,
                        url = %request.url,
                        attempt,
                        error = %e,
                        "Transport failure, retrying"
                    );
                    std::thread::sleep(self.retry.delay);
                }
                Err(e) => {
                    return Err(Error::Transport {
                        method: request.method.to_string(),
                        url: request.url,
                        message: e.message,
                    })
                }
            }
        };

        let response = Response::from_raw(request.method, request.url, raw, started.elapsed());
        self.log_response(&response);
        Ok(response)
    }

    pub fn get(&self, endpoint: &str) -> Result<Response> {
        self.execute(Exchange::get(endpoint))
    }

    pub fn post<T: Serialize + ?Sized>(&self, endpoint: &str, body: &T) -> Result<Response> {
        self.execute(Exchange::new(Method::Post, endpoint).json(body)?)
    }

    pub fn put<T: Serialize + ?Sized>(&self, endpoint: &str, body: &T) -> Result<Response> {
        self.execute(Exchange::new(Method::Put, endpoint).json(body)?)
    }

    pub fn patch<T: Serialize + ?Sized>(&self, endpoint: &str, body: &T) -> Result<Response> {
        self.execute(Exchange::new(Method::Patch, endpoint).json(body)?)
    }

    pub fn delete(&self, endpoint: &str) -> Result<Response> {
        self.execute(Exchange::delete(endpoint))
    }

    fn log_request(&self, request: &HttpRequest) {
        tracing::info!("STEP: Performing {} request to: {}", request.method, request.url);
        if self.request.log == LogDetail::None {
            return;
        }
        tracing::debug!(headers = ?request.headers, query = ?request.query, "Request headers");
        if self.request.log == LogDetail::All {
            if let Some(body) = &request.body {
                tracing::debug!(body = %String::from_utf8_lossy(body), "Request body");
            }
        }
    }

    fn log_response(&self, response: &Response) {
        tracing::info!(
            status = response.status,
            elapsed_ms = response.elapsed.as_millis() as u64,
            "{} {} completed",
            response.method,
            response.url
        );
        if self.response.log == LogDetail::None {
            return;
        }
        tracing::debug!(headers = ?response.headers, "Response headers");
        if self.response.log == LogDetail::All {
            tracing::debug!(body = %response.body, "Response body");
        }
    }
}

//! HTTP plumbing shared by the remote clients.
//!
//! The actual HTTP client is abstracted via a trait so that the remote
//! clients can run over reqwest in the binary and over canned responses in
//! tests.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL, without query string.
    pub url: String,
    /// Extra headers.
    pub headers: Vec<(String, String)>,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// Form-encoded body parameters.
    pub form: Vec<(String, String)>,
}

impl HttpRequest {
    /// Creates a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Creates a POST request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            form: Vec::new(),
        }
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Adds a form parameter.
    pub fn form(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((name.into(), value.into()));
        self
    }

    /// Value of the first query parameter named `name`.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        lookup(&self.query, name)
    }

    /// Value of the first form parameter named `name`.
    pub fn form_value(&self, name: &str) -> Option<&str> {
        lookup(&self.form, name)
    }

    /// Value of the first header named `name`, case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// A received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Creates a 200 response carrying `value` as JSON.
    pub fn json(value: &Value) -> Self {
        Self::new(200, value.to_string())
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. Errors are
/// reported as plain messages and treated as retryable transport failures.
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response, whatever its status.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, String>;
}

impl<T: HttpClient + ?Sized> HttpClient for Arc<T> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        (**self).send(request)
    }
}

/// Sends `request` and decodes a successful JSON response.
pub(crate) fn fetch_json<C: HttpClient + ?Sized>(
    client: &C,
    request: &HttpRequest,
    endpoint: &str,
) -> SyncResult<Value> {
    let response = client
        .send(request)
        .map_err(SyncError::transport_retryable)?;
    if !response.is_success() {
        return Err(SyncError::HttpStatus {
            status: response.status,
            endpoint: endpoint.to_string(),
        });
    }
    Ok(serde_json::from_slice(&response.body)?)
}

/// Like [`fetch_json`], but a 404 yields `Ok(None)`.
pub(crate) fn fetch_json_optional<C: HttpClient + ?Sized>(
    client: &C,
    request: &HttpRequest,
    endpoint: &str,
) -> SyncResult<Option<Value>> {
    match fetch_json(client, request, endpoint) {
        Ok(value) => Ok(Some(value)),
        Err(SyncError::HttpStatus { status: 404, .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// An HTTP client answering from a table of canned responses.
///
/// Responses are keyed by method and URL path (the part after the host);
/// several responses for the same key are served in order and the last one
/// repeats. Every request is recorded. Useful for testing.
#[derive(Debug, Default)]
pub struct CannedClient {
    routes: Mutex<HashMap<(Method, String), VecDeque<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl CannedClient {
    /// Creates a client with no routes; unknown routes answer 404.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for `method` on `path`.
    pub fn respond(&self, method: Method, path: &str, response: HttpResponse) -> &Self {
        self.routes
            .lock()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(response);
        self
    }

    /// Queues a 200 JSON response for `method` on `path`.
    pub fn respond_json(&self, method: Method, path: &str, value: Value) -> &Self {
        self.respond(method, path, HttpResponse::json(&value))
    }

    /// All requests sent so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Requests sent to `path`.
    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|request| url_path(&request.url) == path)
            .cloned()
            .collect()
    }
}

fn url_path(url: &str) -> &str {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    without_scheme
        .find('/')
        .map_or("/", |idx| &without_scheme[idx..])
}

impl HttpClient for CannedClient {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        self.requests.lock().push(request.clone());
        let mut routes = self.routes.lock();
        let Some(queue) = routes.get_mut(&(request.method, url_path(&request.url).to_string()))
        else {
            return Ok(HttpResponse::new(404, "{}"));
        };
        let response = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        response.ok_or_else(|| format!("no response queued for {}", request.url))
    }
}

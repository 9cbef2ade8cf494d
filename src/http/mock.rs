//! In-process transport for tests and dry runs
//!
//! Routes match on method plus the path portion of the request URL.
//! Unmatched requests get a 404 with an empty JSON object.

use std::sync::{Arc, Mutex};

use super::transport::{HttpRequest, Method, RawResponse, Transport, TransportError};

type Responder =
    dyn Fn(&HttpRequest) -> std::result::Result<RawResponse, TransportError> + Send + Sync;

struct Route {
    method: Method,
    path: String,
    reply: Arc<Responder>,
}

/// Canned-response transport that records every request it receives
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with a fixed status and body
    pub fn on(&self, method: Method, path: &str, status: u16, body: impl Into<String>) -> &Self {
        let body = body.into();
        self.on_with(method, path, move |_| Ok(RawResponse::new(status, body.clone())))
    }

    /// Fail at the transport level (no HTTP status)
    pub fn on_fail(&self, method: Method, path: &str, message: &str) -> &Self {
        let message = message.to_string();
        self.on_with(method, path, move |_| Err(TransportError::new(message.clone(), true)))
    }

    /// Reply with a closure over the request
    pub fn on_with<F>(&self, method: Method, path: &str, reply: F) -> &Self
    where
        F: Fn(&HttpRequest) -> std::result::Result<RawResponse, TransportError>
            + Send
            + Sync
            + 'static,
    {
        if let Ok(mut routes) = self.routes.lock() {
            routes.push(Route {
                method,
                path: path.to_string(),
                reply: Arc::new(reply),
            });
        }
        self
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

/// Path portion of a URL: `https://host:1/a/b` -> `/a/b`
///
/// Relative inputs are taken to be a path already.
fn url_path(url: &str) -> String {
    reqwest::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string())
}

impl Transport for MockTransport {
    fn send(&self, request: &HttpRequest) -> std::result::Result<RawResponse, TransportError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let path = url_path(&request.url);
        let reply = self.routes.lock().ok().and_then(|routes| {
            routes
                .iter()
                .rev()
                .find(|r| r.method == request.method && r.path == path)
                .map(|r| Arc::clone(&r.reply))
        });

        match reply {
            Some(reply) => reply(request),
            None => Ok(RawResponse::new(404, "{}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: Method, url: &str) -> HttpRequest {
        HttpRequest {
            method,
            url: url.to_string(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    #[test]
    fn test_url_path() {
        assert_eq!(url_path("https://api.example.test/users/1"), "/users/1");
        assert_eq!(url_path("http://localhost:8080"), "/");
        assert_eq!(url_path("/users"), "/users");
        assert_eq!(url_path("https://api.example.test/users/7?verbose=1"), "/users/7");
        assert_eq!(url_path("https://api.example.test/search/a%20b"), "/search/a%20b");
    }

    #[test]
    fn test_latest_route_wins_and_unmatched_is_404() {
        let mock = MockTransport::new();
        mock.on(Method::Get, "/users/1", 200, "first");
        mock.on(Method::Get, "/users/1", 500, "second");

        let resp = mock.send(&request(Method::Get, "https://h/users/1")).unwrap();
        assert_eq!(resp.status, 500);

        let resp = mock.send(&request(Method::Delete, "https://h/users/1")).unwrap();
        assert_eq!(resp.status, 404);
        assert_eq!(mock.requests().len(), 2);
    }
}

//! Request context handed to the binder.
//!
//! A [`RequestContext`] holds the parts of an HTTP request the binder reads:
//! method, URI, headers, the buffered body and the path parameters the
//! router captured.

use bytes::Bytes;
use http::{header, HeaderMap, Method, Uri};

/// The parts of an HTTP request a binder reads.
///
/// # Example
///
/// ```rust
/// use reqbind_http::RequestContext;
/// use http::{HeaderMap, Method, Uri};
/// use bytes::Bytes;
///
/// let ctx = RequestContext::new(
///     Method::GET,
///     Uri::from_static("/users/123?page=2"),
///     HeaderMap::new(),
///     Bytes::new(),
///     vec![("id".to_string(), "123".to_string())],
/// );
///
/// assert_eq!(ctx.method(), &Method::GET);
/// assert_eq!(ctx.query_string(), Some("page=2"));
/// assert_eq!(ctx.path_param("id"), Some("123"));
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    path_params: Vec<(String, String)>,
}

impl RequestContext {
    /// Creates a new request context.
    #[must_use]
    pub fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        path_params: Vec<(String, String)>,
    ) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
            path_params,
        }
    }

    /// Splits an `http::Request` with a buffered body into a context.
    #[must_use]
    pub fn from_request(request: http::Request<Bytes>, path_params: Vec<(String, String)>) -> Self {
        let (parts, body) = request.into_parts();
        Self::new(parts.method, parts.uri, parts.headers, body, path_params)
    }

    /// Returns a builder.
    #[must_use]
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::new()
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the query string if present.
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the buffered body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the router's path parameters in capture order.
    #[must_use]
    pub fn path_params(&self) -> &[(String, String)] {
        &self.path_params
    }

    /// Returns the first path parameter named `name`.
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the Content-Type header, or `""` when absent or not text.
    #[must_use]
    pub fn content_type(&self) -> &str {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    /// True for methods whose body the binder reads.
    #[must_use]
    pub fn reads_body(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::PATCH)
    }
}

/// Builder for a [`RequestContext`].
///
/// Method and URI default to `GET /`.
#[derive(Debug, Default)]
pub struct RequestContextBuilder {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    path_params: Vec<(String, String)>,
}

impl RequestContextBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the HTTP method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the URI.
    #[must_use]
    pub fn uri(mut self, uri: Uri) -> Self {
        self.uri = uri;
        self
    }

    /// Sets the headers.
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Appends a header; invalid names or values are ignored.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.parse::<header::HeaderName>(),
            value.parse::<header::HeaderValue>(),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds a path parameter.
    #[must_use]
    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.push((name.into(), value.into()));
        self
    }

    /// Builds the context.
    #[must_use]
    pub fn build(self) -> RequestContext {
        RequestContext {
            method: self.method,
            uri: self.uri,
            headers: self.headers,
            body: self.body,
            path_params: self.path_params,
        }
    }
}

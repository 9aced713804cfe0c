use std::collections::HashMap;
use std::sync::OnceLock;

use bytes::Bytes;

use crate::http::headers::Headers;

pub const CONNECTION: &str = "Connection";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const COOKIE: &str = "Cookie";
pub const KEEP_ALIVE: &str = "keep-alive";
pub const CLOSE: &str = "close";
pub const FORM_URL_ENCODED: &str = "application/x-www-form-urlencoded";

/// A parsed HTTP request.
///
/// Immutable after construction except for the lazily-computed parameter
/// map. Lives for one exchange.
#[derive(Debug)]
pub struct Request {
    method: String,
    path: String,
    query: Option<String>,
    version: String,
    headers: Headers,
    body: Bytes,
    parameters: OnceLock<HashMap<String, Option<String>>>,
}

impl Request {
    /// Builds a request from the fields of the request line plus headers and
    /// body. Returns `None` when the target is malformed.
    pub(crate) fn new(
        method: String,
        target: String,
        version: String,
        headers: Headers,
        body: Vec<u8>,
    ) -> Option<Self> {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target, None),
        };
        if path.is_empty() {
            return None;
        }
        Some(Self {
            method,
            path,
            query,
            version,
            headers,
            body: Bytes::from(body),
            parameters: OnceLock::new(),
        })
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string, if the target carried one.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// First value of a header. Names are matched case-sensitively, as
    /// received.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Determines whether the connection should remain open after the
    /// response. `Connection: close` wins; `keep-alive` wins; an absent or
    /// unrecognized header falls back to the given default.
    pub fn keep_alive(&self, default: bool) -> bool {
        match self.header(CONNECTION) {
            Some(value) if value.eq_ignore_ascii_case(CLOSE) => false,
            Some(value) if value.eq_ignore_ascii_case(KEEP_ALIVE) => true,
            _ => default,
        }
    }

    /// Query-string and form-encoded-body parameters, parsed on first access.
    ///
    /// Keys and values are percent-decoded; a pair with no `=` maps to
    /// `None`; duplicate keys keep the last occurrence. A body contributes
    /// only when the request Content-Type is form-url-encoded.
    pub fn parameters(&self) -> &HashMap<String, Option<String>> {
        self.parameters.get_or_init(|| {
            let mut parameters = HashMap::new();
            if let Some(query) = &self.query {
                push_parameters(&mut parameters, query);
            }
            if self.header(CONTENT_TYPE) == Some(FORM_URL_ENCODED) {
                if let Ok(body) = std::str::from_utf8(&self.body) {
                    push_parameters(&mut parameters, body);
                }
            }
            parameters
        })
    }

    /// Value of a parameter; `None` when absent or when the pair had no `=`.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters().get(name)?.as_deref()
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters().contains_key(name)
    }
}

fn push_parameters(parameters: &mut HashMap<String, Option<String>>, raw: &str) {
    for pair in raw.split('&') {
        if pair.is_empty() {
            continue;
        }
        let Some((key, value)) = form_urlencoded::parse(pair.as_bytes()).next() else {
            continue;
        };
        if pair.contains('=') {
            parameters.insert(key.into_owned(), Some(value.into_owned()));
        } else {
            parameters.insert(key.into_owned(), None);
        }
    }
}

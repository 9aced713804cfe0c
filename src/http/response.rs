use crate::http::headers::Headers;

/// Response head: status code and headers.
///
/// Mutation is append-only until the framer sends the head; after that no
/// change is observed downstream.
#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: Headers,
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: Headers::new(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

/// Standard reason phrase for a status code.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

use std::io::{self, Write};

use crate::http::request::{CLOSE, CONNECTION, KEEP_ALIVE};
use crate::http::response::{Response, reason_phrase};

pub const SERVER_NAME: &str = "hearth";
pub const TEXT_PLAIN: &str = "text/plain";

const BODY_BUFFER_SIZE: usize = 8192;

/// Serializes a response into wire bytes.
///
/// Body bytes go into a bounded buffer; filling it past its capacity forces
/// a flush before the remainder is appended, which bounds memory for large
/// bodies. The status line and headers are sent exactly once, on the first
/// flush; at that point any unset default headers are injected and
/// `Content-Length` is fixed to the body bytes accepted so far. A body that
/// overflows the buffer before an explicit flush therefore advertises only
/// the already-accepted prefix; the remainder is still delivered.
///
/// A transport write failure is fatal for the exchange - the caller must
/// close the connection, not reuse it.
pub struct ResponseFramer<W: Write> {
    transport: W,
    response: Response,
    buffer: Vec<u8>,
    capacity: usize,
    body_size: usize,
    headers_sent: bool,
    keep_alive: bool,
}

impl<W: Write> ResponseFramer<W> {
    pub fn new(transport: W, keep_alive: bool) -> Self {
        Self::with_capacity(transport, keep_alive, BODY_BUFFER_SIZE)
    }

    pub fn with_capacity(transport: W, keep_alive: bool, capacity: usize) -> Self {
        // A zero-capacity buffer could never accept a byte.
        let capacity = capacity.max(1);
        Self {
            transport,
            response: Response::new(),
            buffer: Vec::with_capacity(capacity),
            capacity,
            body_size: 0,
            headers_sent: false,
            keep_alive,
        }
    }

    pub fn status(&self) -> u16 {
        self.response.status()
    }

    /// Sets the status code. Ignored once the head has been sent.
    pub fn set_status(&mut self, status: u16) {
        if !self.headers_sent {
            self.response.set_status(status);
        }
    }

    /// Appends a header value. Ignored once the head has been sent.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        if !self.headers_sent {
            self.response.headers_mut().add(name, value);
        }
    }

    /// Replaces a header. Ignored once the head has been sent.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        if !self.headers_sent {
            self.response.headers_mut().set(name, value);
        }
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.response.headers().contains(name)
    }

    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Total body bytes accepted so far.
    pub fn body_size(&self) -> usize {
        self.body_size
    }

    pub fn write_str(&mut self, text: &str) -> io::Result<()> {
        self.write(text.as_bytes())
    }

    /// Appends body bytes, flushing whenever the buffer would overflow.
    ///
    /// `body_size` advances with each appended chunk, so an overflow flush
    /// freezes `Content-Length` at the bytes accepted up to that point
    /// whether the body arrived as one call or many.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut rest = bytes;
        loop {
            let room = self.capacity - self.buffer.len();
            if rest.len() > room {
                self.buffer.extend_from_slice(&rest[..room]);
                self.body_size += room;
                self.write_buffer()?;
                rest = &rest[room..];
            } else {
                self.buffer.extend_from_slice(rest);
                self.body_size += rest.len();
                return Ok(());
            }
        }
    }

    /// Sends the head if still pending and drains the buffer, even when
    /// empty. This is what finalizes an empty-body response.
    pub fn flush(&mut self) -> io::Result<()> {
        self.write_buffer()
    }

    /// Hands the transport back, discarding any unsent buffered body.
    pub(crate) fn into_transport(self) -> W {
        self.transport
    }

    fn write_buffer(&mut self) -> io::Result<()> {
        self.send_headers()?;
        self.transport.write_all(&self.buffer)?;
        self.buffer.clear();
        self.transport.flush()
    }

    fn send_headers(&mut self) -> io::Result<()> {
        if self.headers_sent {
            return Ok(());
        }

        if !self.has_header("Content-Type") {
            self.response.headers_mut().add("Content-Type", TEXT_PLAIN);
        }
        if !self.has_header("Content-Length") {
            self.response
                .headers_mut()
                .add("Content-Length", self.body_size.to_string());
        }
        if !self.has_header("Date") {
            self.response.headers_mut().add("Date", http_date());
        }
        if !self.has_header("Server") {
            self.response.headers_mut().add("Server", SERVER_NAME);
        }
        if !self.has_header(CONNECTION) {
            let value = if self.keep_alive { KEEP_ALIVE } else { CLOSE };
            self.response.headers_mut().add(CONNECTION, value);
        }

        let mut head = Vec::with_capacity(256);
        let status = self.response.status();
        head.extend_from_slice(
            format!("HTTP/1.1 {} {}\r\n", status, reason_phrase(status)).as_bytes(),
        );
        for (name, value) in self.response.headers().iter() {
            head.extend_from_slice(name.as_bytes());
            head.extend_from_slice(b": ");
            head.extend_from_slice(value.as_bytes());
            head.extend_from_slice(b"\r\n");
        }
        head.extend_from_slice(b"\r\n");

        self.transport.write_all(&head)?;
        self.headers_sent = true;
        Ok(())
    }
}

/// Current time formatted for the `Date` header (RFC 7231 IMF-fixdate).
fn http_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

//! HTTP protocol engine.
//!
//! This module implements the HTTP/1.1 message layer: request parsing from a
//! fully-read byte buffer and buffered response framing with lazy header
//! emission.
//!
//! # Architecture
//!
//! - **`parser`**: turns raw bytes into a request (method, target, version,
//!   headers, body)
//! - **`headers`**: ordered multi-value header map shared by requests and
//!   responses
//! - **`request`**: parsed request representation with a lazily-computed
//!   parameter map
//! - **`response`**: response head (status code, reason phrase, headers)
//! - **`framer`**: buffers outgoing body bytes, emits the status line and
//!   headers exactly once, tracks content length
//! - **`cookie`**: minimal cookie carrier used for session transport
//!
//! Parsing is a pure transformation - all socket I/O happens before it
//! starts. The framer owns the opposite direction: handlers append body
//! bytes, and the headers go out on the first flush (explicit or triggered
//! by buffer overflow), at which point `Content-Length` is fixed.

pub mod cookie;
pub mod framer;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;

//! Hearth - HTTP/1.1 Server Engine
//!
//! Core library for the connection reactor, the HTTP protocol engine and
//! the session store.

pub mod config;
pub mod http;
pub mod server;
pub mod session;

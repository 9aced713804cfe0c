use std::io::{self, ErrorKind, Read};
use std::sync::Arc;

use bytes::BytesMut;
use mio::net::TcpStream;

use crate::http::framer::{ResponseFramer, TEXT_PLAIN};
use crate::http::parser::{ParseError, parse_request};
use crate::server::Shared;
use crate::server::connection::{Connection, Lifecycle, TransportWriter};
use crate::server::exchange::Exchange;

const READ_CHUNK_SIZE: usize = 2048;

/// Runs one exchange on the current thread, then hands the connection back
/// to the reactor (keep-alive) or closes it.
pub(crate) fn run_exchange(shared: &Arc<Shared>, connection: Arc<Connection>) {
    let reusable = process(shared, &connection);

    shared.remove_running(connection.token());

    if reusable
        && !connection.is_closed()
        && connection.try_transition(Lifecycle::Running, Lifecycle::Ready)
    {
        shared.release(connection);
    } else {
        connection.close();
        tracing::debug!("{} closed", connection);
    }
}

/// Parse, dispatch, frame, flush. Returns whether the connection may be
/// reused for another exchange. Every failure is contained here; nothing
/// escapes into the reactor or a later exchange.
fn process(shared: &Arc<Shared>, connection: &Connection) -> bool {
    let data = {
        let mut stream = connection.stream();
        match read_available(&mut stream) {
            Ok(data) => data,
            Err(err) => {
                tracing::debug!("{} read failed: {}", connection, err);
                return false;
            }
        }
    };
    connection.touch();

    let request = match parse_request(&data) {
        Ok(request) => request,
        Err(err) => {
            // Client protocol violation: answer 400 best-effort and never
            // keep the connection alive.
            tracing::debug!("{} bad request: {:?}", connection, err);
            let mut stream = connection.stream();
            let mut framer = ResponseFramer::new(TransportWriter::new(&mut stream), false);
            framer.set_status(400);
            let _ = framer.write_str(bad_request_message(err));
            let _ = framer.flush();
            return false;
        }
    };

    let keep_alive = request.keep_alive(shared.config.server.keep_alive_default);
    connection.set_keep_alive(keep_alive);
    let path = request.path().to_string();
    tracing::debug!("{} received request {} {}", connection, request.method(), path);

    let mut stream = connection.stream();
    let writer = TransportWriter::new(&mut stream);

    match shared.dispatcher.find(&path) {
        Some(handler) => {
            let framer = ResponseFramer::new(writer, keep_alive);
            let mut exchange = Exchange::new(
                request,
                framer,
                connection,
                &shared.sessions,
                &shared.config.session,
            );
            match handler.handle(&mut exchange) {
                Ok(()) => {
                    let mut framer = exchange.into_response();
                    if let Err(err) = framer.flush() {
                        tracing::debug!("{} response flush failed: {}", connection, err);
                        return false;
                    }
                    keep_alive
                }
                Err(err) => {
                    // Handler failure: report it as a 500 and close, unless
                    // the head already went out.
                    tracing::warn!("{} handler failed for {}: {}", connection, path, err);
                    let framer = exchange.into_response();
                    if framer.headers_sent() {
                        return false;
                    }
                    let mut framer = ResponseFramer::new(framer.into_transport(), false);
                    framer.set_status(500);
                    framer.add_header("Content-Type", TEXT_PLAIN);
                    let _ = framer
                        .write_str(&format!("Error processing request path \"{}\": {}", path, err));
                    let _ = framer.flush();
                    false
                }
            }
        }
        None => {
            // Not an error: a 404 response over a possibly keep-alive
            // connection.
            let mut framer = ResponseFramer::new(writer, keep_alive);
            framer.set_status(404);
            framer.add_header("Content-Type", TEXT_PLAIN);
            let write = framer
                .write_str(&format!("No handler found for request path \"{}\"", path))
                .and_then(|_| framer.flush());
            match write {
                Ok(()) => keep_alive,
                Err(err) => {
                    tracing::debug!("{} response flush failed: {}", connection, err);
                    false
                }
            }
        }
    }
}

/// Drains everything currently readable from the stream.
///
/// Readiness has already fired, so the request bytes are expected to be
/// here; a request that has not fully arrived parses as incomplete, which
/// is answered as a bad request.
fn read_available(stream: &mut TcpStream) -> io::Result<BytesMut> {
    let mut data = BytesMut::with_capacity(4096);
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        match stream.read(&mut chunk) {
            // End of stream.
            Ok(0) => break,
            Ok(n) => data.extend_from_slice(&chunk[..n]),
            Err(err) if err.kind() == ErrorKind::WouldBlock => break,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(data)
}

fn bad_request_message(err: ParseError) -> &'static str {
    match err {
        ParseError::Empty => "Empty request",
        ParseError::Incomplete => "Incomplete request",
        ParseError::Malformed => "Malformed request",
    }
}

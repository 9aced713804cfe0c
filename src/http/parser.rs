use crate::http::headers::Headers;
use crate::http::request::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Zero bytes were read before end-of-stream.
    Empty,
    /// The terminating empty line was never found.
    Incomplete,
    /// Request line or a header line is not well-formed.
    Malformed,
}

/// Parses a complete HTTP request from the bytes read off a connection.
///
/// The buffer must hold everything read so far; parsing performs no I/O and
/// is never retried mid-way. Everything after the blank line terminating the
/// headers is taken as the body verbatim - no Content-Length truncation
/// happens at this layer (enforcing Content-Length, if at all, is the
/// dispatch collaborator's concern).
pub fn parse_request(buf: &[u8]) -> Result<Request, ParseError> {
    if buf.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut request_line: Option<(String, String, String)> = None;
    let mut headers = Headers::new();

    let mut line_start = 0;
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] != b'\r' || buf[i + 1] != b'\n' {
            i += 1;
            continue;
        }

        let line = &buf[line_start..i];
        line_start = i + 2;
        i += 2;

        if line.is_empty() {
            // Blank lines ahead of the request line are tolerated; after it,
            // a blank line ends the headers and the rest of the buffer is
            // the body.
            match request_line.take() {
                Some((method, target, version)) => {
                    let body = buf[line_start..].to_vec();
                    return Request::new(method, target, version, headers, body)
                        .ok_or(ParseError::Malformed);
                }
                None => continue,
            }
        }

        let line = std::str::from_utf8(line).map_err(|_| ParseError::Malformed)?;
        if request_line.is_none() {
            request_line = Some(parse_request_line(line)?);
        } else {
            parse_header_line(line, &mut headers)?;
        }
    }

    Err(ParseError::Incomplete)
}

fn parse_request_line(line: &str) -> Result<(String, String, String), ParseError> {
    let mut fields = line.split(' ');
    let method = fields.next().ok_or(ParseError::Malformed)?;
    let target = fields.next().ok_or(ParseError::Malformed)?;
    let version = fields.next().ok_or(ParseError::Malformed)?;
    if fields.next().is_some() || method.is_empty() || target.is_empty() || version.is_empty() {
        return Err(ParseError::Malformed);
    }
    Ok((method.to_string(), target.to_string(), version.to_string()))
}

fn parse_header_line(line: &str, headers: &mut Headers) -> Result<(), ParseError> {
    let (name, value) = line.split_once(':').ok_or(ParseError::Malformed)?;
    headers.add(name, value.trim());
    Ok(())
}

use hearth::http::framer::ResponseFramer;

/// Splits framed wire bytes into (status line, header lines, body).
fn split_output(output: &[u8]) -> (String, Vec<String>, Vec<u8>) {
    let separator = output
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("no header/body separator");
    let head = std::str::from_utf8(&output[..separator]).unwrap();
    let mut lines = head.split("\r\n").map(str::to_string);
    let status_line = lines.next().unwrap();
    (status_line, lines.collect(), output[separator + 4..].to_vec())
}

fn header<'a>(headers: &'a [String], name: &str) -> Option<&'a str> {
    let prefix = format!("{}: ", name);
    headers
        .iter()
        .find(|line| line.starts_with(&prefix))
        .map(|line| &line[prefix.len()..])
}

#[test]
fn test_round_trip_framing() {
    let mut output = Vec::new();
    let mut framer = ResponseFramer::new(&mut output, true);
    framer.add_header("Content-Type", "text/html");
    framer.write(b"hello").unwrap();
    framer.flush().unwrap();
    drop(framer);

    let (status_line, headers, body) = split_output(&output);
    assert_eq!(status_line, "HTTP/1.1 200 OK");
    assert_eq!(header(&headers, "Content-Type").unwrap(), "text/html");
    assert_eq!(header(&headers, "Content-Length").unwrap(), "5");
    assert_eq!(body, b"hello");
}

#[test]
fn test_flush_finalizes_empty_body_response() {
    let mut output = Vec::new();
    let mut framer = ResponseFramer::new(&mut output, true);
    framer.flush().unwrap();
    drop(framer);

    let (status_line, headers, body) = split_output(&output);
    assert_eq!(status_line, "HTTP/1.1 200 OK");
    assert_eq!(header(&headers, "Content-Length").unwrap(), "0");
    assert!(body.is_empty());
}

#[test]
fn test_default_headers_are_injected() {
    let mut output = Vec::new();
    let mut framer = ResponseFramer::new(&mut output, true);
    framer.flush().unwrap();
    drop(framer);

    let (_, headers, _) = split_output(&output);
    assert_eq!(header(&headers, "Content-Type").unwrap(), "text/plain");
    assert_eq!(header(&headers, "Server").unwrap(), "hearth");
    assert_eq!(header(&headers, "Connection").unwrap(), "keep-alive");
    assert!(header(&headers, "Date").unwrap().ends_with("GMT"));
}

#[test]
fn test_explicit_headers_are_not_overridden() {
    let mut output = Vec::new();
    let mut framer = ResponseFramer::new(&mut output, true);
    framer.add_header("Content-Type", "application/json");
    framer.add_header("Server", "custom");
    framer.write(b"{}").unwrap();
    framer.flush().unwrap();
    drop(framer);

    let (_, headers, _) = split_output(&output);
    assert_eq!(header(&headers, "Content-Type").unwrap(), "application/json");
    assert_eq!(header(&headers, "Server").unwrap(), "custom");
}

#[test]
fn test_connection_close_header() {
    let mut output = Vec::new();
    let mut framer = ResponseFramer::new(&mut output, false);
    framer.flush().unwrap();
    drop(framer);

    let (_, headers, _) = split_output(&output);
    assert_eq!(header(&headers, "Connection").unwrap(), "close");
}

#[test]
fn test_status_line_reflects_status_code() {
    let mut output = Vec::new();
    let mut framer = ResponseFramer::new(&mut output, true);
    framer.set_status(404);
    framer.flush().unwrap();
    drop(framer);

    let (status_line, _, _) = split_output(&output);
    assert_eq!(status_line, "HTTP/1.1 404 Not Found");
}

#[test]
fn test_multi_valued_headers_emit_one_line_per_value() {
    let mut output = Vec::new();
    let mut framer = ResponseFramer::new(&mut output, true);
    framer.add_header("Set-Cookie", "a=1");
    framer.add_header("Set-Cookie", "b=2");
    framer.flush().unwrap();
    drop(framer);

    let (_, headers, _) = split_output(&output);
    let cookies: Vec<_> = headers
        .iter()
        .filter(|line| line.starts_with("Set-Cookie: "))
        .collect();
    assert_eq!(cookies, ["Set-Cookie: a=1", "Set-Cookie: b=2"]);
}

#[test]
fn test_many_small_writes_match_one_large_write() {
    // Pin the Date header so both outputs are byte-identical.
    let body: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();

    let mut chunked = Vec::new();
    let mut framer = ResponseFramer::with_capacity(&mut chunked, true, 64);
    framer.add_header("Date", "Mon, 01 Jan 2024 00:00:00 GMT");
    for chunk in body.chunks(7) {
        framer.write(chunk).unwrap();
    }
    framer.flush().unwrap();
    drop(framer);

    let mut whole = Vec::new();
    let mut framer = ResponseFramer::with_capacity(&mut whole, true, 64);
    framer.add_header("Date", "Mon, 01 Jan 2024 00:00:00 GMT");
    framer.write(&body).unwrap();
    framer.flush().unwrap();
    drop(framer);

    assert_eq!(chunked, whole);

    // Both paths freeze Content-Length at the bytes accepted when the
    // buffer first overflowed.
    let (_, headers, framed_body) = split_output(&whole);
    assert_eq!(header(&headers, "Content-Length").unwrap(), "64");
    assert_eq!(framed_body, body);
}

#[test]
fn test_overflow_freezes_content_length_at_first_flush() {
    // A single write larger than the buffer sends the head mid-call, so the
    // advertised length covers only the accepted prefix; the rest of the
    // body is still delivered.
    let body = vec![7u8; 100];
    let mut output = Vec::new();
    let mut framer = ResponseFramer::with_capacity(&mut output, true, 16);
    framer.write(&body).unwrap();
    framer.flush().unwrap();
    drop(framer);

    let (_, headers, framed_body) = split_output(&output);
    assert_eq!(header(&headers, "Content-Length").unwrap(), "16");
    assert_eq!(framed_body, body);
}

#[test]
fn test_zero_capacity_is_clamped_and_still_frames() {
    let mut output = Vec::new();
    let mut framer = ResponseFramer::with_capacity(&mut output, true, 0);
    framer.write(b"hi").unwrap();
    framer.flush().unwrap();
    drop(framer);

    let (_, headers, body) = split_output(&output);
    assert_eq!(header(&headers, "Content-Length").unwrap(), "1");
    assert_eq!(body, b"hi");
}

#[test]
fn test_mutation_after_headers_sent_is_not_observed() {
    let mut output = Vec::new();
    let mut framer = ResponseFramer::new(&mut output, true);
    framer.write(b"first").unwrap();
    framer.flush().unwrap();
    assert!(framer.headers_sent());

    framer.set_status(500);
    framer.add_header("X-Late", "nope");
    framer.write(b" second").unwrap();
    framer.flush().unwrap();
    drop(framer);

    let (status_line, headers, body) = split_output(&output);
    assert_eq!(status_line, "HTTP/1.1 200 OK");
    assert!(header(&headers, "X-Late").is_none());
    assert_eq!(body, b"first second");
}

//! Byte-level scanning for response reassembly and inspection
//!
//! Reassembly deliberately works on raw marker strings rather than a full
//! header parse: a response is recognised by the literal
//! `Transfer-Encoding: chunked` and `Content-Length: ` substrings and the
//! first `\r\n\r\n`. The status-line and header-block parsers below are only
//! used after the fact, when a caller inspects a completed response.

use super::{Error, Headers, Result, Status, Version, CONTENT_LENGTH_MARKER, HEADER_TERMINATOR};

/// Position of the first occurrence of `needle` in `haystack`
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Find the next CRLF in a buffer
pub fn find_crlf(buf: &[u8]) -> Option<usize> {
    find(buf, b"\r\n")
}

/// Position of the header/body separator, if it has arrived
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    find(buf, HEADER_TERMINATOR)
}

/// Scan for a `Content-Length: ` header and parse its value
///
/// Only the first occurrence of the marker is considered. The value must
/// have at least one digit and be terminated by CR or LF; a value still
/// being received yields `None`, as does an absent header.
pub fn scan_content_length(buf: &[u8]) -> Option<usize> {
    let start = find(buf, CONTENT_LENGTH_MARKER)? + CONTENT_LENGTH_MARKER.len();
    let rest = &buf[start..];
    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();

    if digits == 0 || !matches!(rest.get(digits), Some(b'\r') | Some(b'\n')) {
        return None;
    }

    std::str::from_utf8(&rest[..digits]).ok()?.parse().ok()
}

/// Parse HTTP response status line
///
/// Format: VERSION STATUS REASON\r\n
/// Example: HTTP/1.1 200 OK\r\n
pub fn parse_status_line(line: &str) -> Result<(Version, Status, String)> {
    let parts: Vec<&str> = line.splitn(3, ' ').collect();

    if parts.len() < 2 {
        return Err(Error::Parse(format!(
            "Invalid status line: expected at least 2 parts, got {}",
            parts.len()
        )));
    }

    let version = Version::from_str(parts[0])?;
    let status_code = parts[1]
        .parse::<u16>()
        .map_err(|_| Error::Parse(format!("Invalid status code: {}", parts[1])))?;
    let status = Status::new(status_code)?;
    let reason = match parts.get(2) {
        Some(reason) => reason.to_string(),
        None => status.reason_phrase().to_string(),
    };

    Ok((version, status, reason))
}

/// Parse the status line and header block at the start of `buf`
///
/// Works on truncated input too: only complete lines before the separator
/// (or before the end of the buffer) are parsed.
pub fn parse_head(buf: &[u8]) -> Result<(Version, Status, String, Headers)> {
    let end = find_header_end(buf).unwrap_or(buf.len());
    let head = String::from_utf8_lossy(&buf[..end]);
    let complete = find_header_end(buf).is_some();

    let mut lines = head.split(super::CRLF);
    let status_line = lines
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| Error::Parse("Missing status line".to_string()))?;
    let (version, status, reason) = parse_status_line(status_line)?;

    let mut headers = Headers::new();
    let mut lines = lines.peekable();
    while let Some(line) = lines.next() {
        // A trailing partial line is not a header yet
        if !complete && lines.peek().is_none() && !head.ends_with(super::CRLF) {
            break;
        }
        if line.is_empty() {
            continue;
        }
        let (name, value) = Headers::parse_header_line(line)?;
        headers.insert(name, value);
    }

    Ok((version, status, reason, headers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"Hello\r\nWorld"), Some(5));
        assert_eq!(find_crlf(b"NoEOL"), None);
        assert_eq!(find_crlf(b"\r\n"), Some(0));
        assert_eq!(find_crlf(b"First\r\nSecond\r\n"), Some(5));
    }

    #[test]
    fn test_find_header_end() {
        assert_eq!(find_header_end(b"HTTP/1.1 200 OK\r\n\r\n"), Some(15));
        assert_eq!(find_header_end(b"HTTP/1.1 200 OK\r\n"), None);
        assert_eq!(find_header_end(b""), None);
    }

    #[test]
    fn test_scan_content_length() {
        assert_eq!(scan_content_length(b"HTTP/1.1 200 OK\r\nContent-Length: 42\r\n"), Some(42));
        assert_eq!(scan_content_length(b"Content-Length: 0\n"), Some(0));
        // Value not terminated yet
        assert_eq!(scan_content_length(b"Content-Length: 12"), None);
        // No digits
        assert_eq!(scan_content_length(b"Content-Length: \r\n"), None);
        // Garbage after the digits
        assert_eq!(scan_content_length(b"Content-Length: 12x\r\n"), None);
        // Marker is case-sensitive
        assert_eq!(scan_content_length(b"content-length: 12\r\n"), None);
        assert_eq!(scan_content_length(b"HTTP/1.1 200 OK\r\n\r\n"), None);
    }

    #[test]
    fn test_parse_status_line() {
        let (version, status, reason) = parse_status_line("HTTP/1.1 200 OK").unwrap();
        assert_eq!(version, Version::Http11);
        assert_eq!(status.code(), 200);
        assert_eq!(reason, "OK");

        // Test without reason phrase
        let (version, status, reason) = parse_status_line("HTTP/1.0 404").unwrap();
        assert_eq!(version, Version::Http10);
        assert_eq!(status.code(), 404);
        assert_eq!(reason, "Not Found");

        assert!(parse_status_line("garbage").is_err());
    }

    #[test]
    fn test_parse_head() {
        let buf = b"HTTP/1.1 201 Created\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nok";
        let (version, status, reason, headers) = parse_head(buf).unwrap();
        assert_eq!(version, Version::Http11);
        assert_eq!(status.code(), 201);
        assert_eq!(reason, "Created");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_parse_head_truncated() {
        let buf = b"HTTP/1.1 200 OK\r\nServer: test\r\nContent-Le";
        let (_, status, _, headers) = parse_head(buf).unwrap();
        assert_eq!(status.code(), 200);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Server"), Some("test"));
    }

    #[test]
    fn test_parse_head_rejects_body_only() {
        assert!(parse_head(b"hello").is_err());
        assert!(parse_head(b"").is_err());
    }
}

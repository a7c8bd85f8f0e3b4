//! HTTP response serialization.

use super::query::ParamMap;
use super::status::HttpStatus;

/// Serialize a complete HTTP/1.1 response.
///
/// A non-2xx status with an empty body gets a minimal HTML error page and
/// `Content-Type: text/html; charset=utf-8`; otherwise `Content-Type`
/// defaults to `text/plain; charset=utf-8` unless the caller set one.
/// `Content-Length` is always emitted. Headers with empty values are skipped.
pub fn render_response(status: HttpStatus, mut headers: ParamMap, mut body: Vec<u8>) -> Vec<u8> {
    let code_status = status.to_string();

    if body.is_empty() && !status.is_success() {
        body.extend_from_slice(b"<html><head><title>");
        body.extend_from_slice(code_status.as_bytes());
        body.extend_from_slice(b"</title></head><body><h1>");
        body.extend_from_slice(code_status.as_bytes());
        body.extend_from_slice(b"</h1><hr /><p>");
        body.extend_from_slice(status.detail().as_bytes());
        body.extend_from_slice(b"</p></body></html>");
        headers.set("Content-Type", "text/html; charset=utf-8");
    } else if headers
        .get_ignore_ascii_case("Content-Type")
        .map_or(true, str::is_empty)
    {
        headers.set("Content-Type", "text/plain; charset=utf-8");
    }
    headers.set("Content-Length", body.len().to_string());

    let mut out = Vec::with_capacity(128 + body.len());
    out.extend_from_slice(b"HTTP/1.1 ");
    out.extend_from_slice(code_status.as_bytes());
    out.extend_from_slice(b"\r\n");
    for (name, value) in headers.iter() {
        if value.is_empty() {
            continue;
        }
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal response parser for asserting on serialized output.
    fn parse(raw: &[u8]) -> (String, Vec<(String, String)>, Vec<u8>) {
        let split = raw
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("header terminator");
        let head = std::str::from_utf8(&raw[..split]).expect("ascii head");
        let body = raw[split + 4..].to_vec();
        let mut lines = head.split("\r\n");
        let status_line = lines.next().expect("status line").to_string();
        let headers = lines
            .map(|line| {
                let (name, value) = line.split_once(": ").expect("header line");
                (name.to_string(), value.to_string())
            })
            .collect();
        (status_line, headers, body)
    }

    fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn plain_success_response() {
        let raw = render_response(HttpStatus::OK, ParamMap::new(), b"hello".to_vec());
        let (status_line, headers, body) = parse(&raw);
        assert_eq!(status_line, "HTTP/1.1 200 OK");
        assert_eq!(
            header(&headers, "Content-Type"),
            Some("text/plain; charset=utf-8")
        );
        assert_eq!(header(&headers, "Content-Length"), Some("5"));
        assert_eq!(body, b"hello");
    }

    #[test]
    fn error_with_empty_body_synthesizes_html() {
        let raw = render_response(HttpStatus::NOT_FOUND, ParamMap::new(), Vec::new());
        let (status_line, headers, body) = parse(&raw);
        assert_eq!(status_line, "HTTP/1.1 404 Not Found");
        assert_eq!(
            header(&headers, "Content-Type"),
            Some("text/html; charset=utf-8")
        );
        let body = String::from_utf8(body).unwrap();
        assert!(body.contains("<h1>404 Not Found</h1>"));
        assert_eq!(
            header(&headers, "Content-Length").unwrap(),
            &body.len().to_string()
        );
    }

    #[test]
    fn error_with_body_keeps_it() {
        let raw = render_response(
            HttpStatus::BAD_REQUEST,
            ParamMap::new(),
            b"nope".to_vec(),
        );
        let (_, headers, body) = parse(&raw);
        assert_eq!(body, b"nope");
        assert_eq!(
            header(&headers, "Content-Type"),
            Some("text/plain; charset=utf-8")
        );
    }

    #[test]
    fn caller_content_type_wins() {
        let mut headers = ParamMap::new();
        headers.add("Content-Type", "application/json");
        let raw = render_response(HttpStatus::OK, headers, b"{}".to_vec());
        let (_, headers, _) = parse(&raw);
        assert_eq!(header(&headers, "Content-Type"), Some("application/json"));
    }

    #[test]
    fn empty_header_values_are_skipped() {
        let mut headers = ParamMap::new();
        headers.add("X-Empty", "");
        headers.add("X-Full", "yes");
        let raw = render_response(HttpStatus::OK, headers, b"x".to_vec());
        let (_, headers, _) = parse(&raw);
        assert_eq!(header(&headers, "X-Empty"), None);
        assert_eq!(header(&headers, "X-Full"), Some("yes"));
    }

    #[test]
    fn serialization_parses_back_to_the_same_triple() {
        let mut headers = ParamMap::new();
        headers.add("X-Trace", "abc");
        let raw = render_response(HttpStatus::OK, headers, b"payload".to_vec());
        let (status_line, headers, body) = parse(&raw);
        assert_eq!(status_line, "HTTP/1.1 200 OK");
        assert_eq!(header(&headers, "X-Trace"), Some("abc"));
        assert_eq!(body, b"payload");
    }
}

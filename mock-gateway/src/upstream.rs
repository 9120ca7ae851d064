//! Canned stand-ins for the third-party origins the smoke scenarios target.
//!
//! Answers the handful of httpbin.org routes the harness relies on, plus a
//! generic HTML page for any other host's root. Everything is in-process
//! and deterministic.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use url::Url;

/// Eight-byte PNG signature followed by an IHDR chunk header.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR\x00\x00\x00\x01\x00\x00\x00\x01\x08\x06\x00\x00\x00";

pub const HTML_PAGE: &str = "<!doctype html><html><head><title>Example Domain</title></head><body><h1>Example Domain</h1></body></html>";

#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: String,
    pub target: String,
    /// Lowercased names, in order.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl UpstreamRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    fn new(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), content_type.to_string())],
            body: body.into(),
        }
    }

    fn json(value: Value) -> Self {
        Self::new(200, "application/json", value.to_string())
    }

    fn not_found() -> Self {
        Self::new(404, "text/plain", "not found")
    }

    pub fn header(&self, name: &str) -> impl Iterator<Item = &str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(&name))
            .map(|(_, v)| v.as_str())
    }
}

/// Produce what the origin behind `request.target` would answer.
pub fn respond(request: &UpstreamRequest, honor_range: bool) -> UpstreamResponse {
    let Ok(url) = Url::parse(&request.target) else {
        return UpstreamResponse::new(400, "text/plain", "bad target");
    };
    if url.host_str() != Some("httpbin.org") {
        return match url.path() {
            "/" => UpstreamResponse::new(200, "text/html; charset=UTF-8", HTML_PAGE),
            _ => UpstreamResponse::not_found(),
        };
    }

    let path = url.path();
    match path {
        "/image/png" => UpstreamResponse::new(200, "image/png", PNG_BYTES),
        "/get" => UpstreamResponse::json(json!({
            "args": query_object(&url),
            "headers": header_object(request),
            "url": request.target,
        })),
        "/headers" => UpstreamResponse::json(json!({ "headers": header_object(request) })),
        "/post" if request.method == "POST" => echo_post(request),
        "/post" => UpstreamResponse::new(405, "text/html", "method not allowed"),
        "/cookies" => UpstreamResponse::json(json!({ "cookies": cookie_object(request) })),
        "/response-headers" => response_headers(&url),
        _ => match path.strip_prefix("/range/").and_then(|n| n.parse::<usize>().ok()) {
            Some(len) => range(request, len, honor_range),
            None => UpstreamResponse::not_found(),
        },
    }
}

fn echo_post(request: &UpstreamRequest) -> UpstreamResponse {
    let data = String::from_utf8_lossy(&request.body).into_owned();
    let parsed = serde_json::from_slice::<Value>(&request.body).unwrap_or(Value::Null);
    UpstreamResponse::json(json!({
        "data": data,
        "json": parsed,
        "headers": header_object(request),
        "url": request.target,
    }))
}

fn response_headers(url: &Url) -> UpstreamResponse {
    let mut response = UpstreamResponse::json(query_object(url));
    for (name, value) in url.query_pairs() {
        response.headers.push((name.to_ascii_lowercase(), value.into_owned()));
    }
    response
}

/// `len` bytes of a repeating alphabet; honors a single `bytes=a-b` range.
fn range(request: &UpstreamRequest, len: usize, honor_range: bool) -> UpstreamResponse {
    let body: Vec<u8> = (0..len).map(|i| b'a' + (i % 26) as u8).collect();
    let requested = request
        .header("range")
        .filter(|_| honor_range)
        .and_then(|r| parse_range(r, len));
    match requested {
        Some((start, end)) => {
            let mut response =
                UpstreamResponse::new(206, "application/octet-stream", body[start..=end].to_vec());
            response
                .headers
                .push(("content-range".to_string(), format!("bytes {start}-{end}/{len}")));
            response
        }
        None => UpstreamResponse::new(200, "application/octet-stream", body),
    }
}

fn parse_range(header: &str, len: usize) -> Option<(usize, usize)> {
    let (start, end) = header.trim().strip_prefix("bytes=")?.split_once('-')?;
    let start: usize = start.trim().parse().ok()?;
    let end: usize = match end.trim() {
        "" => len.checked_sub(1)?,
        e => e.parse::<usize>().ok()?.min(len.checked_sub(1)?),
    };
    (start <= end).then_some((start, end))
}

/// Request headers the way httpbin reports them: title-cased names.
fn header_object(request: &UpstreamRequest) -> Value {
    let mut object = Map::new();
    for (name, value) in &request.headers {
        object.insert(title_case(name), Value::String(value.clone()));
    }
    Value::Object(object)
}

fn query_object(url: &Url) -> Value {
    let pairs: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
    json!(pairs)
}

fn cookie_object(request: &UpstreamRequest) -> Value {
    let mut cookies = Map::new();
    if let Some(header) = request.header("cookie") {
        for pair in header.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                cookies.insert(name.to_string(), Value::String(value.to_string()));
            }
        }
    }
    Value::Object(cookies)
}

fn title_case(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(target: &str, headers: &[(&str, &str)]) -> UpstreamRequest {
        UpstreamRequest {
            method: "GET".to_string(),
            target: target.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                .collect(),
            body: Vec::new(),
        }
    }

    #[test]
    fn range_is_honored_when_enabled() {
        let req = get("https://httpbin.org/range/2048", &[("Range", "bytes=0-99")]);
        let resp = respond(&req, true);
        assert_eq!(resp.status, 206);
        assert_eq!(resp.body.len(), 100);
        assert_eq!(resp.header("content-range").next(), Some("bytes 0-99/2048"));

        let resp = respond(&req, false);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body.len(), 2048);
    }

    #[test]
    fn parse_range_bounds() {
        assert_eq!(parse_range("bytes=0-99", 2048), Some((0, 99)));
        assert_eq!(parse_range("bytes=2000-", 2048), Some((2000, 2047)));
        assert_eq!(parse_range("bytes=0-5000", 2048), Some((0, 2047)));
        assert_eq!(parse_range("bytes=50-10", 2048), None);
        assert_eq!(parse_range("items=0-1", 2048), None);
    }

    #[test]
    fn response_headers_sets_cookie() {
        let resp = respond(&get("https://httpbin.org/response-headers?Set-Cookie=foo=bar", &[]), true);
        assert_eq!(resp.header("set-cookie").collect::<Vec<_>>(), vec!["foo=bar"]);
    }

    #[test]
    fn cookies_echo_request_cookie_header() {
        let resp = respond(&get("https://httpbin.org/cookies", &[("cookie", "foo=bar; a=1")]), true);
        let body: Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["cookies"]["foo"], "bar");
        assert_eq!(body["cookies"]["a"], "1");
    }

    #[test]
    fn headers_are_title_cased() {
        assert_eq!(title_case("x-smoke-probe"), "X-Smoke-Probe");
        assert_eq!(title_case("accept"), "Accept");
    }

    #[test]
    fn other_hosts_serve_html_root() {
        let resp = respond(&get("https://www.google.com/", &[]), true);
        assert_eq!(resp.status, 200);
        assert!(resp.header("content-type").next().unwrap().starts_with("text/html"));
        assert_eq!(respond(&get("https://example.com/missing", &[]), true).status, 404);
    }
}

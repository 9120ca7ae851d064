//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! Requests and responses are plain data. The gateway client builds
//! `HttpRequest` values and the scenarios inspect `HttpResponse` snapshots;
//! only a `Transport` touches the network. Scenarios can therefore be
//! exercised against scripted responses in unit tests.
//!
//! Response headers are kept in a `Headers` multimap: names are lowercased
//! on insert, and repeated names keep every value in arrival order, so two
//! `Set-Cookie` lines are both observable.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive, multi-valued header map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: BTreeMap<String, Vec<String>>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value under `name`, after any values already present.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.inner
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Every value for `name`, in arrival order. Empty when absent.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.inner
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    /// All values for `name` joined with `", "`, the way they would read if
    /// folded onto a single header line.
    pub fn joined(&self, name: &str) -> String {
        self.get_all(name).join(", ")
    }

    pub fn contains(&self, name: &str) -> bool {
        !self.get_all(name).is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_str())))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name.as_ref(), value);
        }
        headers
    }
}

/// An HTTP request described as plain data.
///
/// `url` is absolute. Header pairs are sent in order as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

/// Snapshot of whatever the gateway answered, whatever the status.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// `Content-Type` folded to one lowercase string; empty when absent.
    pub fn content_type(&self) -> String {
        self.headers.joined("content-type").to_ascii_lowercase()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON. `context` prefixes the parse error message.
    pub fn json<T: DeserializeOwned>(&self, context: &str) -> Result<T, HarnessError> {
        serde_json::from_slice(&self.body).map_err(|e| HarnessError::parse(context, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let headers: Headers = [("Content-Type", "image/png")].into_iter().collect();
        assert_eq!(headers.first("content-type"), Some("image/png"));
        assert_eq!(headers.first("CONTENT-TYPE"), Some("image/png"));
        assert!(headers.contains("Content-type"));
    }

    #[test]
    fn repeated_headers_keep_every_value_in_order() {
        let mut headers = Headers::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("set-cookie", "b=2");
        headers.append("SET-COOKIE", "c=3");
        assert_eq!(headers.get_all("set-cookie"), ["a=1", "b=2", "c=3"]);
        assert_eq!(headers.joined("Set-Cookie"), "a=1, b=2, c=3");
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn missing_header_is_empty_not_error() {
        let headers = Headers::new();
        assert!(headers.get_all("x-set-cookie").is_empty());
        assert_eq!(headers.joined("x-set-cookie"), "");
        assert_eq!(headers.first("x-set-cookie"), None);
    }

    #[test]
    fn iter_flattens_values() {
        let headers: Headers = [("b", "2"), ("a", "1"), ("b", "3")].into_iter().collect();
        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(pairs, vec![("a", "1"), ("b", "2"), ("b", "3")]);
    }

    #[test]
    fn content_type_is_lowercased() {
        let response = HttpResponse {
            status: 200,
            headers: [("Content-Type", "Text/HTML; charset=UTF-8")].into_iter().collect(),
            body: b"<html></html>".to_vec(),
        };
        assert_eq!(response.content_type(), "text/html; charset=utf-8");
    }

    #[test]
    fn json_failure_is_parse_error() {
        let response = HttpResponse {
            status: 200,
            headers: Headers::new(),
            body: b"not json".to_vec(),
        };
        let err = response.json::<serde_json::Value>("Expected JSON").unwrap_err();
        assert!(matches!(err, HarnessError::ResponseParse { .. }));
    }

    #[test]
    fn method_serializes_uppercase() {
        assert_eq!(serde_json::to_value(HttpMethod::Post).unwrap(), "POST");
        let m: HttpMethod = serde_json::from_str("\"OPTIONS\"").unwrap();
        assert_eq!(m, HttpMethod::Options);
        assert_eq!(HttpMethod::Head.to_string(), "HEAD");
    }
}

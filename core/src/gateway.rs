//! Stateless request builder and response parser for the gateway API.
//!
//! # Design
//! `GatewayClient` holds only the base URL and session id and carries no
//! mutable state between calls. Each endpoint has a `build_*` method that
//! produces an `HttpRequest`; `parse_dispatch` turns a batch response into
//! typed results. Executing the round-trip is the `Transport`'s job.

use url::Url;

use crate::encode::encode_target;
use crate::error::HarnessError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{DispatchRequest, DispatchResponse, FetchRequest, TargetSpec};

#[derive(Debug, Clone)]
pub struct GatewayClient {
    base_url: String,
    sid: String,
}

impl GatewayClient {
    pub fn new(base_url: &str, sid: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            sid: sid.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// `GET|HEAD /p?sid=..&u=..` for a proxied passthrough of `target`.
    pub fn build_proxy(
        &self,
        method: HttpMethod,
        target: &str,
        headers: &[(&str, &str)],
    ) -> Result<HttpRequest, HarnessError> {
        let endpoint = format!("{}/p", self.base_url);
        let url = Url::parse_with_params(
            &endpoint,
            &[("sid", self.sid.as_str()), ("u", encode_target(target).as_str())],
        )
        .map_err(|e| HarnessError::InvalidRequest(format!("base url {:?}: {e}", self.base_url)))?;
        Ok(HttpRequest {
            method,
            url: url.into(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: None,
        })
    }

    /// `POST /fetch` for a structured request.
    pub fn build_fetch(&self, spec: &TargetSpec) -> Result<HttpRequest, HarnessError> {
        self.post_json("fetch", &FetchRequest::new(&self.sid, spec))
    }

    /// `POST /dispatch` for a batch.
    pub fn build_dispatch(&self, batch: &DispatchRequest) -> Result<HttpRequest, HarnessError> {
        self.post_json("dispatch", batch)
    }

    pub fn parse_dispatch(&self, response: &HttpResponse) -> Result<DispatchResponse, HarnessError> {
        check_status(response, 200)?;
        response.json("Expected JSON batch result")
    }

    fn post_json<T: serde::Serialize>(&self, path: &str, payload: &T) -> Result<HttpRequest, HarnessError> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| HarnessError::InvalidRequest(format!("serialize /{path} body: {e}")))?;
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: format!("{}/{path}", self.base_url),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(body),
        })
    }
}

/// Contract check shared by every scenario: the gateway answered `expected`.
pub fn check_status(response: &HttpResponse, expected: u16) -> Result<(), HarnessError> {
    if response.status == expected {
        return Ok(());
    }
    Err(HarnessError::contract(format!(
        "Expected {expected}, got {}",
        response.status
    )))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::encode::b64url_decode;
    use crate::types::Pipeline;

    fn client() -> GatewayClient {
        GatewayClient::new("http://127.0.0.1:8787", "smoke sid")
    }

    fn query(url: &str) -> BTreeMap<String, String> {
        Url::parse(url).unwrap().query_pairs().into_owned().collect()
    }

    #[test]
    fn build_proxy_encodes_target_and_sid() {
        let req = client()
            .build_proxy(HttpMethod::Get, "https://httpbin.org/image/png", &[])
            .unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert!(req.url.starts_with("http://127.0.0.1:8787/p?"));
        assert!(req.body.is_none());
        let q = query(&req.url);
        assert_eq!(q["sid"], "smoke sid");
        assert_eq!(q["u"], "aHR0cHM6Ly9odHRwYmluLm9yZy9pbWFnZS9wbmc");
        assert_eq!(b64url_decode(&q["u"]).unwrap(), b"https://httpbin.org/image/png");
    }

    #[test]
    fn build_proxy_carries_extra_headers() {
        let req = client()
            .build_proxy(HttpMethod::Get, "https://httpbin.org/range/2048", &[("Range", "bytes=0-99")])
            .unwrap();
        assert_eq!(req.headers, vec![("Range".to_string(), "bytes=0-99".to_string())]);
    }

    #[test]
    fn build_fetch_produces_json_post() {
        let spec = TargetSpec::get("https://example.com/").unwrap().header("Accept", "text/html");
        let req = client().build_fetch(&spec).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "http://127.0.0.1:8787/fetch");
        assert_eq!(
            req.headers,
            vec![("content-type".to_string(), "application/json".to_string())]
        );
        let body: serde_json::Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["sid"], "smoke sid");
        assert_eq!(body["method"], "GET");
        assert_eq!(body["headers"]["Accept"], "text/html");
    }

    #[test]
    fn build_dispatch_targets_dispatch_endpoint() {
        let spec = TargetSpec::get("https://httpbin.org/get").unwrap();
        let batch = DispatchRequest::new("smoke sid", Pipeline::Parallel, vec![("one".into(), spec)]).unwrap();
        let req = client().build_dispatch(&batch).unwrap();
        assert_eq!(req.url, "http://127.0.0.1:8787/dispatch");
        let body: serde_json::Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["pipeline"], "parallel");
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let client = GatewayClient::new("http://127.0.0.1:8787/", "s");
        assert_eq!(client.base_url(), "http://127.0.0.1:8787");
    }

    #[test]
    fn parse_dispatch_rejects_wrong_status() {
        let response = HttpResponse {
            status: 502,
            body: b"bad gateway".to_vec(),
            ..Default::default()
        };
        let err = client().parse_dispatch(&response).unwrap_err();
        assert!(matches!(err, HarnessError::Contract(msg) if msg == "Expected 200, got 502"));
    }

    #[test]
    fn parse_dispatch_bad_json() {
        let response = HttpResponse {
            status: 200,
            body: b"not json".to_vec(),
            ..Default::default()
        };
        let err = client().parse_dispatch(&response).unwrap_err();
        assert!(matches!(err, HarnessError::ResponseParse { .. }));
    }
}

//! Wire payloads for the gateway's `/fetch` and `/dispatch` endpoints.
//!
//! # Design
//! These mirror what the gateway accepts but are defined independently of
//! the mock gateway crate; the integration test catches drift between the
//! two. Constructors validate the invariants the gateway relies on: targets
//! are absolute URLs and batch ids are unique.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::encode::b64url;
use crate::error::HarnessError;
use crate::http::HttpMethod;

/// How the gateway should hand back a dispatched response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Json,
    Text,
}

/// Whether the gateway runs a batch's requests concurrently or one by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pipeline {
    Parallel,
    Sequential,
}

/// One upstream request the gateway should make on the harness's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub target: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub response_type: Option<ResponseType>,
}

impl TargetSpec {
    /// A bodiless request to an absolute `target` URL.
    pub fn new(method: HttpMethod, target: &str) -> Result<Self, HarnessError> {
        let parsed = Url::parse(target)
            .map_err(|e| HarnessError::InvalidRequest(format!("target {target:?}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(HarnessError::InvalidRequest(format!(
                "target {target:?} is not an absolute URL"
            )));
        }
        Ok(Self {
            target: target.to_string(),
            method,
            headers: BTreeMap::new(),
            body: None,
            response_type: None,
        })
    }

    pub fn get(target: &str) -> Result<Self, HarnessError> {
        Self::new(HttpMethod::Get, target)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }
}

/// JSON body of `POST /fetch`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub sid: String,
    pub target: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_b64: Option<String>,
}

impl FetchRequest {
    pub fn new(sid: &str, spec: &TargetSpec) -> Self {
        Self {
            sid: sid.to_string(),
            target: spec.target.clone(),
            method: spec.method,
            headers: spec.headers.clone(),
            body_b64: spec.body.as_deref().map(b64url),
        }
    }
}

/// One entry of a `/dispatch` batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub id: String,
    pub target: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_b64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
}

/// JSON body of `POST /dispatch`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchRequest {
    pub sid: String,
    pub pipeline: Pipeline,
    pub requests: Vec<BatchEntry>,
}

impl DispatchRequest {
    /// Build a batch from `(id, spec)` pairs, rejecting repeated ids.
    pub fn new(
        sid: &str,
        pipeline: Pipeline,
        entries: Vec<(String, TargetSpec)>,
    ) -> Result<Self, HarnessError> {
        let mut seen = HashSet::new();
        let mut requests = Vec::with_capacity(entries.len());
        for (id, spec) in entries {
            if !seen.insert(id.clone()) {
                return Err(HarnessError::InvalidRequest(format!(
                    "duplicate batch id {id:?}"
                )));
            }
            requests.push(BatchEntry {
                id,
                target: spec.target,
                method: spec.method,
                headers: spec.headers,
                body_b64: spec.body.as_deref().map(b64url),
                response_type: spec.response_type,
            });
        }
        Ok(Self {
            sid: sid.to_string(),
            pipeline,
            requests,
        })
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.requests.iter().map(|r| r.id.as_str())
    }
}

/// One result of a `/dispatch` batch. Everything besides `id` is kept as
/// raw JSON; the harness only correlates by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchResult {
    pub id: String,
    #[serde(flatten)]
    pub outcome: serde_json::Map<String, serde_json::Value>,
}

impl DispatchResult {
    pub fn status(&self) -> Option<u64> {
        self.outcome.get("status").and_then(serde_json::Value::as_u64)
    }
}

/// Response body of `POST /dispatch`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchResponse {
    pub results: Vec<DispatchResult>,
}

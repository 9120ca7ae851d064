//! In-process stand-in for the proxying gateway.
//!
//! Serves `/p`, `/fetch` and `/dispatch` with the same wire contract as the
//! real gateway, but answers every upstream target from the canned origins
//! in `upstream` instead of the network. Cookie jars are kept per session id
//! when persistence is enabled.

pub mod upstream;

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock, task::JoinSet};
use tracing::debug;

use upstream::{UpstreamRequest, UpstreamResponse};

/// Header carrying each captured upstream `Set-Cookie` back to the caller.
pub const COOKIE_CAPTURE_HEADER: &str = "x-set-cookie";

/// Request headers the gateway never forwards upstream.
const FILTERED_HEADERS: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
    "proxy-authorization",
    "proxy-connection",
    "forwarded",
    "x-real-ip",
    "cookie",
    "content-length",
];

/// Deployment switches the real gateway varies on.
#[derive(Debug, Clone, Copy)]
pub struct GatewayOptions {
    /// Keep cookies per `sid` and replay them on later calls.
    pub persist_cookies: bool,
    /// Whether the canned origins answer `Range` with 206.
    pub honor_range: bool,
    /// Strip `x-forwarded-*` and `cf-*` before forwarding.
    pub filter_forwarding: bool,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            persist_cookies: true,
            honor_range: true,
            filter_forwarding: true,
        }
    }
}

pub type Jars = Arc<RwLock<HashMap<String, BTreeMap<String, String>>>>;

#[derive(Clone)]
struct AppState {
    options: GatewayOptions,
    jars: Jars,
}

#[derive(Deserialize)]
pub struct ProxyQuery {
    #[serde(default)]
    pub sid: Option<String>,
    pub u: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchBody {
    #[serde(default)]
    pub sid: String,
    pub target: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body_b64: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchEntry {
    pub id: String,
    #[serde(flatten)]
    pub request: FetchBody,
    #[serde(default)]
    pub response_type: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispatchBody {
    #[serde(default)]
    pub sid: String,
    #[serde(default = "default_pipeline")]
    pub pipeline: String,
    pub requests: Vec<DispatchEntry>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_pipeline() -> String {
    "sequential".to_string()
}

pub fn app() -> Router {
    app_with(GatewayOptions::default())
}

pub fn app_with(options: GatewayOptions) -> Router {
    let state = AppState {
        options,
        jars: Arc::new(RwLock::new(HashMap::new())),
    };
    Router::new()
        .route("/p", get(proxy))
        .route("/fetch", post(fetch))
        .route("/dispatch", post(dispatch))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with(listener: TcpListener, options: GatewayOptions) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(options)).await
}

/// `GET|HEAD /p`: passthrough of the decoded target, status and headers verbatim.
async fn proxy(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(target) = decode_target(&query.u) else {
        return (StatusCode::BAD_REQUEST, "invalid u parameter").into_response();
    };
    debug!(sid = query.sid.as_deref().unwrap_or(""), %target, "proxy");

    let request = UpstreamRequest {
        method: "GET".to_string(),
        target,
        headers: filter_headers(
            headers
                .iter()
                .map(|(k, v)| (k.as_str(), String::from_utf8_lossy(v.as_bytes()).into_owned())),
            &state.options,
        ),
        body: Vec::new(),
    };
    let upstream = upstream::respond(&request, state.options.honor_range);
    into_response(upstream.status, upstream.headers, upstream.body)
}

/// `POST /fetch`: structured request, cookie capture surfaced as `x-set-cookie`.
async fn fetch(State(state): State<AppState>, Json(body): Json<FetchBody>) -> Response {
    debug!(sid = %body.sid, target = %body.target, method = %body.method, "fetch");
    match forward(&state, &body).await {
        Ok(upstream) => {
            let mut headers: Vec<(String, String)> = upstream
                .headers
                .iter()
                .filter(|(k, _)| k != "set-cookie")
                .cloned()
                .collect();
            for cookie in upstream.header("set-cookie") {
                headers.push((COOKIE_CAPTURE_HEADER.to_string(), cookie.to_string()));
            }
            into_response(upstream.status, headers, upstream.body)
        }
        Err(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
    }
}

/// `POST /dispatch`: run every entry, one result per id.
async fn dispatch(State(state): State<AppState>, Json(batch): Json<DispatchBody>) -> Response {
    let mut seen = HashSet::new();
    if let Some(dup) = batch.requests.iter().find(|r| !seen.insert(r.id.as_str())) {
        return (StatusCode::BAD_REQUEST, format!("duplicate id {}", dup.id)).into_response();
    }
    debug!(sid = %batch.sid, pipeline = %batch.pipeline, count = batch.requests.len(), "dispatch");

    let mut results = Vec::with_capacity(batch.requests.len());
    match batch.pipeline.as_str() {
        "parallel" => {
            let mut tasks = JoinSet::new();
            for entry in batch.requests {
                let state = state.clone();
                let sid = batch.sid.clone();
                tasks.spawn(async move { dispatch_one(&state, &sid, entry).await });
            }
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(result) => results.push(result),
                    Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
                }
            }
        }
        "sequential" => {
            for entry in batch.requests {
                results.push(dispatch_one(&state, &batch.sid, entry).await);
            }
        }
        other => {
            return (StatusCode::BAD_REQUEST, format!("unknown pipeline {other}")).into_response();
        }
    }
    Json(json!({ "results": results })).into_response()
}

async fn dispatch_one(state: &AppState, sid: &str, entry: DispatchEntry) -> Value {
    let mut request = entry.request;
    if request.sid.is_empty() {
        request.sid = sid.to_string();
    }
    match forward(state, &request).await {
        Ok(upstream) => {
            let text = String::from_utf8_lossy(&upstream.body).into_owned();
            let body = match entry.response_type.as_deref() {
                Some("json") => serde_json::from_str(&text).unwrap_or(Value::String(text)),
                _ => Value::String(text),
            };
            let content_type = upstream.header("content-type").next().unwrap_or("").to_string();
            json!({
                "id": entry.id,
                "ok": (200..300).contains(&upstream.status),
                "status": upstream.status,
                "headers": { "content-type": content_type },
                "body": body,
            })
        }
        Err(msg) => json!({ "id": entry.id, "ok": false, "error": msg }),
    }
}

/// Filter headers, attach the session's cookies, call the origin, and
/// capture any cookies it sets.
async fn forward(state: &AppState, body: &FetchBody) -> Result<UpstreamResponse, String> {
    let payload = match &body.body_b64 {
        Some(encoded) => URL_SAFE_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .map_err(|e| format!("invalid bodyB64: {e}"))?,
        None => Vec::new(),
    };

    let mut headers = filter_headers(
        body.headers.iter().map(|(k, v)| (k.as_str(), v.clone())),
        &state.options,
    );
    if state.options.persist_cookies {
        if let Some(jar) = state.jars.read().await.get(&body.sid) {
            if !jar.is_empty() {
                let cookie = jar
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                headers.push(("cookie".to_string(), cookie));
            }
        }
    }

    let request = UpstreamRequest {
        method: body.method.to_ascii_uppercase(),
        target: body.target.clone(),
        headers,
        body: payload,
    };
    let response = upstream::respond(&request, state.options.honor_range);

    if state.options.persist_cookies {
        let captured: Vec<(String, String)> = response.header("set-cookie").filter_map(parse_set_cookie).collect();
        if !captured.is_empty() {
            let mut jars = state.jars.write().await;
            jars.entry(body.sid.clone()).or_default().extend(captured);
        }
    }
    Ok(response)
}

fn filter_headers<'a>(
    headers: impl Iterator<Item = (&'a str, String)>,
    options: &GatewayOptions,
) -> Vec<(String, String)> {
    headers
        .map(|(k, v)| (k.to_ascii_lowercase(), v))
        .filter(|(k, _)| !FILTERED_HEADERS.contains(&k.as_str()))
        .filter(|(k, _)| {
            !options.filter_forwarding || !(k.starts_with("x-forwarded-") || k.starts_with("cf-"))
        })
        .collect()
}

/// `name=value; Path=/; ...` to `(name, value)`.
fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.trim().split_once('=')?;
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.to_string()))
}

fn decode_target(encoded: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('=')).ok()?;
    String::from_utf8(bytes).ok()
}

fn into_response(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
            map.append(name, value);
        }
    }
    (status, map, body).into_response()
}

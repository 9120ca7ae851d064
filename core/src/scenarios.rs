//! The fixed list of black-box checks against the gateway's public surface.
//!
//! # Design
//! Each scenario is a plain function from a `ScenarioContext` to
//! `Result<(), HarnessError>`. `Ok` is a pass. A scenario that runs into
//! upstream- or deployment-dependent behavior (an origin ignoring `Range`,
//! cookie persistence switched off) returns `HarnessError::Environmental`,
//! which the runner records as a warning. Everything else it returns fails
//! the run.
//!
//! Scenarios share nothing but the read-only config and the transport, so
//! they can run in any order; the runner keeps them in list order.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::gateway::{check_status, GatewayClient};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::Transport;
use crate::types::{DispatchRequest, DispatchResponse, Pipeline, ResponseType, TargetSpec};

const PNG_TARGET: &str = "https://httpbin.org/image/png";
const RANGE_TARGET: &str = "https://httpbin.org/range/2048";
const RANGE_HEADER: &str = "bytes=0-99";
const RANGE_LEN: usize = 100;
const HTML_TARGET: &str = "https://example.com/";
const ECHO_POST_TARGET: &str = "https://httpbin.org/post";
const ECHO_HEADERS_TARGET: &str = "https://httpbin.org/headers";
const SET_COOKIE_TARGET: &str = "https://httpbin.org/response-headers?Set-Cookie=foo=bar";
const COOKIES_TARGET: &str = "https://httpbin.org/cookies";
const JSON_GET_TARGET: &str = "https://httpbin.org/get";
const ECHO_HELLO: &str = "world";

/// Header the gateway adds to `/fetch` responses when upstream set a cookie.
pub const COOKIE_CAPTURE_HEADER: &str = "x-set-cookie";
const PROBE_HEADER: &str = "X-Smoke-Probe";
const FORWARDED_HEADER: &str = "X-Forwarded-For";
const FORWARDED_PROBE_VALUE: &str = "203.0.113.7";

pub type ScenarioFn = fn(&ScenarioContext<'_>) -> Result<(), HarnessError>;

#[derive(Clone, Copy)]
pub struct Scenario {
    pub name: &'static str,
    pub run: ScenarioFn,
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario").field("name", &self.name).finish()
    }
}

/// Everything a scenario may touch.
pub struct ScenarioContext<'a> {
    pub config: &'a HarnessConfig,
    pub gateway: GatewayClient,
    transport: &'a dyn Transport,
}

impl<'a> ScenarioContext<'a> {
    pub fn new(config: &'a HarnessConfig, transport: &'a dyn Transport) -> Self {
        Self {
            config,
            gateway: GatewayClient::new(&config.base_url, &config.sid),
            transport,
        }
    }

    pub fn send(&self, request: &HttpRequest) -> Result<HttpResponse, HarnessError> {
        self.transport.execute(request)
    }

    pub fn fetch(&self, spec: &TargetSpec) -> Result<HttpResponse, HarnessError> {
        self.send(&self.gateway.build_fetch(spec)?)
    }

    pub fn proxy(
        &self,
        method: HttpMethod,
        target: &str,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, HarnessError> {
        self.send(&self.gateway.build_proxy(method, target, headers)?)
    }
}

/// The full list, in run order.
pub fn all() -> Vec<Scenario> {
    vec![
        Scenario { name: "GET /p basic", run: proxy_basic },
        Scenario { name: "HEAD /p", run: proxy_head },
        Scenario { name: "GET /p with Range", run: proxy_range },
        Scenario { name: "POST /fetch GET HTML", run: fetch_get_html },
        Scenario { name: "POST /fetch POST JSON", run: fetch_post_json },
        Scenario { name: "POST /fetch header filtering", run: fetch_header_filtering },
        Scenario { name: "/fetch cookies set -> X-Set-Cookie + optional persistence", run: fetch_cookies },
        Scenario { name: "POST /dispatch batch", run: dispatch_parallel },
        Scenario { name: "POST /dispatch sequential batch", run: dispatch_sequential },
        Scenario { name: "Common sites 200 via /fetch", run: common_sites },
    ]
}

// ---------------------------------------------------------------------------
// Shared assertions
// ---------------------------------------------------------------------------

fn expect_content_type(response: &HttpResponse, expected: &str) -> Result<(), HarnessError> {
    let ctype = response.content_type();
    if ctype.contains(expected) {
        return Ok(());
    }
    Err(HarnessError::contract(format!(
        "Expected Content-Type {expected}, got {}",
        response.headers.joined("content-type")
    )))
}

fn expect_body(response: &HttpResponse) -> Result<(), HarnessError> {
    if response.body.is_empty() {
        return Err(HarnessError::contract("Empty body"));
    }
    Ok(())
}

/// Status 200, matching content type, something in the body.
fn expect_page(response: &HttpResponse, content_type: &str) -> Result<(), HarnessError> {
    check_status(response, 200)?;
    expect_content_type(response, content_type)?;
    expect_body(response)
}

/// Look up a key in a JSON object without regard to case.
fn get_ignore_case<'v>(object: &'v Value, key: &str) -> Option<&'v Value> {
    object
        .as_object()?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

// ---------------------------------------------------------------------------
// /p
// ---------------------------------------------------------------------------

fn proxy_basic(ctx: &ScenarioContext<'_>) -> Result<(), HarnessError> {
    let response = ctx.proxy(HttpMethod::Get, PNG_TARGET, &[])?;
    expect_page(&response, "image/png")
}

fn proxy_head(ctx: &ScenarioContext<'_>) -> Result<(), HarnessError> {
    let response = ctx.proxy(HttpMethod::Head, PNG_TARGET, &[])?;
    check_status(&response, 200)?;
    expect_content_type(&response, "image/png")?;
    if !response.body.is_empty() {
        return Err(HarnessError::contract(format!(
            "Expected empty body for HEAD, got {} bytes",
            response.body.len()
        )));
    }
    Ok(())
}

fn proxy_range(ctx: &ScenarioContext<'_>) -> Result<(), HarnessError> {
    let response = ctx.proxy(HttpMethod::Get, RANGE_TARGET, &[("Range", RANGE_HEADER)])?;
    if response.status != 206 {
        return Err(HarnessError::environmental(format!(
            "Upstream did not return 206 (got {}).",
            response.status
        )));
    }

    let content_range = response.headers.joined("content-range");
    if !content_range.contains("bytes") {
        return Err(HarnessError::contract(format!(
            "Expected Content-Range bytes, got {content_range:?}"
        )));
    }
    let len = response.body.len();
    if len < RANGE_LEN {
        return Err(HarnessError::contract(format!(
            "Expected {RANGE_LEN} bytes, got {len}"
        )));
    }
    if len > RANGE_LEN {
        warn!(len, "range body longer than requested, upstream behavior");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// /fetch
// ---------------------------------------------------------------------------

fn fetch_get_html(ctx: &ScenarioContext<'_>) -> Result<(), HarnessError> {
    let spec = TargetSpec::get(HTML_TARGET)?.header("Accept", "text/html");
    let response = ctx.fetch(&spec)?;
    expect_page(&response, "text/html")
}

/// The part of httpbin's `/post` echo this scenario reads.
#[derive(Deserialize)]
struct JsonEcho {
    json: HelloPayload,
}

#[derive(Deserialize)]
struct HelloPayload {
    hello: String,
}

fn fetch_post_json(ctx: &ScenarioContext<'_>) -> Result<(), HarnessError> {
    let payload = serde_json::json!({ "hello": ECHO_HELLO });
    let spec = TargetSpec::new(HttpMethod::Post, ECHO_POST_TARGET)?
        .header("Content-Type", "application/json")
        .header("Accept", "application/json")
        .body(payload.to_string());
    let response = ctx.fetch(&spec)?;
    check_status(&response, 200)?;

    let echo: JsonEcho = response.json("Expected JSON echo")?;
    if echo.json.hello != ECHO_HELLO {
        return Err(HarnessError::contract(format!(
            "JSON echo mismatch: expected {ECHO_HELLO:?}, got {:?}",
            echo.json.hello
        )));
    }
    Ok(())
}

fn fetch_header_filtering(ctx: &ScenarioContext<'_>) -> Result<(), HarnessError> {
    let spec = TargetSpec::get(ECHO_HEADERS_TARGET)?
        .header("Accept", "application/json")
        .header(PROBE_HEADER, "1")
        .header(FORWARDED_HEADER, FORWARDED_PROBE_VALUE);
    let response = ctx.fetch(&spec)?;
    check_status(&response, 200)?;

    let echo: Value = response.json("Expected JSON header echo")?;
    let seen = &echo["headers"];
    if get_ignore_case(seen, PROBE_HEADER).is_none() {
        return Err(HarnessError::contract(format!(
            "{PROBE_HEADER} did not reach upstream"
        )));
    }
    let forwarded = get_ignore_case(seen, FORWARDED_HEADER)
        .and_then(Value::as_str)
        .unwrap_or_default();
    if forwarded.contains(FORWARDED_PROBE_VALUE) {
        return Err(HarnessError::environmental(format!(
            "{FORWARDED_HEADER} reached upstream unfiltered"
        )));
    }
    Ok(())
}

fn fetch_cookies(ctx: &ScenarioContext<'_>) -> Result<(), HarnessError> {
    let set = TargetSpec::get(SET_COOKIE_TARGET)?.header("Accept", "*/*");
    let response = ctx.fetch(&set)?;
    if response.status != 200 {
        return Err(HarnessError::contract(format!(
            "Expected 200 on cookie set, got {}",
            response.status
        )));
    }
    let captured = response.headers.get_all(COOKIE_CAPTURE_HEADER);
    if !captured.iter().any(|v| !v.trim().is_empty()) {
        return Err(HarnessError::contract("Expected X-Set-Cookie header from worker"));
    }

    // Persistence is keyed by sid and only exists when the deployment enables it.
    let read = TargetSpec::get(COOKIES_TARGET)?.header("Accept", "application/json");
    let response = ctx.fetch(&read)?;
    if response.status != 200 {
        return Err(HarnessError::environmental(format!(
            "Cookie check fetch returned {}; skipping parse.",
            response.status
        )));
    }
    let echo: Value = response.json("Cookie check").map_err(|_| {
        HarnessError::environmental("Failed to parse cookie JSON; skipping persistence check.")
    })?;
    if echo["cookies"]["foo"] != "bar" {
        return Err(HarnessError::environmental(
            "Cookie not persisted (session persistence likely disabled).",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// /dispatch
// ---------------------------------------------------------------------------

fn dispatch_parallel(ctx: &ScenarioContext<'_>) -> Result<(), HarnessError> {
    dispatch_batch(ctx, Pipeline::Parallel)
}

fn dispatch_sequential(ctx: &ScenarioContext<'_>) -> Result<(), HarnessError> {
    dispatch_batch(ctx, Pipeline::Sequential)
}

fn dispatch_batch(ctx: &ScenarioContext<'_>, pipeline: Pipeline) -> Result<(), HarnessError> {
    let entries = vec![
        (
            "one".to_string(),
            TargetSpec::get(JSON_GET_TARGET)?
                .header("Accept", "application/json")
                .response_type(ResponseType::Json),
        ),
        (
            "two".to_string(),
            TargetSpec::get(HTML_TARGET)?
                .header("Accept", "text/html")
                .response_type(ResponseType::Text),
        ),
    ];
    let batch = DispatchRequest::new(ctx.gateway.sid(), pipeline, entries)?;
    let response = ctx.send(&ctx.gateway.build_dispatch(&batch)?)?;
    let results = ctx.gateway.parse_dispatch(&response)?;
    verify_batch(&batch, &results)
}

/// Every input id comes back exactly once; nothing else comes back.
pub fn verify_batch(batch: &DispatchRequest, response: &DispatchResponse) -> Result<(), HarnessError> {
    let expected = batch.requests.len();
    let got = response.results.len();
    if got != expected {
        return Err(HarnessError::contract(format!(
            "Batch results length mismatch (expected {expected}, got {got})"
        )));
    }

    let mut seen: HashMap<&str, usize> = batch.ids().map(|id| (id, 0)).collect();
    for result in &response.results {
        match seen.get_mut(result.id.as_str()) {
            Some(count) => *count += 1,
            None => {
                return Err(HarnessError::contract(format!(
                    "Unexpected result id {:?}",
                    result.id
                )))
            }
        }
    }

    // Lengths match and every id is known, so a duplicate always displaces one.
    let mut missing: Vec<&str> = batch.ids().filter(|id| seen[id] == 0).collect();
    if missing.is_empty() {
        return Ok(());
    }
    missing.sort_unstable();
    let mut message = format!("Missing result ids: {}", missing.join(", "));
    let duplicated: Vec<&str> = batch.ids().filter(|id| seen[id] > 1).collect();
    if !duplicated.is_empty() {
        message.push_str(&format!(" (duplicated: {})", duplicated.join(", ")));
    }
    Err(HarnessError::contract(message))
}

// ---------------------------------------------------------------------------
// Aggregate reachability
// ---------------------------------------------------------------------------

fn common_sites(ctx: &ScenarioContext<'_>) -> Result<(), HarnessError> {
    let mut failures = Vec::new();
    for site in &ctx.config.reachability_targets {
        let spec = match TargetSpec::get(&site.url) {
            Ok(spec) => spec.header("Accept", "text/html"),
            Err(e) => {
                failures.push(format!("{}: {e}", site.label));
                continue;
            }
        };
        // The gateway itself being unreachable ends the scenario.
        let response = ctx.fetch(&spec)?;
        if let Err(e) = expect_page(&response, "text/html") {
            failures.push(format!("{}: {e}", site.label));
        }
    }
    if !failures.is_empty() {
        return Err(HarnessError::contract(failures.join("; ")));
    }
    Ok(())
}

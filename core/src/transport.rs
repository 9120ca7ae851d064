//! Executes `HttpRequest`s against the network.
//!
//! # Design
//! `Transport` is the only seam that performs I/O. `UreqTransport` is the
//! production implementation; unit tests substitute scripted transports.
//!
//! ureq is configured with `http_status_as_error(false)` so 4xx/5xx answers
//! come back as data for the scenario to judge. Anything that prevents an
//! answer from arriving (resolution, connect, reset, timeout, a body cut
//! short) is a `HarnessError::Network`. No retries.

use std::time::{Duration, Instant};

use tracing::debug;
use ureq::Agent;

use crate::error::HarnessError;
use crate::http::{Headers, HttpMethod, HttpRequest, HttpResponse};

pub trait Transport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, HarnessError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, HarnessError> {
        (**self).execute(request)
    }
}

/// Largest response body read before the exchange is treated as failed.
/// Raised from ureq's 10 MB default so large proxied pages still count.
pub const MAX_RESPONSE_BYTES: u64 = 64 * 1024 * 1024;

/// Blocking transport backed by a ureq `Agent`.
#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    /// `timeout` bounds each request end to end, body included.
    pub fn new(timeout: Duration) -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, HarnessError> {
        let started = Instant::now();
        let url = request.url.as_str();
        let headers = request.headers.as_slice();
        let agent = &self.agent;

        let result = match (request.method, request.body.as_deref()) {
            (HttpMethod::Get, _) => with_headers(agent.get(url), headers).call(),
            (HttpMethod::Head, _) => with_headers(agent.head(url), headers).call(),
            (HttpMethod::Delete, _) => with_headers(agent.delete(url), headers).call(),
            (HttpMethod::Options, _) => with_headers(agent.options(url), headers).call(),
            (HttpMethod::Post, Some(body)) => with_headers(agent.post(url), headers).send(body),
            (HttpMethod::Post, None) => with_headers(agent.post(url), headers).send_empty(),
            (HttpMethod::Put, Some(body)) => with_headers(agent.put(url), headers).send(body),
            (HttpMethod::Put, None) => with_headers(agent.put(url), headers).send_empty(),
            (HttpMethod::Patch, Some(body)) => with_headers(agent.patch(url), headers).send(body),
            (HttpMethod::Patch, None) => with_headers(agent.patch(url), headers).send_empty(),
        };
        let mut response = result.map_err(|e| HarnessError::network(url, e))?;

        let status = response.status().as_u16();
        let mut snapshot_headers = Headers::new();
        for (name, value) in response.headers() {
            snapshot_headers.append(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }
        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_RESPONSE_BYTES)
            .read_to_vec()
            .map_err(|e| HarnessError::network(url, e))?;

        debug!(
            method = %request.method,
            url,
            status,
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "gateway exchange"
        );

        Ok(HttpResponse {
            status,
            headers: snapshot_headers,
            body,
        })
    }
}

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &[(String, String)]) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    fn get(url: String) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Answer a single connection with `reply` verbatim, after reading the request head.
    fn serve_once(reply: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
                line.clear();
            }
            reader.get_mut().write_all(&reply).unwrap();
        });
        format!("http://{addr}/")
    }

    #[test]
    fn silent_server_times_out_as_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            // Hold the connection open without answering.
            let (_stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_secs(5));
        });

        let transport = UreqTransport::new(Duration::from_millis(300));
        let started = Instant::now();
        let err = transport.execute(&get(format!("http://{addr}/"))).unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, HarnessError::Network { .. }), "got {err:?}");
        assert!(err.is_hard_failure());
        assert!(elapsed >= Duration::from_millis(250), "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
    }

    #[test]
    fn error_status_is_data_and_repeated_headers_survive() {
        let url = serve_once(
            b"HTTP/1.1 500 Internal Server Error\r\n\
              Set-Cookie: a=1\r\n\
              set-cookie: b=2\r\n\
              Content-Length: 2\r\n\
              Connection: close\r\n\
              \r\n\
              hi"
                .to_vec(),
        );
        let response = UreqTransport::new(Duration::from_secs(5)).execute(&get(url)).unwrap();

        assert_eq!(response.status, 500);
        assert_eq!(response.headers.get_all("SET-COOKIE"), ["a=1", "b=2"]);
        assert_eq!(response.body, b"hi");
    }

    #[test]
    fn bodies_past_ureq_default_limit_are_read() {
        let len = 12 * 1024 * 1024;
        let mut reply = format!("HTTP/1.1 200 OK\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n").into_bytes();
        reply.resize(reply.len() + len, b'x');
        let url = serve_once(reply);

        let response = UreqTransport::new(Duration::from_secs(10)).execute(&get(url)).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body.len(), len);
    }

    #[test]
    fn refused_connection_is_network_error() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let transport = UreqTransport::new(Duration::from_secs(2));
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: format!("http://127.0.0.1:{port}/p"),
            headers: Vec::new(),
            body: None,
        };
        let err = transport.execute(&request).unwrap_err();
        assert!(matches!(err, HarnessError::Network { .. }), "got {err:?}");
        assert!(err.is_hard_failure());
    }
}

//! Full scenario runs against the live mock gateway.
//!
//! # Design
//! Starts the mock gateway on a random port in a background tokio runtime,
//! then drives the whole scenario list over real HTTP with `UreqTransport`.
//! Gateway switches emulate deployments where range support, cookie
//! persistence or forwarding-header filtering are missing.

use std::sync::Once;
use std::time::Duration;

use mock_gateway::GatewayOptions;
use smoke_core::runner::Outcome;
use smoke_core::{scenarios, HarnessConfig, Runner, UreqTransport};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
            .with_test_writer()
            .try_init();
    });
}

/// Start the mock gateway on a random port and return its base URL.
fn start_gateway(options: GatewayOptions) -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_gateway::run_with(listener, options).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

fn config(base_url: &str) -> HarnessConfig {
    HarnessConfig::new(base_url, "integration-sid")
        .with_timeout(Duration::from_secs(5))
        .with_pause(Duration::ZERO)
}

fn run(config: &HarnessConfig) -> (Vec<(&'static str, Outcome)>, String, u8) {
    let transport = UreqTransport::new(config.timeout);
    let runner = Runner::new(config, &transport);
    let list = scenarios::all();
    let outcomes = list
        .iter()
        .map(|s| (s.name, runner.run_one(s).outcome))
        .collect();
    let mut out = Vec::new();
    let summary = runner.run(&list, &mut out).unwrap();
    (outcomes, String::from_utf8(out).unwrap(), summary.exit_code())
}

#[test]
fn compliant_gateway_passes_everything() {
    init_tracing();
    let base = start_gateway(GatewayOptions::default());
    let (outcomes, report, code) = run(&config(&base));

    for (name, outcome) in &outcomes {
        assert_eq!(outcome, &Outcome::Pass, "{name}");
    }
    assert_eq!(code, 0);
    assert!(report.contains("[PASS] GET /p basic"));
    assert!(report.contains("All smoke tests passed."));
    assert!(report.contains(&format!("{0} run, {0} passed, 0 warned, 0 failed", outcomes.len())));
}

#[test]
fn deployment_variance_only_warns() {
    init_tracing();
    let base = start_gateway(GatewayOptions {
        persist_cookies: false,
        honor_range: false,
        filter_forwarding: false,
    });
    let (outcomes, report, code) = run(&config(&base));

    let warned: Vec<&str> = outcomes
        .iter()
        .filter(|(_, o)| matches!(o, Outcome::Warn(_)))
        .map(|(name, _)| *name)
        .collect();
    assert_eq!(
        warned,
        vec![
            "GET /p with Range",
            "POST /fetch header filtering",
            "/fetch cookies set -> X-Set-Cookie + optional persistence",
        ]
    );
    assert!(outcomes.iter().all(|(_, o)| !o.is_failure()));
    assert_eq!(code, 0);
    assert!(report.contains("[WARN] GET /p with Range: Upstream did not return 206 (got 200)."));
}

#[test]
fn unreachable_gateway_fails_every_scenario() {
    init_tracing();
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let (outcomes, report, code) = run(&config(&format!("http://127.0.0.1:{port}")));

    for (name, outcome) in &outcomes {
        match outcome {
            Outcome::Fail(reason) => assert!(reason.starts_with("network error"), "{name}: {reason}"),
            other => panic!("{name}: expected failure, got {other:?}"),
        }
    }
    assert_eq!(code, 1);
    assert!(report.contains(&format!("{} test(s) failed.", outcomes.len())));
}

#[test]
fn repeated_runs_classify_the_same() {
    init_tracing();
    let base = start_gateway(GatewayOptions::default());
    let config = config(&base);
    let (first, _, _) = run(&config);
    let (second, _, _) = run(&config);
    assert_eq!(first, second);
}

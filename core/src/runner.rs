//! Sequential scenario execution and the human-readable report.
//!
//! # Design
//! Scenarios run one after another on the calling thread, with a short
//! pause in between. Each result is classified the moment it arrives and
//! written as one report line; nothing is retried and nothing is stored
//! beyond the running `RunSummary`.
//!
//! A scenario cannot take the run down with it: errors become outcomes,
//! and a panic is caught with `catch_unwind` and reported as a failure.

use std::any::Any;
use std::fmt;
use std::io::{self, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::scenarios::{Scenario, ScenarioContext};
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Warn(String),
    Fail(String),
}

impl Outcome {
    /// Map what a scenario returned onto the report's three states.
    pub fn classify(result: Result<(), HarnessError>) -> Self {
        match result {
            Ok(()) => Outcome::Pass,
            Err(HarnessError::Environmental(reason)) => Outcome::Warn(reason),
            Err(e) => Outcome::Fail(e.to_string()),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Fail(_))
    }
}

/// One line of the report.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub name: &'static str,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Pass => write!(f, "[PASS] {} ({}ms)", self.name, self.elapsed.as_millis()),
            Outcome::Warn(reason) => write!(f, "[WARN] {}: {reason}", self.name),
            Outcome::Fail(reason) => write!(f, "[FAIL] {}: {reason}", self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub warnings: usize,
    pub failures: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Pass => self.passed += 1,
            Outcome::Warn(_) => self.warnings += 1,
            Outcome::Fail(_) => self.failures += 1,
        }
    }

    pub fn success(&self) -> bool {
        self.failures == 0
    }

    /// Process exit status: warnings never count against the run.
    pub fn exit_code(&self) -> u8 {
        if self.success() {
            0
        } else {
            1
        }
    }
}

pub struct Runner<'a> {
    config: &'a HarnessConfig,
    transport: &'a dyn Transport,
}

impl<'a> Runner<'a> {
    pub fn new(config: &'a HarnessConfig, transport: &'a dyn Transport) -> Self {
        Self { config, transport }
    }

    /// Run one scenario and classify it. Never panics on the scenario's behalf.
    pub fn run_one(&self, scenario: &Scenario) -> ScenarioReport {
        info!(scenario = scenario.name, "running");
        let ctx = ScenarioContext::new(self.config, self.transport);
        let started = Instant::now();
        let outcome = match catch_unwind(AssertUnwindSafe(|| (scenario.run)(&ctx))) {
            Ok(result) => Outcome::classify(result),
            Err(panic) => Outcome::Fail(format!("panicked: {}", panic_message(panic.as_ref()))),
        };
        let elapsed = started.elapsed();

        match &outcome {
            Outcome::Pass => info!(scenario = scenario.name, elapsed_ms = elapsed.as_millis() as u64, "passed"),
            Outcome::Warn(reason) => warn!(scenario = scenario.name, %reason, "warning"),
            Outcome::Fail(reason) => warn!(scenario = scenario.name, %reason, "failed"),
        }
        ScenarioReport {
            name: scenario.name,
            outcome,
            elapsed,
        }
    }

    /// Run `scenarios` in order, writing one line per scenario and the
    /// closing summary to `out`.
    pub fn run<W: Write>(&self, scenarios: &[Scenario], out: &mut W) -> io::Result<RunSummary> {
        let mut summary = RunSummary::default();
        for (i, scenario) in scenarios.iter().enumerate() {
            let report = self.run_one(scenario);
            writeln!(out, "{report}")?;
            out.flush()?;
            summary.record(&report.outcome);

            if i + 1 < scenarios.len() && !self.config.pause.is_zero() {
                thread::sleep(self.config.pause);
            }
        }
        write_summary(out, &summary)?;
        Ok(summary)
    }
}

pub fn write_summary<W: Write>(out: &mut W, summary: &RunSummary) -> io::Result<()> {
    writeln!(out)?;
    if summary.success() {
        writeln!(out, "All smoke tests passed.")?;
    } else {
        writeln!(out, "{} test(s) failed.", summary.failures)?;
    }
    writeln!(
        out,
        "{} run, {} passed, {} warned, {} failed",
        summary.total, summary.passed, summary.warnings, summary.failures
    )
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

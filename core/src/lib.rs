//! Black-box contract checks for an HTTP proxying gateway.
//!
//! # Overview
//! Probes a running gateway from the outside (`/p`, `/fetch`, `/dispatch`)
//! and classifies each check as pass, warn, or fail. Warnings mark
//! behavior that depends on third-party origins or on the deployment;
//! failures mark violations of the gateway's own contract.
//!
//! # Design
//! - `GatewayClient` is stateless and only builds `HttpRequest` values
//!   (host-does-IO). `Transport` performs the round-trip; `UreqTransport`
//!   is the blocking production implementation.
//! - Scenarios are plain functions returning `Result<(), HarnessError>`;
//!   the `Runner` maps error kinds onto outcomes and writes the report.
//! - `HarnessConfig` is built once and passed down; there is no global state.
//! - Wire types are defined independently from the `mock-gateway` crate;
//!   the integration test catches drift.

pub mod config;
pub mod encode;
pub mod error;
pub mod gateway;
pub mod http;
pub mod runner;
pub mod scenarios;
pub mod transport;
pub mod types;

pub use config::{HarnessConfig, Site};
pub use error::HarnessError;
pub use gateway::GatewayClient;
pub use http::{Headers, HttpMethod, HttpRequest, HttpResponse};
pub use runner::{Outcome, RunSummary, Runner, ScenarioReport};
pub use scenarios::{Scenario, ScenarioContext};
pub use transport::{Transport, UreqTransport};
pub use types::{DispatchRequest, DispatchResponse, FetchRequest, Pipeline, ResponseType, TargetSpec};

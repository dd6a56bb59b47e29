//! Library crate for scan-orchestrator: target/port planning, concurrent
//! probing, result analysis and the job registry behind the HTTP API.
pub mod analysis;
pub mod config;
pub mod error;
pub mod job;
pub mod netdetect;
pub mod plan;
pub mod ports;
pub mod prober;
pub mod registry;
pub mod scanner;
pub mod server;
pub mod store;
pub mod targets;
pub mod telemetry;
pub mod types;

pub use config::EngineConfig;
pub use error::{Result, ScanError};
pub use registry::JobRegistry;

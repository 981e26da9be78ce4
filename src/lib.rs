pub mod admission;
pub mod allowlist;
pub mod config;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod labels;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod projection;
pub mod reload;
pub mod server;
pub mod telemetry;

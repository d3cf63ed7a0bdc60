//! foreman-server: HTTP/JSON and websocket surface for the coordination
//! kernel, plus configuration and telemetry for the `foremand` binary.

pub mod config;
pub mod http;
pub mod rate_limit;
pub mod telemetry;
pub mod ws;

pub use config::Config;
pub use http::{app, AppState};

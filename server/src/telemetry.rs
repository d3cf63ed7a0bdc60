use anyhow::{Context, Result};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry,
};

use crate::config::{LogFormat, LoggingConfig};

/// Initialize the tracing subscriber.
///
/// The configured level uses the historic names `fatal` and `silent`,
/// which map onto `error` and `off` for the env filter. `RUST_LOG` wins
/// when set.
pub fn init_telemetry(config: &LoggingConfig) -> Result<()> {
    let level = match config.level.as_str() {
        "fatal" => "error",
        "silent" => "off",
        other => other,
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("invalid log level configuration")?;

    let registry = Registry::default().with(env_filter);

    match config.format {
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer().pretty().with_target(true);
            registry.with(fmt_layer).init();
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_span_list(true)
                .flatten_event(true);
            registry.with(fmt_layer).init();
        }
        LogFormat::Compact => {
            let fmt_layer = fmt::layer().compact().with_target(false);
            registry.with(fmt_layer).init();
        }
    }

    tracing::info!(
        log_level = %config.level,
        log_format = ?config.format,
        "telemetry initialized"
    );
    Ok(())
}

/// Log the effective configuration at startup.
pub fn log_startup_info(config: &crate::config::Config) {
    tracing::info!(
        address = %config.server_address(),
        database = %config.database_path(),
        strict_mode = config.coordination.strict_mode,
        auth_enabled = config.auth.enabled,
        rate_limit_rpm = config.coordination.rate_limit_rpm,
        "coordination server starting"
    );
}

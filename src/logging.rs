use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Env var that overrides the configured filter
pub const LOG_ENV: &str = "CARDGATE_LOG";

/// Filter directives for a configured level.
///
/// A bare level (`debug`) applies to this crate only and dependencies stay
/// at `warn`. A value with explicit directives (`info,cardgate=trace`) is
/// used as given. sqlx is always held at `warn`; it logs every statement
/// at info.
pub fn filter_directives(log_level: &str) -> String {
    let base = if log_level.contains('=') || log_level.contains(',') {
        log_level.to_string()
    } else {
        format!("warn,cardgate={}", log_level)
    };
    format!("{},sqlx=warn", base)
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(&config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        // One object per line with transaction_id/account_id as fields
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        // stdout carries the JSON response of the binary
        let stderr_layer = fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_ansi(true);
        registry.with(file_layer).with(stderr_layer).init();
    }

    guard
}

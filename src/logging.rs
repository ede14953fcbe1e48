use std::path::Path;
#[cfg(test)]
use std::sync::LazyLock;

use anyhow::Result;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::writer::MakeWriterExt;

const LOG_PREFIX: &str = "time-tracker";

/// Sends logs to daily files under `<state_dir>/logs`, and to stderr when
/// `show_std` is set. `TIME_TRACKER_LOG` or `RUST_LOG` pick the level unless
/// `log_level` overrides it.
pub fn enable_logging(
    state_dir: &Path,
    log_level: Option<LevelFilter>,
    show_std: bool,
) -> Result<()> {
    let appender = tracing_appender::rolling::Builder::new()
        .rotation(Rotation::DAILY)
        .max_log_files(5)
        .filename_prefix(LOG_PREFIX)
        .build(state_dir.join("logs"))?;

    let stderr = std::io::stderr.with_filter(move |_| show_std);

    let level = log_level.map(|v| v.to_string()).unwrap_or_else(|| {
        std::env::var("TIME_TRACKER_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".into())
    });

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(format!(
            "{}={level}",
            env!("CARGO_PKG_NAME").replace('-', "_"),
        )))
        .with_ansi(false)
        .with_writer(stderr.and(appender))
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))?;
    Ok(())
}

#[cfg(test)]
pub static TEST_LOGGING: LazyLock<()> = LazyLock::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_test_writer()
        .try_init();
});

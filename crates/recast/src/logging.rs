use std::{fs, path::Path};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub(crate) const DEFAULT_LOG_FILTER: &str = "recast=debug,recast_core=debug";

const LOG_FILE_PREFIX: &str = "recast.log";

/// Install the global subscriber: console output plus a daily rolling file
/// in `log_dir` when one is available.
///
/// The returned guard flushes the file writer on drop and must live as long
/// as the process.
pub(crate) fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let file = log_dir.and_then(|dir| {
        fs::create_dir_all(dir).ok()?;
        let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        Some(tracing_appender::non_blocking(appender))
    });

    let (file_layer, guard) = match file {
        Some((writer, guard)) => (
            Some(fmt::layer().with_ansi(false).with_writer(writer)),
            Some(guard),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

//! Tracing subscriber setup: console layer on stderr plus an optional
//! JSON-lines file sink.

use std::path::Path;

use dispenser_config::Logging;
use eyre::WrapErr;
use tracing_subscriber::prelude::*;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn env_filter(cli_level: Option<&str>, cfg_level: Option<&str>) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = cli_level.or(cfg_level).unwrap_or("info");
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn file_layer(path: &Path, rotation: Option<&str>) -> eyre::Result<(BoxedLayer, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| eyre::eyre!("logging.file {path:?} has no file name"))?;
    std::fs::create_dir_all(dir).wrap_err_with(|| format!("create log directory {dir:?}"))?;

    let appender = match rotation.unwrap_or("never") {
        "daily" => tracing_appender::rolling::daily(dir, name),
        "hourly" => tracing_appender::rolling::hourly(dir, name),
        "never" => tracing_appender::rolling::never(dir, name),
        other => eyre::bail!("logging.rotation must be never|daily|hourly, got {other:?}"),
    };
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(writer)
        .boxed();
    Ok((layer, guard))
}

/// Install the global subscriber. Call once, after the config is loaded.
///
/// The returned guard flushes the file sink when dropped; hold it until exit.
pub fn init(
    cli_level: Option<&str>,
    json: bool,
    logging: &Logging,
) -> eyre::Result<Option<WorkerGuard>> {
    let filter = env_filter(cli_level, logging.level.as_deref());

    let console: BoxedLayer = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .boxed()
    };

    let mut layers = vec![console];
    let mut guard = None;
    if let Some(path) = logging.file.as_deref() {
        let (layer, g) = file_layer(Path::new(path), logging.rotation.as_deref())?;
        layers.push(layer);
        guard = Some(g);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| eyre::eyre!("install tracing subscriber: {e}"))?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_rotation() {
        let dir = std::env::temp_dir().join("dispenser_cli_log_test");
        let err = file_layer(&dir.join("x.log"), Some("weekly")).err().unwrap();
        assert!(err.to_string().contains("never|daily|hourly"));
    }
}

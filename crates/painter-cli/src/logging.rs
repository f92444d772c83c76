use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber: stderr, plus the run log file when given.
/// `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: &str, run_log: Option<&Path>) -> Result<(), String> {
    build_subscriber(level, run_log)?
        .try_init()
        .map_err(|err| format!("install log subscriber: {err}"))?;
    install_panic_hook();
    Ok(())
}

pub fn build_subscriber(
    level: &str,
    run_log: Option<&Path>,
) -> Result<impl Subscriber + Send + Sync + 'static, String> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match run_log {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|err| format!("create log dir {}: {err}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| format!("open run log {}: {err}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(file_layer))
}

/// Routes panics through the subscriber so they reach the run log.
fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(panic = %info, "runner panicked");
        previous(info);
    }));
}

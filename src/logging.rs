use std::path::PathBuf;
use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize process-wide logging. Console output is always enabled; when
/// `log_dir` is given, a daily-rolling JSON file is written alongside.
pub fn init(log_dir: Option<PathBuf>) {
    INIT.call_once(|| {
        let console = fmt::Layer::new()
            .with_target(true)
            .with_ansi(true)
            .with_filter(env_filter());

        let registry = tracing_subscriber::registry().with(console);

        match log_dir {
            Some(dir) => {
                std::fs::create_dir_all(&dir).expect("Failed to create log directory");

                let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
                    .rotation(tracing_appender::rolling::Rotation::DAILY)
                    .filename_prefix("starbus")
                    .filename_suffix("log")
                    .build(&dir)
                    .expect("Failed to create file appender");

                registry
                    .with(
                        fmt::Layer::new()
                            .json()
                            .with_writer(file_appender)
                            .with_ansi(false)
                            .with_filter(env_filter()),
                    )
                    .init();
            }
            None => registry.init(),
        }
    });
}

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            enable_file_logs: false,
            log_dir: "./logs".to_string(),
        }
    }
}

impl From<&Config> for LogConfig {
    fn from(config: &Config) -> Self {
        Self {
            log_level: config.log_level.clone(),
            enable_file_logs: config.enable_file_logs,
            log_dir: config.log_dir.clone(),
        }
    }
}

/// Installs the global subscriber. Calling it again is a no-op.
///
/// File logs are daily-rotated JSON; if the directory cannot be used the
/// service keeps running with stdout logging only.
pub fn init_tracing(config: &LogConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let mut appender_error = None;
    let file_layer = if config.enable_file_logs {
        match RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("lingo-progress")
            .filename_suffix("log")
            .max_log_files(14)
            .build(&config.log_dir)
        {
            Ok(appender) => Some(
                fmt::layer()
                    .with_writer(appender)
                    .with_ansi(false)
                    .json(),
            ),
            Err(e) => {
                appender_error = Some(e.to_string());
                None
            }
        }
    } else {
        None
    };

    let result = Registry::default()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .try_init();

    if let Err(e) = result {
        if !e.to_string().contains("already been set") {
            eprintln!("failed to initialize tracing: {e}");
        }
        return;
    }

    if let Some(error) = appender_error {
        tracing::warn!(log_dir = %config.log_dir, %error, "File logging disabled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let cfg = LogConfig::default();
        init_tracing(&cfg);
        init_tracing(&cfg);
    }
}

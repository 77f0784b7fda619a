use clap::ValueEnum;
use tracing::level_filters::LevelFilter;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

impl From<rnsnow_bridge::LogLevel> for LogLevel {
    fn from(level: rnsnow_bridge::LogLevel) -> Self {
        match level {
            rnsnow_bridge::LogLevel::Error => LogLevel::Error,
            rnsnow_bridge::LogLevel::Warn => LogLevel::Warn,
            rnsnow_bridge::LogLevel::Info => LogLevel::Info,
            rnsnow_bridge::LogLevel::Debug => LogLevel::Debug,
            rnsnow_bridge::LogLevel::Trace => LogLevel::Trace,
        }
    }
}

/// Log to stderr with time since start, level and component target.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level.as_filter())
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_ansi(false)
        .with_target(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_levels_map_to_cli_levels() {
        assert_eq!(LogLevel::from(rnsnow_bridge::LogLevel::Debug), LogLevel::Debug);
        assert_eq!(LogLevel::from(rnsnow_bridge::LogLevel::default()), LogLevel::Info);
        assert_eq!(LogLevel::Warn.as_filter(), LevelFilter::WARN);
    }
}

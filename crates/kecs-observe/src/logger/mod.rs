mod config;
mod error;
mod format;
mod log;

pub use config::LoggerConfig;
pub use error::LoggerError;
pub use format::LoggerFormat;

/// Installs the global subscriber described by `cfg`. Fails if one is already set.
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let directives = cfg.directives();
    match cfg.format {
        LoggerFormat::Text => log::Logger::text(cfg, &directives),
        LoggerFormat::Json => log::Logger::json(cfg, &directives),
        LoggerFormat::Journald => log::Logger::journald(&directives),
    }
}

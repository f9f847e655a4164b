use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, fmt, fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt,
};

use super::{config::LoggerConfig, error::LoggerError};

pub(super) struct Logger;

impl Logger {
    pub(super) fn text(cfg: &LoggerConfig, directives: &str) -> Result<(), LoggerError> {
        let layer = fmt::layer()
            .with_ansi(cfg.use_color)
            .with_target(cfg.with_targets)
            .with_timer(timer());
        install(tracing_subscriber::registry().with(filter(directives)?).with(layer))
    }

    pub(super) fn json(cfg: &LoggerConfig, directives: &str) -> Result<(), LoggerError> {
        let layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_ansi(false)
            .with_target(cfg.with_targets)
            .with_timer(timer());
        install(tracing_subscriber::registry().with(filter(directives)?).with(layer))
    }

    pub(super) fn journald(directives: &str) -> Result<(), LoggerError> {
        journald(filter(directives)?)
    }
}

pub(super) fn filter(directives: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(directives).map_err(|e| LoggerError::InvalidLogLevel(format!("{directives}: {e}")))
}

/// RFC 3339 timestamps in the local offset, or UTC when the offset cannot be determined.
fn timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

fn install<S>(subscriber: S) -> Result<(), LoggerError>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber.try_init().map_err(|e| {
        let msg = e.to_string();
        if msg.contains("global default") || msg.contains("SetGlobalDefaultError") {
            LoggerError::AlreadyInitialized
        } else {
            LoggerError::InitializationFailed(msg)
        }
    })
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald(filter: EnvFilter) -> Result<(), LoggerError> {
    let layer = tracing_journald::layer()
        .map_err(|e| LoggerError::InitializationFailed(format!("journald: {e}")))?
        .with_syslog_identifier("kecs".to_string());
    install(tracing_subscriber::registry().with(filter).with(layer))
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald(_filter: EnvFilter) -> Result<(), LoggerError> {
    Err(LoggerError::JournaldNotSupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_filter_is_rejected() {
        let err = filter("info,kecs=verbose").unwrap_err();
        assert!(matches!(err, LoggerError::InvalidLogLevel(_)));
    }

    #[test]
    fn rfc3339_timer_builds() {
        let _timer: OffsetTime<Rfc3339> = timer();
    }

    #[test]
    fn second_init_reports_already_initialized() {
        let cfg = LoggerConfig::default();
        // Another test in this binary may have won the race; either way the next call must fail.
        let _ = Logger::text(&cfg, "info");
        assert!(matches!(
            Logger::json(&cfg, "info"),
            Err(LoggerError::AlreadyInitialized)
        ));
    }
}

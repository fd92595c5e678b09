use crate::config::RecoveryConfig;
use log::{Level, Log, Metadata, Record};
use std::fmt;

const LOG_TARGET: &str = "crashrecover";

/// Everything one recovery call needs from its caller: the tunables and a
/// logger to report to. Borrowed for the duration of the call; the engine
/// keeps no state of its own between calls.
pub struct RecoveryContext<'a> {
    pub config: &'a RecoveryConfig,
    logger: &'a dyn Log,
}

impl<'a> RecoveryContext<'a> {
    pub fn new(config: &'a RecoveryConfig, logger: &'a dyn Log) -> Self {
        Self { config, logger }
    }

    /// Context that reports to whatever global logger is installed (none,
    /// unless the caller set one up).
    #[cfg(test)]
    pub fn with_global_logger(config: &'a RecoveryConfig) -> Self {
        Self::new(config, log::logger())
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let metadata = Metadata::builder().level(level).target(LOG_TARGET).build();
        if !self.logger.enabled(&metadata) {
            return;
        }
        self.logger.log(
            &Record::builder()
                .metadata(metadata)
                .args(args)
                .module_path_static(Some(module_path!()))
                .build(),
        );
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Logger that keeps every record in memory.
    #[derive(Default)]
    pub(crate) struct CaptureLogger {
        pub lines: Mutex<Vec<(Level, String)>>,
    }

    impl Log for CaptureLogger {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            self.lines
                .lock()
                .unwrap()
                .push((record.level(), record.args().to_string()));
        }

        fn flush(&self) {}
    }

    #[test]
    fn records_go_to_the_supplied_logger() {
        let config = RecoveryConfig::default();
        let logger = CaptureLogger::default();
        let ctx = RecoveryContext::new(&config, &logger);
        ctx.debug(format_args!("strategy {} failed", "direct"));
        ctx.warn(format_args!("nothing recovered"));
        let lines = logger.lines.lock().unwrap();
        assert_eq!(
            *lines,
            vec![
                (Level::Debug, "strategy direct failed".to_string()),
                (Level::Warn, "nothing recovered".to_string()),
            ]
        );
    }
}

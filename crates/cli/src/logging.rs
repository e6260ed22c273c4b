use std::io::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{Level, LevelFilter};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor as _};

static APP_LOGGER_LEVEL: AtomicUsize = AtomicUsize::new(LevelFilter::Warn as usize);

/// Colored stderr logger for the `log` facade.
pub struct AppLogger;

impl AppLogger {
    pub fn init() -> &'static AppLogger {
        log::set_max_level(Self::instance().level());
        Self::instance()
    }

    pub fn instance() -> &'static AppLogger {
        static INSTANCE: AppLogger = AppLogger;
        &INSTANCE
    }

    pub fn level(&self) -> LevelFilter {
        match APP_LOGGER_LEVEL.load(Ordering::Relaxed) {
            0 => LevelFilter::Off,
            1 => LevelFilter::Error,
            2 => LevelFilter::Warn,
            3 => LevelFilter::Info,
            4 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    pub fn set_level(&self, level: LevelFilter) {
        APP_LOGGER_LEVEL.store(level as usize, Ordering::Relaxed);
        log::set_max_level(level);
    }

    fn write_log(&self, record: &log::Record) -> std::io::Result<()> {
        let (level, color) = match record.level() {
            Level::Error => ("error", Color::Red),
            Level::Warn => ("warning", Color::Yellow),
            Level::Info => ("info", Color::Blue),
            Level::Debug => ("debug", Color::Green),
            Level::Trace => ("trace", Color::Magenta),
        };

        // Everything goes to stderr so `--json` output stays parseable.
        let mut output = StandardStream::stderr(ColorChoice::Auto);

        let mut level_color = ColorSpec::new();
        level_color.set_fg(Some(color)).set_bold(true);
        let mut reset_color = ColorSpec::new();
        reset_color.set_reset(true);

        output.set_color(&level_color)?;
        write!(output, "{:>width$}(", level, width = 7)?;
        output.set_color(&reset_color)?;
        write!(output, "{}", record.target())?;
        output.set_color(&level_color)?;
        write!(output, "): ")?;
        output.set_color(&reset_color)?;
        writeln!(output, "{}", record.args())?;

        Ok(())
    }
}

impl log::Log for AppLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let _ = self.write_log(record);
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Map `-v`/`-q` counts to a level filter. The default shows warnings.
pub fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_for(0, false), LevelFilter::Warn);
        assert_eq!(level_for(1, false), LevelFilter::Info);
        assert_eq!(level_for(2, false), LevelFilter::Debug);
        assert_eq!(level_for(7, false), LevelFilter::Trace);
        assert_eq!(level_for(3, true), LevelFilter::Error);
    }

    #[test]
    fn set_level_round_trips() {
        let logger = AppLogger::instance();
        logger.set_level(LevelFilter::Debug);
        assert_eq!(logger.level(), LevelFilter::Debug);
        logger.set_level(LevelFilter::Warn);
        assert_eq!(logger.level(), LevelFilter::Warn);
    }
}

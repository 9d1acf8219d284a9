//! Logging setup with indicatif integration

use indicatif::MultiProgress;

/// ANSI color code and padded label for a log level.
fn level_style(level: log::Level, color: bool) -> (&'static str, &'static str, &'static str) {
    let label = match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    };
    if !color {
        return ("", label, "");
    }
    let ansi = match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    };
    (ansi, label, "\x1b[0m")
}

/// Render one record. Debug/trace lines carry the emitting module so cycle
/// and submission events can be told apart.
fn render(record: &log::Record, color: bool) -> String {
    let (pre, label, post) = level_style(record.level(), color);
    match record.level() {
        log::Level::Debug | log::Level::Trace => format!(
            "[{pre}{label}{post}] {}: {}",
            record.module_path().unwrap_or("?"),
            record.args()
        ),
        _ => format!("[{pre}{label}{post}] {}", record.args()),
    }
}

/// Logger that prints through indicatif MultiProgress so lines never tear
/// the river status spinners.
pub struct IndicatifLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl IndicatifLogger {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { inner, multi }
    }
}

impl log::Log for IndicatifLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.inner.enabled(record.metadata()) {
            let line = render(record, true);
            self.multi.suspend(|| eprintln!("{line}"));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Initialize logging. `RUST_LOG` overrides the level picked from the flags.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    use std::io::Write;

    let default_level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let env = env_logger::Env::default().default_filter_or(default_level);

    if let Some(multi) = multi {
        let logger = env_logger::Builder::from_env(env).build();
        let max_level = logger.filter();

        log::set_boxed_logger(Box::new(IndicatifLogger::new(logger, multi.clone())))
            .expect("failed to init logger");
        log::set_max_level(max_level);
    } else {
        // Non-TTY: no ANSI colors, timestamp for log aggregation
        env_logger::Builder::from_env(env)
            .format(|buf, record| {
                let ts = buf.timestamp_millis();
                writeln!(buf, "{ts} {}", render(record, false))
            })
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_label_without_color() {
        assert_eq!(level_style(log::Level::Warn, false), ("", "WARN ", ""));
    }

    #[test]
    fn info_render_has_no_module() {
        let line = render(
            &log::Record::builder()
                .level(log::Level::Info)
                .module_path(Some("sqlriver_core::river"))
                .args(format_args!("cycle 1 done"))
                .build(),
            false,
        );
        assert_eq!(line, "[INFO ] cycle 1 done");
    }

    #[test]
    fn debug_render_names_module() {
        let line = render(
            &log::Record::builder()
                .level(log::Level::Debug)
                .module_path(Some("sqlriver_core::writer"))
                .args(format_args!("bulk submitted"))
                .build(),
            false,
        );
        assert_eq!(line, "[DEBUG] sqlriver_core::writer: bulk submitted");
    }
}

//! Logger setup shared by the solvers: terminal output and an optional log file.
use simplelog::{ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode, WriteLogger};
use std::fs::File;
use std::io;

/// Installs a terminal logger and, if `log_file` is given, a file logger.
/// The global logger can be set only once; later calls leave it unchanged.
pub fn init_logger(level: LevelFilter, log_file: Option<&str>) -> io::Result<()> {
    LoggerSettings {
        level,
        log_file: log_file.map(String::from),
        log_to_console: true,
    }
    .init()
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggerSettings {
    pub level: LevelFilter,
    pub log_file: Option<String>,
    pub log_to_console: bool,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        LoggerSettings {
            level: LevelFilter::Info,
            log_file: None,
            log_to_console: true,
        }
    }
}

impl LoggerSettings {
    /// Set logging level (Off, Error, Warn, Info, Debug, Trace)
    pub fn set_log_level(&mut self, level: LevelFilter) -> &mut Self {
        self.level = level;
        self
    }

    pub fn set_log_file(&mut self, filename: &str) -> &mut Self {
        self.log_file = Some(filename.to_string());
        self
    }

    pub fn set_console_logging(&mut self, enabled: bool) -> &mut Self {
        self.log_to_console = enabled;
        self
    }

    pub fn enable_debug_logging(&mut self) -> &mut Self {
        self.set_log_level(LevelFilter::Debug)
    }

    pub fn enable_info_logging(&mut self) -> &mut Self {
        self.set_log_level(LevelFilter::Info)
    }

    pub fn disable_logging(&mut self) -> &mut Self {
        self.set_log_level(LevelFilter::Off)
    }

    /// Debug level, optionally mirrored into a file
    pub fn enable_verbose_logging(&mut self, log_file: Option<&str>) -> &mut Self {
        self.enable_debug_logging();
        if let Some(filename) = log_file {
            self.set_log_file(filename);
        }
        self
    }

    pub fn init(&self) -> io::Result<()> {
        let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
        if self.log_to_console {
            loggers.push(TermLogger::new(
                self.level,
                Config::default(),
                TerminalMode::Mixed,
                ColorChoice::Auto,
            ));
        }
        if let Some(ref filename) = self.log_file {
            loggers.push(WriteLogger::new(self.level, Config::default(), File::create(filename)?));
        }
        if !loggers.is_empty() {
            let _ = CombinedLogger::init(loggers);
        }
        Ok(())
    }
}

use std::path::{Path, PathBuf};

use log::LevelFilter;
use log4rs::{
    append::{
        console::ConsoleAppender,
        rolling_file::{
            policy::compound::{
                roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy,
            },
            RollingFileAppender,
        },
    },
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};

use crate::error::{Error, Result};

const FILE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} {M} - {m}{n}";
const CONSOLE_PATTERN: &str = "[{l}] {m}{n}";

/// Where and how much the launcher logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LevelFilter,
    /// Base name; the live file is `<name>.log`, rolled ones `<name>.<n>.log`.
    pub file_name: String,
    pub max_file_bytes: u64,
    pub rolled_files: u32,
    /// Mirror records to stdout.
    pub console: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            file_name: "tamods-launcher".to_string(),
            max_file_bytes: 10 * 1024 * 1024,
            rolled_files: 5,
            console: cfg!(debug_assertions),
        }
    }
}

impl LogSettings {
    pub fn log_file(&self, logs_dir: &Path) -> PathBuf {
        logs_dir.join(format!("{}.log", self.file_name))
    }

    fn rolled_pattern(&self, logs_dir: &Path) -> String {
        logs_dir
            .join(format!("{}.{{}}.log", self.file_name))
            .to_string_lossy()
            .into_owned()
    }
}

fn config_error(e: impl std::fmt::Display) -> Error {
    Error::Io(std::io::Error::other(format!("logger config: {e}")))
}

fn file_appender(logs_dir: &Path, settings: &LogSettings) -> Result<RollingFileAppender> {
    let roller = FixedWindowRoller::builder()
        .build(&settings.rolled_pattern(logs_dir), settings.rolled_files)
        .map_err(config_error)?;
    let policy = CompoundPolicy::new(
        Box::new(SizeTrigger::new(settings.max_file_bytes)),
        Box::new(roller),
    );
    let appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(FILE_PATTERN)))
        .build(settings.log_file(logs_dir), Box::new(policy))?;
    Ok(appender)
}

/// Install the global logger: a rolling file under `logs_dir`, plus stdout when
/// `settings.console` is set. Returns the live log file.
///
/// A second call in the same process keeps the first logger.
pub fn init(logs_dir: &Path, settings: &LogSettings) -> Result<PathBuf> {
    std::fs::create_dir_all(logs_dir)?;
    let log_file = settings.log_file(logs_dir);

    let mut appenders = vec![Appender::builder().build(
        "file",
        Box::new(file_appender(logs_dir, settings)?),
    )];
    if settings.console {
        let stdout = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new(CONSOLE_PATTERN)))
            .build();
        appenders.push(Appender::builder().build("stdout", Box::new(stdout)));
    }

    let names: Vec<String> = appenders.iter().map(|a| a.name().to_string()).collect();
    let cfg = Config::builder()
        .appenders(appenders)
        .build(Root::builder().appenders(names).build(settings.level))
        .map_err(config_error)?;

    if log4rs::init_config(cfg).is_err() {
        log::debug!("logger already installed, {} not attached", log_file.display());
        return Ok(log_file);
    }

    std::panic::set_hook(Box::new(|info| {
        log::error!("panic: {info}");
    }));

    log::info!("logging to {} at {}", log_file.display(), settings.level);
    Ok(log_file)
}

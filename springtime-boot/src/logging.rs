//! Logging bootstrap.
//!
//! Logging is based on [tracing], with a global subscriber installed by [initialize]. Log levels
//! are configured per target with `logging.level.<target>`, where `root` sets the default level.
//! A target can also name a [logger group](LoggerGroups), which sets the level of all its members
//! at once. Setting `debug` or `trace` in [ApplicationConfig] enables verbose logging of core
//! framework targets, which can still be overridden by explicit levels.

use crate::config::{ApplicationConfig, LogFileConfig};
use fxhash::FxHashMap;
use itertools::Itertools;
use parking_lot::{const_mutex, Mutex};
use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter};

/// Target setting the default level.
pub const ROOT_LOGGER: &str = "root";

/// Name of the log file created in the configured log directory.
pub const DEFAULT_LOG_FILE: &str = "springtime.log";

const DEBUG_LOGGERS: &[&str] = &["sql", "web", "springtime_boot"];

const TRACE_LOGGERS: &[&str] = &[
    "sql",
    "web",
    "springtime_boot",
    "springtime_loader",
    "springtime_autoconfigure",
    "hyper",
    "axum",
];

static INITIALIZED: AtomicBool = AtomicBool::new(false);
static SHUTDOWN_HOOK_REGISTERED: AtomicBool = AtomicBool::new(false);
static SHUTDOWN_HOOK: Mutex<Option<ShutdownHandler>> = const_mutex(None);

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Unknown log level: {0}")]
    UnknownLevel(String),
    #[error("Invalid log filter: {0}")]
    InvalidFilter(#[from] ParseError),
    #[error("Cannot open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Cannot install logger: {0}")]
    Install(#[from] TryInitError),
}

/// Level of a log target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Fatal errors are reported as errors.
    Fatal,
    Off,
}

impl LogLevel {
    /// Returns the level as used in filter directives.
    pub fn directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error | Self::Fatal => "error",
            Self::Off => "off",
        }
    }
}

impl FromStr for LogLevel {
    type Err = LoggingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Self::Trace),
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARN" => Ok(Self::Warn),
            "ERROR" => Ok(Self::Error),
            "FATAL" => Ok(Self::Fatal),
            "OFF" | "FALSE" => Ok(Self::Off),
            _ => Err(LoggingError::UnknownLevel(value.to_string())),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = LoggingError;

    fn try_from(value: String) -> Result<Self, LoggingError> {
        value.parse()
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
            Self::Off => "OFF",
        })
    }
}

/// Location of the log file: either an explicit file name or the default file in a directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFile {
    file: Option<String>,
    path: Option<String>,
}

impl LogFile {
    /// Resolves the log file from config. Returns `None` if neither a name nor a path is set,
    /// which means logging to the standard output.
    pub fn from_config(config: &LogFileConfig) -> Option<Self> {
        let file = config.name.clone().filter(|file| !file.is_empty());
        let path = config.path.clone().filter(|path| !path.is_empty());

        (file.is_some() || path.is_some()).then_some(Self { file, path })
    }

    pub fn file_path(&self) -> PathBuf {
        match (&self.file, &self.path) {
            (Some(file), _) => PathBuf::from(file),
            (None, Some(path)) => PathBuf::from(path).join(DEFAULT_LOG_FILE),
            (None, None) => PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

impl Display for LogFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file_path().display())
    }
}

/// Named groups of log targets configured together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggerGroups {
    groups: FxHashMap<String, Vec<String>>,
}

impl Default for LoggerGroups {
    fn default() -> Self {
        let mut groups = FxHashMap::default();
        groups.insert(
            "web".to_string(),
            vec![
                "springtime_web_axum".to_string(),
                "axum".to_string(),
                "tower_http".to_string(),
            ],
        );
        groups.insert(
            "sql".to_string(),
            vec![
                "springtime_migrate_refinery".to_string(),
                "refinery_core".to_string(),
                "sqlx".to_string(),
            ],
        );

        Self { groups }
    }
}

impl LoggerGroups {
    /// Adds given groups, replacing existing ones with the same name.
    pub fn put_all(&mut self, groups: &FxHashMap<String, Vec<String>>) {
        self.groups.extend(
            groups
                .iter()
                .map(|(name, members)| (name.clone(), members.clone())),
        );
    }

    pub fn members(&self, name: &str) -> Option<&[String]> {
        self.groups.get(name).map(|members| members.as_slice())
    }
}

/// Flushes the log file on application shutdown.
#[derive(Clone, Debug)]
pub struct ShutdownHandler {
    file: Option<Arc<File>>,
}

impl ShutdownHandler {
    pub fn new(file: Option<Arc<File>>) -> Self {
        Self { file }
    }

    pub fn run(&self) {
        if let Some(file) = &self.file {
            if let Err(error) = file.sync_all() {
                debug!(%error, "Cannot sync log file");
            }
        }
    }
}

/// Registers the handler to run on application shutdown. Only the first registration in the
/// process takes effect; returns whether given handler was registered.
pub fn register_shutdown_hook(handler: ShutdownHandler) -> bool {
    if SHUTDOWN_HOOK_REGISTERED
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return false;
    }

    *SHUTDOWN_HOOK.lock() = Some(handler);
    true
}

/// Runs the registered shutdown hook, if any. The hook runs at most once.
pub fn run_shutdown_hook() {
    let handler = SHUTDOWN_HOOK.lock().take();
    if let Some(handler) = handler {
        handler.run();
    }
}

/// Creates the filter directives for given config. The default level comes first, followed by
/// core framework targets and explicitly configured targets, so later directives take precedence.
pub fn filter_directives(config: &ApplicationConfig) -> Vec<String> {
    let mut groups = LoggerGroups::default();
    groups.put_all(&config.logging.group);

    let mut directives = vec![config
        .logging
        .level
        .get(ROOT_LOGGER)
        .copied()
        .unwrap_or_default()
        .directive()
        .to_string()];

    let mut configure = |name: &str, level: LogLevel| match groups.members(name) {
        Some(members) => directives.extend(
            members
                .iter()
                .map(|member| format!("{member}={}", level.directive())),
        ),
        None => directives.push(format!("{name}={}", level.directive())),
    };

    let framework_level = if config.trace {
        Some((LogLevel::Trace, TRACE_LOGGERS))
    } else if config.debug {
        Some((LogLevel::Debug, DEBUG_LOGGERS))
    } else {
        None
    };

    if let Some((level, loggers)) = framework_level {
        for name in loggers {
            configure(name, level);
        }
    }

    for (name, level) in config
        .logging
        .level
        .iter()
        .filter(|(name, _)| name.as_str() != ROOT_LOGGER)
        .sorted_by(|(left, _), (right, _)| left.cmp(right))
    {
        configure(name, *level);
    }

    directives
}

/// Installs the global logger according to given config. Subsequent calls have no effect.
pub fn initialize(config: &ApplicationConfig) -> Result<(), LoggingError> {
    if INITIALIZED
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        debug!("Logging already initialized");
        return Ok(());
    }

    install(config).map_err(|error| {
        INITIALIZED.store(false, Ordering::Release);
        error
    })
}

fn install(config: &ApplicationConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::builder().parse(filter_directives(config).join(","))?;
    let log_file = LogFile::from_config(&config.logging.file);

    let file = match &log_file {
        Some(log_file) => {
            let file = Arc::new(open_log_file(log_file)?);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(file.clone()).with_ansi(false))
                .try_init()?;

            Some(file)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .try_init()?;

            None
        }
    };

    if let Some(log_file) = &log_file {
        info!(%log_file, "Logging to file");
    }

    if config.logging.register_shutdown_hook {
        register_shutdown_hook(ShutdownHandler::new(file));
    }

    Ok(())
}

fn open_log_file(log_file: &LogFile) -> Result<File, LoggingError> {
    let path = log_file.file_path();
    let map_error = |source| LoggingError::LogFile {
        path: path.clone(),
        source,
    };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(map_error)?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(map_error)
}

#[cfg(test)]
mod tests {
    use crate::config::{ApplicationConfig, LogFileConfig};
    use crate::logging::{
        filter_directives, register_shutdown_hook, run_shutdown_hook, LogFile, LogLevel,
        LoggerGroups, LoggingError, ShutdownHandler, DEFAULT_LOG_FILE, ROOT_LOGGER,
    };
    use std::path::PathBuf;

    fn config(levels: &[(&str, LogLevel)]) -> ApplicationConfig {
        let mut config = ApplicationConfig::default();
        config.logging.level = levels
            .iter()
            .map(|(name, level)| (name.to_string(), *level))
            .collect();
        config
    }

    #[test]
    fn should_parse_levels() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!(" WARN ".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("false".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert!(matches!(
            "loud".parse::<LogLevel>().unwrap_err(),
            LoggingError::UnknownLevel(_)
        ));
        assert_eq!(LogLevel::Fatal.directive(), "error");
        assert_eq!(
            LogLevel::try_from("error".to_string()).unwrap(),
            LogLevel::Error
        );
        assert!(LogLevel::try_from("loud".to_string()).is_err());
    }

    #[test]
    fn should_resolve_log_file() {
        assert_eq!(LogFile::from_config(&LogFileConfig::default()), None);
        assert_eq!(
            LogFile::from_config(&LogFileConfig {
                name: Some(String::new()),
                path: Some(String::new()),
            }),
            None
        );

        let file = LogFile::from_config(&LogFileConfig {
            name: Some("app.log".to_string()),
            path: Some("/var/log".to_string()),
        })
        .unwrap();
        assert_eq!(file.file_path(), PathBuf::from("app.log"));

        let file = LogFile::from_config(&LogFileConfig {
            name: None,
            path: Some("/var/log".to_string()),
        })
        .unwrap();
        assert_eq!(file.file_path(), PathBuf::from("/var/log").join(DEFAULT_LOG_FILE));
    }

    #[test]
    fn should_use_info_by_default() {
        assert_eq!(
            filter_directives(&ApplicationConfig::default()),
            vec!["info".to_string()]
        );
    }

    #[test]
    fn should_enable_framework_loggers() {
        let mut config = config(&[]);
        config.debug = true;

        let directives = filter_directives(&config);
        assert!(directives.contains(&"springtime_boot=debug".to_string()));
        assert!(directives.contains(&"axum=debug".to_string()));
        assert!(directives.contains(&"sqlx=debug".to_string()));
        assert!(!directives.contains(&"springtime_loader=debug".to_string()));

        config.trace = true;
        let directives = filter_directives(&config);
        assert!(directives.contains(&"springtime_loader=trace".to_string()));
        assert!(!directives.iter().any(|directive| directive.ends_with("=debug")));
    }

    #[test]
    fn should_expand_groups_after_framework_loggers() {
        let mut config = config(&[
            (ROOT_LOGGER, LogLevel::Warn),
            ("web", LogLevel::Error),
            ("my_app", LogLevel::Trace),
        ]);
        config.debug = true;
        config
            .logging
            .group
            .insert("web".to_string(), vec!["my_web".to_string()]);

        assert_eq!(
            filter_directives(&config),
            vec![
                "warn",
                "springtime_migrate_refinery=debug",
                "refinery_core=debug",
                "sqlx=debug",
                "my_web=debug",
                "springtime_boot=debug",
                "my_app=trace",
                "my_web=error",
            ]
        );
    }

    #[test]
    fn should_override_default_groups() {
        let mut groups = LoggerGroups::default();
        assert!(groups.members("web").is_some());

        groups.put_all(
            &[("web".to_string(), vec!["my_web".to_string()])]
                .into_iter()
                .collect(),
        );
        assert_eq!(groups.members("web"), Some(&["my_web".to_string()][..]));
        assert!(groups.members("other").is_none());
    }

    #[test]
    fn should_register_shutdown_hook_once() {
        let file = tempfile::tempfile().unwrap();

        assert!(register_shutdown_hook(ShutdownHandler::new(Some(file.into()))));
        assert!(!register_shutdown_hook(ShutdownHandler::new(None)));

        run_shutdown_hook();
        run_shutdown_hook();
    }
}

//! Framework configuration is read from an optional `springtime.json` file, overridden by
//! environment variables prefixed with `SPRINGTIME_`. Nested keys are separated with `__` in
//! variable names, e.g. `SPRINGTIME_LOGGING__LEVEL__ROOT=debug` sets `logging.level.root`.
//!
//! [ApplicationConfig] holds the opinionated framework configuration, while
//! [ConfigurationPropertiesBinder] allows binding any other configuration subtree to a typed
//! structure.

use crate::logging::LogLevel;
use config::{Config, ConfigError, Environment, File};
use fxhash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;

const CONFIG_ENV_PREFIX: &str = "SPRINGTIME";
const CONFIG_ENV_SEPARATOR: &str = "__";

/// Name of the default config file.
pub const CONFIG_FILE: &str = "springtime.json";

/// Binds configuration subtrees to typed structures.
#[derive(Clone, Debug)]
pub struct ConfigurationPropertiesBinder {
    config: Config,
}

impl ConfigurationPropertiesBinder {
    /// Creates a binder over given configuration.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Creates a binder over [CONFIG_FILE] and environment variables.
    pub fn from_environment() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("_")
                    .separator(CONFIG_ENV_SEPARATOR),
            )
            .build()
            .map(Self::new)
    }

    /// Binds the subtree under given dotted prefix, e.g. `logging.file`.
    pub fn bind<T: DeserializeOwned>(&self, prefix: &str) -> Result<T, ConfigError> {
        self.config.get(prefix)
    }

    /// Binds the subtree under given prefix, falling back to the default value if there's no such
    /// subtree.
    pub fn bind_or_default<T: DeserializeOwned + Default>(
        &self,
        prefix: &str,
    ) -> Result<T, ConfigError> {
        match self.bind(prefix) {
            Err(ConfigError::NotFound(_)) => Ok(T::default()),
            result => result,
        }
    }

    /// Binds the whole configuration.
    pub fn bind_root<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        self.config.clone().try_deserialize()
    }
}

/// Framework configuration.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct ApplicationConfig {
    /// Should a default tracing logger be installed in the scope of the application.
    pub install_tracing_logger: bool,
    /// Enables debug logging of core framework loggers.
    pub debug: bool,
    /// Enables trace logging of core framework loggers. Takes precedence over `debug`.
    pub trace: bool,
    pub logging: LoggingConfig,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            install_tracing_logger: true,
            debug: false,
            trace: false,
            logging: Default::default(),
        }
    }
}

impl From<OptionalApplicationConfig> for ApplicationConfig {
    fn from(value: OptionalApplicationConfig) -> Self {
        let default = Self::default();
        Self {
            install_tracing_logger: value
                .install_tracing_logger
                .unwrap_or(default.install_tracing_logger),
            debug: value.debug.unwrap_or(default.debug),
            trace: value.trace.unwrap_or(default.trace),
            logging: value
                .logging
                .map(LoggingConfig::from)
                .unwrap_or(default.logging),
        }
    }
}

impl ApplicationConfig {
    /// Reads the config from [CONFIG_FILE] and environment variables.
    pub fn init_from_environment() -> Result<Self, ConfigError> {
        ConfigurationPropertiesBinder::from_environment()
            .and_then(|binder| Self::init_from_binder(&binder))
    }

    pub fn init_from_binder(binder: &ConfigurationPropertiesBinder) -> Result<Self, ConfigError> {
        binder
            .bind_root::<OptionalApplicationConfig>()
            .map(|config| config.into())
    }
}

/// Logging configuration, as found under the `logging` key.
#[non_exhaustive]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoggingConfig {
    /// Levels of log targets or logger groups. The `root` target sets the default level.
    pub level: FxHashMap<String, LogLevel>,
    /// Custom logger groups, overriding the default ones with the same name.
    pub group: FxHashMap<String, Vec<String>>,
    pub file: LogFileConfig,
    /// Should logs be flushed on application shutdown.
    pub register_shutdown_hook: bool,
}

impl From<OptionalLoggingConfig> for LoggingConfig {
    fn from(value: OptionalLoggingConfig) -> Self {
        Self {
            level: value.level.unwrap_or_default(),
            group: value.group.unwrap_or_default(),
            file: value.file.unwrap_or_default(),
            register_shutdown_hook: value.register_shutdown_hook.unwrap_or_default(),
        }
    }
}

/// Log file location, as found under the `logging.file` key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct LogFileConfig {
    /// Log file name, relative or absolute.
    pub name: Option<String>,
    /// Directory of the default log file, used when no name is given.
    pub path: Option<String>,
}

#[derive(Deserialize)]
struct OptionalApplicationConfig {
    install_tracing_logger: Option<bool>,
    debug: Option<bool>,
    trace: Option<bool>,
    logging: Option<OptionalLoggingConfig>,
}

#[derive(Deserialize)]
struct OptionalLoggingConfig {
    level: Option<FxHashMap<String, LogLevel>>,
    group: Option<FxHashMap<String, Vec<String>>>,
    file: Option<LogFileConfig>,
    register_shutdown_hook: Option<bool>,
}

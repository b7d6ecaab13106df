//! Core application bootstrap functionality.

use crate::config::ApplicationConfig;
use crate::logging::{self, LoggingError};
use config::ConfigError;
use derive_more::Constructor;
use springtime_loader::error::LauncherError;
use springtime_loader::launcher::{JarLauncher, Launcher};
use std::env;
use std::process::ExitCode;
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Error reading configuration: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Error initializing logging: {0}")]
    LoggingError(#[from] LoggingError),
    #[error("Launch error: {0}")]
    LaunchError(#[from] LauncherError),
}

/// Bootstraps the process and hands control to the application entry point found by given
/// [Launcher].
#[derive(Constructor)]
pub struct Application<L: Launcher> {
    launcher: L,
    config: ApplicationConfig,
}

impl<L: Launcher> Application<L> {
    #[inline]
    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    /// Initializes logging, if enabled, and launches the application with given arguments.
    pub fn run(&self, args: Vec<String>) -> Result<(), ApplicationError> {
        if self.config.install_tracing_logger {
            logging::initialize(&self.config)?;
        }

        info!("Launching application...");

        self.launcher.launch(args)?;
        Ok(())
    }
}

/// Launches the application packaged in the running executable, using configuration from the
/// environment and process arguments. Meant to be returned from `main()`:
///
/// ```no_run
/// use std::process::ExitCode;
///
/// fn main() -> ExitCode {
///     springtime_boot::application::launch()
/// }
/// ```
pub fn launch() -> ExitCode {
    let result = launch_from_environment();
    logging::run_shutdown_hook();

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "Application failed to start");
            eprintln!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn launch_from_environment() -> Result<(), ApplicationError> {
    let config = ApplicationConfig::init_from_environment()?;
    let launcher = JarLauncher::new()?;

    Application::new(launcher, config).run(env::args().skip(1).collect())
}

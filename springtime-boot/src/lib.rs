//! Bootstrapping of self-contained applications.
//!
//! An application packaged as an executable archive starts in a `main()` function which only
//! delegates to [launch](application::launch). The bootstrap reads
//! [configuration](config::ApplicationConfig), installs a [logger](logging) and runs the
//! [JarLauncher](springtime_loader::launcher::JarLauncher) over the running executable, which in
//! turn calls the entry point named by the archive manifest.
//!
//! The remaining building blocks are exposed for applications which need a custom bootstrap:
//! [Application](application::Application) works with any
//! [Launcher](springtime_loader::launcher::Launcher), while
//! [ConfigurationPropertiesBinder](config::ConfigurationPropertiesBinder) binds application
//! specific configuration.

pub mod application;
pub mod config;
pub mod logging;

//! Launching applications packaged as self-contained executable archives.
//!
//! The default [JarLauncher] expects the following layout of the root archive:
//!
//! * `META-INF/MANIFEST.MF` - manifest with the `Start-Class` attribute naming the entry point
//! * `BOOT-INF/classes/` - application classes
//! * `BOOT-INF/lib/` - nested library archives
//!
//! ```no_run
//! use springtime_loader::launcher::{JarLauncher, Launcher};
//!
//! let launcher = JarLauncher::new().expect("cannot resolve application archive");
//! launcher
//!     .launch(std::env::args().skip(1).collect())
//!     .expect("application failed");
//! ```

use crate::archive::exploded::ExplodedArchive;
use crate::archive::handler::Handler;
use crate::archive::packaged::PackagedArchive;
use crate::archive::{ArchivePtr, Entry};
use crate::class_loader::{
    context_class_loader, set_context_class_loader, ClassLoaderPtr, IsolatedClassLoader,
};
use crate::entry_point::BuiltinClassLoader;
use crate::error::LauncherError;
use derive_more::Constructor;
use itertools::Itertools;
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Manifest attribute naming the application entry point.
pub const START_CLASS: &str = "Start-Class";

/// Directory holding application classes.
pub const BOOT_INF_CLASSES: &str = "BOOT-INF/classes/";

/// Directory holding nested library archives.
pub const BOOT_INF_LIB: &str = "BOOT-INF/lib/";

/// Resolves the archive of the running executable.
pub fn resolve_self_archive() -> Result<ArchivePtr, LauncherError> {
    let path = env::current_exe().map_err(LauncherError::CodeSourceUndetermined)?;
    create_archive(path)
}

/// Creates an archive for given code source - an exploded archive for directories and a packaged
/// one otherwise.
pub fn create_archive(path: impl AsRef<Path>) -> Result<ArchivePtr, LauncherError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(LauncherError::CodeSourceMissing(path.to_path_buf()));
    }

    Ok(if path.is_dir() {
        Arc::new(ExplodedArchive::new(path))
    } else {
        Arc::new(PackagedArchive::open(path)?)
    })
}

/// Runs the entry point of a class resolved through the current context class loader.
#[derive(Constructor, Clone, Debug)]
pub struct MainMethodRunner {
    main_class: String,
    args: Vec<String>,
}

impl MainMethodRunner {
    pub fn run(self) -> Result<(), LauncherError> {
        let class_loader =
            context_class_loader().ok_or(LauncherError::MissingContextClassLoader)?;
        let class = class_loader.load_class(&self.main_class, false)?;
        let main = class
            .main_method()
            .ok_or_else(|| LauncherError::MainMethodNotFound(self.main_class.clone()))?;

        info!(main_class = %self.main_class, "Starting application");

        main(self.args).map_err(LauncherError::Application)
    }
}

/// Base of launchers turning a root archive into a class loader and running its entry point.
pub trait Launcher {
    /// Returns the name of the class holding the entry point.
    fn main_class(&self) -> Result<String, LauncherError>;

    /// Returns archives making up the class path, in class path order.
    fn class_path_archives(&self) -> Result<Vec<ArchivePtr>, LauncherError>;

    /// Returns the loader used as the parent of the created class loader.
    fn parent_class_loader(&self) -> ClassLoaderPtr {
        BuiltinClassLoader::shared()
    }

    /// Creates a class loader over given archives. Archives are registered with the url handler,
    /// so they are not opened again.
    fn create_class_loader(&self, archives: &[ArchivePtr]) -> Result<ClassLoaderPtr, LauncherError> {
        let handler = Arc::new(Handler::default());
        for archive in archives {
            handler.register(archive.clone());
        }

        let urls = archives.iter().map(|archive| archive.url()).collect_vec();
        debug!(urls = %urls.iter().join(", "), "Creating class loader");

        Ok(Arc::new(IsolatedClassLoader::with_handler(
            urls,
            Some(self.parent_class_loader()),
            handler,
        )))
    }

    fn create_main_method_runner(
        &self,
        main_class: String,
        args: Vec<String>,
        _class_loader: &ClassLoaderPtr,
    ) -> MainMethodRunner {
        MainMethodRunner::new(main_class, args)
    }

    /// Launches the application with given arguments, excluding the program name.
    fn launch(&self, args: Vec<String>) -> Result<(), LauncherError> {
        let class_loader = self.create_class_loader(&self.class_path_archives()?)?;
        self.launch_with(args, self.main_class()?, class_loader)
    }

    /// Runs the entry point of given class with the class loader installed as the context class
    /// loader of the current thread. The previous context class loader is restored afterwards.
    fn launch_with(
        &self,
        args: Vec<String>,
        main_class: String,
        class_loader: ClassLoaderPtr,
    ) -> Result<(), LauncherError> {
        let runner = self.create_main_method_runner(main_class, args, &class_loader);
        let _guard = ContextClassLoaderGuard::install(class_loader);
        runner.run()
    }
}

/// Restores the previous context class loader when dropped, including on unwinding.
struct ContextClassLoaderGuard {
    previous: Option<ClassLoaderPtr>,
}

impl ContextClassLoaderGuard {
    fn install(class_loader: ClassLoaderPtr) -> Self {
        Self {
            previous: set_context_class_loader(Some(class_loader)),
        }
    }
}

impl Drop for ContextClassLoaderGuard {
    fn drop(&mut self) {
        set_context_class_loader(self.previous.take());
    }
}

/// Archive layout of a launcher variant.
pub trait ArchiveLayout {
    /// Checks if a root archive entry should become a class path archive.
    fn is_nested_archive(&self, entry: &Entry) -> bool;

    /// Adjusts the class path archives before a class loader is created.
    fn post_process_class_path_archives(
        &self,
        archives: Vec<ArchivePtr>,
    ) -> Result<Vec<ArchivePtr>, LauncherError> {
        Ok(archives)
    }
}

/// Layout with application classes in `BOOT-INF/classes/` and libraries in `BOOT-INF/lib/`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JarLayout;

impl ArchiveLayout for JarLayout {
    fn is_nested_archive(&self, entry: &Entry) -> bool {
        if entry.is_directory() {
            entry.name() == BOOT_INF_CLASSES
        } else {
            entry.name().starts_with(BOOT_INF_LIB)
        }
    }
}

/// Launcher for archives with a [layout](ArchiveLayout) and a `Start-Class` manifest attribute.
#[derive(Debug)]
pub struct ExecutableArchiveLauncher<L> {
    archive: ArchivePtr,
    layout: L,
}

pub type JarLauncher = ExecutableArchiveLauncher<JarLayout>;

impl<L: ArchiveLayout + Default> ExecutableArchiveLauncher<L> {
    /// Creates a launcher for the archive of the running executable.
    pub fn new() -> Result<Self, LauncherError> {
        resolve_self_archive().map(|archive| Self::with_archive(archive, L::default()))
    }
}

impl<L: ArchiveLayout> ExecutableArchiveLauncher<L> {
    pub fn with_archive(archive: ArchivePtr, layout: L) -> Self {
        Self { archive, layout }
    }

    #[inline]
    pub fn archive(&self) -> &ArchivePtr {
        &self.archive
    }
}

impl<L: ArchiveLayout> Launcher for ExecutableArchiveLauncher<L> {
    fn main_class(&self) -> Result<String, LauncherError> {
        let manifest = self
            .archive
            .manifest()?
            .ok_or_else(|| LauncherError::MissingManifest(self.archive.url()))?;

        manifest
            .main_attributes()
            .value(START_CLASS)
            .map(str::to_string)
            .ok_or_else(|| LauncherError::MissingStartClass(self.archive.url()))
    }

    fn class_path_archives(&self) -> Result<Vec<ArchivePtr>, LauncherError> {
        let archives = self
            .archive
            .nested_archives(&|entry| self.layout.is_nested_archive(entry))?;

        self.layout.post_process_class_path_archives(archives)
    }
}

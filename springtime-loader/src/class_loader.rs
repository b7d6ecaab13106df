//! Class loading over a list of archive urls.
//!
//! [IsolatedClassLoader] resolves classes and resources from its own urls after delegating to its
//! parent. Before a class is loaded, its package is defined from the manifest of the nested archive
//! which actually contains the class, so package metadata such as implementation version reflects
//! the library the class came from.
//!
//! Every lookup opens connections with [fast](ConnectionOptions::fast) connection options scoped
//! to that single call, since most urls are expected not to contain a given name.

use crate::archive::handler::{Connection, ConnectionOptions, Handler};
use crate::archive::manifest::Manifest;
use crate::archive::{class_entry_name, package_entry_name, ArchivePtr, ArchiveUrl};
use crate::entry_point::MainFn;
use crate::error::{ArchiveError, ClassLoaderError};
use bytes::Bytes;
use derivative::Derivative;
use fxhash::FxHashMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::cell::RefCell;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use tracing::{debug, trace};

pub type ClassPtr = Arc<Class>;
pub type PackagePtr = Arc<Package>;
pub type ClassLoaderPtr = Arc<dyn ClassLoader>;

/// Package metadata, defined once per package name and loader.
#[non_exhaustive]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub specification_title: Option<String>,
    pub specification_version: Option<String>,
    pub specification_vendor: Option<String>,
    pub implementation_title: Option<String>,
    pub implementation_version: Option<String>,
    pub implementation_vendor: Option<String>,
    /// Url of the archive sealing this package, if sealed.
    pub sealed_base: Option<ArchiveUrl>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Defines a package from manifest attributes. Values from the package section take
    /// precedence over the main section.
    pub fn from_manifest(name: impl Into<String>, manifest: &Manifest, url: &ArchiveUrl) -> Self {
        let name = name.into();
        let section = package_entry_name(&name);
        let value = |attribute: &str| manifest.value(&section, attribute).map(str::to_string);

        let sealed = manifest
            .value(&section, "Sealed")
            .map(|sealed| sealed.eq_ignore_ascii_case("true"))
            .unwrap_or_default();

        Self {
            specification_title: value("Specification-Title"),
            specification_version: value("Specification-Version"),
            specification_vendor: value("Specification-Vendor"),
            implementation_title: value("Implementation-Title"),
            implementation_version: value("Implementation-Version"),
            implementation_vendor: value("Implementation-Vendor"),
            sealed_base: sealed.then(|| url.clone()),
            name,
        }
    }

    #[inline]
    pub fn is_sealed(&self) -> bool {
        self.sealed_base.is_some()
    }
}

/// Where a class definition comes from.
#[derive(Clone, Debug)]
pub enum ClassSource {
    /// Class entry in an archive.
    Archive {
        url: ArchiveUrl,
        archive: ArchivePtr,
        entry: String,
    },
    /// Class compiled into the running binary.
    Builtin { main: Option<MainFn> },
}

/// A loaded class.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Class {
    name: String,
    source: ClassSource,
    package: Option<PackagePtr>,
    #[derivative(Debug = "ignore")]
    bytes: OnceCell<Bytes>,
}

impl Class {
    /// Creates a class compiled into the running binary.
    pub fn builtin(name: impl Into<String>, main: Option<MainFn>) -> Self {
        Self {
            name: name.into(),
            source: ClassSource::Builtin { main },
            package: None,
            bytes: OnceCell::new(),
        }
    }

    fn archived(
        name: &str,
        connection: &Connection,
        entry: String,
        package: Option<PackagePtr>,
    ) -> Self {
        Self {
            name: name.to_string(),
            source: ClassSource::Archive {
                url: connection.url().clone(),
                archive: connection.archive().clone(),
                entry,
            },
            package,
            bytes: OnceCell::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn source(&self) -> &ClassSource {
        &self.source
    }

    #[inline]
    pub fn package(&self) -> Option<&PackagePtr> {
        self.package.as_ref()
    }

    /// Returns the registered entry point, if any.
    pub fn main_method(&self) -> Option<MainFn> {
        match &self.source {
            ClassSource::Builtin { main } => *main,
            ClassSource::Archive { .. } => None,
        }
    }

    /// Returns the class definition bytes, reading them on first access. Builtin classes have no
    /// bytes.
    pub fn bytes(&self) -> Result<Bytes, ClassLoaderError> {
        self.bytes
            .get_or_try_init(|| match &self.source {
                ClassSource::Builtin { .. } => Ok(Bytes::new()),
                ClassSource::Archive {
                    url,
                    archive,
                    entry,
                } => archive
                    .read_entry(entry)
                    .and_then(|bytes| {
                        bytes.ok_or_else(|| ArchiveError::MissingEntry {
                            url: url.clone(),
                            name: entry.clone(),
                        })
                    })
                    .map_err(|source| ClassLoaderError::ClassRead {
                        name: self.name.clone(),
                        source,
                    }),
            })
            .cloned()
    }
}

/// A named resource found in an archive.
#[derive(Clone, Debug)]
pub struct Resource {
    archive: ArchivePtr,
    name: String,
}

impl Resource {
    pub fn new(archive: ArchivePtr, name: impl Into<String>) -> Self {
        Self {
            archive,
            name: name.into(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Url of the archive containing this resource.
    pub fn archive_url(&self) -> ArchiveUrl {
        self.archive.url()
    }

    pub fn read(&self) -> Result<Bytes, ArchiveError> {
        self.archive
            .read_entry(&self.name)?
            .ok_or_else(|| ArchiveError::MissingEntry {
                url: self.archive.url(),
                name: self.name.clone(),
            })
    }
}

impl Display for Resource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.archive.url(), self.name)
    }
}

/// Resolver of classes and resources by name.
pub trait ClassLoader: Debug + Send + Sync {
    /// Loads a class with given fully qualified name. When `resolve` is true, the class
    /// definition is read eagerly.
    fn load_class(&self, name: &str, resolve: bool) -> Result<ClassPtr, ClassLoaderError>;

    /// Finds a resource in this loader only.
    fn find_resource(&self, name: &str) -> Option<Resource>;

    /// Finds all resources with given name in this loader only.
    fn find_resources(&self, name: &str) -> Vec<Resource>;

    /// Returns a package defined by this loader.
    fn package(&self, name: &str) -> Option<PackagePtr>;

    fn parent(&self) -> Option<ClassLoaderPtr>;

    /// Finds a resource, asking the parent first.
    fn resource(&self, name: &str) -> Option<Resource> {
        self.parent()
            .and_then(|parent| parent.resource(name))
            .or_else(|| self.find_resource(name))
    }

    /// Finds all resources with given name, starting with the ones visible to the parent.
    fn resources(&self, name: &str) -> Vec<Resource> {
        let mut resources = self
            .parent()
            .map(|parent| parent.resources(name))
            .unwrap_or_default();

        resources.extend(self.find_resources(name));
        resources
    }
}

/// Class loader over an ordered list of archive urls, delegating to its parent first.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct IsolatedClassLoader {
    urls: Vec<ArchiveUrl>,
    parent: Option<ClassLoaderPtr>,
    #[derivative(Debug = "ignore")]
    handler: Arc<Handler>,
    #[derivative(Debug = "ignore")]
    classes: RwLock<FxHashMap<String, ClassPtr>>,
    #[derivative(Debug = "ignore")]
    packages: RwLock<FxHashMap<String, PackagePtr>>,
}

impl IsolatedClassLoader {
    pub fn new(urls: Vec<ArchiveUrl>, parent: Option<ClassLoaderPtr>) -> Self {
        Self::with_handler(urls, parent, Default::default())
    }

    /// Creates a loader resolving urls through given handler, which can hold already open
    /// archives.
    pub fn with_handler(
        urls: Vec<ArchiveUrl>,
        parent: Option<ClassLoaderPtr>,
        handler: Arc<Handler>,
    ) -> Self {
        Self {
            urls,
            parent,
            handler,
            classes: Default::default(),
            packages: Default::default(),
        }
    }

    #[inline]
    pub fn urls(&self) -> &[ArchiveUrl] {
        &self.urls
    }

    /// Returns all packages defined so far.
    pub fn packages(&self) -> Vec<PackagePtr> {
        self.packages.read().values().cloned().collect()
    }

    /// Defines a new package. Packages are never redefined - an attempt to define an existing one
    /// results in [ClassLoaderError::PackageAlreadyDefined].
    pub fn define_package(
        &self,
        name: &str,
        manifest: Option<&Manifest>,
        url: &ArchiveUrl,
    ) -> Result<PackagePtr, ClassLoaderError> {
        let mut packages = self.packages.write();
        if packages.contains_key(name) {
            return Err(ClassLoaderError::PackageAlreadyDefined(name.to_string()));
        }

        let package = Arc::new(match manifest {
            Some(manifest) => Package::from_manifest(name, manifest, url),
            None => Package::new(name),
        });

        debug!(package = name, %url, "Defined package");

        packages.insert(name.to_string(), package.clone());
        Ok(package)
    }

    /// Drops cached index data of all packaged archives reachable from the urls. Connection
    /// failures are ignored.
    pub fn clear_cache(&self) {
        for url in &self.urls {
            match self.handler.open_connection(url, ConnectionOptions::fast()) {
                Ok(connection) if connection.is_packaged() => connection.archive().clear_cache(),
                Ok(_) => {}
                Err(error) => debug!(%url, %error, "Ignoring connection error while clearing cache"),
            }
        }
    }

    fn connections(&self, options: ConnectionOptions) -> impl Iterator<Item = Connection> + '_ {
        self.urls
            .iter()
            .filter_map(move |url| match self.handler.open_connection(url, options) {
                Ok(connection) => Some(connection),
                Err(error) => {
                    debug!(%url, %error, "Ignoring connection error");
                    None
                }
            })
    }

    fn define_package_if_necessary(&self, class_name: &str, options: ConnectionOptions) {
        let Some((package_name, _)) = class_name.rsplit_once('.') else {
            return;
        };

        if self.package(package_name).is_some() {
            return;
        }

        if let Some(result) = self.define_package_from_urls(class_name, package_name, options) {
            self.converge_package_definition(package_name, result);
        }
    }

    fn define_package_from_urls(
        &self,
        class_name: &str,
        package_name: &str,
        options: ConnectionOptions,
    ) -> Option<Result<PackagePtr, ClassLoaderError>> {
        let class_entry = class_entry_name(class_name);
        let package_entry = package_entry_name(package_name);

        for connection in self.connections(options) {
            if !connection.is_packaged() {
                continue;
            }

            let archive = connection.archive();
            let contains_entries = archive
                .entry(&class_entry)
                .and_then(|class| Ok(class.is_some() && archive.entry(&package_entry)?.is_some()));

            match contains_entries {
                Ok(true) => {}
                Ok(false) => continue,
                Err(error) => {
                    debug!(url = %connection.url(), %error, "Ignoring unreadable archive");
                    continue;
                }
            }

            match archive.manifest() {
                Ok(Some(manifest)) => {
                    return Some(self.define_package(
                        package_name,
                        Some(&*manifest),
                        connection.url(),
                    ))
                }
                Ok(None) => {}
                Err(error) => {
                    debug!(url = %connection.url(), %error, "Ignoring unreadable manifest")
                }
            }
        }

        None
    }

    /// Resolves the result of a package definition attempt. Losing a definition race is not an
    /// error, as long as the winning definition is visible.
    fn converge_package_definition(
        &self,
        name: &str,
        result: Result<PackagePtr, ClassLoaderError>,
    ) -> Option<PackagePtr> {
        match result {
            Ok(package) => Some(package),
            Err(ClassLoaderError::PackageAlreadyDefined(_)) => {
                let package = self.package(name);
                assert!(
                    package.is_some(),
                    "Package {name} has already been defined but it could not be found"
                );
                package
            }
            Err(error) => {
                debug!(package = name, %error, "Cannot define package");
                None
            }
        }
    }

    fn package_or_define(&self, name: &str, connection: &Connection) -> Option<PackagePtr> {
        if let Some(package) = self.package(name) {
            return Some(package);
        }

        let manifest = connection.archive().manifest().ok().flatten();
        let result = self.define_package(name, manifest.as_deref(), connection.url());
        self.converge_package_definition(name, result)
    }

    fn find_class(
        &self,
        name: &str,
        options: ConnectionOptions,
    ) -> Result<ClassPtr, ClassLoaderError> {
        let entry = class_entry_name(name);
        for connection in self.connections(options) {
            match connection.archive().entry(&entry) {
                Ok(Some(found)) if !found.is_directory() => {
                    let package = name
                        .rsplit_once('.')
                        .and_then(|(package, _)| self.package_or_define(package, &connection));

                    trace!(class = name, url = %connection.url(), "Found class");

                    let class = Arc::new(Class::archived(name, &connection, entry, package));
                    return Ok(self
                        .classes
                        .write()
                        .entry(name.to_string())
                        .or_insert(class)
                        .clone());
                }
                Ok(_) => {}
                Err(error) => {
                    debug!(url = %connection.url(), %error, "Ignoring unreadable archive")
                }
            }
        }

        Err(ClassLoaderError::ClassNotFound(name.to_string()))
    }

    fn load(
        &self,
        name: &str,
        options: ConnectionOptions,
    ) -> Result<ClassPtr, ClassLoaderError> {
        if let Some(class) = self.classes.read().get(name).cloned() {
            return Ok(class);
        }

        self.define_package_if_necessary(name, options);

        if let Some(parent) = &self.parent {
            match parent.load_class(name, false) {
                Ok(class) => return Ok(class),
                Err(ClassLoaderError::ClassNotFound(_)) => {}
                Err(error) => return Err(error),
            }
        }

        self.find_class(name, options)
    }
}

impl ClassLoader for IsolatedClassLoader {
    fn load_class(&self, name: &str, resolve: bool) -> Result<ClassPtr, ClassLoaderError> {
        let class = self.load(name, ConnectionOptions::fast())?;
        if resolve {
            class.bytes()?;
        }

        Ok(class)
    }

    fn find_resource(&self, name: &str) -> Option<Resource> {
        self.connections(ConnectionOptions::fast())
            .find_map(|connection| match connection.archive().entry(name) {
                Ok(Some(_)) => Some(Resource::new(connection.archive().clone(), name)),
                _ => None,
            })
    }

    fn find_resources(&self, name: &str) -> Vec<Resource> {
        self.connections(ConnectionOptions::fast())
            .filter_map(|connection| match connection.archive().entry(name) {
                Ok(Some(_)) => Some(Resource::new(connection.archive().clone(), name)),
                _ => None,
            })
            .collect()
    }

    fn package(&self, name: &str) -> Option<PackagePtr> {
        self.packages.read().get(name).cloned()
    }

    fn parent(&self) -> Option<ClassLoaderPtr> {
        self.parent.clone()
    }
}

thread_local! {
    static CONTEXT_CLASS_LOADER: RefCell<Option<ClassLoaderPtr>> = RefCell::new(None);
}

/// Installs a class loader for the current thread, returning the previous one.
pub fn set_context_class_loader(loader: Option<ClassLoaderPtr>) -> Option<ClassLoaderPtr> {
    CONTEXT_CLASS_LOADER.with(|current| current.replace(loader))
}

/// Returns the class loader installed for the current thread.
pub fn context_class_loader() -> Option<ClassLoaderPtr> {
    CONTEXT_CLASS_LOADER.with(|current| current.borrow().clone())
}

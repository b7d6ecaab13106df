//! Builtin classes compiled into the running binary.
//!
//! Application entry points are plain functions registered under a class name, either with the
//! `#[entry_point]` attribute or manually with [register_class]. Registered classes are resolved
//! by the [BuiltinClassLoader], which is the parent of every
//! [IsolatedClassLoader](crate::class_loader::IsolatedClassLoader) created by the launcher. This
//! is the only place where a class name is dynamically mapped to a function.
//!
//! ```
//! use springtime_loader::entry_point;
//! use std::convert::Infallible;
//!
//! #[entry_point(class = "com.example.App")]
//! fn main_app(args: Vec<String>) -> Result<(), Infallible> {
//!     println!("Started with {args:?}");
//!     Ok(())
//! }
//! # fn main() {}
//! ```

use crate::class_loader::{Class, ClassLoader, ClassLoaderPtr, ClassPtr, PackagePtr, Resource};
use crate::error::ClassLoaderError;
use fxhash::FxHashMap;
use once_cell::sync::Lazy;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, warn};

pub type ErrorPtr = Arc<dyn Error + Send + Sync>;

/// Signature of an application entry point, receiving process arguments without the program name.
pub type MainFn = fn(Vec<String>) -> Result<(), ErrorPtr>;

/// Definition of a builtin class.
#[derive(Clone, Copy, Debug)]
pub struct ClassDefinition {
    pub name: &'static str,
    pub main: Option<MainFn>,
}

/// Conversion of entry point return values into a common result.
pub trait EntryPointResult {
    fn into_result(self) -> Result<(), ErrorPtr>;
}

impl EntryPointResult for () {
    #[inline]
    fn into_result(self) -> Result<(), ErrorPtr> {
        Ok(())
    }
}

impl<E: Error + Send + Sync + 'static> EntryPointResult for Result<(), E> {
    fn into_result(self) -> Result<(), ErrorPtr> {
        self.map_err(|error| Arc::new(error) as ErrorPtr)
    }
}

/// Registers a builtin class without an entry point, e.g. to make a marker class resolvable.
///
/// ```
/// springtime_loader::register_class!("org.example.Marker");
/// # fn main() {}
/// ```
#[macro_export]
macro_rules! register_class {
    ($name:literal) => {
        const _: () = {
            fn register() -> $crate::entry_point::ClassDefinition {
                $crate::entry_point::ClassDefinition {
                    name: $name,
                    main: None,
                }
            }

            $crate::entry_point::internal::submit! {
                $crate::entry_point::internal::ClassRegisterer { register }
            };
        };
    };
}

/// Class loader resolving builtin classes.
#[derive(Debug, Default)]
pub struct BuiltinClassLoader {
    classes: FxHashMap<&'static str, ClassPtr>,
}

impl BuiltinClassLoader {
    /// Creates a loader from all statically registered classes.
    pub fn from_registry() -> Self {
        Self::from_definitions(
            inventory::iter::<internal::ClassRegisterer>
                .into_iter()
                .map(|registerer| (registerer.register)()),
        )
    }

    /// Creates a loader from given definitions. When a name is defined more than once, the first
    /// definition wins.
    pub fn from_definitions<I: IntoIterator<Item = ClassDefinition>>(definitions: I) -> Self {
        let mut classes = FxHashMap::default();
        for definition in definitions {
            if classes.contains_key(definition.name) {
                warn!(
                    name = definition.name,
                    "Ignoring duplicate builtin class definition"
                );
                continue;
            }

            debug!(name = definition.name, "Registering builtin class");
            classes.insert(
                definition.name,
                Arc::new(Class::builtin(definition.name, definition.main)),
            );
        }

        Self { classes }
    }

    /// Returns the process-wide loader created from the static registry.
    pub fn shared() -> ClassLoaderPtr {
        static SHARED: Lazy<ClassLoaderPtr> =
            Lazy::new(|| Arc::new(BuiltinClassLoader::from_registry()));

        SHARED.clone()
    }
}

impl ClassLoader for BuiltinClassLoader {
    fn load_class(&self, name: &str, _resolve: bool) -> Result<ClassPtr, ClassLoaderError> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| ClassLoaderError::ClassNotFound(name.to_string()))
    }

    fn find_resource(&self, _name: &str) -> Option<Resource> {
        None
    }

    fn find_resources(&self, _name: &str) -> Vec<Resource> {
        vec![]
    }

    fn package(&self, _name: &str) -> Option<PackagePtr> {
        None
    }

    fn parent(&self) -> Option<ClassLoaderPtr> {
        None
    }
}

#[doc(hidden)]
pub mod internal {
    use crate::entry_point::ClassDefinition;
    use inventory::collect;
    pub use inventory::submit;

    pub struct ClassRegisterer {
        pub register: fn() -> ClassDefinition,
    }

    collect!(ClassRegisterer);
}

//! Launcher for self-contained executable archives.
//!
//! A packaged application is a single artifact carrying its own classes under
//! `BOOT-INF/classes/` and its libraries as nested archives under `BOOT-INF/lib/`. The
//! [Launcher](launcher::Launcher) turns such artifact into a flat list of
//! [Archives](archive::Archive), builds an [IsolatedClassLoader](class_loader::IsolatedClassLoader)
//! over them and hands control to the entry point named by the `Start-Class` manifest attribute.
//!
//! Entry points are plain functions compiled into the running binary and registered with the
//! [entry_point] attribute, which makes them resolvable by name at launch time.
//!
//! ### Features
//!
//! * `derive` - enable the `#[entry_point]` attribute

pub mod archive;
pub mod class_loader;
pub mod entry_point;
pub mod error;
pub mod launcher;

#[cfg(feature = "derive")]
pub use springtime_loader_derive::entry_point;

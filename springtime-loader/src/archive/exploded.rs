//! Archives exploded on the filesystem, typically used when running an application directly from
//! its build output.

use crate::archive::manifest::{Manifest, MANIFEST_NAME};
use crate::archive::packaged::PackagedArchive;
use crate::archive::{is_safe_entry_name, Archive, ArchivePtr, ArchiveUrl, Entry};
use crate::error::ArchiveError;
use bytes::Bytes;
use itertools::Itertools;
use once_cell::sync::OnceCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An archive backed by a directory. Entries are listed depth-first with siblings sorted by name.
#[derive(Debug)]
pub struct ExplodedArchive {
    root: PathBuf,
    manifest: OnceCell<Option<Arc<Manifest>>>,
}

impl ExplodedArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest: OnceCell::new(),
        }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn io_error(&self, path: &Path) -> impl FnOnce(io::Error) -> ArchiveError {
        let path = path.to_path_buf();
        move |source| ArchiveError::Io { path, source }
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let relative = name.trim_end_matches('/');
        if relative.is_empty() || !is_safe_entry_name(relative) {
            return None;
        }

        Some(self.root.join(relative))
    }

    fn collect_entries(&self, directory: &Path, entries: &mut Vec<Entry>) -> Result<(), ArchiveError> {
        let children = fs::read_dir(directory)
            .map_err(self.io_error(directory))?
            .map(|child| child.and_then(|child| Ok((child.path(), child.file_type()?))))
            .collect::<Result<Vec<_>, _>>()
            .map_err(self.io_error(directory))?;

        for (path, file_type) in children
            .into_iter()
            .sorted_by(|(left, _), (right, _)| left.cmp(right))
        {
            let Some(name) = self.entry_name(&path) else {
                continue;
            };

            if file_type.is_dir() {
                entries.push(Entry::new(format!("{name}/"), true));
                self.collect_entries(&path, entries)?;
            } else if file_type.is_symlink() && path.is_dir() {
                // linked directories are listed without descending into them
                entries.push(Entry::new(format!("{name}/"), true));
            } else {
                entries.push(Entry::new(name, false));
            }
        }

        Ok(())
    }

    fn entry_name(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let name = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .join("/");

        (!name.is_empty()).then_some(name)
    }

    fn nested(&self, entry: &Entry) -> Result<Option<ArchivePtr>, ArchiveError> {
        let Some(path) = self.resolve(entry.name()) else {
            return Ok(None);
        };

        if entry.is_directory() {
            Ok(Some(Arc::new(ExplodedArchive::new(path))))
        } else {
            Ok(Some(Arc::new(PackagedArchive::open(path)?)))
        }
    }
}

impl Archive for ExplodedArchive {
    fn url(&self) -> ArchiveUrl {
        ArchiveUrl::directory(self.root.clone())
    }

    fn manifest(&self) -> Result<Option<Arc<Manifest>>, ArchiveError> {
        self.manifest
            .get_or_try_init(|| {
                let path = self.root.join(MANIFEST_NAME);
                match fs::read(&path) {
                    Ok(content) => Ok(Some(Arc::new(Manifest::parse(&content)))),
                    Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
                    Err(error) => Err(ArchiveError::Io {
                        path,
                        source: error,
                    }),
                }
            })
            .cloned()
    }

    fn entries(&self) -> Result<Vec<Entry>, ArchiveError> {
        let mut entries = vec![];
        self.collect_entries(&self.root, &mut entries)?;
        Ok(entries)
    }

    fn entry(&self, name: &str) -> Result<Option<Entry>, ArchiveError> {
        let Some(path) = self.resolve(name) else {
            return Ok(None);
        };

        let is_directory = name.ends_with('/');
        Ok(match fs::metadata(&path) {
            Ok(metadata) if metadata.is_dir() == is_directory => Some(Entry::new(name, is_directory)),
            _ => None,
        })
    }

    fn read_entry(&self, name: &str) -> Result<Option<Bytes>, ArchiveError> {
        let Some(path) = self.resolve(name) else {
            return Ok(None);
        };

        if name.ends_with('/') || !path.is_file() {
            return Ok(None);
        }

        fs::read(&path)
            .map(|content| Some(Bytes::from(content)))
            .map_err(self.io_error(&path))
    }

    fn nested_archives(
        &self,
        filter: &dyn Fn(&Entry) -> bool,
    ) -> Result<Vec<ArchivePtr>, ArchiveError> {
        let mut archives = vec![];
        for entry in self.entries()?.iter().filter(|entry| filter(entry)) {
            if let Some(archive) = self.nested(entry)? {
                archives.push(archive);
            }
        }

        Ok(archives)
    }

    fn nested_archive(&self, name: &str) -> Result<Option<ArchivePtr>, ArchiveError> {
        let Some(path) = self.resolve(name) else {
            return Ok(None);
        };

        let name = name.trim_end_matches('/');
        if path.is_dir() {
            self.nested(&Entry::new(format!("{name}/"), true))
        } else if path.is_file() {
            self.nested(&Entry::new(name, false))
        } else {
            Ok(None)
        }
    }

    #[inline]
    fn is_packaged(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use crate::archive::exploded::ExplodedArchive;
    use crate::archive::fixtures::TarFixture;
    use crate::archive::{Archive, ArchiveUrl};
    use std::fs;
    use std::path::Path;

    fn write(root: &Path, name: &str, content: &[u8]) {
        let path = root.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn application(root: &Path) {
        write(root, "META-INF/MANIFEST.MF", b"Start-Class: com.example.App\n");
        write(root, "BOOT-INF/classes/com/example/App.class", b"app");
        write(
            root,
            "BOOT-INF/lib/a.jar",
            &TarFixture::new().file("org/a/A.class", b"a").build(),
        );
    }

    #[test]
    fn should_list_entries_depth_first() {
        let directory = tempfile::tempdir().unwrap();
        application(directory.path());

        let archive = ExplodedArchive::new(directory.path());
        let names = archive
            .entries()
            .unwrap()
            .into_iter()
            .map(|entry| entry.name().to_string())
            .collect::<Vec<_>>();

        assert_eq!(
            names,
            vec![
                "BOOT-INF/",
                "BOOT-INF/classes/",
                "BOOT-INF/classes/com/",
                "BOOT-INF/classes/com/example/",
                "BOOT-INF/classes/com/example/App.class",
                "BOOT-INF/lib/",
                "BOOT-INF/lib/a.jar",
                "META-INF/",
                "META-INF/MANIFEST.MF",
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn should_not_descend_into_linked_directories() {
        let directory = tempfile::tempdir().unwrap();
        let root = directory.path();
        write(root, "a/b.txt", b"b");
        std::os::unix::fs::symlink(root, root.join("a/loop")).unwrap();

        let archive = ExplodedArchive::new(root);
        let names = archive
            .entries()
            .unwrap()
            .into_iter()
            .map(|entry| entry.name().to_string())
            .collect::<Vec<_>>();

        assert_eq!(names, vec!["a/", "a/b.txt", "a/loop/"]);
    }

    #[test]
    fn should_expose_nested_archives() {
        let directory = tempfile::tempdir().unwrap();
        application(directory.path());

        let archive = ExplodedArchive::new(directory.path());
        let nested = archive
            .nested_archives(&|entry| {
                entry.name() == "BOOT-INF/classes/"
                    || (!entry.is_directory() && entry.name().starts_with("BOOT-INF/lib/"))
            })
            .unwrap();

        assert_eq!(nested.len(), 2);
        assert_eq!(
            nested[0].url(),
            ArchiveUrl::directory(directory.path().join("BOOT-INF/classes"))
        );
        assert!(!nested[0].is_packaged());
        assert!(nested[0].entry("com/example/App.class").unwrap().is_some());
        assert!(nested[1].is_packaged());
        assert!(nested[1].entry("org/a/A.class").unwrap().is_some());
    }

    #[test]
    fn should_read_manifest_and_entries() {
        let directory = tempfile::tempdir().unwrap();
        application(directory.path());

        let archive = ExplodedArchive::new(directory.path());
        assert_eq!(
            archive
                .manifest()
                .unwrap()
                .unwrap()
                .main_attributes()
                .value("Start-Class"),
            Some("com.example.App")
        );
        assert_eq!(
            &archive
                .read_entry("BOOT-INF/classes/com/example/App.class")
                .unwrap()
                .unwrap()[..],
            b"app"
        );
        assert!(archive.entry("BOOT-INF/classes/").unwrap().is_some());
        assert!(archive.entry("BOOT-INF/classes").unwrap().is_none());
        assert!(archive.entry("../outside").unwrap().is_none());
    }

    #[test]
    fn should_report_missing_manifest() {
        let directory = tempfile::tempdir().unwrap();
        assert!(ExplodedArchive::new(directory.path())
            .manifest()
            .unwrap()
            .is_none());
    }
}

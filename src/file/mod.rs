//! Input abstraction for classfile sources.
//!
//! This module hides where class bytes come from. A compilation run is fed a list of
//! [`crate::file::ClassSource`]s (a directory tree of `.class` files, a `.jar`/`.zip` archive,
//! a single classfile, or an in-memory buffer). Each source is expanded into a list of
//! [`crate::file::SourceEntry`] values that own a [`crate::file::Backend`] holding the bytes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   expand()    ┌──────────────┐   Backend::data()   ┌──────────────────┐
//! │ ClassSource  │ ────────────▶ │ SourceEntry  │ ──────────────────▶ │ classfile parser │
//! │ dir/jar/file │               │ name+backend │                     └──────────────────┘
//! └──────────────┘               └──────────────┘
//!        │                              ▲
//!        │ archive                      │ Physical (mmap) / Memory (inflated, in-memory)
//!        ▼                              │
//! ┌──────────────┐  by_index            │
//! │ ZipArchive   │ ─────────────────────┘
//! └──────────────┘
//! ```
//!
//! Backends are dropped as soon as the parser is done with them, so file handles and mappings
//! only live for the parse phase, including when parsing fails.
//!
//! # Key Components
//!
//! - [`crate::file::Backend`] - Trait for different data sources (disk files, memory buffers)
//! - [`crate::file::physical::Physical`] - Memory-mapped file backend
//! - [`crate::file::memory::Memory`] - In-memory buffer backend
//! - [`crate::file::parser::Parser`] - Cursor used by every decoder in the crate
//! - [`crate::file::archive`] - Zip container reader

pub mod archive;
pub mod io;
mod memory;
pub mod parser;
mod physical;

use std::path::{Path, PathBuf};

pub use memory::Memory;
pub use physical::Physical;

use crate::Result;

/// Name of the configuration fragment an archive may carry at its root.
pub const CONFIG_FRAGMENT_NAME: &str = "jvmaot.json";

/// Backend trait for the byte storage behind a source entry.
pub trait Backend {
    /// Returns a bounds-checked slice of the data.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the data.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the complete data.
    fn data(&self) -> &[u8];

    /// Returns the total size of the data.
    fn len(&self) -> usize;

    /// Returns `true` when the backend holds no data.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single place classes are loaded from.
#[derive(Debug, Clone)]
pub enum ClassSource {
    /// A directory searched recursively for `*.class` files.
    Directory(PathBuf),
    /// A `.jar` or `.zip` archive.
    Archive(PathBuf),
    /// A single `.class` file.
    Class(PathBuf),
    /// An in-memory classfile, mostly used by tests and embedders.
    Memory {
        /// Display name used in diagnostics
        name: String,
        /// Raw classfile bytes
        data: Vec<u8>,
    },
}

impl ClassSource {
    /// Classifies a filesystem path into the matching source kind.
    ///
    /// Directories become [`ClassSource::Directory`], files ending in `.jar` or `.zip` become
    /// [`ClassSource::Archive`], anything else is treated as a single classfile.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        if path.is_dir() {
            return ClassSource::Directory(path.to_path_buf());
        }

        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("jar") || ext.eq_ignore_ascii_case("zip") => {
                ClassSource::Archive(path.to_path_buf())
            }
            _ => ClassSource::Class(path.to_path_buf()),
        }
    }

    /// Expands the source into its class entries and optional configuration fragment.
    ///
    /// Entries are returned in a deterministic order (sorted by name for directories, central
    /// directory order for archives) so repeated runs visit classes identically.
    ///
    /// # Errors
    /// Returns an error if a file cannot be opened or an archive is malformed.
    pub fn expand(&self) -> Result<SourceContents> {
        match self {
            ClassSource::Directory(root) => {
                let mut paths = Vec::new();
                collect_class_files(root, &mut paths)?;
                paths.sort();

                let mut entries = Vec::with_capacity(paths.len());
                for path in paths {
                    entries.push(SourceEntry {
                        name: path.display().to_string(),
                        backend: Box::new(Physical::new(&path)?),
                    });
                }

                Ok(SourceContents {
                    entries,
                    config_fragment: None,
                })
            }
            ClassSource::Archive(path) => {
                let physical = Physical::new(path)?;
                archive::read_archive(physical.data())
            }
            ClassSource::Class(path) => Ok(SourceContents {
                entries: vec![SourceEntry {
                    name: path.display().to_string(),
                    backend: Box::new(Physical::new(path)?),
                }],
                config_fragment: None,
            }),
            ClassSource::Memory { name, data } => Ok(SourceContents {
                entries: vec![SourceEntry {
                    name: name.clone(),
                    backend: Box::new(Memory::new(data.clone())),
                }],
                config_fragment: None,
            }),
        }
    }
}

/// One classfile ready to be parsed.
pub struct SourceEntry {
    /// Display name (path or archive entry name)
    pub name: String,
    /// Storage holding the classfile bytes
    pub backend: Box<dyn Backend>,
}

/// Everything a [`ClassSource`] contributed.
pub struct SourceContents {
    /// Classfiles in deterministic order
    pub entries: Vec<SourceEntry>,
    /// Raw JSON configuration fragment found in an archive, if any
    pub config_fragment: Option<String>,
}

fn collect_class_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_class_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "class") {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path_classification() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ClassSource::from_path(dir.path()),
            ClassSource::Directory(_)
        ));
        assert!(matches!(
            ClassSource::from_path(Path::new("lib/rt.JAR")),
            ClassSource::Archive(_)
        ));
        assert!(matches!(
            ClassSource::from_path(Path::new("Main.class")),
            ClassSource::Class(_)
        ));
    }

    #[test]
    fn test_directory_expansion_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/B.class"), [0xCA, 0xFE]).unwrap();
        std::fs::write(dir.path().join("A.class"), [0xCA, 0xFE]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"skip").unwrap();

        let contents = ClassSource::Directory(dir.path().to_path_buf())
            .expand()
            .unwrap();
        let names: Vec<_> = contents
            .entries
            .iter()
            .map(|e| Path::new(&e.name).file_name().unwrap().to_owned())
            .collect();
        assert_eq!(names, vec!["A.class", "B.class"]);
        assert_eq!(contents.entries[0].backend.data(), &[0xCA, 0xFE]);
    }
}

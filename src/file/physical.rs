//! Physical file backend for memory-mapped I/O.
//!
//! Classfiles and archives are mapped read-only for the duration of the parse phase. The
//! mapping (and with it the file handle) is released when the [`Physical`] value is dropped.

use std::{fs, path::Path};

use memmap2::Mmap;

use super::Backend;
use crate::{
    Error::{Empty, Error, FileError, OutOfBounds},
    Result,
};

/// Memory-mapped, read-only view of a file on disk.
#[derive(Debug)]
pub struct Physical {
    data: Option<Mmap>,
}

impl Physical {
    /// Opens and maps the file at `path`.
    ///
    /// Zero-length files cannot be mapped on every platform, so they are represented by an
    /// empty backend instead.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened, or a generic error if
    /// the mapping fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(error) => return Err(FileError(error)),
        };

        if file.metadata()?.len() == 0 {
            return Ok(Physical { data: None });
        }

        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => mmap,
            Err(error) => return Err(Error(error.to_string())),
        };

        Ok(Physical { data: Some(mmap) })
    }

    /// Like [`Physical::new`], but rejects empty files.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for zero-length files.
    pub fn non_empty(path: impl AsRef<Path>) -> Result<Physical> {
        let physical = Self::new(path)?;
        if physical.data.is_none() {
            return Err(Empty);
        }
        Ok(physical)
    }
}

impl Backend for Physical {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(OutOfBounds);
        };

        let data = self.data();
        if offset_end > data.len() {
            return Err(OutOfBounds);
        }

        Ok(&data[offset..offset_end])
    }

    fn data(&self) -> &[u8] {
        match &self.data {
            Some(mmap) => mmap.as_ref(),
            None => &[],
        }
    }

    fn len(&self) -> usize {
        self.data().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_maps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Probe.class");
        std::fs::write(&path, [0xCA, 0xFE, 0xBA, 0xBE, 0x00]).unwrap();

        let physical = Physical::new(&path).unwrap();
        assert_eq!(physical.len(), 5);
        assert_eq!(physical.data_slice(1, 2).unwrap(), &[0xFE, 0xBA]);
        assert!(physical.data_slice(4, 2).is_err());
    }

    #[test]
    fn test_physical_empty_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Empty.class");
        std::fs::write(&path, []).unwrap();

        assert!(Physical::new(&path).unwrap().is_empty());
        assert!(matches!(Physical::non_empty(&path), Err(Empty)));
        assert!(matches!(
            Physical::new(dir.path().join("Missing.class")),
            Err(FileError(_))
        ));
    }
}

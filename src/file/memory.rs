//! In-memory backend for classfiles that never touched the disk (archive members, tests).

use super::Backend;
use crate::{Error::OutOfBounds, Result};

/// Owned byte buffer backend.
#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Wraps an owned buffer.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Memory {
        Memory { data }
    }
}

impl Backend for Memory {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(OutOfBounds);
        };

        if offset_end > self.data.len() {
            return Err(OutOfBounds);
        }

        Ok(&self.data[offset..offset_end])
    }

    fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_slices() {
        let memory = Memory::new(vec![0xCA, 0xFE, 0xBA, 0xBE]);

        assert_eq!(memory.len(), 4);
        assert_eq!(memory.data_slice(2, 2).unwrap(), &[0xBA, 0xBE]);
        assert!(memory.data_slice(3, 2).is_err());
        assert!(memory.data_slice(usize::MAX, 2).is_err());
    }
}

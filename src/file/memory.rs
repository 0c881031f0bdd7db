//! In-memory backend for class files.
//!
//! Used for class files produced by the synthesizer itself and for fixtures authored with the
//! class builder.

use super::Backend;
use crate::Result;

/// Owned byte buffer holding one class file.
#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Create a new memory backend
    ///
    /// ## Arguments
    /// * 'data' - The data buffer to consume
    pub fn new(data: Vec<u8>) -> Memory {
        Memory { data }
    }
}

impl Backend for Memory {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(out_of_bounds_error!());
        };

        if offset_end > self.data.len() {
            return Err(out_of_bounds_error!());
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
    fn memory() {
        let mut data = vec![0xCA_u8; 64];
        data[10..14].copy_from_slice(&[0xCA, 0xFE, 0xBA, 0xBE]);

        let memory = Memory::new(data);

        assert_eq!(memory.len(), 64);
        assert_eq!(memory.data_slice(10, 4).unwrap(), &[0xCA, 0xFE, 0xBA, 0xBE]);
        assert!(memory
            .data_slice(u32::MAX as usize, u32::MAX as usize)
            .is_err());
        assert!(memory.data_slice(0, 65).is_err());
        assert!(memory.data_slice(usize::MAX, 1).is_err());
    }

    #[test]
    fn empty_buffer() {
        let memory = Memory::new(vec![]);

        assert_eq!(memory.len(), 0);
        assert!(memory.data().is_empty());
        assert_eq!(memory.data_slice(0, 0).unwrap(), &[] as &[u8]);
        assert!(memory.data_slice(0, 1).is_err());
    }
}

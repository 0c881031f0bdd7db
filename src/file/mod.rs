//! Class-file byte sources and low-level reading utilities.
//!
//! Every class file the synthesizer looks at arrives as a [`crate::file::ClassBytes`] handle.
//! The handle abstracts over where the bytes live, so a loading context can serve class files
//! straight out of a memory map or out of an owned buffer without copying.
//!
//! # Key Components
//!
//! - [`crate::file::ClassBytes`] - Cheaply clonable, shared handle to the bytes of one class file
//! - [`crate::file::Backend`] - Trait for different data sources (disk files, memory buffers)
//! - [`crate::file::parser::Parser`] - Bounds-checked big-endian cursor
//! - [`crate::file::io`] - Big-endian read and write helpers
//!
//! # Backend Implementations
//!
//! - `Physical` - Memory-mapped file backend for `.class` files on disk
//! - `Memory` - In-memory buffer backend for generated or embedded class files
//!
//! # Examples
//!
//! ```rust
//! use dynsubclass::ClassBytes;
//!
//! let bytes = ClassBytes::from_vec(vec![0xCA, 0xFE, 0xBA, 0xBE]);
//! assert_eq!(bytes.len(), 4);
//! assert_eq!(&bytes[..2], &[0xCA, 0xFE]);
//! assert_eq!(bytes.data_slice(2, 2)?, &[0xBA, 0xBE]);
//! # Ok::<(), dynsubclass::Error>(())
//! ```

pub mod io;
pub mod parser;

mod memory;
mod physical;

use std::{fmt, ops::Deref, path::Path, sync::Arc};

use crate::Result;
use memory::Memory;
use physical::Physical;

/// Backend trait for class-file data sources.
///
/// Implementations must be thread-safe; a single [`ClassBytes`] may be read concurrently by
/// every synthesis request that touches the same type hierarchy.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

/// Shared, immutable bytes of a single class file.
#[derive(Clone)]
pub struct ClassBytes {
    backend: Arc<dyn Backend>,
}

impl ClassBytes {
    /// Wrap an owned buffer.
    #[must_use]
    pub fn from_vec(data: Vec<u8>) -> Self {
        ClassBytes {
            backend: Arc::new(Memory::new(data)),
        }
    }

    /// Memory-map a `.class` file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(ClassBytes {
            backend: Arc::new(Physical::new(path)?),
        })
    }

    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the requested range is out of bounds.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.backend.data_slice(offset, len)
    }

    /// Returns the entire class file.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.backend.data()
    }

    /// Returns the length of the class file in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.backend.len()
    }

    /// Returns `true` if the class file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backend.len() == 0
    }
}

impl Deref for ClassBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.backend.data()
    }
}

impl AsRef<[u8]> for ClassBytes {
    fn as_ref(&self) -> &[u8] {
        self.backend.data()
    }
}

impl From<Vec<u8>> for ClassBytes {
    fn from(data: Vec<u8>) -> Self {
        ClassBytes::from_vec(data)
    }
}

impl fmt::Debug for ClassBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassBytes")
            .field("len", &self.len())
            .finish()
    }
}

//! Low-level byte order and safe reading/writing utilities for class-file parsing.
//!
//! The JVM class-file format stores every multi-byte quantity in big-endian order
//! (JVMS §4.1). This module provides bounds-checked reads from byte slices and appending
//! writes into growable buffers, both generic over the [`crate::file::io::ClassIO`] trait.
//!
//! # Key Components
//!
//! - [`crate::file::io::ClassIO`] - Trait defining big-endian conversion for primitive types
//! - [`crate::file::io::read_be`] - Read a value from the start of a buffer
//! - [`crate::file::io::read_be_at`] - Read a value at an offset, advancing the offset
//! - [`crate::file::io::write_be`] - Append a value to a growable buffer
//!
//! # Examples
//!
//! ```rust,ignore
//! use dynsubclass::file::io::{read_be_at, write_be};
//!
//! let mut out = Vec::new();
//! write_be(&mut out, 0xCAFE_BABEu32);
//! write_be(&mut out, 52u16);
//!
//! let mut offset = 0;
//! let magic: u32 = read_be_at(&out, &mut offset)?;
//! let major: u16 = read_be_at(&out, &mut offset)?;
//! assert_eq!((magic, major, offset), (0xCAFE_BABE, 52, 6));
//! # Ok::<(), dynsubclass::Error>(())
//! ```
//!
//! # Error Handling
//!
//! All reading functions return [`crate::Error::OutOfBounds`] if there are insufficient bytes
//! in the buffer. Writing into a `Vec<u8>` cannot fail.

use crate::Result;

/// Trait for type-specific, big-endian binary conversions.
///
/// Each implementation defines a `Bytes` associated type that represents the fixed-size
/// byte array required for that particular type (e.g., `[u8; 4]` for `u32`).
pub trait ClassIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in big-endian
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in big-endian
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_class_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl ClassIO for $ty {
                type Bytes = [u8; $len];

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_class_io!(
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
);

/// Safely reads a value of type `T` in big-endian byte order from the start of a buffer.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the buffer is shorter than `T`.
pub fn read_be<T: ClassIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_be_at(data, &mut offset)
}

/// Safely reads a value of type `T` in big-endian byte order at a specific offset.
///
/// The offset is advanced by the number of bytes read.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes after `offset`.
pub fn read_be_at<T: ClassIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;

    Ok(T::from_be_bytes(read))
}

/// Appends a value of type `T` in big-endian byte order to `out`.
pub fn write_be<T: ClassIO>(out: &mut Vec<u8>, value: T) {
    out.extend_from_slice(value.to_be_bytes().as_ref());
}

/// Overwrites the bytes at `offset` with `value` in big-endian byte order.
///
/// Used to back-patch length prefixes once the length of a nested structure is known.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if `value` does not fit at `offset`.
pub fn patch_be_at<T: ClassIO>(out: &mut [u8], offset: usize, value: T) -> Result<()> {
    let bytes = value.to_be_bytes();
    let bytes = bytes.as_ref();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(out_of_bounds_error!());
    };
    if end > out.len() {
        return Err(out_of_bounds_error!());
    }

    out[offset..end].copy_from_slice(bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_big_endian_values() {
        let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x34];
        let mut offset = 0;

        assert_eq!(read_be_at::<u32>(&data, &mut offset).unwrap(), 0xCAFE_BABE);
        assert_eq!(read_be_at::<u16>(&data, &mut offset).unwrap(), 52);
        assert_eq!(offset, 6);
        assert!(matches!(
            read_be_at::<u8>(&data, &mut offset),
            Err(crate::Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn read_does_not_advance_on_failure() {
        let data = [0x01, 0x02, 0x03];
        let mut offset = 1;

        assert!(read_be_at::<u32>(&data, &mut offset).is_err());
        assert_eq!(offset, 1);

        let mut overflowing = usize::MAX;
        assert!(read_be_at::<u16>(&data, &mut overflowing).is_err());
    }

    #[test]
    fn write_and_patch() {
        let mut out = Vec::new();
        write_be(&mut out, 0u32);
        write_be(&mut out, -2i16);
        write_be(&mut out, 1.5f64);
        patch_be_at(&mut out, 0, 0x0102_0304u32).unwrap();

        assert_eq!(&out[..6], &[0x01, 0x02, 0x03, 0x04, 0xFF, 0xFE]);
        assert_eq!(read_be::<f64>(&out[6..]).unwrap(), 1.5);
        let last = out.len() - 1;
        assert!(patch_be_at(&mut out, last, 7u16).is_err());
    }
}

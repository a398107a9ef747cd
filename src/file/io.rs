//! Big-endian primitive reads over byte buffers.
//!
//! Classfiles store every multi-byte quantity in big-endian order. Values are read through the
//! [`ClassIO`] trait and the bounds-checked [`read_be_at`] helper, which advances a caller-owned
//! offset.
//!
//! # Key Components
//!
//! - [`crate::file::io::ClassIO`] - Trait implemented by all fixed-size primitives
//! - [`crate::file::io::read_be_at`] - Big-endian read with offset advance
//!
//! # Examples
//!
//! ```rust
//! use jvmaot::file::io::read_be_at;
//!
//! let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x34];
//! let mut offset = 0;
//! let magic: u32 = read_be_at(&data, &mut offset)?;
//! assert_eq!(magic, 0xCAFEBABE);
//! let major: u16 = read_be_at(&data, &mut offset)?;
//! assert_eq!(major, 52);
//! # Ok::<(), jvmaot::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Trait for fixed-size primitives that can be decoded from big-endian bytes.
///
/// Implemented for `u8`, `u16`, `u32`, `u64`, `i8`, `i16`, `i32`, `i64`, `f32` and `f64`.
pub trait ClassIO: Sized {
    /// Associated byte array type for this numeric type.
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in big-endian
    fn from_be_bytes(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_class_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl ClassIO for $ty {
                type Bytes = [u8; $len];

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }
            }
        )*
    };
}

impl_class_io! {
    u8 => 1, i8 => 1,
    u16 => 2, i16 => 2,
    u32 => 4, i32 => 4,
    u64 => 8, i64 => 8,
    f32 => 4, f64 => 8,
}

fn take_bytes<T: ClassIO>(data: &[u8], offset: &mut usize) -> Result<T::Bytes> {
    let type_len = std::mem::size_of::<T>();
    let end = offset.checked_add(type_len).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(read)
}

/// Reads a value of type `T` in big-endian order at `offset` and advances it.
///
/// # Arguments
///
/// * `data` - The byte buffer to read from
/// * `offset` - Mutable reference to the offset position (advanced after reading)
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_be_at<T: ClassIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    Ok(T::from_be_bytes(take_bytes::<T>(data, offset)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_be_advances() {
        let data = [0x00, 0x01, 0x02, 0x03];
        let mut offset = 0;
        assert_eq!(read_be_at::<u16>(&data, &mut offset).unwrap(), 0x0001);
        assert_eq!(read_be_at::<u16>(&data, &mut offset).unwrap(), 0x0203);
        assert_eq!(offset, 4);
    }

    #[test]
    fn test_read_out_of_bounds_keeps_offset() {
        let data = [0x00, 0x01, 0x02];
        let mut offset = 1;
        assert!(matches!(
            read_be_at::<u32>(&data, &mut offset),
            Err(crate::Error::OutOfBounds)
        ));
        assert_eq!(offset, 1);
    }

    #[test]
    fn test_read_floats() {
        let data = 1.5f32.to_be_bytes();
        let mut offset = 0;
        assert_eq!(read_be_at::<f32>(&data, &mut offset).unwrap(), 1.5);

        let data = (-2.25f64).to_be_bytes();
        let mut offset = 0;
        assert_eq!(read_be_at::<f64>(&data, &mut offset).unwrap(), -2.25);
    }
}

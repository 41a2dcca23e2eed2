//! Reinterpret raw byte ranges as numeric arrays.
//!
//! Tag payloads (see [`crate::tag`]) are plain packed
//! arrays; the element type and byte order are decided by
//! the caller. Buffers must hold a whole number of elements.
use byteordered::{byteorder::ReadBytesExt, ByteOrdered, Endian, Endianness};
use ndarray::Array1;

use crate::error::{Error, Result};

/// A fixed-size value that can be read from a byte stream
/// in either byte order.
pub trait Parseable: Sized {
    const SIZE: usize;
    fn parse<T: ReadBytesExt, E: Endian>(r: &mut ByteOrdered<T, E>) -> std::io::Result<Self>;
}

macro_rules! impl_parseable {
    ($ty:ty, $method:ident) => {
        impl Parseable for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();
            fn parse<T: ReadBytesExt, E: Endian>(
                r: &mut ByteOrdered<T, E>,
            ) -> std::io::Result<Self> {
                r.$method()
            }
        }
    };
}

impl_parseable!(u16, read_u16);
impl_parseable!(i16, read_i16);
impl_parseable!(u32, read_u32);
impl_parseable!(i32, read_i32);
impl_parseable!(f32, read_f32);
impl_parseable!(f64, read_f64);

/// Decode `bytes` as a packed array of `T`.
///
/// Fails with [`Error::MisalignedBuffer`] if the length is
/// not a multiple of the element size.
pub fn bytes_to_array<T: Parseable>(bytes: &[u8], endianness: Endianness) -> Result<Array1<T>> {
    if bytes.len() % T::SIZE != 0 {
        return Err(Error::MisalignedBuffer {
            len: bytes.len(),
            size: T::SIZE,
        });
    }

    let count = bytes.len() / T::SIZE;
    let mut rdr = ByteOrdered::runtime(bytes, endianness);
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(T::parse(&mut rdr)?);
    }
    Ok(Array1::from(out))
}

/// Bit-exact reinterpretation of 4-byte groups as `f32`.
pub fn bytes_to_f32(bytes: &[u8], endianness: Endianness) -> Result<Array1<f32>> {
    bytes_to_array(bytes, endianness)
}

pub fn bytes_to_u16(bytes: &[u8], endianness: Endianness) -> Result<Array1<u16>> {
    bytes_to_array(bytes, endianness)
}

pub fn bytes_to_i16(bytes: &[u8], endianness: Endianness) -> Result<Array1<i16>> {
    bytes_to_array(bytes, endianness)
}

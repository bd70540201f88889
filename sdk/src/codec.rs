/*!
Little-endian value codec.

Every multi-byte value in a Motion data message or take file is stored in
little-endian order, independent of the host. All decoding goes through the
functions in this module.
*/

use num_traits::Zero;

/// Read a little-endian `i32` from the start of `bytes`
pub fn read_le_i32(bytes: &[u8]) -> Option<i32> {
    let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    Some(i32::from_le_bytes(raw))
}

/// Read a little-endian `f32` from the start of `bytes`
pub fn read_le_f32(bytes: &[u8]) -> Option<f32> {
    let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    Some(f32::from_le_bytes(raw))
}

/// Read a little-endian `i16` from the start of `bytes`
pub fn read_le_i16(bytes: &[u8]) -> Option<i16> {
    let raw: [u8; 2] = bytes.get(..2)?.try_into().ok()?;
    Some(i16::from_le_bytes(raw))
}

/// A primitive channel value that can be read from a little-endian buffer
pub trait LeValue: Copy + Zero + std::fmt::Debug {
    /// Size of one value in bytes
    const WIDTH: usize;

    /// Read one value from the start of `bytes`
    fn read_le(bytes: &[u8]) -> Option<Self>;

    /// Encode one value, used for building test buffers and take files
    fn write_le(self, out: &mut Vec<u8>);
}

impl LeValue for f32 {
    const WIDTH: usize = 4;

    fn read_le(bytes: &[u8]) -> Option<Self> {
        read_le_f32(bytes)
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl LeValue for i16 {
    const WIDTH: usize = 2;

    fn read_le(bytes: &[u8]) -> Option<Self> {
        read_le_i16(bytes)
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

/// Forward-only reader over a byte slice
#[derive(Debug, Clone)]
pub struct LeReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> LeReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Number of unread bytes
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    pub fn read_i32(&mut self) -> Option<i32> {
        let value = read_le_i32(&self.buffer[self.position..])?;
        self.position += 4;
        Some(value)
    }

    /// Read exactly `count` values, or nothing if fewer remain
    pub fn read_values<T: LeValue>(&mut self, count: usize) -> Option<Vec<T>> {
        let byte_len = count.checked_mul(T::WIDTH)?;
        if byte_len > self.remaining() {
            return None;
        }

        let values = self.buffer[self.position..self.position + byte_len]
            .chunks_exact(T::WIDTH)
            .filter_map(T::read_le)
            .collect();
        self.position += byte_len;
        Some(values)
    }
}

//! Extendable position buffer.
//!
//! All persistent structures in the engine address data by byte offset
//! ("position") into one of these buffers — the trie buffer, the bigram
//! buffer or the shortcut buffer. No component holds pointers into a buffer
//! across a mutation; positions are re-resolved on every dereference and
//! every access is bounds-checked.

use crate::dict::DictError;

/// Byte offset into a buffer. Fixed-width so it can be persisted verbatim.
pub type Position = u32;

/// Sentinel for "no position". Valid because position 0 is always occupied
/// by a reserved record (the root node array, or a pad byte in the side
/// buffers), so no linked field can legitimately point there.
pub const NO_POSITION: Position = 0;

#[derive(Debug, Clone, Default)]
pub struct ExtendableBuffer {
    data: Vec<u8>,
}

impl ExtendableBuffer {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// First position past the written extent.
    pub fn tail_position(&self) -> Position {
        self.data.len() as Position
    }

    fn check(&self, pos: Position, width: usize) -> Result<usize, DictError> {
        let start = pos as usize;
        let end = start
            .checked_add(width)
            .ok_or(DictError::OutOfBounds { position: pos })?;
        if end > self.data.len() {
            return Err(DictError::OutOfBounds { position: pos });
        }
        Ok(start)
    }

    pub fn read_bytes(&self, pos: Position, len: usize) -> Result<&[u8], DictError> {
        let start = self.check(pos, len)?;
        Ok(&self.data[start..start + len])
    }

    pub fn read_u8(&self, pos: Position) -> Result<u8, DictError> {
        let start = self.check(pos, 1)?;
        Ok(self.data[start])
    }

    pub fn read_u16(&self, pos: Position) -> Result<u16, DictError> {
        let start = self.check(pos, 2)?;
        Ok(u16::from_le_bytes(
            self.data[start..start + 2].try_into().unwrap(),
        ))
    }

    /// Code points are stored as 3-byte values (21 significant bits).
    pub fn read_u24(&self, pos: Position) -> Result<u32, DictError> {
        let start = self.check(pos, 3)?;
        let b = &self.data[start..start + 3];
        Ok(u32::from_le_bytes([b[0], b[1], b[2], 0]))
    }

    pub fn read_u32(&self, pos: Position) -> Result<u32, DictError> {
        let start = self.check(pos, 4)?;
        Ok(u32::from_le_bytes(
            self.data[start..start + 4].try_into().unwrap(),
        ))
    }

    /// Writes grow the buffer when they extend past the current tail.
    fn write_bytes(&mut self, pos: Position, bytes: &[u8]) {
        let start = pos as usize;
        let end = start + bytes.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(bytes);
    }

    pub fn write_u8(&mut self, pos: Position, v: u8) {
        self.write_bytes(pos, &[v]);
    }

    pub fn write_u16(&mut self, pos: Position, v: u16) {
        self.write_bytes(pos, &v.to_le_bytes());
    }

    pub fn write_u24(&mut self, pos: Position, v: u32) {
        debug_assert!(v < (1 << 24));
        self.write_bytes(pos, &v.to_le_bytes()[..3]);
    }

    pub fn write_u32(&mut self, pos: Position, v: u32) {
        self.write_bytes(pos, &v.to_le_bytes());
    }

    pub fn append_u8(&mut self, v: u8) -> Position {
        let pos = self.tail_position();
        self.data.push(v);
        pos
    }

    pub fn append_u16(&mut self, v: u16) -> Position {
        let pos = self.tail_position();
        self.data.extend_from_slice(&v.to_le_bytes());
        pos
    }

    pub fn append_u24(&mut self, v: u32) -> Position {
        debug_assert!(v < (1 << 24));
        let pos = self.tail_position();
        self.data.extend_from_slice(&v.to_le_bytes()[..3]);
        pos
    }

    pub fn append_u32(&mut self, v: u32) -> Position {
        let pos = self.tail_position();
        self.data.extend_from_slice(&v.to_le_bytes());
        pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_read() {
        let mut buf = ExtendableBuffer::new();
        let p0 = buf.append_u8(0xab);
        let p1 = buf.append_u16(0x1234);
        let p2 = buf.append_u24(0x10ffff);
        let p3 = buf.append_u32(0xdeadbeef);
        assert_eq!(p0, 0);
        assert_eq!(p1, 1);
        assert_eq!(p2, 3);
        assert_eq!(p3, 6);
        assert_eq!(buf.read_u8(p0).unwrap(), 0xab);
        assert_eq!(buf.read_u16(p1).unwrap(), 0x1234);
        assert_eq!(buf.read_u24(p2).unwrap(), 0x10ffff);
        assert_eq!(buf.read_u32(p3).unwrap(), 0xdeadbeef);
        assert_eq!(buf.tail_position(), 10);
    }

    #[test]
    fn test_write_grows() {
        let mut buf = ExtendableBuffer::new();
        buf.write_u32(8, 42);
        assert_eq!(buf.tail_position(), 12);
        assert_eq!(buf.read_u32(8).unwrap(), 42);
        // Gap is zero-filled
        assert_eq!(buf.read_u32(0).unwrap(), 0);
    }

    #[test]
    fn test_overwrite_in_place() {
        let mut buf = ExtendableBuffer::new();
        buf.append_u32(1);
        buf.write_u32(0, 2);
        assert_eq!(buf.read_u32(0).unwrap(), 2);
        assert_eq!(buf.tail_position(), 4);
    }

    #[test]
    fn test_out_of_bounds_read() {
        let buf = ExtendableBuffer::from_vec(vec![0; 4]);
        assert!(matches!(
            buf.read_u32(1),
            Err(DictError::OutOfBounds { position: 1 })
        ));
        assert!(buf.read_u8(4).is_err());
        assert!(buf.read_u32(u32::MAX).is_err());
    }
}

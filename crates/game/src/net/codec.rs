//! Fixed-width field codec. Every field is written in a fixed order using
//! the host's native byte order; both peers must share endianness.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("datagram truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("unknown packet kind {0}")]
    UnknownKind(u8),
    #[error("unknown event kind {0}")]
    UnknownEvent(u8),
    #[error("payload of {0} bytes does not fit a u16 size field")]
    PayloadTooLarge(usize),
    #[error("{0} entity states do not fit a u16 count")]
    TooManyEntities(usize),
}

/// Types with a defined wire layout.
pub trait Wire: Sized {
    fn write(&self, writer: &mut Writer);
    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtocolError>;
}

#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    #[inline]
    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_ne_bytes());
    }

    #[inline]
    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_ne_bytes());
    }

    #[inline]
    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_ne_bytes());
    }

    #[inline]
    pub fn put_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_ne_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes `text` into exactly `N` bytes, zero padded and cut at a char
    /// boundary if too long.
    pub fn put_fixed_str<const N: usize>(&mut self, text: &str) {
        let mut end = text.len().min(N);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let mut field = [0u8; N];
        field[..end].copy_from_slice(&text.as_bytes()[..end]);
        self.buf.extend_from_slice(&field);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn take<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let bytes = self.take_slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn take_slice(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < len {
            return Err(ProtocolError::Truncated {
                needed: self.pos + len,
                available: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn u16(&mut self) -> Result<u16, ProtocolError> {
        self.take().map(u16::from_ne_bytes)
    }

    pub fn u32(&mut self) -> Result<u32, ProtocolError> {
        self.take().map(u32::from_ne_bytes)
    }

    pub fn u64(&mut self) -> Result<u64, ProtocolError> {
        self.take().map(u64::from_ne_bytes)
    }

    pub fn f32(&mut self) -> Result<f32, ProtocolError> {
        self.take().map(f32::from_ne_bytes)
    }

    /// Reads an `N` byte zero-padded string field.
    pub fn fixed_str<const N: usize>(&mut self) -> Result<String, ProtocolError> {
        let field = self.take::<N>()?;
        let end = field.iter().position(|&b| b == 0).unwrap_or(N);
        Ok(String::from_utf8_lossy(&field[..end]).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_str_pads_and_truncates() {
        let mut writer = Writer::new();
        writer.put_fixed_str::<4>("ab");
        writer.put_fixed_str::<4>("abcdef");
        // 'é' is two bytes and straddles the limit
        writer.put_fixed_str::<4>("abcé");
        let bytes = writer.into_inner();

        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.fixed_str::<4>().unwrap(), "ab");
        assert_eq!(reader.fixed_str::<4>().unwrap(), "abcd");
        assert_eq!(reader.fixed_str::<4>().unwrap(), "abc");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn short_read_reports_truncation() {
        let mut reader = Reader::new(&[1, 2, 3]);
        assert_eq!(
            reader.u32(),
            Err(ProtocolError::Truncated {
                needed: 4,
                available: 3
            })
        );
    }

    #[test]
    fn floats_are_bit_exact() {
        let values = [0.1f32, -0.0, f32::MIN_POSITIVE, f32::MAX, 1.0e-40];
        let mut writer = Writer::new();
        for value in values {
            writer.put_f32(value);
        }
        let bytes = writer.into_inner();
        let mut reader = Reader::new(&bytes);
        for value in values {
            assert_eq!(reader.f32().unwrap().to_bits(), value.to_bits());
        }
    }
}

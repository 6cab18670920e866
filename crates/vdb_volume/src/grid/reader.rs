use crate::error::DecodeError;

/// Bounds-checked little-endian cursor over a grid file.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::Truncated {
                offset: self.offset,
                needed: len,
            });
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    pub fn coord(&mut self) -> Result<[i32; 3], DecodeError> {
        Ok([self.i32()?, self.i32()?, self.i32()?])
    }

    /// Length-prefixed UTF-8 string.
    pub fn string(&mut self, what: &str) -> Result<String, DecodeError> {
        let len = self.u32()? as usize;
        let raw = self.bytes(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| DecodeError::BadHeader(format!("{what} is not valid UTF-8")))
    }

    /// Reads a count and checks that `count * min_elem_bytes` can still follow,
    /// so a corrupt count never drives a huge allocation.
    pub fn count(&mut self, min_elem_bytes: usize) -> Result<usize, DecodeError> {
        let count = self.u32()? as usize;
        let needed = count.saturating_mul(min_elem_bytes);
        if needed > self.remaining() {
            return Err(DecodeError::Truncated {
                offset: self.offset,
                needed,
            });
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_values() {
        let mut data = Vec::new();
        data.extend_from_slice(&7u32.to_le_bytes());
        data.extend_from_slice(&(-3i32).to_le_bytes());
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.u32(), Ok(7));
        assert_eq!(reader.i32(), Ok(-3));
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn short_read_reports_offset() {
        let data = [1u8, 2, 3];
        let mut reader = ByteReader::new(&data);
        reader.u8().expect("one byte");
        assert_eq!(
            reader.u32(),
            Err(DecodeError::Truncated { offset: 1, needed: 4 })
        );
    }

    #[test]
    fn oversized_count_is_truncation() {
        let data = 1_000u32.to_le_bytes();
        let mut reader = ByteReader::new(&data);
        assert!(matches!(
            reader.count(12),
            Err(DecodeError::Truncated { offset: 4, .. })
        ));
    }
}

use std::ops::Range;

use crate::{ReadAt, verify};

fn read_slice_at(content: &[u8], range: Range<u64>) -> std::io::Result<Vec<u8>> {
    verify!(range.end >= range.start);
    let content_len = content.len() as u64;
    if range.start >= content_len {
        return Ok(Vec::new());
    }
    let end = range.end.min(content_len);
    Ok(content[range.start as usize..end as usize].to_vec())
}

impl ReadAt for Vec<u8> {
    fn size(&self) -> std::io::Result<u64> {
        Ok(self.len() as u64)
    }

    fn read_at(&self, range: Range<u64>) -> std::io::Result<Vec<u8>> {
        read_slice_at(self, range)
    }
}

impl ReadAt for [u8] {
    fn size(&self) -> std::io::Result<u64> {
        Ok(self.len() as u64)
    }

    fn read_at(&self, range: Range<u64>) -> std::io::Result<Vec<u8>> {
        read_slice_at(self, range)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::ReadAt;

    #[test]
    fn test_mem_reader() {
        let blob = b"abcd123".to_vec();
        assert_eq!(blob.size().unwrap(), 7);
        let buf = blob.read_at(1..3).unwrap();
        assert_eq!(buf, b"bc");
        let buf = blob.read_at(4..200).unwrap();
        assert_eq!(buf, b"123");
        assert!(blob.read_at(10..20).unwrap().is_empty());

        let blob = Arc::new(blob) as Arc<dyn ReadAt>;
        let buf = blob.read_at(1..3).unwrap();
        assert_eq!(buf, b"bc");
    }

    #[test]
    fn test_mem_reader_exact() {
        let blob: Arc<[u8]> = Arc::from(&b"abcd123"[..]);
        assert_eq!(blob.read_exact_at(0..4).unwrap(), b"abcd");
        let err = blob.read_exact_at(5..9).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}

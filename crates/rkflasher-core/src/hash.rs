//! MD5 digests for burn confirmation and read-back verification

use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const CHUNK_SIZE: usize = 8192;

/// MD5 of a byte slice as lowercase hex
pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}

/// MD5 of everything a reader yields, as lowercase hex
pub fn reader_md5<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Md5::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// MD5 of a file, streamed in 8 KiB chunks
pub fn file_md5(path: &Path) -> io::Result<String> {
    reader_md5(File::open(path)?)
}

/// MD5 of the first `len` bytes of a file
pub fn file_prefix_md5(path: &Path, len: u64) -> io::Result<String> {
    reader_md5(File::open(path)?.take(len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_md5_known_vectors() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            md5_hex(b"The quick brown fox jumps over the lazy dog"),
            "9e107d9d372bb6826bd81d3542a419d6"
        );
    }

    #[test]
    fn test_file_md5() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();
        assert_eq!(
            file_md5(file.path()).unwrap(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[test]
    fn test_file_md5_spans_chunks() {
        let data = vec![0xA5u8; CHUNK_SIZE * 3 + 17];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        file.flush().unwrap();
        assert_eq!(file_md5(file.path()).unwrap(), md5_hex(&data));
    }

    #[test]
    fn test_file_prefix_md5() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello world\0\0\0\0").unwrap();
        file.flush().unwrap();
        assert_eq!(
            file_prefix_md5(file.path(), 11).unwrap(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[test]
    fn test_missing_file() {
        assert!(file_md5(Path::new("/nonexistent/rkflasher-md5")).is_err());
    }
}

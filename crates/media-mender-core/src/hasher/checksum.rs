use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

const CHUNK_SIZE: usize = 64 * 1024;

/// Streaming BLAKE3 digest of a file, as lowercase hex.
pub fn checksum(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Full byte-for-byte comparison, chunked so neither file is held in memory.
pub fn files_equal(a: &Path, b: &Path) -> io::Result<bool> {
    let meta_a = std::fs::metadata(a)?;
    let meta_b = std::fs::metadata(b)?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }

    let mut reader_a = BufReader::with_capacity(CHUNK_SIZE, File::open(a)?);
    let mut reader_b = BufReader::with_capacity(CHUNK_SIZE, File::open(b)?);
    let mut buf_a = vec![0u8; CHUNK_SIZE];
    let mut buf_b = vec![0u8; CHUNK_SIZE];

    loop {
        let read_a = read_full(&mut reader_a, &mut buf_a)?;
        let read_b = read_full(&mut reader_b, &mut buf_b)?;
        if read_a != read_b || buf_a[..read_a] != buf_b[..read_b] {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
    }
}

// Fill `buf` as far as possible; short only at EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_checksum_is_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.bin");
        let b = tmp.path().join("b.bin");
        let content = vec![0x5Au8; CHUNK_SIZE * 2 + 17];
        fs::write(&a, &content).unwrap();
        fs::write(&b, &content).unwrap();

        let hash_a = checksum(&a).unwrap();
        assert_eq!(hash_a, checksum(&a).unwrap());
        assert_eq!(hash_a, checksum(&b).unwrap());
        assert_eq!(hash_a, blake3::hash(&content).to_hex().to_string());
    }

    #[test]
    fn test_files_equal_detects_single_byte_difference() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.bin");
        let b = tmp.path().join("b.bin");
        let mut content = vec![1u8; CHUNK_SIZE + 100];
        fs::write(&a, &content).unwrap();
        fs::write(&b, &content).unwrap();
        assert!(files_equal(&a, &b).unwrap());

        content[CHUNK_SIZE + 50] = 2;
        fs::write(&b, &content).unwrap();
        assert!(!files_equal(&a, &b).unwrap());
    }

    #[test]
    fn test_checksum_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let err = checksum(&tmp.path().join("gone.jpg")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}

use std::fs::File;
use std::hash::Hasher as _;
use std::io::{self, Read};
use std::path::Path;
use twox_hash::XxHash64;

const PARTIAL_HASH_LENGTH: usize = 1024; // 1KB

/// Cheap pre-filter for duplicate detection: XxHash64 of the first 1KB.
/// Two files with different partial hashes cannot be byte-identical.
pub fn partial_hash(file: &Path) -> io::Result<u64> {
    let data = read_portion(file)?;
    Ok(hash_data(&data))
}

fn read_portion(file: &Path) -> io::Result<Vec<u8>> {
    let f = File::open(file)?;
    let mut buffer = Vec::with_capacity(PARTIAL_HASH_LENGTH);
    f.take(PARTIAL_HASH_LENGTH as u64).read_to_end(&mut buffer)?;
    Ok(buffer)
}

pub fn hash_data(data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(data);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_partial_hash_only_reads_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.bin");
        let b = tmp.path().join("b.bin");

        let mut content = vec![7u8; 4096];
        fs::write(&a, &content).unwrap();
        content[3000] = 8;
        fs::write(&b, &content).unwrap();

        // Difference lies past the first 1KB
        assert_eq!(partial_hash(&a).unwrap(), partial_hash(&b).unwrap());
    }

    #[test]
    fn test_partial_hash_detects_prefix_change() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.bin");
        let b = tmp.path().join("b.bin");
        fs::write(&a, b"hello world").unwrap();
        fs::write(&b, b"hello World").unwrap();
        assert_ne!(partial_hash(&a).unwrap(), partial_hash(&b).unwrap());
    }
}

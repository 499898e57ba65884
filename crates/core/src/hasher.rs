//! Content fingerprints: full-file BLAKE3, streamed in fixed-size chunks.

use crate::fs::FileSystem;
use std::io::{self, Read};
use std::path::Path;

const CHUNK: usize = 64 * 1024;

pub fn hash(fs: &dyn FileSystem, path: &Path) -> io::Result<String> {
    let file = fs.open(path)?;
    hash_reader(file)
}

pub fn hash_reader(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;

    #[test]
    fn matches_one_shot_digest_across_chunks() {
        let data: Vec<u8> = (0..(CHUNK * 2 + 17)).map(|i| (i % 251) as u8).collect();
        let fs = MemFs::new();
        fs.write("/big.bin", data.clone());
        let streamed = hash(&fs, Path::new("/big.bin")).unwrap();
        assert_eq!(streamed, blake3::hash(&data).to_hex().to_string());
        assert_eq!(streamed.len(), 64);
    }

    #[test]
    fn different_bytes_differ() {
        let a = hash_reader(&b"hello"[..]).unwrap();
        let b = hash_reader(&b"hellp"[..]).unwrap();
        assert_ne!(a, b);
    }
}

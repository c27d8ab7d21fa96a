//! Integrity: whole-file SHA-1 digest used as transfer identity and per-frame tag.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use sha1::{Digest, Sha1};

/// Digest length in bytes (SHA-1).
pub const DIGEST_LEN: usize = 20;

/// Whole-file digest. Displays as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileDigest([u8; DIGEST_LEN]);

impl FileDigest {
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        FileDigest(bytes)
    }

    /// Take the first [`DIGEST_LEN`] bytes of `bytes`, or `None` if it is shorter.
    pub fn from_prefix(bytes: &[u8]) -> Option<Self> {
        let head = bytes.get(..DIGEST_LEN)?;
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(head);
        Some(FileDigest(out))
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for FileDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for FileDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileDigest({})", self.to_hex())
    }
}

impl FromStr for FileDigest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut out).map_err(|_| DigestParseError(s.to_string()))?;
        Ok(FileDigest(out))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a 20-byte hex digest: {0:?}")]
pub struct DigestParseError(pub String);

/// Hash a byte sequence.
pub fn hash_bytes(data: &[u8]) -> FileDigest {
    let mut hasher = Sha1::new();
    hasher.update(data);
    FileDigest(hasher.finalize().into())
}

/// Verify bytes against an expected digest.
pub fn verify_bytes(data: &[u8], expected: &FileDigest) -> bool {
    hash_bytes(data) == *expected
}

/// Read a whole file and hash it. Unreadable sources surface as `io::Error`.
pub async fn hash_file(path: impl AsRef<Path>) -> std::io::Result<FileDigest> {
    let data = tokio::fs::read(path).await?;
    Ok(hash_bytes(&data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        assert_eq!(
            hash_bytes(b"abc").to_hex(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            hash_bytes(b"").to_hex(),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
    }

    #[test]
    fn hash_verify_roundtrip() {
        let data = b"hello file";
        let digest = hash_bytes(data);
        assert!(verify_bytes(data, &digest));
        assert!(!verify_bytes(b"tampered", &digest));
    }

    #[test]
    fn hex_parse() {
        let digest = hash_bytes(b"abc");
        let parsed: FileDigest = digest.to_hex().parse().unwrap();
        assert_eq!(parsed, digest);
        let upper: FileDigest = digest.to_hex().to_uppercase().parse().unwrap();
        assert_eq!(upper, digest);
        assert!("abc".parse::<FileDigest>().is_err());
        assert!("zz".repeat(20).parse::<FileDigest>().is_err());
    }

    #[test]
    fn prefix_needs_full_digest() {
        assert!(FileDigest::from_prefix(&[0u8; 19]).is_none());
        let d = FileDigest::from_prefix(&[7u8; 25]).unwrap();
        assert_eq!(d.as_bytes(), &[7u8; 20]);
    }

    #[tokio::test]
    async fn hash_file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(hash_file(&path).await.unwrap(), hash_bytes(b"abc"));
        assert!(hash_file(dir.path().join("missing")).await.is_err());
    }
}

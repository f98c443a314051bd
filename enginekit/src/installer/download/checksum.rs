//! SHA-256 integrity verification for downloaded artifacts.
//!
//! Published digests may carry an algorithm prefix (`sha256:`) and may use
//! either hex case; both are normalized before comparison.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::installer::error::{InstallError, InstallResult};

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Minimum size for an artifact without digest to count as complete.
pub const PROBABLY_COMPLETE_BYTES: u64 = 1024 * 1024;

/// Calculate SHA-256 checksum of a file.
///
/// # Returns
///
/// The lowercase hexadecimal SHA-256 hash of the file contents.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn calculate_file_checksum(path: &Path) -> InstallResult<String> {
    let mut file = File::open(path).map_err(|e| InstallError::io(path, e))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| InstallError::io(path, e))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Strip an optional `sha256:` prefix and lowercase the hex digest.
pub fn normalize_digest(digest: &str) -> String {
    let trimmed = digest.trim();
    let hex = match trimmed.split_once(':') {
        Some((algo, rest)) if algo.eq_ignore_ascii_case("sha256") => rest,
        _ => trimmed,
    };
    hex.trim().to_ascii_lowercase()
}

/// Whether the file at `path` hashes to `expected`.
///
/// Never fails: an unreadable file simply does not verify.
pub fn verify(path: &Path, expected: &str) -> bool {
    match calculate_file_checksum(path) {
        Ok(actual) => actual == normalize_digest(expected),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Digest check could not read file");
            false
        }
    }
}

/// Like [`verify`] but reports the mismatch as an `Integrity` error.
pub fn verify_checksum(path: &Path, expected: &str) -> InstallResult<()> {
    let actual = calculate_file_checksum(path)?;
    let expected = normalize_digest(expected);
    if actual != expected {
        return Err(InstallError::Integrity {
            filename: path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Weak completeness check used when no digest is published.
///
/// True if the file exists and is larger than [`PROBABLY_COMPLETE_BYTES`].
pub fn probably_complete(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.len() > PROBABLY_COMPLETE_BYTES)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    const HELLO_WORLD: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    fn hello_file(temp: &TempDir) -> std::path::PathBuf {
        let file_path = temp.path().join("test.txt");
        let mut file = File::create(&file_path).unwrap();
        file.write_all(b"hello world").unwrap();
        file_path
    }

    #[test]
    fn test_calculate_file_checksum() {
        let temp = TempDir::new().unwrap();
        let file_path = hello_file(&temp);
        assert_eq!(calculate_file_checksum(&file_path).unwrap(), HELLO_WORLD);
    }

    #[test]
    fn test_calculate_empty_file() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("empty.txt");
        File::create(&file_path).unwrap();

        assert_eq!(
            calculate_file_checksum(&file_path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_verify_accepts_prefix_and_uppercase() {
        let temp = TempDir::new().unwrap();
        let file_path = hello_file(&temp);

        assert!(verify(&file_path, HELLO_WORLD));
        assert!(verify(&file_path, &format!("sha256:{}", HELLO_WORLD)));
        assert!(verify(&file_path, &format!("SHA256:{}", HELLO_WORLD.to_uppercase())));
        assert!(!verify(&file_path, "wrong_checksum"));
    }

    #[test]
    fn test_verify_missing_file_is_false() {
        assert!(!verify(Path::new("/nonexistent/file.txt"), HELLO_WORLD));
    }

    #[test]
    fn test_verify_checksum_mismatch() {
        let temp = TempDir::new().unwrap();
        let file_path = hello_file(&temp);

        match verify_checksum(&file_path, "sha256:ABC") {
            Err(InstallError::Integrity {
                filename, expected, ..
            }) => {
                assert_eq!(filename, "test.txt");
                assert_eq!(expected, "abc");
            }
            other => panic!("Expected Integrity error, got {:?}", other),
        }
    }

    #[test]
    fn test_probably_complete_threshold() {
        let temp = TempDir::new().unwrap();
        let small = temp.path().join("small.7z");
        let large = temp.path().join("large.7z");
        fs::write(&small, vec![0u8; PROBABLY_COMPLETE_BYTES as usize]).unwrap();
        fs::write(&large, vec![0u8; PROBABLY_COMPLETE_BYTES as usize + 1]).unwrap();

        assert!(!probably_complete(&small));
        assert!(probably_complete(&large));
        assert!(!probably_complete(&temp.path().join("missing.7z")));
        assert!(!probably_complete(temp.path()));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_verify_matches_iff_digest_equal(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            other in proptest::collection::vec(any::<u8>(), 0..4096),
            upper in any::<bool>(),
            prefixed in any::<bool>(),
        ) {
            let temp = TempDir::new().unwrap();
            let path = temp.path().join("blob.bin");
            fs::write(&path, &data).unwrap();

            let own = format!("{:x}", Sha256::digest(&data));
            let mut presented = if upper { own.to_uppercase() } else { own.clone() };
            if prefixed {
                presented = format!("sha256:{}", presented);
            }
            prop_assert!(verify(&path, &presented));

            let foreign = format!("{:x}", Sha256::digest(&other));
            prop_assert_eq!(verify(&path, &foreign), foreign == own);
        }
    }
}

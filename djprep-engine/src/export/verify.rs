//! Verification CLI support: checks that a bundle's
//! `checksums.txt` still matches the files on disk.

use djprep_common::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct VerifyReport {
    pub checked: usize,
    pub mismatched: Vec<String>,
    pub missing: Vec<String>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.mismatched.is_empty() && self.missing.is_empty()
    }
}

pub fn verify_bundle(dir: &Path) -> Result<VerifyReport> {
    let checksums_path = dir.join("checksums.txt");
    let text = std::fs::read_to_string(&checksums_path)
        .map_err(|_| Error::NotFound(format!("checksums.txt in {}", dir.display())))?;

    let mut checked = 0;
    let mut mismatched = Vec::new();
    let mut missing = Vec::new();

    for line in text.lines() {
        let Some((digest, name)) = line.split_once("  ") else {
            continue;
        };
        checked += 1;
        let path = dir.join(name);
        match std::fs::read(&path) {
            Ok(bytes) => {
                let actual = format!("{:x}", Sha256::digest(&bytes));
                if actual != digest {
                    mismatched.push(name.to_string());
                }
            }
            Err(_) => missing.push(name.to_string()),
        }
    }

    Ok(VerifyReport {
        checked,
        mismatched,
        missing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intact_bundle_verifies_clean() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("playlist.m3u8"), b"hello").unwrap();
        let digest = format!("{:x}", Sha256::digest(b"hello"));
        std::fs::write(
            dir.path().join("checksums.txt"),
            format!("{digest}  playlist.m3u8\n"),
        )
        .unwrap();

        let report = verify_bundle(dir.path()).unwrap();
        assert!(report.is_ok());
        assert_eq!(report.checked, 1);
    }

    #[test]
    fn tampered_file_is_reported_as_mismatched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("playlist.m3u8"), b"hello").unwrap();
        let digest = format!("{:x}", Sha256::digest(b"hello"));
        std::fs::write(
            dir.path().join("checksums.txt"),
            format!("{digest}  playlist.m3u8\n"),
        )
        .unwrap();
        std::fs::write(dir.path().join("playlist.m3u8"), b"tampered").unwrap();

        let report = verify_bundle(dir.path()).unwrap();
        assert!(!report.is_ok());
        assert_eq!(report.mismatched, vec!["playlist.m3u8".to_string()]);
    }

    #[test]
    fn deleted_file_is_reported_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let digest = format!("{:x}", Sha256::digest(b"hello"));
        std::fs::write(
            dir.path().join("checksums.txt"),
            format!("{digest}  playlist.m3u8\n"),
        )
        .unwrap();

        let report = verify_bundle(dir.path()).unwrap();
        assert_eq!(report.missing, vec!["playlist.m3u8".to_string()]);
    }
}

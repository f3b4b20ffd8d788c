//! Raw event files: a plain dump of little-endian 32-bit words

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RawFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not a whole number of 32-bit words
    #[error("{path}: {len} bytes is not a whole number of 32-bit words")]
    TruncatedWords { path: PathBuf, len: usize },
}

/// Decode a byte dump into words
pub fn words_from_bytes(bytes: &[u8]) -> Option<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

pub fn read_words<P: AsRef<Path>>(path: P) -> Result<Vec<u32>, RawFileError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    words_from_bytes(&bytes).ok_or_else(|| RawFileError::TruncatedWords {
        path: path.to_path_buf(),
        len: bytes.len(),
    })
}

pub fn write_words<P: AsRef<Path>>(path: P, words: &[u32]) -> Result<(), RawFileError> {
    std::fs::write(path, words_to_bytes(words))?;
    Ok(())
}

/// File name for event `event_number` of a run
pub fn event_file_name(event_number: u32) -> String {
    format!("fed_event_{:08}.raw", event_number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_are_little_endian() {
        assert_eq!(words_to_bytes(&[0x0102_0304]), vec![4, 3, 2, 1]);
        assert_eq!(words_from_bytes(&[4, 3, 2, 1]), Some(vec![0x0102_0304]));
        assert_eq!(words_from_bytes(&[1, 2, 3]), None);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(event_file_name(12));
        let words = vec![0x5100_0001, 0xA000_0002, 0, u32::MAX];
        write_words(&path, &words).unwrap();
        assert_eq!(read_words(&path).unwrap(), words);
        assert!(path.ends_with("fed_event_00000012.raw"));
    }

    #[test]
    fn test_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.raw");
        std::fs::write(&path, [0u8; 6]).unwrap();
        assert!(matches!(
            read_words(&path),
            Err(RawFileError::TruncatedWords { len: 6, .. })
        ));
        let message = read_words(&path).unwrap_err().to_string();
        assert!(message.contains("bad.raw"));
        assert!(message.contains("6 bytes"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_words(dir.path().join("absent.raw")).unwrap_err();
        assert!(matches!(err, RawFileError::Io(_)));
        assert!(err.to_string().starts_with("I/O error"));
    }
}

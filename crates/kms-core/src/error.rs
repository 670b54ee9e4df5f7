use std::path::PathBuf;

use thiserror::Error;

pub type KmsResult<T> = Result<T, KmsError>;

#[derive(Debug, Error)]
pub enum KmsError {
    #[error("config error: {0}")]
    Config(String),

    #[error("key file {}: {reason}", path.display())]
    KeyFile { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_missing(path: &std::path::Path) -> KmsResult<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    #[test]
    fn test_io_error_converts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = read_missing(&tmp.path().join("absent")).unwrap_err();
        assert!(matches!(err, KmsError::Io(_)));
        assert!(err.to_string().starts_with("I/O error: "));
    }

    #[test]
    fn test_key_file_display_names_path() {
        let err = KmsError::KeyFile {
            path: PathBuf::from("/etc/kms/key"),
            reason: "expected 32 bytes, got 33".into(),
        };
        assert_eq!(
            err.to_string(),
            "key file /etc/kms/key: expected 32 bytes, got 33"
        );
    }
}

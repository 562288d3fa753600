use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StError>;

/// Crate-wide error type.
///
/// Every failure is fatal for the scene being processed: `main` logs the
/// message and exits non-zero. No retries, no partial outputs.
#[derive(Debug, Error)]
pub enum StError {
    #[error("{0} environment variable is not set")]
    MissingEnv(&'static str),

    #[error("missing required input file {}: {}", .path.display(), .source)]
    ConfigMissing {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed reading {}: {}", .path.display(), .source)]
    IoRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed writing {}: {}", .path.display(), .source)]
    IoWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed data in {}: {}", .path.display(), .detail)]
    Malformed { path: PathBuf, detail: String },

    #[error("failed allocating {0}")]
    ResourceExhausted(&'static str),

    #[error("{0}")]
    Domain(String),
}

impl StError {
    /// Read-side error for `path`, distinguishing a missing file (a setup
    /// problem) from a failure while reading it.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            StError::ConfigMissing { path, source }
        } else {
            StError::IoRead { path, source }
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StError::IoWrite {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        StError::Malformed {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_maps_to_config_error() {
        let not_found = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert!(matches!(
            StError::read("grid_points.hdr", not_found),
            StError::ConfigMissing { .. }
        ));

        let interrupted = std::io::Error::from(std::io::ErrorKind::UnexpectedEof);
        assert!(matches!(
            StError::read("grid_points.hdr", interrupted),
            StError::IoRead { .. }
        ));
    }

    #[test]
    fn messages_name_the_offending_file() {
        let error = StError::malformed("grid_points.bin", "short record");
        assert_eq!(
            error.to_string(),
            "malformed data in grid_points.bin: short record"
        );
    }
}

//! Error type shared by the certificate authority, the toolchain runner and
//! the archive builder.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

pub type Result<T, E = CaError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum CaError {
    #[error("invalid common name: {0:?}")]
    InvalidCommonName(String),

    #[error("a certificate with common name {0:?} already exists")]
    AlreadyExists(String),

    #[error("no certificate found for common name {0:?}")]
    NotFound(String),

    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("{command} exited with {status}")]
    Toolchain {
        command: String,
        status: ExitStatus,
        output: String,
    },

    #[error("failed to parse certificate: {0}")]
    Certificate(#[from] openssl::error::ErrorStack),

    #[error("issuance task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("failed to build archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("{context} ({}): {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CaError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        CaError::Io {
            context,
            path: path.into(),
            source,
        }
    }
}

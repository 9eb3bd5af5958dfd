//! Error taxonomy shared by every stage of the compiler

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ListError {
    /// Contradictory or insufficient column or format settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A row violates the expected shape.
    #[error("format error in {} at line {line}: {message}", .path.display())]
    Format {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The stored layout disagrees with its metadata.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// Wraps any failure with the identity of the dataset being processed.
    #[error(
        "failed to {stage} graph {name}, version {version}, retrieved from the {repository} repository"
    )]
    Dataset {
        stage: &'static str,
        name: String,
        version: String,
        repository: String,
        #[source]
        source: Box<ListError>,
    },
}

pub type Result<T> = std::result::Result<T, ListError>;

impl ListError {
    pub fn configuration<T: Into<String>>(msg: T) -> Self {
        ListError::Configuration(msg.into())
    }

    pub fn consistency<T: Into<String>>(msg: T) -> Self {
        ListError::Consistency(msg.into())
    }

    pub fn format<P: AsRef<Path>, T: Into<String>>(path: P, line: usize, msg: T) -> Self {
        ListError::Format {
            path: path.as_ref().to_path_buf(),
            line,
            message: msg.into(),
        }
    }

    /// Build a `map_err` adapter attaching `path` to an I/O error.
    pub fn io<P: AsRef<Path>>(path: P) -> impl FnOnce(io::Error) -> ListError {
        let path = path.as_ref().to_path_buf();
        move |source| ListError::Io { path, source }
    }

    /// Spill files are encoded with bincode; its failures are I/O failures.
    pub fn spill<P: AsRef<Path>>(path: P) -> impl FnOnce(bincode::Error) -> ListError {
        let path = path.as_ref().to_path_buf();
        move |source| ListError::Io {
            path,
            source: match *source {
                bincode::ErrorKind::Io(error) => error,
                other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
            },
        }
    }

    pub fn is_format(&self) -> bool {
        matches!(self, ListError::Format { .. })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, ListError::Configuration(_))
    }

    pub fn is_consistency(&self) -> bool {
        matches!(self, ListError::Consistency(_))
    }

    /// The innermost error, looking through dataset context.
    pub fn root_cause(&self) -> &ListError {
        match self {
            ListError::Dataset { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

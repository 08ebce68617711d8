//! Error taxonomy for project resolution and build orchestration.
//!
//! Every variant is fatal: callers report it once and stop. Nothing here is
//! retried automatically.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while resolving or building a project
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or contradictory configuration
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Filesystem traversal failed while scanning the project tree
    #[error("cannot scan {}: {message}", path.display())]
    Scan { path: PathBuf, message: String },

    /// The build script failed to load, to execute, or has a malformed entry point
    #[error("build script {}: {message}", script.display())]
    BuildScript { script: PathBuf, message: String },

    /// An include/exclude pattern could not be compiled
    #[error("invalid pattern {pattern:?}: {reason}")]
    GlobCompile { pattern: String, reason: String },

    /// The compiler reported a fatal error for a file
    #[error("failed to compile {}: {message}", file.display())]
    Compile { file: PathBuf, message: String },

    /// A filesystem operation outside of scanning failed
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    pub fn build_script(script: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::BuildScript {
            script: script.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offending_path() {
        let err = Error::Scan {
            path: PathBuf::from("src/locked"),
            message: "permission denied".to_string(),
        };
        assert_eq!(err.to_string(), "cannot scan src/locked: permission denied");

        let err = Error::build_script("build.sh", "gen_code exited with status 1");
        assert!(err.to_string().starts_with("build script build.sh:"));
    }
}

//! Error taxonomy shared by every dlbench layer.
//!
//! Four kinds of failure matter to a harness driving an external downloader:
//! the reference fetch failed, the filesystem refused us, an external tool
//! (timer, diff) misbehaved, or the downloader-under-test itself exited non-zero.
//! Configuration problems get their own variant so they never masquerade as any
//! of those.

use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("fetch of {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("filesystem error at {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("tooling error: {0}")]
    Tooling(String),

    #[error("{program} exited with {}", describe_exit(.exit_code))]
    Process {
        program: String,
        exit_code: Option<i32>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl HarnessError {
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        HarnessError::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            HarnessError::Network { .. } => ErrorKind::Network,
            HarnessError::Filesystem { .. } => ErrorKind::Filesystem,
            HarnessError::Tooling(_) => ErrorKind::Tooling,
            HarnessError::Process { .. } => ErrorKind::Process,
            HarnessError::Config(_) => ErrorKind::Config,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Filesystem,
    Tooling,
    Process,
    Config,
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "no status (killed by signal)".to_string(),
    }
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn network_message_names_url() {
        let err = HarnessError::Network {
            url: "http://example.com/a.txt".into(),
            message: "connection refused".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("http://example.com/a.txt"));
        assert!(msg.contains("connection refused"));
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[test]
    fn filesystem_keeps_io_source() {
        use std::error::Error as _;

        let err = HarnessError::filesystem(
            "legit_small/a_b.txt",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("legit_small/a_b.txt"));
        assert!(err.source().is_some());
        assert_eq!(err.kind(), ErrorKind::Filesystem);
    }

    #[test]
    fn process_without_status_mentions_signal() {
        let err = HarnessError::Process {
            program: "./downloader".into(),
            exit_code: None,
        };
        assert!(err.to_string().contains("signal"));
    }

    proptest! {
        #[test]
        fn process_message_carries_exit_code(code in any::<i32>()) {
            let err = HarnessError::Process {
                program: "./downloader".into(),
                exit_code: Some(code),
            };
            let msg = err.to_string();
            prop_assert!(msg.contains(&code.to_string()));
            prop_assert!(msg.starts_with("./downloader"));
        }
    }
}

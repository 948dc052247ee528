//! Std adapters for dlbench.
//!
//! In clean-arch terms: this is where we touch the world.

mod fs;
mod http;

pub use fs::{
    append_report, discard_file, read_report, read_text, recreate_dir, write_report,
};
pub use http::{Fetcher, HttpFetcher};

use anyhow::Context;
use dlbench_error::HarnessError;
use std::collections::VecDeque;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What happens to a child's stdout or stderr.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Shared with the harness's own stream.
    #[default]
    Inherit,
    /// Read into memory, keeping the first `output_cap_bytes`.
    Capture,
    /// Read into memory, keeping the last `output_cap_bytes`.
    CaptureTail,
    /// Written straight to this file, created or truncated first. Never capped.
    File(PathBuf),
    Discard,
}

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub stdout: OutputMode,
    pub stderr: OutputMode,
    pub output_cap_bytes: usize,
}

impl CommandSpec {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            cwd: None,
            env: Vec::new(),
            stdout: OutputMode::Inherit,
            stderr: OutputMode::Inherit,
            output_cap_bytes: 64 * 1024,
        }
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub wall: Duration,

    /// None when the process was terminated by a signal.
    pub exit_code: Option<i32>,

    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("command argv must not be empty")]
    EmptyArgv,

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("program not found: {0}")]
    ToolNotFound(String),

    #[error("fetch of {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<AdapterError> for HarnessError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Http { url, message } => HarnessError::Network { url, message },
            AdapterError::Io { path, source } => HarnessError::Filesystem { path, source },
            AdapterError::Spawn { .. } | AdapterError::ToolNotFound(_) => {
                HarnessError::Tooling(err.to_string())
            }
            AdapterError::EmptyArgv | AdapterError::Other(_) => {
                HarnessError::Tooling(format!("{err:#}"))
            }
        }
    }
}

pub trait ProcessRunner {
    fn run(&self, spec: &CommandSpec) -> Result<RunResult, AdapterError>;
}

/// Blocking runner: one child at a time, the caller waits for it to exit.
#[derive(Debug, Default, Clone)]
pub struct StdProcessRunner;

impl ProcessRunner for StdProcessRunner {
    fn run(&self, spec: &CommandSpec) -> Result<RunResult, AdapterError> {
        if spec.argv.is_empty() {
            return Err(AdapterError::EmptyArgv);
        }

        tracing::debug!(argv = ?spec.argv, "spawning");

        let start = Instant::now();

        let mut cmd = Command::new(&spec.argv[0]);
        if spec.argv.len() > 1 {
            cmd.args(&spec.argv[1..]);
        }

        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        for (k, v) in &spec.env {
            cmd.env(k, v);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(stdio_for(&spec.stdout)?);
        cmd.stderr(stdio_for(&spec.stderr)?);

        let mut child = cmd.spawn().map_err(|source| AdapterError::Spawn {
            program: spec.argv[0].clone(),
            source,
        })?;

        let cap = spec.output_cap_bytes;
        let out_handle = child.stdout.take().map(|r| drain(r, &spec.stdout, cap));
        let err_handle = child.stderr.take().map(|r| drain(r, &spec.stderr, cap));

        let status = child
            .wait()
            .with_context(|| format!("failed to wait for {:?}", spec.argv))?;

        let wall = start.elapsed();

        let stdout = out_handle
            .map(|h| h.join().unwrap_or_default())
            .unwrap_or_default();
        let stderr = err_handle
            .map(|h| h.join().unwrap_or_default())
            .unwrap_or_default();

        Ok(RunResult {
            wall,
            exit_code: status.code(),
            stdout,
            stderr,
        })
    }
}

fn stdio_for(mode: &OutputMode) -> Result<Stdio, AdapterError> {
    Ok(match mode {
        OutputMode::Inherit => Stdio::inherit(),
        OutputMode::Capture | OutputMode::CaptureTail => Stdio::piped(),
        OutputMode::File(path) => {
            let file = std::fs::File::create(path).map_err(|source| AdapterError::Io {
                path: path.clone(),
                source,
            })?;
            Stdio::from(file)
        }
        OutputMode::Discard => Stdio::null(),
    })
}

fn drain<R: Read + Send + 'static>(
    mut reader: R,
    mode: &OutputMode,
    cap: usize,
) -> JoinHandle<Vec<u8>> {
    if *mode == OutputMode::CaptureTail {
        thread::spawn(move || read_tail(&mut reader, cap))
    } else {
        thread::spawn(move || read_with_cap(&mut reader, cap))
    }
}

fn truncate(mut bytes: Vec<u8>, cap: usize) -> Vec<u8> {
    if bytes.len() > cap {
        bytes.truncate(cap);
    }
    bytes
}

/// Drains the pipe to EOF so the child never blocks on a full pipe, keeping
/// at most `cap` bytes.
fn read_with_cap<R: Read>(reader: &mut R, cap: usize) -> Vec<u8> {
    let mut buf: Vec<u8> = Vec::new();
    let mut tmp = [0u8; 8192];

    loop {
        match reader.read(&mut tmp) {
            Ok(0) => break,
            Ok(n) => {
                if buf.len() < cap {
                    let take = (cap - buf.len()).min(n);
                    buf.extend_from_slice(&tmp[..take]);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }

    truncate(buf, cap)
}

/// Drains the pipe to EOF, keeping only the last `cap` bytes.
fn read_tail<R: Read>(reader: &mut R, cap: usize) -> Vec<u8> {
    let mut buf: VecDeque<u8> = VecDeque::new();
    let mut tmp = [0u8; 8192];

    loop {
        match reader.read(&mut tmp) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend(&tmp[..n]);
                if buf.len() > cap {
                    let excess = buf.len() - cap;
                    buf.drain(..excess);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }

    Vec::from(buf)
}

/// Resolve an external program before any work starts.
///
/// Anything containing a path separator is taken as a path and only checked
/// for existence; bare names go through `PATH`.
pub fn resolve_program(program: &str) -> Result<PathBuf, AdapterError> {
    if program.is_empty() {
        return Err(AdapterError::EmptyArgv);
    }
    if program.chars().any(std::path::is_separator) {
        let path = Path::new(program);
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(AdapterError::ToolNotFound(program.to_string()))
        };
    }
    which::which(program).map_err(|_| AdapterError::ToolNotFound(program.to_string()))
}

//! Shared types for dlbench.
//!
//! Design goal: versioned, explicit, boring.
//! These structs flow from the orchestrators to the reporter and, for the
//! benchmark sweep, out to an optional JSON receipt.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const SWEEP_SCHEMA_V1: &str = "dlbench.sweep.v1";

/// Version tag of the timer-output parsing contract.
pub const TIMER_CONTRACT_V1: &str = "dlbench.timer.v1";

pub const DEFAULT_LEVELS: [u32; 9] = [1, 2, 4, 8, 16, 24, 32, 40, 50];
pub const DEFAULT_ITERATIONS: u32 = 5;
pub const DEFAULT_USER_AGENT: &str = "getter";
pub const DEFAULT_REPORT_FILE: &str = "diffs.txt";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

/// A remote resource named by `host/path`, with no URI scheme.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Trims surrounding whitespace; blank input is not an identifier.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Plain-HTTP URL for the reference fetch.
    pub fn url(&self) -> String {
        format!("http://{}", self.0)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered resource identifiers, loaded fresh per run and never mutated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ResourceId>,
}

impl Manifest {
    pub fn new(entries: Vec<ResourceId>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ResourceId] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Elapsed wall-clock seconds for one timed invocation.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, PartialOrd)]
#[serde(transparent)]
pub struct TimingSample(f64);

impl TimingSample {
    /// Rejects negative, NaN and infinite values.
    pub fn new(seconds: f64) -> Option<Self> {
        if seconds.is_finite() && seconds >= 0.0 {
            Some(Self(seconds))
        } else {
            None
        }
    }

    pub fn seconds(self) -> f64 {
        self.0
    }
}

/// How each benchmark invocation is timed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerSpec {
    /// External wall-clock timer; argv prefix placed before the downloader command.
    External(Vec<String>),
    /// In-process wall clock around the spawned downloader.
    Builtin,
}

impl TimerSpec {
    pub fn describe(&self) -> Vec<String> {
        match self {
            TimerSpec::External(argv) => argv.clone(),
            TimerSpec::Builtin => vec!["builtin".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LevelResult {
    pub level: u32,

    /// Mean of the samples left after trimming the minimum and maximum.
    pub mean_secs: f64,

    /// Raw samples in collection order.
    pub samples: Vec<TimingSample>,
}

/// (level, trimmed mean) pairs in ascending level order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ConcurrencySweepResult {
    levels: Vec<LevelResult>,
}

impl ConcurrencySweepResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a level. Levels must arrive in strictly ascending order.
    pub fn push(&mut self, result: LevelResult) -> Result<(), LevelResult> {
        match self.levels.last() {
            Some(last) if last.level >= result.level => Err(result),
            _ => {
                self.levels.push(result);
                Ok(())
            }
        }
    }

    pub fn levels(&self) -> &[LevelResult] {
        &self.levels
    }

    pub fn pairs(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.levels.iter().map(|r| (r.level, r.mean_secs))
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepFailure {
    pub level: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunMeta {
    pub started_at: String,
    pub ended_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BenchMeta {
    pub downloader: String,
    pub manifest: String,
    pub tag: String,
    pub iterations: u32,
    pub levels: Vec<u32>,

    /// Timer argv prefix, or `builtin`.
    pub timer: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepReceipt {
    pub schema: String,
    pub tool: ToolInfo,
    pub run: RunMeta,
    pub bench: BenchMeta,
    pub results: ConcurrencySweepResult,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<SweepFailure>,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    OnlyInCandidate,
    OnlyInReference,
    ContentDiffers,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: DiffKind,

    /// File the line refers to, when the diff tool names one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    pub text: String,
}

/// How the downloader-under-test ended. None of these stop the comparison.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DownloaderStatus {
    Exited(i32),
    Signaled,
    LaunchFailed(String),
}

impl DownloaderStatus {
    pub fn success(&self) -> bool {
        matches!(self, DownloaderStatus::Exited(0))
    }
}

impl fmt::Display for DownloaderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloaderStatus::Exited(code) => write!(f, "exit status {code}"),
            DownloaderStatus::Signaled => f.write_str("killed by signal"),
            DownloaderStatus::LaunchFailed(msg) => write!(f, "failed to launch: {msg}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComparisonReport {
    pub dataset: String,
    pub report_path: String,
    pub lines: Vec<DiffLine>,
    pub downloader: DownloaderStatus,
}

impl ComparisonReport {
    pub fn identical(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn count(&self, kind: DiffKind) -> usize {
        self.lines.iter().filter(|l| l.kind == kind).count()
    }
}

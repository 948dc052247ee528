//! Configuration for dlbench.
//!
//! Values come from three places, highest precedence first: CLI flags, an
//! optional `dlbench.toml`, built-in defaults. Everything is resolved into a
//! [`Settings`] up front so the orchestrators never consult ambient state.

use dlbench_error::HarnessError;
use dlbench_types::{
    DEFAULT_ITERATIONS, DEFAULT_LEVELS, DEFAULT_REPORT_FILE, DEFAULT_USER_AGENT, TimerSpec,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "dlbench.toml";
pub const DEFAULT_DOWNLOADER: &str = "./downloader";
pub const DEFAULT_TIMER: &str = "time -f %e";
pub const DEFAULT_DIFF: &str = "diff -r";
pub const DEFAULT_TAG: &str = "timer";
pub const DEFAULT_OUTPUT_CAP_BYTES: usize = 16 * 1024 * 1024;

/// Timer value selecting the in-process wall clock.
pub const BUILTIN_TIMER: &str = "builtin";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("{0}")]
    Invalid(String),
}

impl From<ConfigError> for HarnessError {
    fn from(err: ConfigError) -> Self {
        HarnessError::Config(err.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub fetch: FetchConfig,
    pub downloader: DownloaderConfig,
    pub bench: BenchConfig,
    pub diff: DiffConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloaderConfig {
    pub program: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    pub levels: Option<Vec<u32>>,
    pub iterations: Option<u32>,
    pub tag: Option<String>,

    /// Shell-style command prefix (`time -f %e`) or `builtin`.
    pub timer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiffConfig {
    /// Shell-style command prefix, run as `<prefix> <candidate> <reference>`.
    pub program: Option<String>,
    pub report: Option<PathBuf>,
    pub output_cap_bytes: Option<usize>,
}

/// CLI-provided values. `None` falls through to the file, then the default.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub user_agent: Option<String>,
    pub downloader: Option<String>,
    pub levels: Option<Vec<u32>>,
    pub iterations: Option<u32>,
    pub tag: Option<String>,
    pub timer: Option<String>,
    pub diff: Option<String>,
    pub report: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub user_agent: String,
    pub downloader: String,
    pub levels: Vec<u32>,
    pub iterations: u32,
    pub tag: String,
    pub timer: TimerSpec,
    pub diff: Vec<String>,
    pub report: PathBuf,
    pub output_cap_bytes: usize,
}

/// Load the config file.
///
/// An explicit path must exist. Without one, `dlbench.toml` under `base` is
/// used when present and defaults apply otherwise.
pub fn load_config(explicit: Option<&Path>, base: &Path) -> Result<ConfigFile, ConfigError> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let candidate = base.join(DEFAULT_CONFIG_FILE);
            if !candidate.is_file() {
                return Ok(ConfigFile::default());
            }
            candidate
        }
    };

    let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    parse_config(&text).map_err(|message| ConfigError::Parse { path, message })
}

pub fn parse_config(text: &str) -> Result<ConfigFile, String> {
    toml::from_str(text).map_err(|e| e.to_string())
}

pub fn resolve(file: &ConfigFile, o: &Overrides) -> Result<Settings, ConfigError> {
    let levels = o
        .levels
        .clone()
        .or_else(|| file.bench.levels.clone())
        .unwrap_or_else(|| DEFAULT_LEVELS.to_vec());
    dlbench_domain::validate_levels(&levels)
        .map_err(|e| ConfigError::Invalid(format!("bench.levels: {e}")))?;

    let iterations = o
        .iterations
        .or(file.bench.iterations)
        .unwrap_or(DEFAULT_ITERATIONS);
    if (iterations as usize) < dlbench_domain::MIN_TRIMMED_SAMPLES {
        return Err(ConfigError::Invalid(format!(
            "bench.iterations must be >= {}, got {iterations}",
            dlbench_domain::MIN_TRIMMED_SAMPLES
        )));
    }

    let timer_raw = pick(&o.timer, &file.bench.timer, DEFAULT_TIMER);
    let timer = if timer_raw.trim() == BUILTIN_TIMER {
        TimerSpec::Builtin
    } else {
        TimerSpec::External(split_command("bench.timer", &timer_raw)?)
    };

    let diff = split_command("diff.program", &pick(&o.diff, &file.diff.program, DEFAULT_DIFF))?;

    let downloader = pick(&o.downloader, &file.downloader.program, DEFAULT_DOWNLOADER);
    if downloader.trim().is_empty() {
        return Err(ConfigError::Invalid("downloader.program is empty".into()));
    }

    Ok(Settings {
        user_agent: pick(&o.user_agent, &file.fetch.user_agent, DEFAULT_USER_AGENT),
        downloader,
        levels,
        iterations,
        tag: pick(&o.tag, &file.bench.tag, DEFAULT_TAG),
        timer,
        diff,
        report: o
            .report
            .clone()
            .or_else(|| file.diff.report.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_FILE)),
        output_cap_bytes: file
            .diff
            .output_cap_bytes
            .unwrap_or(DEFAULT_OUTPUT_CAP_BYTES),
    })
}

fn pick(cli: &Option<String>, file: &Option<String>, default: &str) -> String {
    cli.clone()
        .or_else(|| file.clone())
        .unwrap_or_else(|| default.to_string())
}

fn split_command(key: &str, raw: &str) -> Result<Vec<String>, ConfigError> {
    let argv = shell_words::split(raw)
        .map_err(|e| ConfigError::Invalid(format!("{key}: {e}")))?;
    if argv.is_empty() {
        return Err(ConfigError::Invalid(format!("{key} is empty")));
    }
    Ok(argv)
}

//! Domain logic for dlbench.
//!
//! This crate is intentionally I/O-free: it parses, sanitizes and averages.

use dlbench_types::{DiffKind, DiffLine, Manifest, ResourceId, TimingSample};
use regex::Regex;
use std::sync::LazyLock;

/// Samples kept after trimming must be at least one, so a trimmed mean needs three.
pub const MIN_TRIMMED_SAMPLES: usize = 3;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DomainError {
    #[error("trimmed mean needs at least {MIN_TRIMMED_SAMPLES} samples, got {0}")]
    TooFewSamples(usize),

    #[error("concurrency level list is empty")]
    NoLevels,

    #[error("concurrency level must be >= 1")]
    ZeroLevel,

    #[error("concurrency levels must be strictly increasing ({prev} then {next})")]
    LevelsNotAscending { prev: u32, next: u32 },

    #[error("timer produced no output on stderr")]
    TimerOutputMissing,

    #[error("timer output is not a single elapsed-seconds token: {0:?}")]
    TimerOutputUnparseable(String),
}

/// Parse manifest text: one identifier per non-blank line, in file order.
pub fn parse_manifest(text: &str) -> Manifest {
    Manifest::new(text.lines().filter_map(ResourceId::parse).collect())
}

/// Local filename for a resource: every path separator becomes `_`.
///
/// The downloader-under-test applies the same rule, otherwise the differential
/// comparison would report every file as missing.
pub fn local_file_name(id: &ResourceId) -> String {
    id.as_str()
        .chars()
        .map(|c| if std::path::is_separator(c) { '_' } else { c })
        .collect()
}

/// Sort ascending, drop the minimum and the maximum, average the rest.
pub fn trimmed_mean(samples: &[TimingSample]) -> Result<f64, DomainError> {
    let retained = trimmed(samples)?;
    let sum: f64 = retained.iter().map(|s| s.seconds()).sum();
    Ok(sum / retained.len() as f64)
}

/// The samples that survive trimming, ascending.
pub fn trimmed(samples: &[TimingSample]) -> Result<Vec<TimingSample>, DomainError> {
    if samples.len() < MIN_TRIMMED_SAMPLES {
        return Err(DomainError::TooFewSamples(samples.len()));
    }
    let mut v = samples.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Ok(v[1..v.len() - 1].to_vec())
}

pub fn validate_levels(levels: &[u32]) -> Result<(), DomainError> {
    if levels.is_empty() {
        return Err(DomainError::NoLevels);
    }
    if levels.contains(&0) {
        return Err(DomainError::ZeroLevel);
    }
    for pair in levels.windows(2) {
        if pair[1] <= pair[0] {
            return Err(DomainError::LevelsNotAscending {
                prev: pair[0],
                next: pair[1],
            });
        }
    }
    Ok(())
}

static ELAPSED_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?$").expect("static regex"));

/// Parse the timer's stderr under the `dlbench.timer.v1` contract.
///
/// The last non-blank line must be exactly one elapsed-seconds token such as
/// `12.34`. Earlier lines belong to the downloader and are ignored.
pub fn parse_elapsed(stderr: &str) -> Result<TimingSample, DomainError> {
    let line = stderr
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .ok_or(DomainError::TimerOutputMissing)?;

    if !ELAPSED_TOKEN.is_match(line) {
        return Err(DomainError::TimerOutputUnparseable(line.to_string()));
    }

    line.parse::<f64>()
        .ok()
        .and_then(TimingSample::new)
        .ok_or_else(|| DomainError::TimerOutputUnparseable(line.to_string()))
}

/// Round to the two-decimal precision the external timer reports.
pub fn round_centiseconds(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}

static ONLY_IN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Only in (.+): (.+)$").expect("static regex"));
static DIFF_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^diff(?: -\S+)* (.+ .+)$").expect("static regex"));
static FILES_DIFFER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:Binary files|Files) (.+ and .+) differ$").expect("static regex"));

/// Classify every line of a recursive diff between `candidate` and `reference`.
///
/// Hunk bodies are kept as [`DiffKind::Other`] so the report stays verbatim.
pub fn classify_diff_output(output: &str, candidate: &str, reference: &str) -> Vec<DiffLine> {
    output
        .lines()
        .filter(|l| !l.is_empty())
        .map(|line| classify_diff_line(line, candidate, reference))
        .collect()
}

fn classify_diff_line(line: &str, candidate: &str, reference: &str) -> DiffLine {
    let text = line.to_string();

    if let Some(c) = ONLY_IN.captures(line) {
        let dir = c[1].trim_end_matches('/');
        let kind = if under(dir, candidate) {
            DiffKind::OnlyInCandidate
        } else if under(dir, reference) {
            DiffKind::OnlyInReference
        } else {
            DiffKind::Other
        };
        let file = match relative_to(dir, candidate).or_else(|| relative_to(dir, reference)) {
            Some(sub) if !sub.is_empty() => format!("{sub}/{}", &c[2]),
            _ => c[2].to_string(),
        };
        return DiffLine {
            kind,
            file: Some(file),
            text,
        };
    }

    let pair = FILES_DIFFER
        .captures(line)
        .map(|c| (c, " and "))
        .or_else(|| DIFF_HEADER.captures(line).map(|c| (c, " ")));
    if let Some((c, sep)) = pair {
        let file = split_pair(&c[1], sep, candidate, reference);
        return DiffLine {
            kind: DiffKind::ContentDiffers,
            file,
            text,
        };
    }

    DiffLine {
        kind: DiffKind::Other,
        file: None,
        text,
    }
}

/// Find the candidate file in `left<sep>right`. Paths may themselves contain
/// `sep`, so every split point is tried against the known directories.
fn split_pair(pair: &str, sep: &str, candidate: &str, reference: &str) -> Option<String> {
    pair.match_indices(sep).find_map(|(i, _)| {
        let left = unquote(&pair[..i]);
        let right = unquote(&pair[i + sep.len()..]);
        let file = relative_to(left, candidate)?;
        relative_to(right, reference)?;
        Some(file)
    })
}

fn unquote(s: &str) -> &str {
    for q in ['\'', '"'] {
        if let Some(inner) = s.strip_prefix(q).and_then(|r| r.strip_suffix(q)) {
            return inner;
        }
    }
    s
}

fn under(path: &str, dir: &str) -> bool {
    relative_to(path, dir).is_some()
}

fn relative_to(path: &str, dir: &str) -> Option<String> {
    let dir = dir.trim_end_matches('/');
    if path == dir {
        return Some(String::new());
    }
    path.strip_prefix(dir)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(str::to_string)
}

//! Result reporting: plain lines for people, JSON for machines.

use dlbench_types::{ComparisonReport, ConcurrencySweepResult, DiffKind, SweepReceipt};
use std::io::{self, Write};

/// One `<level> <mean seconds>` line per level, in the order produced.
pub fn render_sweep_text(results: &ConcurrencySweepResult) -> Vec<String> {
    results
        .pairs()
        .map(|(level, mean)| format!("{level} {mean:.3}"))
        .collect()
}

pub fn report_sweep<W: Write>(results: &ConcurrencySweepResult, out: &mut W) -> io::Result<()> {
    for line in render_sweep_text(results) {
        writeln!(out, "{line}")?;
    }
    out.flush()
}

pub fn render_sweep_json(receipt: &SweepReceipt, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(receipt)
    } else {
        serde_json::to_string(receipt)
    }
}

pub fn render_comparison_summary(report: &ComparisonReport) -> String {
    if report.identical() {
        return format!("{}: identical", report.dataset);
    }

    let missing = report.count(DiffKind::OnlyInReference);
    let extra = report.count(DiffKind::OnlyInCandidate);
    let differing = report.count(DiffKind::ContentDiffers);

    let mut parts = Vec::new();
    if missing > 0 {
        parts.push(format!("{missing} missing"));
    }
    if extra > 0 {
        parts.push(format!("{extra} extra"));
    }
    if differing > 0 {
        parts.push(format!("{differing} differing"));
    }
    if parts.is_empty() {
        parts.push(format!("{} diff lines", report.lines.len()));
    }

    format!(
        "{}: MISMATCH ({}), see {}",
        report.dataset,
        parts.join(", "),
        report.report_path
    )
}

//! Differential run: downloader-under-test against the reference set.

use dlbench_adapters::{
    CommandSpec, OutputMode, ProcessRunner, append_report, discard_file, read_report,
    recreate_dir,
};
use dlbench_domain::classify_diff_output;
use dlbench_error::{HarnessError, Result};
use dlbench_types::{ComparisonReport, DownloaderStatus};
use std::path::{Path, PathBuf};

/// Where the diff tool's text ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportTarget {
    /// Truncate and write the diff output verbatim.
    Overwrite(PathBuf),
    /// Append under a `== <dataset> ==` header, only when there is output.
    Append(PathBuf),
}

impl ReportTarget {
    pub fn path(&self) -> &PathBuf {
        match self {
            ReportTarget::Overwrite(p) | ReportTarget::Append(p) => p,
        }
    }

    /// File the diff tool writes into. Appended sections are staged next to
    /// the report and folded in once the diff has exited.
    fn sink(&self, dataset: &str) -> PathBuf {
        match self {
            ReportTarget::Overwrite(path) => path.clone(),
            ReportTarget::Append(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                path.with_file_name(format!(".{name}.{dataset}.part"))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DifferentialRequest {
    pub dataset: String,
    pub manifest_path: PathBuf,
    pub reference_dir: PathBuf,
    pub candidate_dir: PathBuf,
    pub concurrency: u32,
    pub report: ReportTarget,
}

pub struct DifferentialUseCase<R: ProcessRunner> {
    runner: R,
    downloader: String,
    diff: Vec<String>,
    /// Applies to the diff tool's stderr; its stdout goes straight to the report.
    output_cap_bytes: usize,
}

impl<R: ProcessRunner> DifferentialUseCase<R> {
    /// `diff` is the comparison command prefix; the candidate and reference
    /// directories are appended in that order.
    pub fn new(runner: R, downloader: String, diff: Vec<String>, output_cap_bytes: usize) -> Self {
        Self {
            runner,
            downloader,
            diff,
            output_cap_bytes,
        }
    }

    /// Expects `reference_dir` to be populated already for the same manifest.
    pub fn execute(&self, req: &DifferentialRequest) -> Result<ComparisonReport> {
        recreate_dir(&req.candidate_dir)?;

        let downloader = self.run_downloader(req);
        if !downloader.success() {
            tracing::warn!(
                dataset = %req.dataset,
                status = %downloader,
                "downloader failed; comparing whatever it produced"
            );
        }

        let candidate = req.candidate_dir.display().to_string();
        let reference = req.reference_dir.display().to_string();

        let mut argv = self.diff.clone();
        argv.push(candidate.clone());
        argv.push(reference.clone());

        let sink = req.report.sink(&req.dataset);

        let mut spec = CommandSpec::new(argv);
        spec.stdout = OutputMode::File(sink.clone());
        spec.stderr = OutputMode::Capture;
        spec.output_cap_bytes = self.output_cap_bytes;

        let run = self.runner.run(&spec);
        let output = collect_report(&req.report, &req.dataset, &sink);
        let run = run?;
        let output = output?;

        match run.exit_code {
            Some(0) | Some(1) => {}
            other => {
                let stderr = String::from_utf8_lossy(&run.stderr);
                return Err(HarnessError::Tooling(format!(
                    "{} reported trouble ({}): {}",
                    spec.program(),
                    other.map_or_else(|| "signal".to_string(), |c| format!("status {c}")),
                    stderr.trim()
                )));
            }
        }

        let lines = classify_diff_output(&output, &candidate, &reference);

        Ok(ComparisonReport {
            dataset: req.dataset.clone(),
            report_path: req.report.path().display().to_string(),
            lines,
            downloader,
        })
    }

    fn run_downloader(&self, req: &DifferentialRequest) -> DownloaderStatus {
        let spec = CommandSpec::new(vec![
            self.downloader.clone(),
            req.manifest_path.display().to_string(),
            req.concurrency.to_string(),
            req.candidate_dir.display().to_string(),
        ]);

        match self.runner.run(&spec) {
            Ok(run) => match run.exit_code {
                Some(code) => DownloaderStatus::Exited(code),
                None => DownloaderStatus::Signaled,
            },
            Err(e) => DownloaderStatus::LaunchFailed(e.to_string()),
        }
    }
}

/// Read back what the diff tool wrote and, for appended reports, fold the
/// staged section into the shared report.
fn collect_report(target: &ReportTarget, dataset: &str, sink: &Path) -> Result<String> {
    let output = read_report(sink)?;

    if let ReportTarget::Append(path) = target {
        discard_file(sink)?;
        if !output.is_empty() {
            let mut chunk = format!("== {dataset} ==\n{output}");
            if !output.ends_with('\n') {
                chunk.push('\n');
            }
            append_report(path, chunk.as_bytes())?;
        }
    }

    Ok(output)
}

//! Concurrency sweep: repeated timed runs of the downloader-under-test.

use crate::Clock;
use dlbench_adapters::{CommandSpec, OutputMode, ProcessRunner};
use dlbench_domain::{
    DomainError, parse_elapsed, round_centiseconds, trimmed_mean, validate_levels,
};
use dlbench_error::{HarnessError, Result};
use dlbench_types::{
    BenchMeta, ConcurrencySweepResult, LevelResult, RunMeta, SWEEP_SCHEMA_V1, SweepFailure,
    SweepReceipt, TimerSpec, TimingSample, ToolInfo,
};
use std::path::PathBuf;

/// The downloader's own stderr shares the pipe with the timer's report. Only
/// the tail is kept: the elapsed-time line comes last.
const TIMER_STDERR_TAIL: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("timed run could not be launched: {0}")]
    Launch(String),

    #[error("timed run exited with {}", describe_exit(.exit_code))]
    Process { exit_code: Option<i32> },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct SweepRequest {
    pub downloader: String,
    pub manifest_path: PathBuf,

    /// Third positional argument handed to the downloader in timed mode.
    pub tag: String,

    pub levels: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepOutcome {
    /// Every level that completed, ascending.
    pub results: ConcurrencySweepResult,

    /// The level the sweep stopped at, if it did not finish.
    pub failure: Option<SweepFailure>,
}

pub struct BenchmarkUseCase<R: ProcessRunner, C: Clock> {
    runner: R,
    clock: C,
    tool: ToolInfo,
    timer: TimerSpec,
    iterations: u32,
}

impl<R: ProcessRunner, C: Clock> BenchmarkUseCase<R, C> {
    pub fn new(runner: R, clock: C, tool: ToolInfo, timer: TimerSpec, iterations: u32) -> Self {
        Self {
            runner,
            clock,
            tool,
            timer,
            iterations,
        }
    }

    /// Run the sweep and wrap it in a `dlbench.sweep.v1` receipt.
    pub fn execute(&self, req: &SweepRequest) -> Result<SweepReceipt> {
        let started_at = self.clock.now_rfc3339();
        let outcome = self.sweep(req)?;
        let ended_at = self.clock.now_rfc3339();

        Ok(SweepReceipt {
            schema: SWEEP_SCHEMA_V1.to_string(),
            tool: self.tool.clone(),
            run: RunMeta {
                started_at,
                ended_at,
            },
            bench: BenchMeta {
                downloader: req.downloader.clone(),
                manifest: req.manifest_path.display().to_string(),
                tag: req.tag.clone(),
                iterations: self.iterations,
                levels: req.levels.clone(),
                timer: self.timer.describe(),
            },
            results: outcome.results,
            failure: outcome.failure,
        })
    }

    /// Sample each level in ascending order.
    ///
    /// A level that cannot produce a value stops the sweep there; levels that
    /// already completed are kept.
    pub fn sweep(&self, req: &SweepRequest) -> Result<SweepOutcome> {
        validate_levels(&req.levels).map_err(|e| HarnessError::Config(e.to_string()))?;

        let mut results = ConcurrencySweepResult::new();
        let mut failure = None;

        for &level in &req.levels {
            tracing::info!(level, "Threads: {level}");

            match self.sample(req, level) {
                Ok(result) => {
                    tracing::info!(level, mean_secs = result.mean_secs, "level done");
                    results.push(result).map_err(|r| {
                        HarnessError::Config(format!("level {} out of order", r.level))
                    })?;
                }
                Err(e) => {
                    tracing::warn!(level, error = %e, "sweep stopped at level {level}");
                    failure = Some(SweepFailure {
                        level,
                        reason: e.to_string(),
                    });
                    break;
                }
            }
        }

        Ok(SweepOutcome { results, failure })
    }

    /// Time `iterations` runs at one level and reduce them to a trimmed mean.
    pub fn sample(
        &self,
        req: &SweepRequest,
        level: u32,
    ) -> std::result::Result<LevelResult, SampleError> {
        let mut samples = Vec::with_capacity(self.iterations as usize);

        for i in 1..=self.iterations {
            tracing::info!(level, iteration = i, "Iteration: {i}");
            samples.push(self.time_once(req, level)?);
        }

        let mean_secs = trimmed_mean(&samples)?;

        Ok(LevelResult {
            level,
            mean_secs,
            samples,
        })
    }

    fn time_once(
        &self,
        req: &SweepRequest,
        level: u32,
    ) -> std::result::Result<TimingSample, SampleError> {
        let downloader = [
            req.downloader.clone(),
            req.manifest_path.display().to_string(),
            level.to_string(),
            req.tag.clone(),
        ];

        match &self.timer {
            TimerSpec::External(prefix) => {
                let mut argv = prefix.clone();
                argv.extend(downloader);

                let mut spec = CommandSpec::new(argv);
                spec.stdout = OutputMode::Discard;
                spec.stderr = OutputMode::CaptureTail;
                spec.output_cap_bytes = TIMER_STDERR_TAIL;

                let run = self
                    .runner
                    .run(&spec)
                    .map_err(|e| SampleError::Launch(e.to_string()))?;
                if !run.success() {
                    return Err(SampleError::Process {
                        exit_code: run.exit_code,
                    });
                }
                Ok(parse_elapsed(&String::from_utf8_lossy(&run.stderr))?)
            }
            TimerSpec::Builtin => {
                let mut spec = CommandSpec::new(downloader.to_vec());
                spec.stdout = OutputMode::Discard;
                let run = self
                    .runner
                    .run(&spec)
                    .map_err(|e| SampleError::Launch(e.to_string()))?;
                if !run.success() {
                    return Err(SampleError::Process {
                        exit_code: run.exit_code,
                    });
                }
                let secs = round_centiseconds(run.wall.as_secs_f64());
                TimingSample::new(secs).ok_or(SampleError::Process {
                    exit_code: run.exit_code,
                })
            }
        }
    }
}

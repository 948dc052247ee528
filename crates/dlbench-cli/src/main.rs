use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use dlbench_adapters::{HttpFetcher, StdProcessRunner, resolve_program, write_report};
use dlbench_app::{
    BenchmarkUseCase, DifferentialRequest, DifferentialUseCase, FetchRequest,
    ReferenceFetchUseCase, ReportTarget, SweepRequest, SystemClock, render_comparison_summary,
    render_sweep_json, report_sweep,
};
use dlbench_config::{Overrides, Settings, load_config, resolve};
use dlbench_error::HarnessError;
use dlbench_types::{TimerSpec, ToolInfo};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "dlbench",
    version,
    about = "Differential tests and concurrency sweeps for an external downloader"
)]
struct Cli {
    /// Config file (default: dlbench.toml in the working directory, if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base directory for manifests, run directories and the report
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,

    /// More log output (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch each dataset sequentially, run the downloader on it, and diff the two.
    ///
    /// Dataset NAME reads NAME.txt and compares custom_NAME against legit_NAME.
    E2e {
        /// Concurrency handed to the downloader
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        threads: u32,

        /// Dataset names
        datasets: Vec<String>,

        /// Downloader binary
        #[arg(long)]
        downloader: Option<String>,

        /// Directory comparison command; candidate and reference dirs are appended
        #[arg(long)]
        diff: Option<String>,

        /// Report file for the diff output
        #[arg(long)]
        report: Option<PathBuf>,

        /// User-Agent header for the reference fetch
        #[arg(long)]
        user_agent: Option<String>,
    },

    /// Time the downloader across ascending concurrency levels.
    Bench {
        /// Downloader binary
        downloader: String,

        /// Manifest file handed to the downloader
        manifest: PathBuf,

        /// Concurrency levels, ascending (e.g. 1,2,4,8)
        #[arg(long, value_delimiter = ',')]
        levels: Option<Vec<u32>>,

        /// Timed runs per level (min and max are discarded)
        #[arg(long)]
        iterations: Option<u32>,

        /// Timer command prefix, or "builtin" for the in-process wall clock
        #[arg(long)]
        timer: Option<String>,

        /// Third positional argument passed to the downloader
        #[arg(long)]
        tag: Option<String>,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Write JSON receipt to this path instead of stdout (implies --format json)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Pretty-print JSON
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_tracing(cli.verbose, cli.quiet);

    if let Err(err) = real_main(cli) {
        eprintln!("error: {err:#}");
        eprintln!();
        eprintln!("{}", Cli::command().render_usage());
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

fn real_main(cli: Cli) -> anyhow::Result<()> {
    let base = cli.workdir.clone().unwrap_or_else(|| PathBuf::from("."));
    let file = load_config(cli.config.as_deref(), &base)?;

    match cli.cmd {
        Command::E2e {
            threads,
            datasets,
            downloader,
            diff,
            report,
            user_agent,
        } => {
            let settings = resolve(
                &file,
                &Overrides {
                    downloader,
                    diff,
                    report,
                    user_agent,
                    ..Overrides::default()
                },
            )?;
            run_e2e(&base, &settings, threads, &datasets)
        }

        Command::Bench {
            downloader,
            manifest,
            levels,
            iterations,
            timer,
            tag,
            format,
            out,
            pretty,
        } => {
            let settings = resolve(
                &file,
                &Overrides {
                    downloader: Some(downloader),
                    levels,
                    iterations,
                    timer,
                    tag,
                    ..Overrides::default()
                },
            )?;
            let format = if out.is_some() { Format::Json } else { format };
            run_bench(&base, &settings, &manifest, format, out.as_deref(), pretty)
        }
    }
}

fn run_e2e(base: &Path, settings: &Settings, threads: u32, datasets: &[String]) -> anyhow::Result<()> {
    if datasets.is_empty() {
        tracing::warn!("no datasets given; nothing to compare");
        return Ok(());
    }

    let downloader = program_path(base, &settings.downloader)?;
    let mut diff = settings.diff.clone();
    diff[0] = program_path(base, &diff[0])?;

    let report_path = base.join(&settings.report);
    write_report(&report_path, b"").map_err(HarnessError::from)?;

    let fetch = ReferenceFetchUseCase::new(
        HttpFetcher::new(&settings.user_agent).map_err(HarnessError::from)?,
    );
    let differential = DifferentialUseCase::new(
        StdProcessRunner,
        downloader,
        diff,
        settings.output_cap_bytes,
    );

    let mut mismatched = Vec::new();

    for name in datasets {
        let manifest_path = base.join(format!("{name}.txt"));
        let reference_dir = base.join(format!("legit_{name}"));
        let candidate_dir = base.join(format!("custom_{name}"));

        tracing::info!(dataset = %name, "fetching reference set");
        fetch
            .execute(&FetchRequest {
                manifest_path: manifest_path.clone(),
                output_dir: reference_dir.clone(),
            })
            .with_context(|| format!("reference fetch for dataset {name}"))?;

        tracing::info!(dataset = %name, threads, "running downloader");
        let report = differential
            .execute(&DifferentialRequest {
                dataset: name.clone(),
                manifest_path,
                reference_dir,
                candidate_dir,
                concurrency: threads,
                report: if datasets.len() == 1 {
                    ReportTarget::Overwrite(report_path.clone())
                } else {
                    ReportTarget::Append(report_path.clone())
                },
            })
            .with_context(|| format!("comparison for dataset {name}"))?;

        println!("{}", render_comparison_summary(&report));
        if !report.identical() {
            mismatched.push(name.as_str());
        }
    }

    if !mismatched.is_empty() {
        anyhow::bail!(
            "downloader output differs from reference for: {}",
            mismatched.join(", ")
        );
    }
    Ok(())
}

fn run_bench(
    base: &Path,
    settings: &Settings,
    manifest: &Path,
    format: Format,
    out: Option<&Path>,
    pretty: bool,
) -> anyhow::Result<()> {
    let downloader = program_path(base, &settings.downloader)?;
    let timer = match &settings.timer {
        TimerSpec::External(argv) => {
            let mut argv = argv.clone();
            argv[0] = program_path(base, &argv[0])?;
            TimerSpec::External(argv)
        }
        TimerSpec::Builtin => TimerSpec::Builtin,
    };

    let manifest_path = base.join(manifest);
    if !manifest_path.is_file() {
        return Err(HarnessError::filesystem(
            &manifest_path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "manifest not found"),
        )
        .into());
    }

    let usecase = BenchmarkUseCase::new(
        StdProcessRunner,
        SystemClock,
        tool_info(),
        timer,
        settings.iterations,
    );

    let receipt = usecase.execute(&SweepRequest {
        downloader,
        manifest_path,
        tag: settings.tag.clone(),
        levels: settings.levels.clone(),
    })?;

    match (format, out) {
        (Format::Text, _) => {
            report_sweep(&receipt.results, &mut std::io::stdout().lock())
                .context("write results")?;
        }
        (Format::Json, None) => println!("{}", render_sweep_json(&receipt, pretty)?),
        (Format::Json, Some(path)) => {
            let json = render_sweep_json(&receipt, pretty)?;
            write_atomic(&base.join(path), json.as_bytes())?;
        }
    }

    if let Some(failure) = &receipt.failure {
        anyhow::bail!("Failed when threads = {}: {}", failure.level, failure.reason);
    }
    Ok(())
}

fn tool_info() -> ToolInfo {
    ToolInfo {
        name: "dlbench".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

/// Path-like programs resolve against `base`; bare names go through `PATH`.
fn program_path(base: &Path, program: &str) -> anyhow::Result<String> {
    let candidate = if program.chars().any(std::path::is_separator) {
        base.join(program).display().to_string()
    } else {
        program.to_string()
    };
    let resolved = resolve_program(&candidate).map_err(HarnessError::from)?;
    Ok(resolved.display().to_string())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = parent.to_path_buf();
    tmp.push(format!(".{}.tmp", uuid::Uuid::new_v4()));

    {
        let mut f =
            fs::File::create(&tmp).with_context(|| format!("create temp {}", tmp.display()))?;
        f.write_all(bytes)
            .with_context(|| format!("write temp {}", tmp.display()))?;
        f.sync_all().ok();
    }

    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

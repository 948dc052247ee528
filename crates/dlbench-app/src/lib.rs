//! Application layer for dlbench.
//!
//! The app layer coordinates adapters and domain logic.
//! It does not parse CLI flags. Every path it touches arrives in a request
//! struct; nothing is resolved against the process working directory here.

mod bench;
mod differential;
mod fetch;
mod report;

pub use bench::{BenchmarkUseCase, SampleError, SweepOutcome, SweepRequest};
pub use differential::{DifferentialRequest, DifferentialUseCase, ReportTarget};
pub use fetch::{FetchOutcome, FetchRequest, ReferenceFetchUseCase, load_manifest};
pub use report::{
    render_comparison_summary, render_sweep_json, render_sweep_text, report_sweep,
};

pub trait Clock: Send + Sync {
    fn now_rfc3339(&self) -> String;
}

#[derive(Debug, Default, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_rfc3339(&self) -> String {
        use time::format_description::well_known::Rfc3339;
        time::OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    }
}

//! MPP Quality: scoring vertical runs for longitudinal refinement
//!
//! Every vertical run is reduced to a [`LongitudinalTrace`]. A
//! [`SuccessGate`] decides whether the trace counts as a success under a
//! [`ScoringProfile`], and a [`LongitudinalMetric`] turns a whole trace set
//! into one score.
//!
//! # Example
//!
//! ```
//! use mpp_quality::{LongitudinalMetric, LongitudinalTrace, TraceCostMetric};
//!
//! let trace = LongitudinalTrace::new("sum")
//!     .with_flags(true, true, Some(true))
//!     .with_refinements(0, 0);
//!
//! let metric = TraceCostMetric::default();
//! assert_eq!(metric.score(&[trace]), 1.0);
//! ```

pub mod gate;
pub mod metrics;
pub mod profile;
pub mod trace;

pub use gate::{Check, CheckStatus, GateVerdict, SuccessGate};
pub use metrics::{AllPassMetric, LongitudinalMetric, TraceCostMetric, TraceSummary};
pub use profile::ScoringProfile;
pub use trace::LongitudinalTrace;

/// Quick evaluation function
pub fn evaluate(trace: &LongitudinalTrace, mode: &str) -> GateVerdict {
    SuccessGate::for_mode(mode).evaluate(trace)
}

/// Metric by name, configured from a profile
pub fn metric_for(name: &str, profile: ScoringProfile) -> Option<Box<dyn LongitudinalMetric>> {
    match name {
        "trace_cost" => Some(Box::new(TraceCostMetric::with_profile(profile))),
        "all_pass" => Some(Box::new(AllPassMetric::new(profile))),
        _ => None,
    }
}

//! LSF integration for batchtools.
//!
//! Submit with bsub, list with bjobs, kill with bkill and inspect finished
//! jobs with bhist.

pub mod bhist;
pub mod bjobs;
pub mod bkill;
pub mod bsub;
pub mod failure;
pub mod types;

pub use bhist::{BhistError, query_bhist};
pub use bjobs::{BjobsError, query_bjobs};
pub use bkill::{BkillError, bkill};
pub use bsub::{BsubError, BsubOptions, build_bsub_args, parse_bsub_output, submit};
pub use failure::{FailureAnalysis, FailureError, FailureMode, analyze_failure};
pub use types::{LsfJob, LsfJobState};

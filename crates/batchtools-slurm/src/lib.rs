//! SLURM integration for batchtools.
//!
//! Submit with sbatch, list with squeue, cancel with scancel and inspect
//! finished jobs with sacct.

pub mod failure;
pub mod sacct;
pub mod sbatch;
pub mod scancel;
pub mod squeue;
pub mod types;

pub use failure::{FailureAnalysis, FailureError, FailureMode, analyze_failure};
pub use sacct::{FAILED_STATES, SacctError, query_sacct};
pub use sbatch::{SbatchError, SbatchOptions, build_sbatch_args, parse_sbatch_output, submit};
pub use scancel::{ScancelError, scancel};
pub use squeue::{SqueueError, query_squeue};
pub use types::{SlurmJob, SlurmJobState};

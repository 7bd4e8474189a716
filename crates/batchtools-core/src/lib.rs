//! Scheduler-neutral core of the batch tools.
//!
//! [`Batch`] dispatches submission, listing, killing and failure analysis
//! to SLURM, LSF or the local backend. Log files written by any of them
//! can be checked with [`scan_log_file`].

pub mod batch;
pub mod config;
pub mod error;
pub mod failure;
pub mod job;
pub mod local;
pub mod logscan;
pub mod system;

pub use batch::{Batch, KILL_CHUNK_SIZE, SubmitRequest, SubmittedJob};
pub use config::{Config, ConfigError, SchedulerConfig, ThrottleConfig};
pub use error::BatchError;
pub use failure::{FailureKind, FailureReport};
pub use job::{Job, JobFilter, JobStatus, ToJobStatus, parse_job_ids};
pub use local::{LocalBackend, LocalJob, LocalStore, StoreError};
pub use logscan::{LogOutcome, collect_logs, scan_log_content, scan_log_file};
pub use system::BatchSystem;

use thiserror::Error;

use crate::local::StoreError;
use crate::system::BatchSystem;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Unknown batch system '{0}' (expected local, lsf or slurm)")]
    UnknownSystem(String),
    #[error("Unknown job status '{0}'")]
    UnknownStatus(String),
    #[error("Invalid job id '{0}'")]
    InvalidJobId(String),
    #[error("No command to submit")]
    EmptyCommand,
    #[error("Maximum number of jobs must be at least 1")]
    InvalidThrottle,
    #[error("Cannot determine the current user; set $USER")]
    UnknownUser,
    #[error("Job {0} not found")]
    JobNotFound(String),
    #[error("{operation} is not supported for {system} jobs")]
    Unsupported {
        system: BatchSystem,
        operation: &'static str,
    },

    #[error(transparent)]
    Squeue(#[from] batchtools_slurm::SqueueError),
    #[error(transparent)]
    Sacct(#[from] batchtools_slurm::SacctError),
    #[error(transparent)]
    Sbatch(#[from] batchtools_slurm::SbatchError),
    #[error(transparent)]
    Scancel(#[from] batchtools_slurm::ScancelError),
    #[error(transparent)]
    SlurmFailure(#[from] batchtools_slurm::FailureError),

    #[error(transparent)]
    Bjobs(#[from] batchtools_lsf::BjobsError),
    #[error(transparent)]
    Bhist(#[from] batchtools_lsf::BhistError),
    #[error(transparent)]
    Bsub(#[from] batchtools_lsf::BsubError),
    #[error(transparent)]
    Bkill(#[from] batchtools_lsf::BkillError),
    #[error(transparent)]
    LsfFailure(#[from] batchtools_lsf::FailureError),

    #[error(transparent)]
    Command(#[from] batchtools_parsers::CommandError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

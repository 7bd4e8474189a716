//! Shared parsing and command utilities for the batch tools.
//!
//! Both scheduler crates (batchtools-slurm and batchtools-lsf) run external
//! scheduler commands and parse their text output. The helpers they share
//! live here.

pub mod command;
pub mod memory;
pub mod shell;
pub mod time;

pub use command::{CommandError, command_line, run_command, run_command_allow_failure};
pub use memory::{MemoryFormat, format_memory, parse_memory_mb, suggest_memory_mb};
pub use shell::{shell_join, shell_quote};
pub use time::{
    format_duration, format_duration_lsf, format_duration_slurm, parse_duration,
    parse_duration_secs, parse_exit_code, parse_lsf_timestamp, parse_slurm_timestamp,
    suggest_runtime_secs,
};

/// Text of a column, or `None` for the placeholders schedulers print in
/// empty columns.
pub fn non_empty_string(s: &str) -> Option<String> {
    match s.trim() {
        "" | "-" | "N/A" | "Unknown" | "(null)" | "None assigned" => None,
        value => Some(value.to_string()),
    }
}

/// Columns of a `|`-separated line; an error if there are fewer than
/// `min_fields`.
pub fn split_delimited(line: &str, min_fields: usize) -> Result<Vec<&str>, String> {
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() >= min_fields {
        Ok(fields)
    } else {
        Err(format!("{} of {} columns in '{}'", fields.len(), min_fields, line))
    }
}

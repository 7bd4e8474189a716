//! LSF job history from `bhist -l`.

use crate::types::{LsfJob, LsfJobState};
use batchtools_parsers::{
    MemoryFormat, parse_lsf_timestamp, parse_memory_mb, run_command_allow_failure,
};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum BhistError {
    #[error("bhist failed: {0}")]
    Command(String),
}

/// Undo bhist's line wrapping.
///
/// Long records are wrapped at a fixed width with an indented
/// continuation, which is glued back onto the line it continues.
pub(crate) fn logical_lines(output: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in output.lines() {
        let text = raw.trim();
        let is_continuation = raw.starts_with([' ', '\t']) && !text.is_empty();
        match lines.last_mut() {
            Some(prev) if is_continuation && !prev.is_empty() => prev.push_str(text),
            _ => lines.push(text.to_string()),
        }
    }
    lines
}

/// The `<...>` value after `label`: `bracketed("to Queue <long>", "Queue")`
/// is `long`.
pub(crate) fn bracketed<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let after = &line[line.find(label)? + label.len()..];
    let value = after.trim_start().strip_prefix('<')?;
    value.split_once('>').map(|(inside, _)| inside)
}

/// First run of digits after `label`.
fn number_after(text: &str, label: &str) -> Option<i32> {
    let rest = &text[text.find(label)? + label.len()..];
    let digits: String = rest
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// "Mon Dec 18 10:30:15: Dispatched to <node17>;" -> (time, "Dispatched to <node17>;")
fn split_event(line: &str) -> Option<(DateTime<Utc>, &str)> {
    let (stamp, text) = line.split_once(": ")?;
    let (_weekday, stamp) = stamp.split_once(' ')?;
    Some((parse_lsf_timestamp(stamp)?, text))
}

/// Exit code from "Exited with exit code 2." or "Exited by signal 9."
fn exit_code(text: &str) -> i32 {
    if let Some(code) = number_after(text, "exit code") {
        code
    } else if let Some(signal) = number_after(text, "signal") {
        128 + signal
    } else {
        1
    }
}

fn apply_event(job: &mut LsfJob, at: DateTime<Utc>, text: &str) {
    if text.starts_with("Submitted from host") {
        job.submitted = Some(at);
        job.queue = bracketed(text, "Queue").map(str::to_string);
        job.state = LsfJobState::Pend;
        return;
    }
    if text.starts_with("Dispatched") || text.starts_with("Started on") {
        job.started = Some(at);
        job.hosts = ["Host(s)", "Dispatched to", "Started on"]
            .into_iter()
            .find_map(|label| bracketed(text, label))
            .map(str::to_string);
        job.state = LsfJobState::Run;
        return;
    }
    if text.starts_with("Done successfully") {
        job.finished = Some(at);
        job.state = LsfJobState::Done;
        return;
    }
    if text.starts_with("Exited") {
        job.finished = Some(at);
        job.state = LsfJobState::Exit {
            code: exit_code(text),
            term: None,
        };
        return;
    }
    // "Completed <exit>; TERM_MEMLIMIT: job killed after reaching ..."
    if let (Some(idx), LsfJobState::Exit { term, .. }) = (text.find("TERM_"), &mut job.state) {
        *term = Some(text[idx..].trim().trim_end_matches(';').to_string());
    }
}

/// Jobs in `bhist -l` output, in order.
pub(crate) fn parse_bhist_long_output(output: &str) -> Vec<LsfJob> {
    let mut jobs: Vec<LsfJob> = Vec::new();

    for line in logical_lines(output) {
        if line.starts_with("Job <") {
            if let Some(id) = bracketed(&line, "Job") {
                let mut job = LsfJob::new(id);
                job.name = bracketed(&line, "Job Name").unwrap_or_default().to_string();
                jobs.push(job);
            }
            continue;
        }
        let Some(job) = jobs.last_mut() else {
            continue;
        };
        if let Some((_, mem)) = line.split_once("MAX MEM:") {
            let mem = mem.split(';').next().unwrap_or_default();
            job.max_mem_mb = parse_memory_mb(mem, MemoryFormat::Lsf);
        } else if let Some((at, text)) = split_event(&line) {
            apply_event(job, at, text);
        }
    }

    jobs
}

/// Finished and unfinished jobs (`bhist -a -l`) of `user`, or of everyone.
///
/// With `since`, jobs that finished earlier are dropped; unfinished jobs
/// are judged by their submission time.
pub async fn query_bhist(
    user: Option<&str>,
    name: Option<&str>,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<LsfJob>, BhistError> {
    let mut cmd = Command::new("bhist");
    cmd.args(["-a", "-l", "-u", user.unwrap_or("all")]);
    if let Some(name) = name {
        cmd.args(["-J", name]);
    }

    let stdout = run_command_allow_failure(&mut cmd, "bhist")
        .await
        .map_err(|e| BhistError::Command(e.to_string()))?;

    let mut jobs = parse_bhist_long_output(&stdout);
    if let Some(since) = since {
        jobs.retain(|job| job.finished.or(job.submitted).is_none_or(|t| t >= since));
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Job <1001>, Job Name <fit_tile_0001>, User <alice>, Project <default>, Command
                     <python fit.py --tile 1>
Mon Dec 18 10:30:15: Submitted from host <login01>, to Queue <long>, CWD <$HOM
                     E/run>, Output File (overwrite) <logs/fit_0001.log>;
Mon Dec 18 10:31:00: Dispatched to <node17>, Effective RES_REQ <select[type ==
                     local] order[r15s:pg] >;
Mon Dec 18 10:31:02: Starting (Pid 4242);
Mon Dec 18 11:02:45: Exited with exit code 130. The CPU time used is 1800.0 se
                     conds;
Mon Dec 18 11:02:45: Completed <exit>; TERM_MEMLIMIT: job killed after reachin
                     g LSF memory usage limit;

MEMORY USAGE:
MAX MEM: 4.5 Gbytes;  AVG MEM: 3 Gbytes

Summary of time in seconds spent in various states by  Mon Dec 18 11:02:45
  PEND     PSUSP    RUN      USUSP    SSUSP    UNKWN    TOTAL
  45       0        1905     0        0        0        1950
------------------------------------------------------------------------------

Job <1002>, Job Name <fit_tile_0002>, User <alice>, Project <default>, Command
                     <python fit.py --tile 2>
Mon Dec 18 10:30:16: Submitted from host <login01>, to Queue <long>, CWD <$HOM
                     E/run>;
Mon Dec 18 10:31:00: Dispatched 4 Task(s) on Host(s) <node18>, Allocated 4 Sl
                     ot(s) on Host(s) <node18>;
Mon Dec 18 10:50:00: Done successfully. The CPU time used is 1100.0 seconds;
";

    #[test]
    fn test_wrapped_lines_are_joined() {
        let lines = logical_lines(SAMPLE);
        assert_eq!(
            lines[0],
            "Job <1001>, Job Name <fit_tile_0001>, User <alice>, Project <default>, Command<python fit.py --tile 1>"
        );
        assert!(lines[1].ends_with("Output File (overwrite) <logs/fit_0001.log>;"));
    }

    #[test]
    fn test_history() {
        let jobs = parse_bhist_long_output(SAMPLE);
        assert_eq!(jobs.len(), 2);

        let failed = &jobs[0];
        assert_eq!((failed.id.as_str(), failed.name.as_str()), ("1001", "fit_tile_0001"));
        assert_eq!(failed.queue.as_deref(), Some("long"));
        assert_eq!(failed.hosts.as_deref(), Some("node17"));
        assert_eq!(failed.max_mem_mb, Some(4608));
        assert!(failed.submitted.is_some() && failed.finished.is_some());
        let LsfJobState::Exit { code, term } = &failed.state else {
            panic!("unexpected state {:?}", failed.state);
        };
        assert_eq!(*code, 130);
        assert!(term.as_deref().is_some_and(|t| t.starts_with("TERM_MEMLIMIT")));

        let done = &jobs[1];
        assert_eq!(done.state, LsfJobState::Done);
        assert_eq!(done.hosts.as_deref(), Some("node18"));
    }

    #[test]
    fn test_exit_by_signal() {
        let out = "Job <5>, Job Name <x>\n\
                   Mon Dec 18 10:31:00: Exited by signal 9. The CPU time used is 1 seconds;\n";
        let jobs = parse_bhist_long_output(out);
        assert_eq!(jobs[0].state, LsfJobState::Exit { code: 137, term: None });
    }

    #[test]
    fn test_bracketed() {
        assert_eq!(bracketed("to Queue <long>, CWD <x>", "Queue"), Some("long"));
        assert_eq!(bracketed("Job <12>, Job Name <a>", "Job"), Some("12"));
        assert_eq!(bracketed("no label", "Queue"), None);
    }
}

//! Timestamps, durations and run limits.

use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeZone, Utc};
use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Values schedulers print where a time is not known.
fn is_placeholder(s: &str) -> bool {
    matches!(s, "" | "-" | "N/A" | "Unknown" | "None" | "UNLIMITED")
}

/// Scheduler clocks print host local time. An hour repeated by a DST
/// change resolves to its first occurrence.
fn to_utc(dt: NaiveDateTime) -> Option<DateTime<Utc>> {
    Local
        .from_local_datetime(&dt)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

/// `2024-01-15T10:30:00` as printed by squeue and sacct.
pub fn parse_slurm_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if is_placeholder(s) {
        return None;
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .and_then(to_utc)
}

/// bjobs and bhist print `Dec 18 10:30`, optionally with seconds and a
/// year, and mark estimated times with a trailing ` L` or ` E`. A missing
/// year means this year.
pub fn parse_lsf_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim().trim_end_matches(" L").trim_end_matches(" E");
    if is_placeholder(s) {
        return None;
    }

    let this_year = format!("{} {}", s, Local::now().year());
    [s, this_year.as_str()]
        .into_iter()
        .flat_map(|text| {
            ["%b %d %H:%M %Y", "%b %d %H:%M:%S %Y"]
                .into_iter()
                .map(move |fmt| NaiveDateTime::parse_from_str(text, fmt))
        })
        .find_map(Result::ok)
        .and_then(to_utc)
}

/// `D-HH:MM:SS`, `HH:MM:SS`, `MM:SS` or plain seconds.
///
/// `UNLIMITED` and other placeholders have no duration.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if is_placeholder(s) {
        return None;
    }

    let (days, clock) = match s.split_once('-') {
        Some((d, rest)) => (d.parse::<u64>().ok()?, rest),
        None => (0, s),
    };
    let mut secs = 0u64;
    let mut fields = 0;
    for part in clock.split(':') {
        secs = secs * 60 + part.parse::<u64>().ok()?;
        fields += 1;
    }
    if fields > 3 {
        return None;
    }
    Some(Duration::from_secs(days * DAY + secs))
}

pub fn parse_duration_secs(s: &str) -> Option<u64> {
    parse_duration(s).map(|d| d.as_secs())
}

/// Exit code half of sacct's `code:signal`; 0 if unparseable.
pub fn parse_exit_code(s: &str) -> i32 {
    let code = s.split_once(':').map_or(s, |(code, _)| code);
    code.trim().parse().unwrap_or(0)
}

/// Duration for messages: `45s`, `5m 30s`, `2h 05m`, `1d 2h 30m`.
pub fn format_duration(seconds: u64) -> String {
    let (d, h, m, s) = (
        seconds / DAY,
        seconds % DAY / HOUR,
        seconds % HOUR / MINUTE,
        seconds % MINUTE,
    );
    match (d, h, m) {
        (0, 0, 0) => format!("{}s", s),
        (0, 0, _) => format!("{}m {:02}s", m, s),
        (0, _, _) => format!("{}h {:02}m", h, m),
        _ => format!("{}d {}h {:02}m", d, h, m),
    }
}

/// bsub `-W` limit, `H:MM`, rounded up to the minute.
pub fn format_duration_lsf(seconds: u64) -> String {
    let minutes = seconds.div_ceil(MINUTE);
    format!("{}:{:02}", minutes / 60, minutes % 60)
}

/// sbatch `--time` limit, `HH:MM:SS` or `D-HH:MM:SS`.
pub fn format_duration_slurm(seconds: u64) -> String {
    let clock = format!(
        "{:02}:{:02}:{:02}",
        seconds % DAY / HOUR,
        seconds % HOUR / MINUTE,
        seconds % MINUTE
    );
    match seconds / DAY {
        0 => clock,
        days => format!("{}-{}", days, clock),
    }
}

/// Limit to ask for after a timeout: half again the elapsed time, and at
/// least an hour more than the old limit.
pub fn suggest_runtime_secs(elapsed_secs: u64, limit_secs: u64) -> u64 {
    (elapsed_secs + elapsed_secs / 2).max(limit_secs + HOUR)
}

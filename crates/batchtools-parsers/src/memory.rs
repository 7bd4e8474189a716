//! Memory parsing utilities for scheduler output and user input.

/// Memory format variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryFormat {
    /// SLURM format: "4G", "1000M", "4096K" (no spaces)
    Slurm,
    /// SLURM sacct format: "4Gn", "1000Mc" (with per-node/per-core suffix)
    SlurmSacct,
    /// LSF format: "4 GB", "1000 MB", "4.5 Gbytes" (with spaces)
    Lsf,
    /// Values typed on the command line: "4G", "4GB", "4.5g", "512M", "2T"
    Human,
}

/// Parse memory string to megabytes.
///
/// Returns None for empty strings, placeholder values and unknown units.
pub fn parse_memory_mb(s: &str, format: MemoryFormat) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() || s == "-" {
        return None;
    }

    match format {
        MemoryFormat::Slurm => parse_suffixed(s),
        MemoryFormat::SlurmSacct => {
            // sacct memory can have 'n' or 'c' suffix (per node/per core)
            parse_suffixed(s.trim_end_matches('n').trim_end_matches('c'))
        }
        MemoryFormat::Lsf => parse_lsf_memory(s),
        MemoryFormat::Human => parse_human_memory(s),
    }
}

/// Scale a value in the given unit to megabytes.
fn to_mb(value: f64, unit: &str) -> Option<u64> {
    if value < 0.0 || !value.is_finite() {
        return None;
    }
    let mb = match unit {
        "T" | "TB" | "TBYTES" => value * 1024.0 * 1024.0,
        "G" | "GB" | "GBYTES" => value * 1024.0,
        "M" | "MB" | "MBYTES" | "" => value,
        "K" | "KB" | "KBYTES" => value / 1024.0,
        _ => return None,
    };
    Some(mb.round() as u64)
}

/// Parse a number with an optional single-letter unit suffix (e.g., "4G", "1000M", "4096").
fn parse_suffixed(s: &str) -> Option<u64> {
    let split = s
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let value: f64 = number.parse().ok()?;
    to_mb(value, &unit.to_ascii_uppercase())
}

/// Parse LSF memory format (e.g., "4 GB", "1000 MB", "4.5 Gbytes").
fn parse_lsf_memory(s: &str) -> Option<u64> {
    let parts: Vec<&str> = s.split_whitespace().collect();
    match parts.as_slice() {
        [value] => parse_suffixed(value),
        [value, unit, ..] => {
            let value: f64 = value.parse().ok()?;
            to_mb(value, &unit.to_ascii_uppercase())
        }
        [] => None,
    }
}

/// Parse user-supplied memory. Accepts one- and two-letter units, any case.
fn parse_human_memory(s: &str) -> Option<u64> {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    parse_suffixed(&compact)
}

/// Format megabytes the way sbatch and humans like to read them.
pub fn format_memory(mb: u64) -> String {
    if mb >= 1024 && mb % 1024 == 0 {
        format!("{}G", mb / 1024)
    } else {
        format!("{}M", mb)
    }
}

/// Memory to ask for after an out-of-memory failure: 50% above peak usage,
/// rounded up to whole GB, and at least 1 GB above the old limit.
pub fn suggest_memory_mb(used_mb: u64, limit_mb: u64) -> u64 {
    let suggested = ((used_mb as f64 * 1.5) / 1024.0).ceil() as u64 * 1024;
    suggested.max(limit_mb + 1024)
}

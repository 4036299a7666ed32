/// Abbreviate a hex hash for log lines, keeping the prefix and the last four digits.
pub fn short_hash(hash: &str) -> String {
    if hash.len() <= 14 || !hash.is_ascii() {
        return hash.to_string();
    }
    format!("{}..{}", &hash[..8], &hash[hash.len() - 4..])
}

/// Human-readable age of a block timestamp relative to `now`, both in unix seconds.
pub fn format_block_age(timestamp: u64, now: u64) -> String {
    let secs = now.saturating_sub(timestamp);
    match secs {
        0..=59 => format!("{}s ago", secs),
        60..=3599 => format!("{}m{}s ago", secs / 60, secs % 60),
        _ => format!("{}h{}m ago", secs / 3600, (secs % 3600) / 60),
    }
}

//! Environment parsing helpers shared by [`super::PublisherConfig::from_env`].

pub fn parse_env_usize(name: &str, default: usize) -> Result<usize, String> {
    std::env::var(name).map_or(Ok(default), |v| {
        v.parse::<usize>()
            .map_err(|e| format!("invalid {name}: {e}"))
    })
}

/// Like [`parse_env_usize`], but zero is rejected: it would stall every worker pool.
pub fn parse_env_nonzero_usize(name: &str, default: usize) -> Result<usize, String> {
    match parse_env_usize(name, default)? {
        0 => Err(format!("invalid {name}: must be at least 1")),
        n => Ok(n),
    }
}

pub fn parse_optional_env_u64(name: &str) -> Result<Option<u64>, String> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => v
            .parse::<u64>()
            .map(Some)
            .map_err(|e| format!("invalid {name}: {e}")),
        _ => Ok(None),
    }
}

/// `1` / `true` (any case) → true; unset → `default`; anything else → false.
pub fn parse_env_bool(name: &str, default: bool) -> bool {
    std::env::var(name).map_or(default, |v| v == "1" || v.eq_ignore_ascii_case("true"))
}

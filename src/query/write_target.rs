use once_cell::sync::Lazy;
use regex::Regex;

/// Split suffix the host appends when distributing a write across segments,
/// e.g. `/orders/0-3_7`
static WRITE_SUFFIX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/(.+)/[0-9]+-[0-9]+_[0-9]+$").unwrap()
});

/// Strip the host's split suffix from a write target; anything else passes through unchanged
pub fn normalize_write_target(data_source: &str) -> &str {
    WRITE_SUFFIX_REGEX
        .captures(data_source)
        .and_then(|caps| caps.get(1))
        .map_or(data_source, |name| name.as_str())
}

//! Shared helpers: configuration loading, lenient JSON parsing and log
//! sanitization.

/// Lenient JSON parsing and response sanitizing.
pub mod json_utils;
/// Escaping of untrusted values for log output.
pub mod log_sanitizer;
/// TOML configuration with environment overrides and hot reloading.
pub mod toml_config;

/// Longest prefix of `s` holding at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

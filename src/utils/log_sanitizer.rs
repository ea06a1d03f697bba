//! Escaping for untrusted values before they are written to logs.
//!
//! User feedback, tool names and tool arguments come from outside the
//! process; a raw newline in any of them would let the value forge extra
//! log lines.

use super::truncate_chars;

/// Escape line breaks, tabs, NUL and ESC, drop any other control
/// characters and cap the result at `max_length` characters.
pub fn sanitize_log_input(value: &str, max_length: usize) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            '\x1b' => out.push_str("\\x1b"),
            c if (c as u32) < 0x20 => {}
            c => out.push(c),
        }
    }

    if out.chars().count() > max_length {
        let keep = max_length.saturating_sub(3);
        return format!("{}...", truncate_chars(&out, keep));
    }
    out
}

pub fn sanitize_tool_name(name: &str) -> String {
    sanitize_log_input(name, 100)
}

pub fn sanitize_feedback(feedback: &str) -> String {
    sanitize_log_input(feedback, 500)
}

pub fn sanitize_agent_name(name: &str) -> String {
    sanitize_log_input(name, 100)
}

/// Tool input is often a large JSON blob; keep only its head.
pub fn sanitize_tool_input(input: &str) -> String {
    sanitize_log_input(input, 300)
}

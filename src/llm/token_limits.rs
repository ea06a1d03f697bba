//! Context-window sizes inferred from model names.

/// Used when neither configuration nor the table knows the model.
pub const DEFAULT_TOKEN_LIMIT: usize = 100_000;

/// Substring patterns checked in order; the first match wins, so more
/// specific names come before their prefixes (`gpt-4o` before `gpt-4`).
const MODEL_TOKEN_LIMITS: &[(&str, usize)] = &[
    ("gpt-4o", 120_000),
    ("gpt-4-turbo", 120_000),
    ("gpt-4", 8_000),
    ("gpt-3.5-turbo", 4_000),
    ("claude-3", 180_000),
    ("claude-2", 100_000),
    ("gemini-2", 180_000),
    ("gemini-1.5-pro", 180_000),
    ("gemini-1.5-flash", 180_000),
    ("gemini-pro", 30_000),
    ("doubao", 200_000),
    ("deepseek", 100_000),
    ("qwen", 30_000),
    ("llama", 4_000),
];

/// Token limit for a model name, case-insensitive.
pub fn infer_token_limit(model_name: &str) -> usize {
    let lowered = model_name.to_lowercase();
    MODEL_TOKEN_LIMITS
        .iter()
        .find(|(pattern, _)| lowered.contains(pattern))
        .map(|(_, limit)| *limit)
        .unwrap_or(DEFAULT_TOKEN_LIMIT)
}

/// Explicit limit when configured, otherwise inferred from the name.
pub fn resolve_token_limit(explicit: Option<usize>, model_name: &str) -> usize {
    match explicit {
        Some(limit) if limit > 0 => limit,
        _ => infer_token_limit(model_name),
    }
}

//! Token budget estimation and truncation.
//!
//! Token counts are a character heuristic, not a tokenizer: `ceil(chars / 3.8)`.
//! Every estimate here is an approximation and truncation is best-effort. The
//! functions never fail; oversized input is cut, never rejected.

use crate::Message;

/// Characters per token for the estimation heuristic.
pub const CHARS_PER_TOKEN: f64 = 3.8;

/// Per-message framing overhead in tokens.
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Context window assumed for models missing from [`MODEL_CONTEXT_WINDOWS`].
pub const DEFAULT_CONTEXT_WINDOW: usize = 8192;

/// Share of the context window the transcript may use. The rest is reserved
/// for the system prompt and the model's response.
const BUDGET_FRACTION: f64 = 0.75;

/// Share of the character budget kept from each end when truncating.
const KEEP_FRACTION: f64 = 0.45;

/// Known context windows, keyed by model name without a vendor prefix.
/// Unknown variants resolve to the longest key that prefixes their name.
pub const MODEL_CONTEXT_WINDOWS: &[(&str, usize)] = &[
    ("gpt-4o", 128_000),
    ("gpt-4o-mini", 128_000),
    ("gpt-4.1", 1_047_576),
    ("gpt-4-turbo", 128_000),
    ("gpt-4", 8192),
    ("gpt-3.5-turbo", 16_385),
    ("o1", 200_000),
    ("o3", 200_000),
    ("claude", 200_000),
    ("gemini", 1_000_000),
    ("llama3.2", 131_072),
    ("llama3.1", 131_072),
    ("llama3", 8192),
    ("llama-3.1", 131_072),
    ("llama-3", 8192),
    ("qwen2.5-coder", 32_768),
    ("qwen2.5", 32_768),
    ("qwen3", 40_960),
    ("deepseek-coder", 16_384),
    ("deepseek-chat", 64_000),
    ("deepseek-r1", 64_000),
    ("mistral", 32_768),
    ("mixtral", 32_768),
    ("codellama", 16_384),
    ("gemma2", 8192),
    ("gemma3", 131_072),
    ("phi3", 4096),
];

/// Estimate the token count of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    if chars == 0 {
        return 0;
    }
    (chars as f64 / CHARS_PER_TOKEN).ceil() as usize
}

/// Estimate the tokens of a transcript: `4 + estimate_tokens(content)` per turn.
/// Tool-call arguments on assistant turns count as content.
pub fn estimate_transcript_tokens(turns: &[Message]) -> usize {
    turns
        .iter()
        .map(|m| {
            let calls: usize = m
                .tool_calls
                .iter()
                .flatten()
                .map(|c| estimate_tokens(&c.function.name) + estimate_tokens(&c.function.arguments))
                .sum();
            MESSAGE_OVERHEAD_TOKENS + estimate_tokens(m.text()) + calls
        })
        .sum()
}

/// Raw context window for `model`, before the budget fraction is applied.
pub fn context_window(model: &str) -> usize {
    let lower = model.to_lowercase();
    // "openai/gpt-4o" -> "gpt-4o"; ":free" and similar suffixes don't matter
    // for prefix matching.
    let bare = lower.rsplit('/').next().unwrap_or(&lower);

    MODEL_CONTEXT_WINDOWS
        .iter()
        .filter(|(key, _)| bare.starts_with(key))
        .max_by_key(|(key, _)| key.len())
        .map(|(_, window)| *window)
        .unwrap_or(DEFAULT_CONTEXT_WINDOW)
}

/// Tokens the transcript may occupy for `model`: 75% of its context window.
pub fn context_budget(model: &str) -> usize {
    (context_window(model) as f64 * BUDGET_FRACTION) as usize
}

/// Whether the transcript plus system prompt exceeds the model's budget.
/// The system prompt is framed like any other turn.
pub fn is_over_budget(turns: &[Message], system_prompt: &str, model: &str) -> bool {
    let system = if system_prompt.is_empty() {
        0
    } else {
        MESSAGE_OVERHEAD_TOKENS + estimate_tokens(system_prompt)
    };
    estimate_transcript_tokens(turns) + system > context_budget(model)
}

fn char_budget(max_tokens: usize) -> usize {
    (max_tokens as f64 * CHARS_PER_TOKEN) as usize
}

/// Keep ~45% of the allowed characters from the head and ~45% from the tail,
/// with a marker giving the estimated number of omitted tokens.
pub fn truncate_to_budget(text: &str, max_tokens: usize) -> String {
    if estimate_tokens(text) <= max_tokens {
        return text.to_string();
    }

    let chars: Vec<char> = text.chars().collect();
    let keep = (char_budget(max_tokens) as f64 * KEEP_FRACTION) as usize;
    let head: String = chars[..keep].iter().collect();
    let tail: String = chars[chars.len() - keep..].iter().collect();
    let omitted: String = chars[keep..chars.len() - keep].iter().collect();

    format!(
        "{head}\n\n[... ~{} tokens omitted ...]\n\n{tail}",
        estimate_tokens(&omitted)
    )
}

/// Cap a tool result before it enters the transcript, choosing a strategy
/// by tool name.
///
/// - `read_file`: keep whole head and tail lines so no line is cut midway.
/// - `search_text`: keep the first result lines and append a footer.
/// - anything else: [`truncate_to_budget`].
pub fn truncate_tool_output(tool_name: &str, output: &str, max_tokens: usize) -> String {
    if estimate_tokens(output) <= max_tokens {
        return output.to_string();
    }
    match tool_name {
        "read_file" => truncate_lines_head_tail(output, max_tokens),
        "search_text" => truncate_lines_head(output, max_tokens),
        _ => truncate_to_budget(output, max_tokens),
    }
}

fn truncate_lines_head_tail(output: &str, max_tokens: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let keep_chars = (char_budget(max_tokens) as f64 * KEEP_FRACTION) as usize;

    let mut head_end = 0;
    let mut used = 0;
    while head_end < lines.len() {
        let len = lines[head_end].chars().count() + 1;
        if used + len > keep_chars {
            break;
        }
        used += len;
        head_end += 1;
    }

    let mut tail_start = lines.len();
    used = 0;
    while tail_start > head_end {
        let len = lines[tail_start - 1].chars().count() + 1;
        if used + len > keep_chars {
            break;
        }
        used += len;
        tail_start -= 1;
    }

    // A single enormous line defeats line-based truncation.
    if head_end == 0 && tail_start == lines.len() {
        return truncate_to_budget(output, max_tokens);
    }

    let omitted = &lines[head_end..tail_start];
    let omitted_tokens: usize = omitted.iter().map(|l| estimate_tokens(l)).sum();
    format!(
        "{}\n\n[... {} lines omitted (~{} tokens) ...]\n\n{}",
        lines[..head_end].join("\n"),
        omitted.len(),
        omitted_tokens,
        lines[tail_start..].join("\n"),
    )
}

fn truncate_lines_head(output: &str, max_tokens: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let keep_chars = (char_budget(max_tokens) as f64 * (KEEP_FRACTION * 2.0)) as usize;

    let mut kept = 0;
    let mut used = 0;
    while kept < lines.len() {
        let len = lines[kept].chars().count() + 1;
        if used + len > keep_chars {
            break;
        }
        used += len;
        kept += 1;
    }

    if kept == 0 {
        return truncate_to_budget(output, max_tokens);
    }

    format!(
        "{}\n\n[... {} more results truncated; narrow the query or add a path filter ...]",
        lines[..kept].join("\n"),
        lines.len() - kept,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_has_zero_tokens() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(38)), 10);
    }

    #[test]
    fn estimate_is_monotonic_in_prefix() {
        let s = "fn main() { println!(\"héllo wörld\"); }";
        let mut prev = 0;
        for n in 0..=s.chars().count() {
            let prefix: String = s.chars().take(n).collect();
            let t = estimate_tokens(&prefix);
            assert!(t >= prev);
            prev = t;
        }
    }

    #[test]
    fn transcript_tokens_include_overhead() {
        let turns = vec![Message::user(""), Message::user("abcd")];
        assert_eq!(estimate_transcript_tokens(&turns), 4 + 4 + 2);
    }

    #[test]
    fn tool_call_payload_counts_toward_transcript() {
        let call = crate::ToolCall::new("c1", "read_file", r#"{"path":"a"}"#);
        let turns = vec![Message::assistant_tool_calls(None, vec![call])];
        // Overhead, empty content, "read_file" (3) and the 12-char arguments (4).
        assert_eq!(estimate_transcript_tokens(&turns), 4 + 3 + 4);
    }

    #[test]
    fn adding_turn_never_decreases_estimate() {
        let mut turns = vec![Message::user("question")];
        let before = estimate_transcript_tokens(&turns);
        turns.push(Message::assistant_text(""));
        assert!(estimate_transcript_tokens(&turns) > before);
    }

    #[test]
    fn known_and_prefixed_models() {
        assert_eq!(context_window("gpt-4"), 8192);
        assert_eq!(context_window("openai/gpt-4o-mini"), 128_000);
        assert_eq!(context_window("llama3.1:8b"), 131_072);
        assert_eq!(context_window("llama3:70b"), 8192);
        assert_eq!(context_window("anthropic/claude-sonnet-4"), 200_000);
        assert_eq!(context_window("qwen2.5-coder:7b"), 32_768);
    }

    #[test]
    fn unknown_model_uses_default() {
        assert_eq!(context_window("totally-unknown"), DEFAULT_CONTEXT_WINDOW);
        assert_eq!(context_budget("totally-unknown"), 6144);
    }

    #[test]
    fn budget_is_three_quarters() {
        assert_eq!(context_budget("gpt-4o"), 96_000);
    }

    #[test]
    fn over_budget_counts_system_prompt() {
        let model = "unknown";
        let budget = context_budget(model);
        // One turn of exactly `budget - 4` content tokens fits on its own.
        let content = "x".repeat(((budget - 4) as f64 * CHARS_PER_TOKEN) as usize);
        let turns = vec![Message::user(content)];
        assert!(estimate_transcript_tokens(&turns) <= budget);
        assert!(!is_over_budget(&turns, "", model));
        assert!(is_over_budget(&turns, "You are a code assistant.", model));
    }

    #[test]
    fn truncate_to_budget_is_noop_when_small() {
        assert_eq!(truncate_to_budget("short", 100), "short");
    }

    #[test]
    fn truncate_to_budget_keeps_head_and_tail() {
        let text = format!("HEAD{}TAIL", "m".repeat(4000));
        let out = truncate_to_budget(&text, 100);
        assert!(out.starts_with("HEAD"));
        assert!(out.ends_with("TAIL"));
        assert!(out.contains("tokens omitted"));
        assert!(out.len() < text.len());
    }

    #[test]
    fn truncate_to_budget_is_char_safe() {
        let text = "é".repeat(2000);
        let out = truncate_to_budget(&text, 50);
        assert!(out.contains("tokens omitted"));
    }

    #[test]
    fn read_file_truncation_keeps_whole_lines() {
        let text: String = (1..=500)
            .map(|i| format!("{i:>4} | let value_{i} = compute({i});\n"))
            .collect();
        let out = truncate_tool_output("read_file", &text, 200);
        assert!(out.starts_with("   1 | let value_1"));
        assert!(out.contains("lines omitted"));
        assert!(out.trim_end().ends_with("compute(500);"));
        for line in out.lines().filter(|l| l.contains('|')) {
            assert!(line.ends_with(");"), "cut line: {line}");
        }
    }

    #[test]
    fn search_truncation_keeps_first_results() {
        let text: String = (1..=400)
            .map(|i| format!("src/file_{i}.rs:{i}: createProvider()\n"))
            .collect();
        let out = truncate_tool_output("search_text", &text, 150);
        assert!(out.starts_with("src/file_1.rs:1:"));
        assert!(out.contains("more results truncated"));
        assert!(!out.contains("src/file_400.rs"));
    }

    #[test]
    fn other_tools_use_generic_truncation() {
        let text = "z".repeat(10_000);
        let out = truncate_tool_output("git_status", &text, 100);
        assert!(out.contains("tokens omitted"));
    }
}

//! Summarization request for transcript compaction.
//!
//! The middle of the transcript is condensed into one synthetic turn by a
//! single auxiliary model call. The summary is a fact list, not prose: the
//! loop only needs to remember where things are.

use crate::{ChatRequest, Message, MessageRole};

const SUMMARIZATION_PROMPT: &str = "\
You compress an agent's research transcript. Output a bullet list of facts only.

Rules:
- Bullets only. No headings, no preamble, no conclusions.
- Keep file paths, function and type names, and line numbers verbatim.
- Record what was searched for and where it was (or was not) found.
- No opinions, no speculation, no advice.
- At most 300 words.";

/// Shortest summary accepted from the model. Anything shorter is treated as
/// a failed call.
pub const MIN_SUMMARY_CHARS: usize = 20;

pub const SUMMARY_MAX_TOKENS: u32 = 600;

/// Build the one-shot request that summarizes `span`.
pub fn build_summarization_request(model: &str, span: &[Message]) -> ChatRequest {
    let mut content = String::from("Summarize these transcript turns:\n\n");
    for msg in span {
        let text = match (&msg.role, msg.tool_calls.as_deref()) {
            (MessageRole::Assistant, Some(calls)) if msg.text().is_empty() => calls
                .iter()
                .map(|c| format!("called {}({})", c.function.name, c.function.arguments))
                .collect::<Vec<_>>()
                .join("; "),
            _ if msg.text().is_empty() => "[no content]".to_string(),
            _ => msg.text().to_string(),
        };
        content.push_str(&format!("[{}]: {text}\n\n", msg.role));
    }

    ChatRequest::one_shot(model, SUMMARIZATION_PROMPT, content, SUMMARY_MAX_TOKENS, 0.1)
}

/// Synthetic turn that replaces a compacted span.
pub fn summary_turn(summary: &str, compressed: usize) -> Message {
    Message::user(format!(
        "[Summary of {compressed} earlier messages]\n{}",
        summary.trim()
    ))
}

/// Placeholder used when the summarizer is unavailable.
pub fn placeholder_turn(compressed: usize) -> Message {
    Message::user(format!(
        "[{compressed} earlier messages were compressed to save context. \
         Re-read any file you need details from.]"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolCall;

    #[test]
    fn request_includes_every_turn() {
        let span = vec![
            Message::user("Where is the router?"),
            Message::tool_result("c1", "src/router.rs:12: pub fn route()"),
        ];
        let req = build_summarization_request("m", &span);
        assert_eq!(req.messages.len(), 2);
        assert!(req.messages[0].text().contains("Bullets only"));
        let user = req.messages[1].text();
        assert!(user.contains("[user]: Where is the router?"));
        assert!(user.contains("[tool]: src/router.rs:12"));
        assert!(req.tools.is_none());
    }

    #[test]
    fn tool_call_turns_are_described() {
        let call = ToolCall::new("c1", "read_file", r#"{"path":"a.rs"}"#);
        let span = vec![Message::assistant_tool_calls(None, vec![call])];
        let req = build_summarization_request("m", &span);
        assert!(req.messages[1].text().contains(r#"called read_file({"path":"a.rs"})"#));
    }

    #[test]
    fn placeholder_states_count() {
        let turn = placeholder_turn(7);
        assert!(turn.text().contains("7 earlier messages"));
        assert_eq!(turn.role, MessageRole::User);
    }
}

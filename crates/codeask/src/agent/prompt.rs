//! Prompt text and the system prompt builder.
//!
//! Every fixed instruction the loop sends to a model lives here: the primary
//! system prompt, planner instructions, behavioral rules appended to the
//! first user turn, and the turns injected mid-loop (scratchpad checkpoint,
//! synthesis reminder, duplicate guidance, answer corrections).

/// Builder for multi-section system prompts.
///
/// Sections are joined with double newlines. Empty sections (from
/// `section_opt` with `None`, or empty content) are skipped.
///
/// ```
/// use codeask::agent::prompt::SystemPromptBuilder;
///
/// let prompt = SystemPromptBuilder::new("You answer questions about code.")
///     .section("Workspace", "/srv/app")
///     .section_opt("Project notes", None::<String>)
///     .build();
///
/// assert!(prompt.contains("## Workspace"));
/// assert!(!prompt.contains("Project notes"));
/// ```
pub struct SystemPromptBuilder {
    sections: Vec<String>,
}

impl SystemPromptBuilder {
    /// Start with a preamble that gets no heading.
    pub fn new(preamble: impl Into<String>) -> Self {
        Self {
            sections: vec![preamble.into()],
        }
    }

    /// Append a `## heading` section. Skipped if `content` is empty.
    pub fn section(mut self, heading: &str, content: impl Into<String>) -> Self {
        let content = content.into();
        if !content.trim().is_empty() {
            self.sections.push(format!("## {heading}\n\n{}", content.trim_end()));
        }
        self
    }

    /// Append a section only if the content is `Some`.
    pub fn section_opt(self, heading: &str, content: Option<impl Into<String>>) -> Self {
        match content {
            Some(c) => self.section(heading, c),
            None => self,
        }
    }

    pub fn build(self) -> String {
        self.sections.join("\n\n")
    }
}

pub const SYSTEM_PROMPT: &str = "\
You are a code assistant answering questions about a local codebase. \
You cannot see the code until you look: use the tools to search, list and \
read files, then answer from what you actually found.

Rules:
- Ground every claim in a file you read. Cite paths and line numbers.
- Prefer search_text or find_files to locate code, then read_file the hits.
- Never repeat a call with identical arguments; the result will not change.
- When you have enough evidence, stop calling tools and answer.
- Answer in Markdown prose. Do not reply with raw JSON.";

pub const SEARCH_PLANNER_PROMPT: &str = "\
You plan how to search a codebase before answering a question about it. \
Do not answer the question. Write a short numbered search strategy \
(3-6 steps). Each step names one tool (read_file, search_text, \
list_files, find_files, git_status) and the exact query, pattern or path \
to use. Prefer specific identifiers over generic words. Finish with one \
line naming the files most likely to hold the answer, if you can guess.";

pub const EXECUTION_PLANNER_PROMPT: &str = r#"You plan how to search a codebase before answering a question about it. Do not answer the question.

Respond with ONLY a JSON object, no prose, of this exact shape:
{
  "intent": "one sentence describing what the user wants",
  "steps": [
    {
      "id": 1,
      "action": "what this step does",
      "tool": "search_text",
      "arguments": {"query": "createProvider"},
      "successCriteria": "how to tell the step worked"
    }
  ],
  "minStepsBeforeAnswer": 2,
  "expectedFiles": ["src/provider.rs"]
}

Use 2-6 steps. "tool" must be one of: read_file, search_text, list_files, find_files, git_status."#;

/// Appended to the first user turn, after the plan.
pub const BEHAVIOR_INSTRUCTIONS: &str = "\
## Instructions
- Follow the plan, but adapt when a step finds nothing.
- Read the relevant code before answering; do not guess from file names.
- Do not repeat a tool call with the same arguments.
- Answer with file paths and line numbers for every claim.";

/// Injected every few rounds so the model keeps its own running summary.
pub const SCRATCHPAD_PROMPT: &str = "\
[Working memory checkpoint] Before continuing, summarize in at most 200 \
words: (1) files examined so far, (2) key findings with paths and line \
numbers, (3) what is still missing to answer the question. Then continue \
with the next tool call, or answer if nothing is missing.";

/// Sent when the model stops calling tools with an empty answer.
pub const SYNTHESIS_REMINDER: &str = "\
You have gathered tool results but have not answered yet. Write the final \
answer now, in Markdown, citing the files and line numbers you found. Do \
not call more tools unless something essential is missing.";

/// Appended to the system prompt for the no-tool completion after the
/// round limit.
pub const FALLBACK_INSTRUCTION: &str = "\
Tool access for this question has ended. Answer as well as you can \
without tools, using the project notes above if they help. State plainly \
what you could not verify in the code.";

/// Guidance appended in place of a skipped duplicate call.
pub fn duplicate_call_guidance(tool: &str, arguments: &str) -> String {
    format!(
        "You already made this call: {tool}({arguments}). The result is earlier in the \
         conversation and will not change. Use it, or try a different query, path or tool."
    )
}

/// User turn sent after a candidate answer is rejected.
pub fn answer_correction(reason: &str) -> String {
    format!(
        "Your answer was rejected: {reason}. Revise it: answer the question directly in \
         Markdown prose, cite the specific files and line numbers you read, and use tools \
         only if you still need evidence."
    )
}

/// Full system prompt: the base prompt plus workspace and notes sections.
pub fn build_system_prompt(
    base: Option<&str>,
    workspace: Option<&str>,
    project_notes: Option<&str>,
) -> String {
    SystemPromptBuilder::new(base.unwrap_or(SYSTEM_PROMPT))
        .section_opt("Workspace", workspace)
        .section_opt("Project notes", project_notes)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_skips_empty_and_none() {
        let prompt = SystemPromptBuilder::new("Preamble")
            .section("Empty", "  ")
            .section_opt("Missing", None::<String>)
            .section("Present", "content\n")
            .build();
        assert_eq!(prompt, "Preamble\n\n## Present\n\ncontent");
    }

    #[test]
    fn system_prompt_includes_notes() {
        let prompt = build_system_prompt(None, Some("/srv/app"), Some("- src/main.rs (3 reads)"));
        assert!(prompt.starts_with(SYSTEM_PROMPT));
        assert!(prompt.contains("## Workspace\n\n/srv/app"));
        assert!(prompt.contains("## Project notes"));

        let custom = build_system_prompt(Some("Be brief."), None, None);
        assert_eq!(custom, "Be brief.");
    }

    #[test]
    fn planner_prompt_lists_only_read_tools() {
        for tool in ["read_file", "search_text", "list_files", "find_files", "git_status"] {
            assert!(EXECUTION_PLANNER_PROMPT.contains(tool));
        }
        assert!(!EXECUTION_PLANNER_PROMPT.contains("run_command"));
    }

    #[test]
    fn correction_mentions_reason() {
        assert!(answer_correction("too short").contains("too short"));
        assert!(duplicate_call_guidance("read_file", "{}").contains("already made"));
    }
}

//! Answer validation: a cheap heuristic check, then an optional critic call.
//!
//! [`validate_answer`] runs offline and catches the common failure shapes
//! (empty answer, raw JSON, a one-liner after a long search, an answer
//! that ignores the question). [`critic_evaluate`] asks an auxiliary model
//! to grade the answer. It never blocks: a failed call is a pass.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};

use super::config::CriticConfig;
use crate::ChatRequest;
use crate::api::provider::{ModelProvider, complete};

/// Longest unfenced `{`/`[` text tolerated before it counts as raw JSON.
pub const RAW_JSON_MAX_CHARS: usize = 10;
/// Minimum answer length once tools have been used.
pub const MIN_TOOL_ANSWER_CHARS: usize = 20;
/// Answers shorter than this fail the critic without a model call.
pub const MIN_CRITIC_CHARS: usize = 30;
pub const MIN_RELEVANCE: f64 = 0.15;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "has", "have",
    "her", "was", "one", "our", "out", "his", "how", "its", "may", "who", "did", "does", "get",
    "got", "use", "used", "using", "what", "when", "where", "which", "while", "why", "with",
    "this", "that", "these", "those", "there", "their", "then", "than", "from", "into", "about",
    "would", "could", "should", "will", "shall", "been", "being", "were", "they", "them", "some",
    "such", "only", "also", "just", "more", "most", "other", "each", "very", "your", "yours",
    "explain", "tell", "show", "find", "please", "code", "file", "files", "work", "works",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AnswerIssue {
    #[error("the answer is empty")]
    Empty,
    #[error("the answer is raw JSON instead of prose")]
    RawJson,
    #[error("the answer is too short given the tool results gathered")]
    TooShort,
    #[error("the answer does not address the question")]
    OffTopic,
}

/// Heuristic check of a candidate answer.
///
/// `question` enables the keyword-overlap relevance check; pass `None` to
/// skip it.
pub fn validate_answer(
    text: &str,
    had_tool_calls: bool,
    question: Option<&str>,
) -> Result<(), AnswerIssue> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AnswerIssue::Empty);
    }
    if looks_like_raw_json(text) {
        return Err(AnswerIssue::RawJson);
    }
    if had_tool_calls && text.chars().count() < MIN_TOOL_ANSWER_CHARS {
        return Err(AnswerIssue::TooShort);
    }
    if let Some(question) = question
        && let Some(ratio) = relevance(question, text)
        && ratio < MIN_RELEVANCE
    {
        debug!("Answer relevance {ratio:.2} below {MIN_RELEVANCE}");
        return Err(AnswerIssue::OffTopic);
    }
    Ok(())
}

/// Unfenced text opening with `{` or `[` that parses as JSON, or that is
/// longer than [`RAW_JSON_MAX_CHARS`].
fn looks_like_raw_json(text: &str) -> bool {
    if !(text.starts_with('{') || text.starts_with('[')) {
        return false;
    }
    serde_json::from_str::<serde_json::Value>(text).is_ok()
        || text.chars().count() > RAW_JSON_MAX_CHARS
}

/// Lowercased content words longer than two characters, stop words removed.
fn content_tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() > 2 && !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Share of the question's content tokens that appear in the answer, or
/// `None` when the question has fewer than two content tokens.
pub fn relevance(question: &str, answer: &str) -> Option<f64> {
    let wanted = content_tokens(question);
    if wanted.len() < 2 {
        return None;
    }
    let found = content_tokens(answer);
    let matches = wanted.iter().filter(|t| found.contains(*t)).count();
    Some(matches as f64 / wanted.len() as f64)
}

// ── Critic ──────────────────────────────────────────────────────────

const CRITIC_PROMPT: &str = "\
You grade answers to questions about a codebase. Judge the answer on: \
relevance (does it address the question), specificity (does it cite files, \
functions or line numbers), accuracy (is it consistent with itself and \
plausible), completeness (does it cover every part of the question), and \
format (readable prose, not raw data).

Reply with exactly three lines:
PASS or FAIL
CONFIDENCE: a number from 0 to 1
REASON: one sentence";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriticVerdict {
    pub pass: bool,
    pub reason: String,
    pub confidence: f32,
}

impl CriticVerdict {
    fn pass_by_default(reason: impl Into<String>) -> Self {
        Self {
            pass: true,
            reason: reason.into(),
            confidence: 0.0,
        }
    }
}

const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_REASON: &str = "No reason given";

/// Parse the critic's three-line reply.
///
/// A reply whose verdict line is neither PASS nor FAIL is a pass with
/// confidence 0.
pub fn parse_verdict(text: &str) -> CriticVerdict {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let Some(first) = lines.next() else {
        return CriticVerdict::pass_by_default("Empty critic reply");
    };
    let head = first
        .trim_start_matches(|c: char| !c.is_alphabetic())
        .to_ascii_uppercase();
    let head = head.strip_prefix("VERDICT:").map_or(head.as_str(), str::trim);
    let pass = if head.starts_with("PASS") {
        true
    } else if head.starts_with("FAIL") {
        false
    } else {
        return CriticVerdict::pass_by_default("Malformed critic reply");
    };

    let mut confidence = DEFAULT_CONFIDENCE;
    let mut reason = DEFAULT_REASON.to_string();
    for line in lines {
        if let Some(value) = strip_label(line, "CONFIDENCE:")
            && let Ok(c) = value.parse::<f32>()
            && c.is_finite()
        {
            confidence = c.clamp(0.0, 1.0);
        } else if let Some(value) = strip_label(line, "REASON:")
            && !value.is_empty()
        {
            reason = value.to_string();
        }
    }
    CriticVerdict {
        pass,
        reason,
        confidence,
    }
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    head.eq_ignore_ascii_case(label)
        .then(|| line.get(label.len()..).unwrap_or_default().trim())
}

/// Grade `answer` with one auxiliary model call.
///
/// Answers under [`MIN_CRITIC_CHARS`] fail without a call. A failed call
/// passes with confidence 0.
pub async fn critic_evaluate<P: ModelProvider + ?Sized>(
    provider: &P,
    model: &str,
    config: &CriticConfig,
    question: &str,
    answer: &str,
) -> CriticVerdict {
    if answer.trim().chars().count() < MIN_CRITIC_CHARS {
        return CriticVerdict {
            pass: false,
            reason: "Answer is too short to be useful".into(),
            confidence: 1.0,
        };
    }

    let user = format!("Question:\n{question}\n\nAnswer:\n{answer}");
    let request = ChatRequest::one_shot(
        model,
        CRITIC_PROMPT,
        user,
        config.max_tokens,
        config.temperature,
    );
    match complete(provider, &request).await {
        Ok(done) => {
            let verdict = parse_verdict(&done.text);
            debug!(
                "Critic verdict: pass={} confidence={:.2}",
                verdict.pass, verdict.confidence
            );
            verdict
        }
        Err(e) => {
            warn!("Critic call failed, accepting answer: {e}");
            CriticVerdict::pass_by_default(format!("Critic unavailable: {}", e.code()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::provider::{CompletionStream, ProviderFuture, StreamChunk};
    use crate::{ChatCompletion, Error};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn heuristic_cases() {
        assert_eq!(validate_answer("", false, None), Err(AnswerIssue::Empty));
        assert_eq!(validate_answer("   \n", true, None), Err(AnswerIssue::Empty));
        assert_eq!(
            validate_answer("{\"x\":1}", false, None),
            Err(AnswerIssue::RawJson)
        );
        assert_eq!(
            validate_answer("[1, 2, 3, 4, 5, 6 and more", false, None),
            Err(AnswerIssue::RawJson)
        );
        assert_eq!(validate_answer("Yes.", true, None), Err(AnswerIssue::TooShort));
        assert!(validate_answer("Yes.", false, None).is_ok());
        assert!(
            validate_answer("## Summary\n\nThe factory lives in `src/factory.ts`.", true, None)
                .is_ok()
        );
    }

    #[test]
    fn fenced_json_is_prose() {
        let text = "```json\n{\"name\": \"codeask\", \"version\": \"0.1.0\"}\n```";
        assert!(validate_answer(text, true, None).is_ok());
    }

    #[test]
    fn relevance_check() {
        let question = "Where is the retry backoff configured?";
        let good = "Retry backoff is configured in `src/api/retry.rs:40` via RetryConfig.";
        let bad = "The README describes installation steps for several platforms in detail.";
        assert!(validate_answer(good, true, Some(question)).is_ok());
        assert_eq!(
            validate_answer(bad, true, Some(question)),
            Err(AnswerIssue::OffTopic)
        );
        // A single content token disables the check.
        assert_eq!(relevance("What is foo?", bad), None);
    }

    #[test]
    fn verdict_parsing() {
        let v = parse_verdict("PASS\nCONFIDENCE: 0.9\nREASON: Cites the right file.");
        assert!(v.pass);
        assert_eq!(v.confidence, 0.9);
        assert_eq!(v.reason, "Cites the right file.");

        let v = parse_verdict("**FAIL**\nconfidence: 7\n");
        assert!(!v.pass);
        assert_eq!(v.confidence, 1.0);
        assert_eq!(v.reason, DEFAULT_REASON);

        let v = parse_verdict("FAIL\nCONFIDENCE: high\nREASON:");
        assert_eq!(v.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(v.reason, DEFAULT_REASON);

        let v = parse_verdict("FAIL\nCONFIDENCE: NaN\nREASON: Vague.");
        assert_eq!(v.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(v.reason, "Vague.");

        let v = parse_verdict("The answer looks fine to me.");
        assert!(v.pass);
        assert_eq!(v.confidence, 0.0);
    }

    struct Critic {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl ModelProvider for Critic {
        fn chat_with_tools<'a>(&'a self, _: &'a ChatRequest) -> ProviderFuture<'a, ChatCompletion> {
            Box::pin(async { Ok(ChatCompletion::default()) })
        }

        fn stream_completion<'a>(&'a self, _: &'a ChatRequest) -> CompletionStream<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let item = match self.reply {
                Some(text) => Ok(StreamChunk {
                    delta: text.to_string(),
                    done: true,
                    usage: None,
                }),
                None => Err(Error::ProviderRateLimited {
                    body: "slow down".into(),
                }),
            };
            Box::pin(futures::stream::iter([item]))
        }
    }

    #[tokio::test]
    async fn short_answers_fail_offline() {
        let critic = Critic {
            reply: Some("PASS"),
            calls: AtomicUsize::new(0),
        };
        let v = critic_evaluate(&critic, "m", &CriticConfig::default(), "q", "0123456789").await;
        assert!(!v.pass);
        assert_eq!(critic.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn verdict_from_model_and_failure_default() {
        let answer = "The router is defined in src/router.rs at line 12.";
        let critic = Critic {
            reply: Some("FAIL\nCONFIDENCE: 0.8\nREASON: Misses the second part."),
            calls: AtomicUsize::new(0),
        };
        let v = critic_evaluate(&critic, "m", &CriticConfig::default(), "q", answer).await;
        assert!(!v.pass);
        assert_eq!(v.reason, "Misses the second part.");

        let offline = Critic {
            reply: None,
            calls: AtomicUsize::new(0),
        };
        let v = critic_evaluate(&offline, "m", &CriticConfig::default(), "q", answer).await;
        assert!(v.pass);
        assert_eq!(v.confidence, 0.0);
        assert_eq!(offline.calls.load(Ordering::SeqCst), 1);
    }
}

//! Server-Sent Events parsing for OpenAI-compatible streamed completions.
//!
//! The response body is read with `chunk()` so long completions never hit a
//! single-body timeout. Complete `data:` lines are decoded into
//! [`StreamChunk`]s as they arrive.

use std::collections::VecDeque;

use serde::Deserialize;
use tracing::{debug, trace};

use super::provider::{CompletionStream, StreamChunk};
use crate::{Error, UsageInfo};

#[derive(Deserialize, Debug)]
struct SseFrame {
    choices: Option<Vec<SseChoice>>,
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct SseChoice {
    delta: Option<SseDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct SseDelta {
    content: Option<String>,
}

/// Incremental line splitter. Bytes go in, decoded chunks come out.
///
/// Raw bytes are buffered until a full line arrives, so a multi-byte
/// character split across network chunks decodes intact.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    done: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `[DONE]` (or a finish reason) has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw bytes and return every chunk completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<StreamChunk>, Error> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            self.parse_line(String::from_utf8_lossy(&line).trim(), &mut out)?;
            if self.done {
                break;
            }
        }
        Ok(out)
    }

    /// Flush an unterminated final line at end of body.
    pub fn finish(&mut self) -> Result<Vec<StreamChunk>, Error> {
        let rest = std::mem::take(&mut self.buffer);
        let mut out = Vec::new();
        if !self.done {
            self.parse_line(String::from_utf8_lossy(&rest).trim(), &mut out)?;
        }
        if !self.done {
            self.done = true;
            out.push(StreamChunk {
                done: true,
                ..Default::default()
            });
        }
        Ok(out)
    }

    fn parse_line(&mut self, line: &str, out: &mut Vec<StreamChunk>) -> Result<(), Error> {
        if line.is_empty() || line.starts_with(':') {
            return Ok(());
        }
        let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
            return Ok(());
        };
        if data == "[DONE]" {
            self.done = true;
            out.push(StreamChunk {
                done: true,
                ..Default::default()
            });
            return Ok(());
        }

        let frame: SseFrame = serde_json::from_str(data).map_err(|e| Error::ProviderStream {
            reason: format!("bad SSE frame: {e}"),
        })?;

        let mut chunk = StreamChunk {
            usage: frame.usage,
            ..Default::default()
        };
        for choice in frame.choices.into_iter().flatten() {
            if let Some(content) = choice.delta.and_then(|d| d.content) {
                chunk.delta.push_str(&content);
            }
            if choice.finish_reason.is_some() {
                trace!("Stream finish_reason: {:?}", choice.finish_reason);
            }
        }
        if !chunk.delta.is_empty() || chunk.usage.is_some() {
            out.push(chunk);
        }
        Ok(())
    }
}

/// Turn a streaming HTTP response into a [`CompletionStream`].
pub(crate) fn sse_stream(resp: reqwest::Response) -> CompletionStream<'static> {
    struct State {
        resp: reqwest::Response,
        parser: SseParser,
        pending: VecDeque<StreamChunk>,
        finished: bool,
    }

    let state = State {
        resp,
        parser: SseParser::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(chunk) = st.pending.pop_front() {
                return Some((Ok(chunk), st));
            }
            if st.finished {
                return None;
            }
            let parsed = match st.resp.chunk().await {
                Ok(Some(bytes)) => st.parser.push(&bytes),
                Ok(None) => {
                    st.finished = true;
                    st.parser.finish()
                }
                Err(e) => Err(Error::ProviderStream {
                    reason: format!("failed to read streaming chunk: {e}"),
                }),
            };
            match parsed {
                Ok(chunks) => {
                    st.pending.extend(chunks);
                    if st.parser.is_done() {
                        st.finished = true;
                        debug!("SSE stream done");
                    }
                }
                Err(e) => {
                    st.finished = true;
                    st.pending.clear();
                    return Some((Err(e), st));
                }
            }
        }
    }))
}

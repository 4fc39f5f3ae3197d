//! Server-sent-event decoding for streamed turns.
//!
//! Network chunks can split anywhere, including inside a UTF-8 sequence, so
//! bytes are buffered until a full line is available before decoding.

use std::collections::VecDeque;
use std::fmt::Display;

use futures_util::{stream, Stream, StreamExt};

use super::protocol::FrameNormalizer;
use crate::infrastructure::ports::{LlmError, TurnEvent, TurnEventStream};

/// One dispatched SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Data(String),
    /// The `[DONE]` sentinel
    Done,
}

/// Incremental line-oriented SSE parser
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk, returning every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>, LlmError> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            self.process_line(line, &mut frames)?;
        }
        Ok(frames)
    }

    /// Flush whatever is left once the byte stream ends.
    pub fn finish(&mut self) -> Result<Vec<SseFrame>, LlmError> {
        let mut frames = Vec::new();
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.process_line(line, &mut frames)?;
        }
        self.dispatch(&mut frames);
        Ok(frames)
    }

    fn process_line(&mut self, line: Vec<u8>, frames: &mut Vec<SseFrame>) -> Result<(), LlmError> {
        let line = String::from_utf8(line)
            .map_err(|e| LlmError::invalid(format!("Stream is not valid UTF-8: {}", e)))?;

        if line.is_empty() {
            self.dispatch(frames);
            return Ok(());
        }
        if line.starts_with(':') {
            return Ok(());
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_str(), ""),
        };
        // event:, id: and retry: carry nothing the payloads don't repeat
        if field == "data" {
            self.data_lines.push(value.to_string());
        }
        Ok(())
    }

    fn dispatch(&mut self, frames: &mut Vec<SseFrame>) {
        if self.data_lines.is_empty() {
            return;
        }
        let data = self.data_lines.join("\n");
        self.data_lines.clear();
        if data.trim() == "[DONE]" {
            frames.push(SseFrame::Done);
        } else {
            frames.push(SseFrame::Data(data));
        }
    }
}

struct SseTurnState<S> {
    bytes: S,
    decoder: SseDecoder,
    normalizer: FrameNormalizer,
    pending: VecDeque<Result<TurnEvent, LlmError>>,
    finished: bool,
}

impl<S> SseTurnState<S> {
    /// Normalize decoded frames into pending events. Returns true once the
    /// `[DONE]` sentinel has been seen.
    fn absorb(&mut self, frames: Vec<SseFrame>) -> bool {
        for frame in frames {
            match frame {
                SseFrame::Data(data) => match self.normalizer.push(&data) {
                    Ok(events) => self.pending.extend(events.into_iter().map(Ok)),
                    Err(e) => {
                        self.pending.push_back(Err(e));
                        return true;
                    }
                },
                SseFrame::Done => return true,
            }
        }
        false
    }

    fn close(&mut self) {
        self.finished = true;
        self.pending.extend(self.normalizer.finish().into_iter().map(Ok));
    }
}

/// Turn a response byte stream into normalized turn events.
///
/// Frames are folded strictly in arrival order; the stream ends after the
/// first error.
pub fn sse_turn_stream<S, B, E>(bytes: S, normalizer: FrameNormalizer) -> TurnEventStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    let state = SseTurnState {
        bytes,
        decoder: SseDecoder::new(),
        normalizer,
        pending: VecDeque::new(),
        finished: false,
    };

    let events = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.finished = true;
                    state.pending.clear();
                }
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => match state.decoder.push(chunk.as_ref()) {
                    Ok(frames) => {
                        if state.absorb(frames) {
                            state.close();
                        }
                    }
                    Err(e) => state.pending.push_back(Err(e)),
                },
                Some(Err(e)) => {
                    state.pending.push_back(Err(LlmError::RequestFailed(format!(
                        "Stream interrupted: {}",
                        e
                    ))));
                }
                None => match state.decoder.finish() {
                    Ok(frames) => {
                        state.absorb(frames);
                        state.close();
                    }
                    Err(e) => state.pending.push_back(Err(e)),
                },
            }
        }
    });

    Box::pin(events)
}

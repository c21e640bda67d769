//! Newline-delimited JSON streaming.
//!
//! The Cohere chat API streams one JSON object per line. This module turns
//! a chunked body into complete lines and feeds each line to an
//! adapter-specific parser:
//! - [`drain_json_lines`] -- pull complete lines out of a buffer
//! - [`ndjson_event_stream`] -- build a [`GenerationStream`] from a chunk stream + parser

use std::fmt::Display;

use futures_core::Stream;
use futures_util::StreamExt;

use ck_domain::stream::{FinishReason, GenerationEvent, GenerationStream};

/// Extract complete, non-empty lines from an NDJSON byte buffer.
///
/// The buffer is drained in-place; a trailing partial line stays for the
/// next call. Lines are decoded only once complete, so a multibyte
/// character split across chunks survives intact.
pub(crate) fn drain_json_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();

    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let raw: Vec<u8> = buffer.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&raw[..pos]);

        let line = line.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }

    lines
}

fn is_terminal(event: &GenerationEvent) -> bool {
    matches!(
        event,
        GenerationEvent::StreamEnd { .. } | GenerationEvent::Error { .. }
    )
}

/// Build a [`GenerationStream`] from a body chunk stream and a line parser.
///
/// The parser is `FnMut` so adapters can carry state across lines (e.g.
/// whether the step produced tool calls).
///
/// The stream guarantees exactly one terminal event:
/// 1. Events after the first `StreamEnd`/`Error` are dropped
/// 2. A transport error becomes [`GenerationEvent::Error`]
/// 3. A body that closes without a terminal event yields `StreamEnd{ERROR}`
pub(crate) fn ndjson_event_stream<S, B, E, F>(chunks: S, mut parse_line: F) -> GenerationStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
    F: FnMut(&str) -> Vec<GenerationEvent> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut chunks = Box::pin(chunks);
        let mut buffer: Vec<u8> = Vec::new();
        let mut terminated = false;

        'body: loop {
            match chunks.next().await {
                Some(Ok(bytes)) => {
                    buffer.extend_from_slice(bytes.as_ref());
                    for line in drain_json_lines(&mut buffer) {
                        for event in parse_line(&line) {
                            terminated = is_terminal(&event);
                            yield event;
                            if terminated {
                                break 'body;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    terminated = true;
                    yield GenerationEvent::Error { message: e.to_string() };
                    break;
                }
                None => {
                    // Body closed; the last line may lack a trailing newline.
                    if buffer.iter().any(|b| !b.is_ascii_whitespace()) {
                        buffer.push(b'\n');
                        for line in drain_json_lines(&mut buffer) {
                            for event in parse_line(&line) {
                                terminated = is_terminal(&event);
                                yield event;
                                if terminated {
                                    break 'body;
                                }
                            }
                        }
                    }
                    break;
                }
            }
        }

        if !terminated {
            tracing::warn!("generation stream closed without a stream-end event");
            yield GenerationEvent::StreamEnd { finish_reason: FinishReason::Error };
        }
    };

    Box::pin(stream)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

//! Server-Sent Events parsing for streamed chat completions.
//!
//! Splits the HTTP body on SSE boundaries (`data: …\n\n`), parses each
//! event as a completion chunk and yields the content deltas.

use crate::errors::{AppError, Result};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// Outcome of parsing one SSE event
#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    Done,
    Skip,
}

fn parse_event(event: &str) -> Result<SseEvent> {
    let mut data = String::new();

    for line in event.lines() {
        if let Some(payload) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) {
            let payload = payload.trim();
            if payload == "[DONE]" {
                return Ok(SseEvent::Done);
            }
            data.push_str(payload);
        }
    }

    // Keep-alive or comment
    if data.is_empty() {
        return Ok(SseEvent::Skip);
    }

    let chunk: CompletionChunk = serde_json::from_str(&data).map_err(|e| AppError::Llm {
        message: format!("failed to parse SSE chunk: {} (data: {})", e, data),
        status: None,
    })?;

    match chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
        Some(content) if !content.is_empty() => Ok(SseEvent::Delta(content)),
        _ => Ok(SseEvent::Skip),
    }
}

/// Position of the first `\n\n` event boundary in a byte buffer
fn find_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn decode_event(raw: &[u8]) -> Result<SseEvent> {
    let event = std::str::from_utf8(raw).map_err(|e| AppError::Llm {
        message: format!("SSE event is not valid UTF-8: {}", e),
        status: None,
    })?;
    parse_event(event)
}

/// Turn a byte stream of SSE frames into a stream of text deltas.
///
/// The buffer holds raw bytes; only complete events are decoded, so a
/// multibyte character split across network chunks survives intact.
pub(crate) fn text_deltas<S, B, E>(bytes: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    stream::unfold(
        (bytes, Vec::<u8>::new(), false),
        |(mut bytes, mut buffer, finished)| async move {
            if finished {
                return None;
            }
            loop {
                if let Some(end) = find_boundary(&buffer) {
                    let event: Vec<u8> = buffer.drain(..end + 2).take(end).collect();

                    match decode_event(&event) {
                        Ok(SseEvent::Delta(text)) => return Some((Ok(text), (bytes, buffer, false))),
                        Ok(SseEvent::Skip) => continue,
                        Ok(SseEvent::Done) => return None,
                        Err(e) => return Some((Err(e), (bytes, buffer, true))),
                    }
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        // CR never occurs inside a multibyte sequence
                        buffer.extend(chunk.as_ref().iter().copied().filter(|b| *b != b'\r'));
                    }
                    Some(Err(e)) => {
                        let err = AppError::Llm {
                            message: format!("stream read error: {}", e),
                            status: None,
                        };
                        return Some((Err(err), (bytes, buffer, true)));
                    }
                    None => {
                        // Stream ended without a trailing boundary
                        let rest = std::mem::take(&mut buffer);
                        if rest.iter().all(u8::is_ascii_whitespace) {
                            return None;
                        }
                        return match decode_event(&rest) {
                            Ok(SseEvent::Delta(text)) => Some((Ok(text), (bytes, buffer, true))),
                            Ok(_) => None,
                            Err(e) => Some((Err(e), (bytes, buffer, true))),
                        };
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(parts: &[&str]) -> impl Stream<Item = std::result::Result<Vec<u8>, String>> + Unpin {
        let owned: Vec<std::result::Result<Vec<u8>, String>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(owned)
    }

    #[tokio::test]
    async fn test_deltas_across_chunk_boundaries() {
        let body = frames(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Xin \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"con",
            "tent\":\"chào\"}}]}\n\n: keep-alive\n\n",
            "data: [DONE]\n\n",
        ]);

        let deltas: Vec<String> = text_deltas(body)
            .map(|d| d.unwrap())
            .collect()
            .await;

        assert_eq!(deltas, vec!["Xin ".to_string(), "chào".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_chunk_is_error() {
        let body = frames(&["data: {not json}\n\n"]);
        let results: Vec<Result<String>> = text_deltas(body).collect().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[tokio::test]
    async fn test_multibyte_character_split_across_chunks() {
        let frame = "data: {\"choices\":[{\"delta\":{\"content\":\"chào\"}}]}\r\n\r\n";
        let bytes = frame.as_bytes();
        // 'à' is two bytes; cut between them
        let split = frame.find('à').unwrap() + 1;
        let parts: Vec<std::result::Result<Vec<u8>, String>> = vec![
            Ok(bytes[..split].to_vec()),
            Ok(bytes[split..].to_vec()),
        ];

        let deltas: Vec<String> = text_deltas(stream::iter(parts))
            .map(|d| d.unwrap())
            .collect()
            .await;

        assert_eq!(deltas, vec!["chào".to_string()]);
    }

    #[tokio::test]
    async fn test_trailing_event_without_boundary() {
        let body = frames(&["data: {\"choices\":[{\"delta\":{\"content\":\"hết\"}}]}"]);
        let deltas: Vec<String> = text_deltas(body).map(|d| d.unwrap()).collect().await;
        assert_eq!(deltas, vec!["hết".to_string()]);
    }

    #[test]
    fn test_role_only_delta_is_skipped() {
        let event = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}";
        assert_eq!(parse_event(event).unwrap(), SseEvent::Skip);
    }
}

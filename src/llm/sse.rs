//! Wire-format handling for OpenAI-style streaming completions.
//!
//! The upstream emits `data: <json>` lines with incremental deltas and a
//! final `data: [DONE]`. Keep-alives, comments, and the occasional malformed
//! chunk are normal on this wire, so "skip" is an ordinary parse result here,
//! not an error path.

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;

use super::provider::Fragment;

const DATA_PREFIX: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

/// Outcome of parsing a single upstream line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// An incremental piece of the answer.
    Content(String),
    /// The literal done marker; the stream is over.
    Done,
    /// Not a data line, or not a well-formed delta chunk. Ignored.
    Skip,
}

pub fn parse_stream_line(line: &str) -> ParsedLine {
    let line = line.trim();
    if line.is_empty() {
        return ParsedLine::Skip;
    }

    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return ParsedLine::Skip;
    };
    let payload = payload.trim();

    if payload == DONE_MARKER {
        return ParsedLine::Done;
    }

    let Ok(chunk) = serde_json::from_str::<Value>(payload) else {
        return ParsedLine::Skip;
    };

    match chunk["choices"][0]["delta"].get("content") {
        Some(Value::String(content)) => ParsedLine::Content(content.clone()),
        _ => ParsedLine::Skip,
    }
}

/// Reassembles lines out of arbitrary byte-chunk boundaries. HTTP chunking
/// does not respect line breaks, so a partial trailing line is carried over
/// into the next push.
#[derive(Debug, Default)]
pub struct LineBuffer {
    carry: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.carry.push_str(chunk);

        let mut lines = Vec::new();
        while let Some(newline) = self.carry.find('\n') {
            let line: String = self.carry.drain(..=newline).collect();
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }
}

/// Drives an upstream streaming response into a fragment channel.
///
/// Runs until the done marker, an upstream error, or the receiver going away
/// (client disconnect), whichever comes first. Only the done marker produces
/// `Fragment::Done`; every other exit closes the channel without it.
pub fn spawn_relay(response: reqwest::Response, provider: &'static str) -> mpsc::Receiver<Fragment> {
    let (tx, rx) = mpsc::channel(32);
    let mut stream = response.bytes_stream();

    tokio::spawn(async move {
        let mut buffer = LineBuffer::new();

        while let Some(item) = stream.next().await {
            let bytes = match item {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!("{} stream interrupted: {}", provider, err);
                    return;
                }
            };

            for line in buffer.push(&String::from_utf8_lossy(&bytes)) {
                match parse_stream_line(&line) {
                    ParsedLine::Content(content) => {
                        if tx.send(Fragment::Content(content)).await.is_err() {
                            return;
                        }
                    }
                    ParsedLine::Done => {
                        let _ = tx.send(Fragment::Done).await;
                        return;
                    }
                    ParsedLine::Skip => {}
                }
            }
        }

        tracing::warn!("{} stream ended without done marker", provider);
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"hello"}}]}"#;
        assert_eq!(
            parse_stream_line(line),
            ParsedLine::Content("hello".to_string())
        );
    }

    #[test]
    fn parses_done_marker() {
        assert_eq!(parse_stream_line("data: [DONE]"), ParsedLine::Done);
        assert_eq!(parse_stream_line("data:[DONE]"), ParsedLine::Done);
    }

    #[test]
    fn skips_lines_without_data_prefix() {
        assert_eq!(parse_stream_line(": keep-alive"), ParsedLine::Skip);
        assert_eq!(parse_stream_line("event: ping"), ParsedLine::Skip);
        assert_eq!(parse_stream_line(""), ParsedLine::Skip);
    }

    #[test]
    fn skips_malformed_json_payloads() {
        assert_eq!(parse_stream_line("data: {not json"), ParsedLine::Skip);
        assert_eq!(parse_stream_line("data: 42"), ParsedLine::Skip);
    }

    #[test]
    fn skips_deltas_without_string_content() {
        // Reasoning models interleave chunks whose delta carries no content.
        let null_content = r#"data: {"choices":[{"delta":{"content":null}}]}"#;
        let role_only = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_stream_line(null_content), ParsedLine::Skip);
        assert_eq!(parse_stream_line(role_only), ParsedLine::Skip);
    }

    #[test]
    fn empty_string_content_is_still_content() {
        let line = r#"data: {"choices":[{"delta":{"content":""}}]}"#;
        assert_eq!(parse_stream_line(line), ParsedLine::Content(String::new()));
    }

    #[test]
    fn line_buffer_reassembles_split_lines() {
        let mut buffer = LineBuffer::new();

        assert!(buffer.push("data: {\"a\"").is_empty());
        let lines = buffer.push(":1}\r\ndata: [DO");
        assert_eq!(lines, vec!["data: {\"a\":1}".to_string()]);

        let lines = buffer.push("NE]\n");
        assert_eq!(lines, vec!["data: [DONE]".to_string()]);
    }

    #[test]
    fn line_buffer_handles_multiple_lines_per_chunk() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push("one\ntwo\n\nthree\n");
        assert_eq!(lines, vec!["one", "two", "", "three"]);
    }
}

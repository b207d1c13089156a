//! Decoder for the server-sent event stream of a llama.cpp-style
//! `/completion` endpoint.
//!
//! Each event is a `data: {json}` line. The JSON carries a `content` fragment
//! and a `stop` flag; the final event has `stop: true`.

use anyhow::{Context, bail};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Content(String),
    Stop,
}

#[derive(Debug, Deserialize)]
struct Chunk {
    #[serde(default)]
    content: String,
    #[serde(default)]
    stop: bool,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Splits a byte stream into lines and turns `data:` lines into events.
///
/// Network chunks may cut a line or a UTF-8 sequence in half, so partial
/// lines stay buffered until their newline arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn feed(&mut self, bytes: &[u8]) -> anyhow::Result<Vec<SseEvent>> {
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            let line = std::str::from_utf8(&line).context("engine sent invalid UTF-8")?;
            parse_line(line.trim_end_matches(['\n', '\r']), &mut events)?;
        }
        Ok(events)
    }

    /// Flush a last line that was not newline-terminated.
    pub fn finish(&mut self) -> anyhow::Result<Vec<SseEvent>> {
        let rest = std::mem::take(&mut self.pending);
        let mut events = Vec::new();
        if !rest.is_empty() {
            let line = std::str::from_utf8(&rest).context("engine sent invalid UTF-8")?;
            parse_line(line.trim_end_matches('\r'), &mut events)?;
        }
        Ok(events)
    }
}

fn parse_line(line: &str, events: &mut Vec<SseEvent>) -> anyhow::Result<()> {
    // Blank separators, comments and `event:` fields carry no text.
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(());
    };
    let payload = payload.trim_start();
    if payload == "[DONE]" {
        events.push(SseEvent::Stop);
        return Ok(());
    }

    let chunk: Chunk = serde_json::from_str(payload)
        .with_context(|| format!("malformed engine event: {payload}"))?;
    if let Some(error) = chunk.error {
        bail!("engine reported an error: {error}");
    }
    if !chunk.content.is_empty() {
        events.push(SseEvent::Content(chunk.content));
    }
    if chunk.stop {
        events.push(SseEvent::Stop);
    }
    Ok(())
}

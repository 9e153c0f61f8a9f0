//! Incremental decoder for the server-sent-event body of a streaming
//! generate call.
//!
//! Bytes are buffered until a blank line closes a frame, so frames (and
//! multi-byte characters) may straddle chunk boundaries freely. Each frame
//! either yields one text delta or is skipped; a skipped frame never stops
//! the stream.

use serde::Deserialize;

/// One text fragment extracted from one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDelta {
    pub text: String,
}

/// Why a frame produced no delta
#[derive(Debug)]
pub enum Skipped {
    /// No `data:` lines, or an empty payload
    NoData,
    /// The `[DONE]` sentinel
    Done,
    /// Payload was not valid JSON
    Malformed(serde_json::Error),
    /// Valid JSON without any text part
    NoText,
}

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

const DONE_SENTINEL: &str = "[DONE]";

/// Decode a single frame (without its terminating blank line).
pub fn decode_frame(frame: &str) -> Result<StreamDelta, Skipped> {
    let mut payload = String::new();
    for line in frame.split('\n') {
        if let Some(rest) = line.strip_prefix("data:") {
            payload.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    let payload = payload.trim();
    if payload.is_empty() {
        return Err(Skipped::NoData);
    }
    if payload == DONE_SENTINEL {
        return Err(Skipped::Done);
    }

    let chunk: GenerateChunk = serde_json::from_str(payload).map_err(Skipped::Malformed)?;
    let text: String = chunk
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        Err(Skipped::NoText)
    } else {
        Ok(StreamDelta { text })
    }
}

/// Buffers raw body chunks and splits them into frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already searched for a frame boundary
    scanned: usize,
    done: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk and return the deltas of every frame it
    /// completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamDelta> {
        let mut deltas = Vec::new();
        if self.done {
            return deltas;
        }

        // CR only ever appears as part of a line ending; JSON escapes it.
        self.buffer.extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        while let Some(end) = find_frame_end(&self.buffer, self.scanned) {
            let raw: Vec<u8> = self.buffer.drain(..end + 2).collect();
            self.scanned = 0;
            let frame = String::from_utf8_lossy(&raw[..end]);

            match decode_frame(&frame) {
                Ok(delta) => deltas.push(delta),
                Err(Skipped::Done) => {
                    self.done = true;
                    self.buffer.clear();
                    break;
                }
                Err(Skipped::Malformed(e)) => {
                    tracing::debug!("Discarding malformed stream frame: {}", e);
                }
                Err(Skipped::NoData) | Err(Skipped::NoText) => {}
            }
        }
        self.scanned = self.buffer.len().saturating_sub(1);

        deltas
    }

    /// True once a `[DONE]` frame has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// End of data. Whatever is left is an incomplete frame and is dropped;
    /// returns how many bytes that was.
    pub fn finish(self) -> usize {
        if !self.buffer.is_empty() {
            tracing::debug!("Dropping {} bytes of unterminated frame", self.buffer.len());
        }
        self.buffer.len()
    }
}

fn find_frame_end(buffer: &[u8], from: usize) -> Option<usize> {
    buffer[from..]
        .windows(2)
        .position(|w| w == b"\n\n")
        .map(|i| from + i)
}

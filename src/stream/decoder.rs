//! # Stream Decoder
//!
//! Turns raw network chunks into ordered `DeltaPayload`s.
//!
//! The server frames each delta as `data: <json>\n\n`. The transport splits
//! the byte stream wherever it likes, so a chunk may hold half a frame, three
//! frames, or the tail of one frame plus the head of the next:
//!
//! ```text
//! chunk 1: data: {"text":"Hel
//! chunk 2: lo"}\n\ndata: {"te
//! chunk 3: xt":"!"}\n\n
//!                 │
//!                 ▼
//! deltas:  "Hello", "!"
//! ```
//!
//! Bytes are buffered until a `\n\n` delimiter shows up. Only complete frames
//! are decoded, so the output depends on delimiter positions alone, never on
//! where the chunk boundaries fell. Buffering bytes rather than text keeps a
//! multi-byte character that straddles two chunks intact.

use log::{debug, warn};
use serde::Deserialize;
use thiserror::Error;

/// Blank line separating frames.
const FRAME_DELIMITER: &[u8] = b"\n\n";

/// Prefix of the single payload line inside a frame.
const DATA_PREFIX: &str = "data: ";

/// The decoded content of one frame.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeltaPayload {
    pub text: String,
}

/// Why a frame was dropped. Never fatal: the stream keeps decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
    #[error("frame has no `data: ` line")]
    MissingData,
    #[error("frame payload is not a delta: {0}")]
    Payload(String),
}

/// Incremental decoder owning the residual bytes between chunk arrivals.
///
/// After every `feed`, the buffer holds no complete frame.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    dropped_frames: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every delta completed by it, in arrival order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DeltaPayload> {
        // The residue holds no delimiter; a new one starts at its last byte at the earliest
        let mut scan_from = self.buffer.len().saturating_sub(FRAME_DELIMITER.len() - 1);
        self.buffer.extend_from_slice(chunk);
        debug!(
            "Decoder fed {} bytes ({} buffered)",
            chunk.len(),
            self.buffer.len()
        );

        let mut consumed = 0;
        let mut deltas = Vec::new();
        while let Some(end) = find_delimiter(&self.buffer, scan_from) {
            match decode_frame(&self.buffer[consumed..end]) {
                Ok(delta) => deltas.push(delta),
                Err(e) => {
                    self.dropped_frames += 1;
                    warn!("Dropping frame: {}", e);
                }
            }
            consumed = end + FRAME_DELIMITER.len();
            scan_from = consumed;
        }
        self.buffer.drain(..consumed);
        deltas
    }

    /// Ends the stream. Any incomplete trailing frame is discarded, never emitted.
    ///
    /// Returns the number of bytes thrown away.
    pub fn flush(&mut self) -> usize {
        let residual = self.buffer.len();
        if residual > 0 {
            warn!("Discarding {} bytes of incomplete frame at end of stream", residual);
        }
        self.buffer.clear();
        residual
    }

    /// Clears the buffer and counters for a new stream.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.dropped_frames = 0;
    }

    /// Bytes waiting for a delimiter.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Frames dropped since the last reset.
    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }
}

/// Position of the first delimiter at or after `from`.
fn find_delimiter(buffer: &[u8], from: usize) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(FRAME_DELIMITER.len())
        .position(|window| window == FRAME_DELIMITER)
        .map(|pos| from + pos)
}

/// Decodes one frame (delimiter already stripped).
///
/// Lines other than the payload (`event:`, `id:`, comments) are ignored;
/// the first `data: ` line wins.
pub fn decode_frame(frame: &[u8]) -> Result<DeltaPayload, FrameError> {
    let text = std::str::from_utf8(frame).map_err(|_| FrameError::InvalidUtf8)?;
    let data = text
        .lines()
        .find_map(|line| line.strip_prefix(DATA_PREFIX))
        .ok_or(FrameError::MissingData)?;
    serde_json::from_str::<DeltaPayload>(data).map_err(|e| FrameError::Payload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(deltas: &[DeltaPayload]) -> Vec<&str> {
        deltas.iter().map(|d| d.text.as_str()).collect()
    }

    /// Feeds `stream` split at every position in `cuts` and collects all deltas.
    fn decode_split(stream: &[u8], cuts: &[usize]) -> Vec<DeltaPayload> {
        let mut decoder = StreamDecoder::new();
        let mut deltas = Vec::new();
        let mut start = 0;
        for cut in cuts.iter().copied().chain(std::iter::once(stream.len())) {
            deltas.extend(decoder.feed(&stream[start..cut]));
            start = cut;
        }
        deltas
    }

    #[test]
    fn test_split_mid_payload_emits_after_second_chunk() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder.feed(b"data: {\"text\":\"Hel").is_empty());
        let deltas = decoder.feed(b"lo\"}\n\n");
        assert_eq!(texts(&deltas), vec!["Hello"]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_two_frames_in_one_chunk() {
        let mut decoder = StreamDecoder::new();
        let deltas = decoder.feed(b"data: {\"text\":\"A\"}\n\ndata: {\"text\":\"B\"}\n\n");
        assert_eq!(texts(&deltas), vec!["A", "B"]);
    }

    #[test]
    fn test_malformed_middle_frame_is_skipped() {
        let mut decoder = StreamDecoder::new();
        let deltas = decoder
            .feed(b"data: {\"text\":\"A\"}\n\ndata: not-json\n\ndata: {\"text\":\"B\"}\n\n");
        assert_eq!(texts(&deltas), vec!["A", "B"]);
        assert_eq!(decoder.dropped_frames(), 1);
    }

    #[test]
    fn test_every_single_split_point_decodes_identically() {
        let stream = "data: {\"text\":\"Hi \"}\n\ndata: {\"text\":\"thére\"}\n\ndata: {\"text\":\"!\"}\n\n"
            .as_bytes();
        let expected = decode_split(stream, &[]);
        assert_eq!(texts(&expected), vec!["Hi ", "thére", "!"]);

        for cut in 0..=stream.len() {
            assert_eq!(decode_split(stream, &[cut]), expected, "split at byte {cut}");
        }
    }

    #[test]
    fn test_byte_at_a_time_decodes_identically() {
        let stream = b"data: {\"text\":\"one\"}\n\ndata: {\"text\":\"two\"}\n\n";
        let cuts: Vec<usize> = (1..stream.len()).collect();
        assert_eq!(texts(&decode_split(stream, &cuts)), vec!["one", "two"]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let stream = "data: {\"text\":\"日本\"}\n\n".as_bytes();
        // Cut inside the three-byte encoding of the first character
        let cut = stream.iter().position(|&b| b >= 0x80).unwrap() + 1;
        assert_eq!(texts(&decode_split(stream, &[cut])), vec!["日本"]);
    }

    #[test]
    fn test_incomplete_frame_never_emitted() {
        let mut decoder = StreamDecoder::new();
        // Complete payload line but no delimiter yet
        assert!(decoder.feed(b"data: {\"text\":\"A\"}\n").is_empty());
        assert!(decoder.buffered() > 0);
        assert_eq!(decoder.flush(), 19);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_flush_on_empty_buffer() {
        let mut decoder = StreamDecoder::new();
        assert_eq!(decoder.flush(), 0);
    }

    #[test]
    fn test_frame_without_data_line_is_dropped() {
        let mut decoder = StreamDecoder::new();
        let deltas = decoder.feed(b": keep-alive\n\ndata: {\"text\":\"x\"}\n\n");
        assert_eq!(texts(&deltas), vec!["x"]);
        assert_eq!(decoder.dropped_frames(), 1);
    }

    #[test]
    fn test_event_line_before_data_is_ignored() {
        let mut decoder = StreamDecoder::new();
        let deltas = decoder.feed(b"event: message\ndata: {\"text\":\"x\"}\n\n");
        assert_eq!(texts(&deltas), vec!["x"]);
    }

    #[test]
    fn test_prefix_without_space_is_not_a_payload() {
        // Go's gin `SSEvent` writes `data:` with no space; those frames carry the
        // whole final message and must not be merged into the reply.
        let mut decoder = StreamDecoder::new();
        let deltas = decoder.feed(b"event:message\ndata:{\"text\":\"Hello\"}\n\n");
        assert!(deltas.is_empty());
        assert_eq!(decoder.dropped_frames(), 1);
    }

    #[test]
    fn test_extra_payload_fields_are_ignored() {
        let mut decoder = StreamDecoder::new();
        let deltas = decoder.feed(
            b"data: {\"id\":\"m1\",\"sessionID\":\"1\",\"sender\":\"ai\",\"text\":\"Hi\",\"timestamp\":\"2024-01-01T00:00:00Z\"}\n\n",
        );
        assert_eq!(texts(&deltas), vec!["Hi"]);
    }

    #[test]
    fn test_payload_without_text_is_dropped() {
        assert!(matches!(
            decode_frame(b"data: {\"content\":\"x\"}"),
            Err(FrameError::Payload(_))
        ));
        assert_eq!(decode_frame(b"data: {\"text\":\"\"}"), Ok(DeltaPayload { text: String::new() }));
    }

    #[test]
    fn test_invalid_utf8_frame_is_dropped() {
        assert_eq!(decode_frame(&[0x64, 0xff, 0xfe]), Err(FrameError::InvalidUtf8));
    }

    #[test]
    fn test_delimiter_split_across_feeds() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder.feed(b"data: {\"text\":\"A\"}\n").is_empty());
        assert_eq!(texts(&decoder.feed(b"\ndata: {\"text\":\"B\"}\n")), vec!["A"]);
        assert_eq!(texts(&decoder.feed(b"\n")), vec!["B"]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_long_frame_fed_in_small_pieces() {
        let text = "x".repeat(10_000);
        let stream = format!("data: {{\"text\":\"{text}\"}}\n\n");
        let cuts: Vec<usize> = (1..stream.len()).step_by(7).collect();
        let deltas = decode_split(stream.as_bytes(), &cuts);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].text, text);
    }

    #[test]
    fn test_find_delimiter_from_offset() {
        assert_eq!(find_delimiter(b"a\n\nb\n\n", 0), Some(1));
        assert_eq!(find_delimiter(b"a\n\nb\n\n", 2), Some(4));
        assert_eq!(find_delimiter(b"a\n", 5), None);
    }

    #[test]
    fn test_reset_clears_buffer_and_counter() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(b"data: nope\n\ndata: {\"te");
        assert_eq!(decoder.dropped_frames(), 1);
        decoder.reset();
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.dropped_frames(), 0);
    }
}

//! Chunked transfer encoding support
//!
//! The decoder is incremental: it can be fed arbitrary fragments, including
//! ones that split a size line or the CRLF after a chunk, and keeps its
//! cursor (`current_chunk_size`, `bytes_read_in_current_chunk`) between
//! calls. Decoding stops at the first zero-sized chunk; trailers are not
//! read.

use super::{CRLF, MAX_CHUNK_SIZE};
use bytes::BytesMut;
use std::io::{self, Write};

/// Longest chunk-size line accepted, extensions included
const MAX_SIZE_LINE: usize = 1024;

/// Chunked encoder
///
/// Encodes data in HTTP chunked transfer encoding format
pub struct ChunkedEncoder<W: Write> {
    writer: W,
}

impl<W: Write> ChunkedEncoder<W> {
    /// Create a new chunked encoder
    pub fn new(writer: W) -> Self {
        ChunkedEncoder { writer }
    }

    /// Write a chunk of data; empty chunks are skipped
    pub fn write_chunk(&mut self, data: &[u8]) -> io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        write!(self.writer, "{:x}{}", data.len(), CRLF)?;
        self.writer.write_all(data)?;
        self.writer.write_all(CRLF.as_bytes())
    }

    /// Write the final chunk (0-sized chunk)
    pub fn finish(&mut self) -> io::Result<()> {
        write!(self.writer, "0{}{}", CRLF, CRLF)?;
        self.writer.flush()
    }

    /// Consume the encoder and return the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    ChunkSize,
    ChunkData,
    ChunkEnd,
    Complete,
}

/// Incremental chunked decoder
#[derive(Debug, Clone)]
pub struct ChunkedDecoder {
    state: DecoderState,
    chunk_size: usize,
    chunk_read: usize,
    size_line: Vec<u8>,
    max_chunk_size: usize,
}

impl ChunkedDecoder {
    /// Create a new chunked decoder
    pub fn new() -> Self {
        Self::with_max_chunk_size(MAX_CHUNK_SIZE)
    }

    /// Decoder with a custom corrupt-size threshold
    pub fn with_max_chunk_size(max_chunk_size: usize) -> Self {
        ChunkedDecoder {
            state: DecoderState::ChunkSize,
            chunk_size: 0,
            chunk_read: 0,
            size_line: Vec::new(),
            max_chunk_size,
        }
    }

    /// Decode a fragment, appending chunk payload to `output`
    ///
    /// Returns true once the terminating zero-sized chunk has been read.
    /// Input after that point is ignored.
    ///
    /// # Panics
    ///
    /// Panics when a chunk size at or above the configured maximum is
    /// decoded, or a size line grows past any plausible length. Both mean
    /// the peer is not speaking the protocol.
    pub fn decode(&mut self, input: &[u8], output: &mut BytesMut) -> bool {
        let mut pos = 0;

        while pos < input.len() {
            match self.state {
                DecoderState::ChunkSize => {
                    let byte = input[pos];
                    pos += 1;
                    self.size_line.push(byte);

                    if self.size_line.ends_with(b"\r\n") {
                        self.start_chunk();
                    } else {
                        assert!(
                            self.size_line.len() <= MAX_SIZE_LINE,
                            "corrupt chunked encoding: unterminated chunk-size line"
                        );
                    }
                }

                DecoderState::ChunkData => {
                    let remaining = self.chunk_size - self.chunk_read;
                    let to_copy = remaining.min(input.len() - pos);

                    output.extend_from_slice(&input[pos..pos + to_copy]);
                    pos += to_copy;
                    self.chunk_read += to_copy;

                    if self.chunk_read == self.chunk_size {
                        self.state = DecoderState::ChunkEnd;
                    }
                }

                // Skip the line break after chunk data, tolerating its absence
                DecoderState::ChunkEnd => match input[pos] {
                    b'\r' => pos += 1,
                    b'\n' => {
                        pos += 1;
                        self.state = DecoderState::ChunkSize;
                    }
                    _ => self.state = DecoderState::ChunkSize,
                },

                DecoderState::Complete => break,
            }
        }

        self.is_complete()
    }

    fn start_chunk(&mut self) {
        let line = &self.size_line[..self.size_line.len() - 2];
        let size = parse_chunk_size(line);
        if size.is_none() {
            tracing::warn!(
                line = %String::from_utf8_lossy(line),
                "chunk-size line without hex digits, treating as last chunk"
            );
        }
        let size = size.unwrap_or(0);

        assert!(
            size < self.max_chunk_size,
            "corrupt chunked encoding: chunk size {} exceeds limit {}",
            size,
            self.max_chunk_size
        );

        self.size_line.clear();
        self.chunk_size = size;
        self.chunk_read = 0;
        self.state = if size == 0 {
            DecoderState::Complete
        } else {
            DecoderState::ChunkData
        };
    }

    /// Check if decoding is complete
    pub fn is_complete(&self) -> bool {
        self.state == DecoderState::Complete
    }

    /// Size of the chunk being read (0 once complete)
    pub fn current_chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Payload bytes of the current chunk consumed so far
    pub fn bytes_read_in_current_chunk(&self) -> usize {
        self.chunk_read
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Leading hex digits of a size line, extensions and whitespace ignored
fn parse_chunk_size(line: &[u8]) -> Option<usize> {
    let line = line.split(|&b| b == b';').next().unwrap_or_default();
    let digits: Vec<u8> = line
        .iter()
        .copied()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_hexdigit())
        .collect();

    if digits.is_empty() {
        return None;
    }

    let digits = std::str::from_utf8(&digits).ok()?;
    // Too many digits to fit is certainly over any sane limit
    Some(usize::from_str_radix(digits, 16).unwrap_or(usize::MAX))
}

/// Decode a complete chunked body; `None` if the terminating chunk is missing
pub fn decode_chunked_body(input: &[u8]) -> Option<BytesMut> {
    let mut decoder = ChunkedDecoder::new();
    let mut output = BytesMut::with_capacity(input.len());
    decoder.decode(input, &mut output).then_some(output)
}

/// Encode data as chunked body
pub fn encode_chunked_body(data: &[u8], chunk_size: usize) -> io::Result<Vec<u8>> {
    let mut encoder = ChunkedEncoder::new(Vec::new());

    for chunk in data.chunks(chunk_size.max(1)) {
        encoder.write_chunk(chunk)?;
    }

    encoder.finish()?;

    Ok(encoder.into_inner())
}

//! Incremental response reassembly
//!
//! Each sent request carries a [`ParseState`]. Fragments are fed in with
//! [`absorb`] in arrival order; the request is complete when:
//!
//! - the head carries `Transfer-Encoding: chunked` and the zero-sized chunk
//!   has been decoded (the buffer then holds only the decoded body),
//! - the head carries `Content-Length: N` and N bytes followed the
//!   separator (`N == 0` completes immediately),
//! - neither marker is present and the separator has arrived. This is
//!   best-effort: a body without a length is cut at whatever arrived with
//!   the separator.
//!
//! [`force_complete`] settles the body offset of a request whose
//! connection went away mid-response.

use super::chunked::ChunkedDecoder;
use super::parser::{find, find_header_end, scan_content_length};
use super::request::Request;
use super::{CHUNKED_MARKER, CONTENT_LENGTH_MARKER, HEADER_TERMINATOR};

/// Per-request parse state
#[derive(Debug, Clone, Default)]
pub(crate) enum ParseState {
    /// Headers arriving, no usable Content-Length seen
    #[default]
    UnknownLength,
    /// Content-Length parsed, waiting for the separator and body
    KnownLength(usize),
    /// Chunked marker seen, separator not yet arrived
    ChunkedFirst,
    /// Decoding chunks across receive events
    ChunkedContinuation(ChunkedDecoder),
    Complete,
}

impl ParseState {
    pub(crate) fn is_complete(&self) -> bool {
        matches!(self, ParseState::Complete)
    }
}

/// Feed one fragment into a request; returns true once it is complete
///
/// # Panics
///
/// Panics when a chunk size at or above `max_chunk_size` is decoded.
pub(crate) fn absorb<C>(request: &mut Request<C>, data: &[u8], max_chunk_size: usize) -> bool {
    let state = std::mem::take(&mut request.state);

    request.state = match state {
        ParseState::ChunkedContinuation(mut decoder) => {
            if decoder.decode(data, &mut request.received) {
                ParseState::Complete
            } else {
                ParseState::ChunkedContinuation(decoder)
            }
        }
        ParseState::Complete => {
            tracing::trace!(request = %request.id, len = data.len(), "data after completion dropped");
            ParseState::Complete
        }
        ParseState::ChunkedFirst => {
            request.received.extend_from_slice(data);
            start_chunked(request, max_chunk_size)
        }
        ParseState::UnknownLength => {
            request.received.extend_from_slice(data);
            await_headers(request, None, max_chunk_size)
        }
        ParseState::KnownLength(length) => {
            request.received.extend_from_slice(data);
            await_headers(request, Some(length), max_chunk_size)
        }
    };

    request.state.is_complete()
}

/// Switch to chunked decoding once the separator is in the buffer
fn start_chunked<C>(request: &mut Request<C>, max_chunk_size: usize) -> ParseState {
    let Some(separator) = find_header_end(&request.received) else {
        return ParseState::ChunkedFirst;
    };

    let encoded = request.received.split_off(separator + HEADER_TERMINATOR.len());
    request.received.clear();
    request.chunked = true;
    request.body_offset = Some(0);

    let mut decoder = ChunkedDecoder::with_max_chunk_size(max_chunk_size);
    if decoder.decode(&encoded, &mut request.received) {
        ParseState::Complete
    } else {
        ParseState::ChunkedContinuation(decoder)
    }
}

fn await_headers<C>(request: &mut Request<C>, known: Option<usize>, max_chunk_size: usize) -> ParseState {
    if find(&request.received, CHUNKED_MARKER).is_some() {
        return start_chunked(request, max_chunk_size);
    }

    let content_length = known.or_else(|| scan_content_length(&request.received));
    let separator = find_header_end(&request.received);

    match (content_length, separator) {
        (Some(0), _) => {
            request.body_offset = None;
            ParseState::Complete
        }
        (Some(length), Some(separator)) => {
            let body_start = separator + HEADER_TERMINATOR.len();
            if request.received.len() - body_start >= length {
                request.body_offset = Some(body_start);
                ParseState::Complete
            } else {
                ParseState::KnownLength(length)
            }
        }
        (Some(length), None) => ParseState::KnownLength(length),
        (None, Some(separator)) => {
            let body_start = separator + HEADER_TERMINATOR.len();
            request.body_offset = (request.received.len() > body_start).then_some(body_start);
            ParseState::Complete
        }
        (None, None) => ParseState::UnknownLength,
    }
}

/// Settle the body offset of a request whose connection closed
///
/// Chunked requests and requests that received nothing keep their offset.
pub(crate) fn force_complete<C>(request: &mut Request<C>) {
    if !request.chunked && !request.received.is_empty() {
        request.body_offset = if find(&request.received, CONTENT_LENGTH_MARKER).is_some() {
            Some(find_header_end(&request.received).map_or(0, |sep| sep + HEADER_TERMINATOR.len()))
        } else {
            Some(0)
        };
    }
    request.state = ParseState::Complete;
}

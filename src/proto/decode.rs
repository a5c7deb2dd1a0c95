//! Incremental HTTP/1.1 response decoding.
//!
//! The connection feeds raw reads into these decoders and never looks at
//! wire bytes itself: [`parse_head`] yields a [`ResponseHead`] once enough
//! bytes have arrived, and [`BodyDecoder`] consumes the rest according to
//! the framing the head announced.

use bytes::{Buf, BytesMut};
use http::{header::HeaderName, HeaderMap, HeaderValue, StatusCode, Version};

use super::headers;
use crate::error::ProtocolError;

const MAX_HEADERS: usize = 64;
const MAX_HEAD_BYTES: usize = 64 * 1024;
const MAX_CHUNK_LINE: usize = 4096;

#[derive(Debug)]
pub(crate) struct ResponseHead {
    pub(crate) version: Version,
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
}

/// Try to parse a complete response head out of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed; on success the head bytes
/// are consumed from `buf`, leaving any body prefix in place.
pub(crate) fn parse_head(buf: &mut BytesMut) -> Result<Option<ResponseHead>, ProtocolError> {
    let mut header_slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Response::new(&mut header_slots);

    let (head_len, head) = match parsed.parse(buf)? {
        httparse::Status::Partial => {
            if buf.len() > MAX_HEAD_BYTES {
                return Err(ProtocolError::HeadTooLarge {
                    max: MAX_HEAD_BYTES,
                });
            }
            return Ok(None);
        }
        httparse::Status::Complete(head_len) => {
            let version = match parsed.version {
                Some(0) => Version::HTTP_10,
                Some(1) => Version::HTTP_11,
                _ => return Err(ProtocolError::InvalidHead(httparse::Error::Version)),
            };
            let status = parsed
                .code
                .and_then(|code| StatusCode::from_u16(code).ok())
                .ok_or(ProtocolError::InvalidHead(httparse::Error::Status))?;

            let mut headers = HeaderMap::with_capacity(parsed.headers.len());
            for header in parsed.headers.iter() {
                let name = HeaderName::from_bytes(header.name.as_bytes())
                    .map_err(|_| ProtocolError::InvalidHead(httparse::Error::HeaderName))?;
                let value = HeaderValue::from_bytes(header.value)
                    .map_err(|_| ProtocolError::InvalidHead(httparse::Error::HeaderValue))?;
                headers.append(name, value);
            }

            (
                head_len,
                ResponseHead {
                    version,
                    status,
                    headers,
                },
            )
        }
    };

    buf.advance(head_len);
    Ok(Some(head))
}

/// Body framing state machine, selected from the response head.
#[derive(Debug)]
pub(crate) enum BodyDecoder {
    /// No body follows (1xx/204/304, or a HEAD request).
    Empty,
    /// Exactly `remaining` more bytes.
    Length { remaining: u64 },
    /// `Transfer-Encoding: chunked`.
    Chunked { state: ChunkState },
    /// Delimited by connection close; the transport is not reusable.
    Eof,
}

#[derive(Debug)]
pub(crate) enum ChunkState {
    Size,
    Data { remaining: u64 },
    DataCrlf,
    Trailer,
}

impl BodyDecoder {
    pub(crate) fn from_head(
        request_was_head: bool,
        head: &ResponseHead,
    ) -> Result<BodyDecoder, ProtocolError> {
        if request_was_head
            || head.status.is_informational()
            || head.status == StatusCode::NO_CONTENT
            || head.status == StatusCode::NOT_MODIFIED
        {
            return Ok(BodyDecoder::Empty);
        }
        if headers::transfer_encoding_is_chunked(&head.headers) {
            return Ok(BodyDecoder::Chunked {
                state: ChunkState::Size,
            });
        }
        match headers::content_length_parse_all(&head.headers)
            .map_err(|()| ProtocolError::InvalidContentLength)?
        {
            Some(0) => Ok(BodyDecoder::Empty),
            Some(n) => Ok(BodyDecoder::Length { remaining: n }),
            None => Ok(BodyDecoder::Eof),
        }
    }

    /// Whether this framing leaves the connection eligible for reuse once
    /// the body completes.
    pub(crate) fn allows_reuse(&self) -> bool {
        !matches!(self, BodyDecoder::Eof)
    }

    /// Consume body bytes from `buf` into `out`.
    ///
    /// Returns `Ok(true)` once the body is complete; `Ok(false)` means more
    /// reads are needed.
    pub(crate) fn decode(
        &mut self,
        buf: &mut BytesMut,
        out: &mut BytesMut,
        max_body: usize,
    ) -> Result<bool, ProtocolError> {
        let complete = match self {
            BodyDecoder::Empty => true,
            BodyDecoder::Length { remaining } => {
                let take = (*remaining).min(buf.len() as u64) as usize;
                out.extend_from_slice(&buf[..take]);
                buf.advance(take);
                *remaining -= take as u64;
                *remaining == 0
            }
            BodyDecoder::Eof => {
                out.extend_from_slice(buf);
                buf.clear();
                false
            }
            BodyDecoder::Chunked { state } => decode_chunked(state, buf, out)?,
        };
        if out.len() > max_body {
            return Err(ProtocolError::BodyTooLarge { max: max_body });
        }
        Ok(complete)
    }

    /// The peer closed the connection; decide whether the body is complete.
    pub(crate) fn on_eof(&self) -> Result<(), ProtocolError> {
        match self {
            BodyDecoder::Empty | BodyDecoder::Eof => Ok(()),
            BodyDecoder::Length { .. } | BodyDecoder::Chunked { .. } => {
                Err(ProtocolError::IncompleteResponse)
            }
        }
    }
}

fn decode_chunked(
    state: &mut ChunkState,
    buf: &mut BytesMut,
    out: &mut BytesMut,
) -> Result<bool, ProtocolError> {
    loop {
        match state {
            ChunkState::Size => {
                let line = match take_line(buf)? {
                    Some(line) => line,
                    None => return Ok(false),
                };
                let size = parse_chunk_size(&line)?;
                if size == 0 {
                    *state = ChunkState::Trailer;
                } else {
                    *state = ChunkState::Data { remaining: size };
                }
            }
            ChunkState::Data { remaining } => {
                if buf.is_empty() {
                    return Ok(false);
                }
                let take = (*remaining).min(buf.len() as u64) as usize;
                out.extend_from_slice(&buf[..take]);
                buf.advance(take);
                *remaining -= take as u64;
                if *remaining == 0 {
                    *state = ChunkState::DataCrlf;
                }
            }
            ChunkState::DataCrlf => {
                if buf.len() < 2 {
                    return Ok(false);
                }
                if &buf[..2] != b"\r\n" {
                    return Err(ProtocolError::InvalidChunk);
                }
                buf.advance(2);
                *state = ChunkState::Size;
            }
            ChunkState::Trailer => {
                // Trailer fields are skipped; a bare CRLF terminates the body.
                let line = match take_line(buf)? {
                    Some(line) => line,
                    None => return Ok(false),
                };
                if line.is_empty() {
                    return Ok(true);
                }
            }
        }
    }
}

/// Pop one CRLF-terminated line, without the terminator.
fn take_line(buf: &mut BytesMut) -> Result<Option<BytesMut>, ProtocolError> {
    match buf.windows(2).position(|w| w == b"\r\n") {
        Some(pos) => {
            let line = buf.split_to(pos);
            buf.advance(2);
            Ok(Some(line))
        }
        None => {
            if buf.len() > MAX_CHUNK_LINE {
                return Err(ProtocolError::InvalidChunk);
            }
            Ok(None)
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, ProtocolError> {
    // Chunk extensions after ';' are ignored.
    let digits = match line.iter().position(|&b| b == b';') {
        Some(pos) => &line[..pos],
        None => line,
    };
    let digits = trim_ascii(digits);
    if digits.is_empty() {
        return Err(ProtocolError::InvalidChunk);
    }
    let mut size: u64 = 0;
    for &b in digits {
        let digit = (b as char)
            .to_digit(16)
            .ok_or(ProtocolError::InvalidChunk)?;
        size = size
            .checked_mul(16)
            .and_then(|s| s.checked_add(digit as u64))
            .ok_or(ProtocolError::InvalidChunk)?;
    }
    Ok(size)
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &bytes[start..end]
}

use std::io;

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::messages::Message;

/// Maximum allowed DAP message payload size (in bytes).
///
/// This caps the value of the incoming `Content-Length` header. Without an
/// upper bound a malformed/hostile adapter can send an enormous
/// `Content-Length` and force the client to allocate huge buffers before we
/// even attempt to read the body. 16 MiB is generous for DAP JSON payloads.
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// Maximum allowed size of a message's header block (in bytes).
pub const MAX_HEADER_BLOCK_BYTES: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum DapError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Malformed framing for one message. The offending bytes have already
    /// been consumed, so decoding can continue at the next message boundary.
    #[error("malformed frame: {0}")]
    Frame(String),

    /// A size limit was exceeded. The stream position can no longer be
    /// trusted; callers should close the transport.
    #[error("frame exceeds limit: {0}")]
    TooLarge(String),

    /// The body was not valid message JSON. Exactly `Content-Length` bytes
    /// were consumed, so the stream stays aligned on the next message.
    #[error("invalid message body: {0}")]
    Body(#[from] serde_json::Error),
}

impl DapError {
    /// Whether the decoder can keep going on the same stream after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DapError::Io(_) | DapError::TooLarge(_))
    }
}

#[derive(Debug, Clone, Copy)]
enum DecodeState {
    AwaitingHeader,
    ReadingBody { length: usize },
}

/// Incremental DAP framing: `Key: Value\r\n` header lines, a blank line, then
/// exactly `Content-Length` bytes of UTF-8 JSON.
///
/// Implements [`Decoder`]/[`Encoder`] so it can sit under
/// `tokio_util::codec::Framed*` streams, or be driven by hand with a
/// [`BytesMut`] buffer. Arbitrary chunk splits reassemble to the same message
/// sequence; multiple messages in one chunk are drained by repeated `decode`
/// calls.
#[derive(Debug)]
pub struct DapCodec {
    state: DecodeState,
}

impl Default for DapCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl DapCodec {
    pub fn new() -> Self {
        Self {
            state: DecodeState::AwaitingHeader,
        }
    }
}

impl Decoder for DapCodec {
    type Item = Message;
    type Error = DapError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, DapError> {
        loop {
            match self.state {
                DecodeState::AwaitingHeader => {
                    let Some(header_len) = header_block_len(src)? else {
                        return Ok(None);
                    };
                    let header = src.split_to(header_len);
                    let length = parse_content_length(&header)?;
                    if length > MAX_MESSAGE_BYTES {
                        return Err(DapError::TooLarge(format!(
                            "Content-Length {length} exceeds maximum allowed size {MAX_MESSAGE_BYTES}"
                        )));
                    }
                    self.state = DecodeState::ReadingBody { length };
                }
                DecodeState::ReadingBody { length } => {
                    if src.len() < length {
                        src.reserve(length - src.len());
                        return Ok(None);
                    }
                    let body = src.split_to(length);
                    self.state = DecodeState::AwaitingHeader;
                    return Ok(Some(serde_json::from_slice::<Message>(&body)?));
                }
            }
        }
    }
}

impl Encoder<&Message> for DapCodec {
    type Error = DapError;

    fn encode(&mut self, message: &Message, dst: &mut BytesMut) -> Result<(), DapError> {
        let body = serde_json::to_vec(message)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        dst.reserve(header.len() + body.len());
        dst.put_slice(header.as_bytes());
        dst.put_slice(&body);
        Ok(())
    }
}

/// Encode a single message into its wire form.
pub fn encode_message(message: &Message) -> Result<Vec<u8>, DapError> {
    let mut buf = BytesMut::new();
    DapCodec::new().encode(message, &mut buf)?;
    Ok(buf.to_vec())
}

/// Length of the complete header block (terminator included), or `None` when
/// more bytes are needed.
fn header_block_len(src: &[u8]) -> Result<Option<usize>, DapError> {
    let mut offset = 0;
    loop {
        let Some(nl) = src[offset..].iter().position(|&b| b == b'\n') else {
            if src.len() > MAX_HEADER_BLOCK_BYTES {
                return Err(DapError::TooLarge(format!(
                    "header block exceeds maximum size ({MAX_HEADER_BLOCK_BYTES} bytes)"
                )));
            }
            return Ok(None);
        };
        let line_end = offset + nl;
        let mut line = &src[offset..line_end];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        if line.is_empty() {
            return Ok(Some(line_end + 1));
        }
        offset = line_end + 1;
        if offset > MAX_HEADER_BLOCK_BYTES {
            return Err(DapError::TooLarge(format!(
                "header block exceeds maximum size ({MAX_HEADER_BLOCK_BYTES} bytes)"
            )));
        }
    }
}

fn parse_content_length(header: &[u8]) -> Result<usize, DapError> {
    for line in header.split(|&b| b == b'\n') {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches(['\r', '\n']);
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.eq_ignore_ascii_case("Content-Length") {
            let value = value.trim();
            return value.parse::<usize>().map_err(|err| {
                DapError::Frame(format!("invalid Content-Length {value:?}: {err}"))
            });
        }
    }
    Err(DapError::Frame(
        "message missing Content-Length header".to_string(),
    ))
}

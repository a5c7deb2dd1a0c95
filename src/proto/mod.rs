//! HTTP/1.1 wire layer.
//!
//! Serialization and parsing live here so the connection state machine only
//! deals in buffers and completion booleans. No pipelining: one encoded
//! request goes out, one decoded response comes back.

pub(crate) mod decode;
pub(crate) mod headers;

use bytes::{BufMut, BytesMut};
use http::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};

pub(crate) use decode::{parse_head, BodyDecoder, ResponseHead};

use crate::request::Request;

/// Serialize the request head and body into one write-ready buffer.
pub(crate) fn encode_request(req: &Request) -> BytesMut {
    let url = req.url();
    let body = req.body_bytes();
    // Typical head fits well under this; the buffer grows for large bodies.
    let mut buf = BytesMut::with_capacity(256 + body.len());

    buf.put_slice(req.method().as_str().as_bytes());
    buf.put_u8(b' ');
    let path = url.path();
    buf.put_slice(if path.is_empty() { "/" } else { path }.as_bytes());
    if let Some(query) = url.query() {
        buf.put_u8(b'?');
        buf.put_slice(query.as_bytes());
    }
    buf.put_slice(b" HTTP/1.1\r\n");

    if !req.headers().contains_key(HOST) {
        buf.put_slice(b"host: ");
        buf.put_slice(url.host_str().unwrap_or_default().as_bytes());
        if let Some(port) = url.port() {
            buf.put_u8(b':');
            let mut itoa = [0u8; 5];
            buf.put_slice(fmt_port(port, &mut itoa));
        }
        buf.put_slice(b"\r\n");
    }

    let needs_length = !req.headers().contains_key(CONTENT_LENGTH)
        && !req.headers().contains_key(TRANSFER_ENCODING)
        && (!body.is_empty() || headers::method_has_defined_payload_semantics(req.method()));
    if needs_length {
        buf.put_slice(b"content-length: ");
        buf.put_slice(body.len().to_string().as_bytes());
        buf.put_slice(b"\r\n");
    }

    for (name, value) in req.headers() {
        buf.put_slice(name.as_str().as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\r\n");
    }

    buf.put_slice(b"\r\n");
    buf.put_slice(body);
    buf
}

fn fmt_port(port: u16, out: &mut [u8; 5]) -> &[u8] {
    let mut n = port;
    let mut idx = out.len();
    loop {
        idx -= 1;
        out[idx] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    &out[idx..]
}

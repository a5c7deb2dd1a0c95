//! Header semantics the connection lifecycle depends on.

use http::{
    header::{HeaderValue, CONTENT_LENGTH, TRANSFER_ENCODING},
    HeaderMap, Method, Version,
};

pub(crate) fn connection_keep_alive(value: &HeaderValue) -> bool {
    connection_has(value, "keep-alive")
}

pub(crate) fn connection_close(value: &HeaderValue) -> bool {
    connection_has(value, "close")
}

fn connection_has(value: &HeaderValue, needle: &str) -> bool {
    if let Ok(s) = value.to_str() {
        for val in s.split(',') {
            if val.trim().eq_ignore_ascii_case(needle) {
                return true;
            }
        }
    }
    false
}

/// Whether a response with these headers leaves the connection reusable.
///
/// HTTP/1.1 keeps alive unless told otherwise; HTTP/1.0 closes unless the
/// peer opts in explicitly.
pub(crate) fn response_keep_alive(version: Version, headers: &HeaderMap) -> bool {
    let connection = headers.get(http::header::CONNECTION);
    match version {
        Version::HTTP_11 => !connection.is_some_and(connection_close),
        Version::HTTP_10 => connection.is_some_and(connection_keep_alive),
        _ => false,
    }
}

/// Parse `Content-Length`, tolerating repeats only when they agree.
pub(crate) fn content_length_parse_all(headers: &HeaderMap) -> Result<Option<u64>, ()> {
    let mut content_length: Option<u64> = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let line = value.to_str().map_err(|_| ())?;
        for v in line.split(',') {
            let n = from_digits(v.trim().as_bytes()).ok_or(())?;
            match content_length {
                None => content_length = Some(n),
                Some(prev) if prev == n => {}
                Some(_) => return Err(()),
            }
        }
    }
    Ok(content_length)
}

fn from_digits(bytes: &[u8]) -> Option<u64> {
    // cannot use FromStr for u64, since it allows a signed prefix
    let mut result = 0u64;
    const RADIX: u64 = 10;

    if bytes.is_empty() {
        return None;
    }

    for &b in bytes {
        match b {
            b'0'..=b'9' => {
                result = result.checked_mul(RADIX)?;
                result = result.checked_add((b - b'0') as u64)?;
            }
            _ => return None,
        }
    }

    Some(result)
}

pub(crate) fn transfer_encoding_is_chunked(headers: &HeaderMap) -> bool {
    // chunked must always be the last encoding, according to spec
    if let Some(line) = headers.get_all(TRANSFER_ENCODING).into_iter().next_back() {
        if let Ok(s) = line.to_str() {
            if let Some(encoding) = s.rsplit(',').next() {
                return encoding.trim().eq_ignore_ascii_case("chunked");
            }
        }
    }
    false
}

pub(crate) fn method_has_defined_payload_semantics(method: &Method) -> bool {
    !matches!(
        *method,
        Method::GET | Method::HEAD | Method::DELETE | Method::CONNECT
    )
}

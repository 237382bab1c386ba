//! Protocol codec
//!
//! Reading and writing HTTP/1.1 messages over blocking streams.
//!
//! ## Framing
//! ```text
//! METHOD /path?query HTTP/1.1\r\n        HTTP/1.1 200 OK\r\n
//! Content-Length: n\r\n                  Content-Length: n\r\n
//! Connection: close\r\n   (optional)     Connection: keep-alive\r\n
//! \r\n                                   \r\n
//! <n body bytes>                         <n body bytes>
//! ```
//!
//! Bodies are framed by `Content-Length` only; chunked transfer encoding is
//! rejected. A response without a length runs to end of stream.

use std::io::{BufRead, Read, Write};

use bytes::Bytes;

use crate::error::{Result, ShardError};

use super::request::split_target;
use super::{Method, Request, Response, Status};

/// Maximum body size (16 MB)
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Maximum length of the request/status line or of one header line
pub const MAX_LINE_SIZE: usize = 8 * 1024;

/// Maximum number of header lines
pub const MAX_HEADERS: usize = 64;

/// Framing headers this codec cares about
#[derive(Debug, Default)]
struct Headers {
    content_length: Option<usize>,
    connection: Option<String>,
}

// =============================================================================
// Request Reading/Writing
// =============================================================================

/// Read one request from `reader`.
///
/// Returns `Ok(None)` when the stream ends cleanly before a request starts.
pub fn read_request<R: BufRead>(reader: &mut R) -> Result<Option<Request>> {
    // Blank lines between requests are ignored
    let request_line = loop {
        match read_line(reader)? {
            None => return Ok(None),
            Some(line) if line.is_empty() => continue,
            Some(line) => break line,
        }
    };

    let mut parts = request_line.splitn(3, ' ');
    let (method, target, version) = match (parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v)) if !m.is_empty() && !t.is_empty() => (m, t, v),
        _ => {
            return Err(ShardError::Protocol(format!(
                "Malformed request line: {:?}",
                request_line
            )))
        }
    };
    if !version.starts_with("HTTP/1.") {
        return Err(ShardError::Protocol(format!(
            "Unsupported HTTP version: {}",
            version
        )));
    }

    let headers = read_headers(reader)?;
    let body = read_body(reader, headers.content_length.unwrap_or(0))?;

    let keep_alive = match headers.connection.as_deref() {
        Some("close") => false,
        Some("keep-alive") => true,
        _ => version == "HTTP/1.1",
    };

    let (path, query) = split_target(target);
    Ok(Some(Request {
        method: Method::parse(method),
        path,
        query,
        body,
        keep_alive,
    }))
}

/// Write a request to `host`, flushing the stream
pub fn write_request<W: Write>(writer: &mut W, request: &Request, host: &str) -> Result<()> {
    write!(
        writer,
        "{} {} HTTP/1.1\r\nHost: {}\r\nContent-Length: {}\r\n",
        request.method,
        request.target(),
        host,
        request.body.len()
    )?;
    if !request.keep_alive {
        writer.write_all(b"Connection: close\r\n")?;
    }
    writer.write_all(b"\r\n")?;
    writer.write_all(&request.body)?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Response Reading/Writing
// =============================================================================

/// Read one response from `reader`
pub fn read_response<R: BufRead>(reader: &mut R) -> Result<Response> {
    let status_line = read_line(reader)?.ok_or_else(|| {
        ShardError::Protocol("Connection closed before response".to_string())
    })?;

    let mut parts = status_line.splitn(3, ' ');
    let code = match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/1.") => code,
        _ => {
            return Err(ShardError::Protocol(format!(
                "Malformed status line: {:?}",
                status_line
            )))
        }
    };
    let code: u16 = code
        .parse()
        .map_err(|_| ShardError::Protocol(format!("Invalid status code: {:?}", code)))?;

    let headers = read_headers(reader)?;
    let body = match headers.content_length {
        Some(len) => read_body(reader, len)?,
        None => read_to_close(reader)?,
    };

    Ok(Response {
        status: Status(code),
        body,
    })
}

/// Write a response, flushing the stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response, keep_alive: bool) -> Result<()> {
    write!(
        writer,
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: {}\r\n\r\n",
        response.status.code(),
        response.status.reason(),
        response.body.len(),
        if keep_alive { "keep-alive" } else { "close" }
    )?;
    writer.write_all(&response.body)?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Framing helpers
// =============================================================================

/// Read a CRLF- or LF-terminated line without its terminator.
///
/// `None` means end of stream before any byte.
fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<String>> {
    let mut buf = Vec::new();
    let n = reader
        .by_ref()
        .take(MAX_LINE_SIZE as u64 + 1)
        .read_until(b'\n', &mut buf)?;

    if n == 0 {
        return Ok(None);
    }
    if !buf.ends_with(b"\n") {
        if n > MAX_LINE_SIZE {
            return Err(ShardError::Protocol(format!(
                "Line too long (max {} bytes)",
                MAX_LINE_SIZE
            )));
        }
        return Err(ShardError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "stream ended mid-line",
        )));
    }

    buf.pop();
    if buf.ends_with(b"\r") {
        buf.pop();
    }

    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| ShardError::Protocol("Header line is not valid UTF-8".to_string()))
}

fn read_headers<R: BufRead>(reader: &mut R) -> Result<Headers> {
    let mut headers = Headers::default();

    for _ in 0..=MAX_HEADERS {
        let line = read_line(reader)?.ok_or_else(|| {
            ShardError::Protocol("Connection closed inside headers".to_string())
        })?;
        if line.is_empty() {
            return Ok(headers);
        }

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ShardError::Protocol(format!("Malformed header: {:?}", line)))?;
        let value = value.trim();

        if name.eq_ignore_ascii_case("content-length") {
            let len: usize = value.parse().map_err(|_| {
                ShardError::Protocol(format!("Invalid Content-Length: {:?}", value))
            })?;
            headers.content_length = Some(len);
        } else if name.eq_ignore_ascii_case("connection") {
            headers.connection = Some(value.to_ascii_lowercase());
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            return Err(ShardError::Protocol(format!(
                "Unsupported Transfer-Encoding: {}",
                value
            )));
        }
    }

    Err(ShardError::Protocol(format!(
        "Too many headers (max {})",
        MAX_HEADERS
    )))
}

fn read_body<R: Read>(reader: &mut R, len: usize) -> Result<Bytes> {
    if len > MAX_BODY_SIZE {
        return Err(ShardError::Protocol(format!(
            "Body too large: {} bytes (max {})",
            len, MAX_BODY_SIZE
        )));
    }

    let mut body = vec![0u8; len];
    if len > 0 {
        reader.read_exact(&mut body)?;
    }
    Ok(Bytes::from(body))
}

fn read_to_close<R: Read>(reader: &mut R) -> Result<Bytes> {
    let mut body = Vec::new();
    reader
        .by_ref()
        .take(MAX_BODY_SIZE as u64 + 1)
        .read_to_end(&mut body)?;

    if body.len() > MAX_BODY_SIZE {
        return Err(ShardError::Protocol(format!(
            "Body too large (max {})",
            MAX_BODY_SIZE
        )));
    }
    Ok(Bytes::from(body))
}

//! `Content-Length` framing for DAP messages.
//!
//! Each message is a header block terminated by an empty line, followed by
//! exactly `Content-Length` bytes of JSON.

use std::io::{self, BufRead, Write};

const CONTENT_LENGTH: &str = "Content-Length:";

/// Reads one message body.
///
/// Returns `Ok(None)` at a clean end of stream.
///
/// # Errors
///
/// Fails on I/O errors, a missing or malformed `Content-Length` header, a
/// stream that ends inside a message, or a body that is not UTF-8.
pub fn read_message<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
    let mut content_length = None;
    let mut saw_header = false;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            if saw_header {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended inside a message header",
                ));
            }
            return Ok(None);
        }

        let header = line.trim_end_matches(['\r', '\n']);
        if header.is_empty() {
            if saw_header {
                break;
            }
            // Stray blank line between messages.
            continue;
        }
        saw_header = true;

        if let Some(value) = header.strip_prefix(CONTENT_LENGTH) {
            let length = value.trim().parse::<usize>().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("invalid Content-Length `{}`", value.trim()),
                )
            })?;
            content_length = Some(length);
        }
    }

    let length = content_length
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing Content-Length"))?;
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body)?;

    String::from_utf8(body)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Writes one message body with its header and flushes.
///
/// # Errors
///
/// Fails on I/O errors.
pub fn write_message<W: Write>(writer: &mut W, message: &str) -> io::Result<()> {
    write!(writer, "{CONTENT_LENGTH} {}\r\n\r\n{message}", message.len())?;
    writer.flush()
}

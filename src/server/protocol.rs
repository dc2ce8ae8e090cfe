//! Wire framing
//!
//! Accepts RESP arrays of bulk strings (what client libraries send) and
//! inline lines (for telnet/nc). Inline framing keeps JSON payloads intact:
//! for `TINGEST` everything after the command is one argument, and for
//! `PROFILESET` everything after the user id is.

use thiserror::Error;

/// Largest accepted bulk string
pub const MAX_BULK_LEN: usize = 16 * 1024 * 1024;

/// Largest accepted inline line, terminator excluded
pub const MAX_INLINE_LEN: usize = 1024 * 1024;

/// Most arguments in one RESP array
pub const MAX_ARRAY_LEN: usize = 1024;

/// Longest `*<count>` or `$<len>` line, terminator excluded
pub const MAX_HEADER_LEN: usize = 32;

/// Largest RESP frame, headers and terminators included
pub const MAX_FRAME_LEN: usize = 32 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// More bytes are needed
    #[error("incomplete frame")]
    Incomplete,

    /// The stream cannot be resynchronized
    #[error("{0}")]
    Invalid(String),
}

/// Parse one frame; returns its arguments and the bytes consumed
pub fn parse_frame(buffer: &[u8]) -> Result<(Vec<String>, usize), ParseError> {
    if buffer.first() == Some(&b'*') {
        parse_resp_array(buffer)
    } else {
        parse_inline(buffer)
    }
}

fn find_crlf(buffer: &[u8], from: usize) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|p| p + from)
}

/// Locate the CRLF ending a length line starting at `from`
fn find_header_end(buffer: &[u8], from: usize) -> Result<usize, ParseError> {
    match find_crlf(buffer, from) {
        Some(end) if end - from <= MAX_HEADER_LEN => Ok(end),
        Some(_) => Err(ParseError::Invalid("Length header too long".to_string())),
        None if buffer.len() - from > MAX_HEADER_LEN + 1 => {
            Err(ParseError::Invalid("Length header too long".to_string()))
        }
        None => Err(ParseError::Incomplete),
    }
}

fn parse_usize(bytes: &[u8], what: &str) -> Result<usize, ParseError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::Invalid(format!("Invalid {}", what)))
}

fn parse_resp_array(buffer: &[u8]) -> Result<(Vec<String>, usize), ParseError> {
    let first_crlf = find_header_end(buffer, 0)?;
    let array_count = parse_usize(&buffer[1..first_crlf], "array count")?;
    if array_count > MAX_ARRAY_LEN {
        return Err(ParseError::Invalid("Too many arguments".to_string()));
    }

    let mut args = Vec::with_capacity(array_count.min(64));
    let mut pos = first_crlf + 2;

    for _ in 0..array_count {
        match buffer.get(pos) {
            None => return Err(ParseError::Incomplete),
            Some(b'$') => {}
            Some(_) => return Err(ParseError::Invalid("Expected bulk string".to_string())),
        }

        let len_end = find_header_end(buffer, pos)?;
        let len = parse_usize(&buffer[pos + 1..len_end], "bulk string length")?;
        if len > MAX_BULK_LEN {
            return Err(ParseError::Invalid("Bulk string too large".to_string()));
        }

        let data_start = len_end + 2;
        let data_end = data_start + len;
        if data_end + 2 > MAX_FRAME_LEN {
            return Err(ParseError::Invalid("Frame too large".to_string()));
        }
        if data_end + 2 > buffer.len() {
            return Err(ParseError::Incomplete);
        }
        if &buffer[data_end..data_end + 2] != b"\r\n" {
            return Err(ParseError::Invalid("Bulk string not terminated".to_string()));
        }

        let arg = String::from_utf8(buffer[data_start..data_end].to_vec())
            .map_err(|_| ParseError::Invalid("Invalid UTF-8".to_string()))?;
        args.push(arg);
        pos = data_end + 2;
    }

    Ok((args, pos))
}

fn parse_inline(buffer: &[u8]) -> Result<(Vec<String>, usize), ParseError> {
    let newline = match buffer.iter().position(|&b| b == b'\n') {
        Some(pos) => pos,
        None if buffer.len() > MAX_INLINE_LEN => {
            return Err(ParseError::Invalid("Inline command too long".to_string()))
        }
        None => return Err(ParseError::Incomplete),
    };

    let line = &buffer[..newline];
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let line = std::str::from_utf8(line)
        .map_err(|_| ParseError::Invalid("Invalid UTF-8".to_string()))?;

    Ok((split_inline(line), newline + 1))
}

/// Split an inline line into arguments
pub fn split_inline(line: &str) -> Vec<String> {
    let line = line.trim();
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim_start()),
        None => (line, ""),
    };
    if command.is_empty() {
        return Vec::new();
    }

    let mut args = vec![command.to_string()];
    match command.to_ascii_uppercase().as_str() {
        "TINGEST" => {
            if !rest.is_empty() {
                args.push(rest.to_string());
            }
        }
        "PROFILESET" => match rest.split_once(char::is_whitespace) {
            Some((user_id, payload)) => {
                args.push(user_id.to_string());
                args.push(payload.trim_start().to_string());
            }
            None if !rest.is_empty() => args.push(rest.to_string()),
            None => {}
        },
        _ => args.extend(rest.split_whitespace().map(String::from)),
    }
    args
}

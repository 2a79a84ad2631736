//! Purpose: Convert between quoted/backslash-escaped text and internal UTF-8 string bytes.
//! Exports: `validate_and_compact`, `parse_quoted`, `escape`, `escaped_len`, `EscapeError`.
//! Role: Text boundary of the `str` kind and of any caller that prints heap strings.
//! Invariants: Compacted output is always shortest-form UTF-8 without surrogates or NUL.
//! Invariants: `escaped_len` equals the length `escape` produces for the same arguments.
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EscapeError {
    /// Backslash at the very end of the input.
    Dangling,
    BadHex { at: usize },
    EmbeddedNul { at: usize },
    NotQuoted,
    Unterminated,
    /// Offset into the compacted output where the bad sequence starts.
    NotUtf8 { at: usize },
}

impl fmt::Display for EscapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscapeError::Dangling => write!(f, "dangling backslash"),
            EscapeError::BadHex { at } => write!(f, "bad \\x escape at byte {at}"),
            EscapeError::EmbeddedNul { at } => write!(f, "embedded NUL at byte {at}"),
            EscapeError::NotQuoted => write!(f, "expected a quoted string"),
            EscapeError::Unterminated => write!(f, "unterminated quoted string"),
            EscapeError::NotUtf8 { at } => write!(f, "invalid UTF-8 at byte {at}"),
        }
    }
}

impl std::error::Error for EscapeError {}

/// Expands backslash escapes in `raw` and validates the result as UTF-8.
pub fn validate_and_compact(raw: &[u8]) -> Result<Vec<u8>, EscapeError> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let c = raw[i];
        i += 1;
        if c != b'\\' {
            out.push(c);
            continue;
        }
        let Some(&e) = raw.get(i) else {
            return Err(EscapeError::Dangling);
        };
        i += 1;
        let byte = match e {
            b't' => b'\t',
            b'n' => b'\n',
            b'r' => b'\r',
            b'f' => 0x0c,
            b'b' => 0x08,
            b'a' => 0x07,
            b'v' => 0x0b,
            b'0'..=b'7' => {
                let mut value = e - b'0';
                let mut digits = 1;
                while digits < 3 {
                    let Some(&d @ b'0'..=b'7') = raw.get(i) else {
                        break;
                    };
                    // a third digit would push the byte past 0o377
                    if digits == 2 && value > 0o37 {
                        break;
                    }
                    value = value * 8 + (d - b'0');
                    digits += 1;
                    i += 1;
                }
                value
            }
            b'x' => {
                let start = i - 2;
                let mut value: u8 = 0;
                let mut digits = 0;
                while digits < 2 {
                    let Some(d) = raw.get(i).and_then(|&d| (d as char).to_digit(16)) else {
                        break;
                    };
                    value = value * 16 + d as u8;
                    digits += 1;
                    i += 1;
                }
                if digits == 0 {
                    return Err(EscapeError::BadHex { at: start });
                }
                value
            }
            other => other,
        };
        if byte == 0 {
            return Err(EscapeError::EmbeddedNul { at: out.len() });
        }
        out.push(byte);
    }
    if let Some(at) = out.iter().position(|&b| b == 0) {
        return Err(EscapeError::EmbeddedNul { at });
    }
    check_utf8(&out)?;
    Ok(out)
}

/// Parses `"…"` at the front of `text` (after optional whitespace).
pub fn parse_quoted(text: &str) -> Result<(Vec<u8>, usize), EscapeError> {
    let bytes = text.as_bytes();
    let start = bytes
        .iter()
        .position(|c| !c.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    if bytes.get(start) != Some(&b'"') {
        return Err(EscapeError::NotQuoted);
    }
    let mut j = start + 1;
    loop {
        match bytes.get(j) {
            None => return Err(EscapeError::Unterminated),
            Some(b'\\') => j += 2,
            Some(b'"') => break,
            Some(_) => j += 1,
        }
    }
    let value = validate_and_compact(&bytes[start + 1..j])?;
    Ok((value, j + 1))
}

// Per-length masks: at least one of these bits must be set for the shortest encoding.
const SHORTEST_FORM: [(u8, u8); 3] = [(0x1e, 0x00), (0x0f, 0x20), (0x07, 0x30)];

fn check_utf8(bytes: &[u8]) -> Result<(), EscapeError> {
    let mut i = 0;
    while i < bytes.len() {
        let lead = bytes[i];
        let len = match lead {
            0x00..=0x7f => {
                i += 1;
                continue;
            }
            0xc0..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf7 => 4,
            _ => return Err(EscapeError::NotUtf8 { at: i }),
        };
        let Some(seq) = bytes.get(i..i + len) else {
            return Err(EscapeError::NotUtf8 { at: i });
        };
        if seq[1..].iter().any(|&b| b & 0xc0 != 0x80) {
            return Err(EscapeError::NotUtf8 { at: i });
        }
        let (lead_mask, next_mask) = SHORTEST_FORM[len - 2];
        if lead & lead_mask == 0 && seq[1] & next_mask == 0 {
            return Err(EscapeError::NotUtf8 { at: i });
        }
        let mut code = u32::from(lead & (0x7f >> len));
        for &b in &seq[1..] {
            code = (code << 6) | u32::from(b & 0x3f);
        }
        if code > 0x10ffff || (0xd800..=0xdfff).contains(&code) {
            return Err(EscapeError::NotUtf8 { at: i });
        }
        i += len;
    }
    Ok(())
}

/// Output length of [`escape`] for the same arguments.
pub fn escaped_len(
    value: &[u8],
    sep1: &[u8],
    sep2: &[u8],
    quote: Option<u8>,
    ascii_only: bool,
) -> usize {
    let mut len = 0;
    walk_escaped(value, sep1, sep2, quote, ascii_only, |piece| len += piece.len());
    len
}

pub fn escape(
    value: &[u8],
    sep1: &[u8],
    sep2: &[u8],
    quote: Option<u8>,
    ascii_only: bool,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(escaped_len(value, sep1, sep2, quote, ascii_only));
    walk_escaped(value, sep1, sep2, quote, ascii_only, |piece| {
        out.extend_from_slice(piece)
    });
    out
}

fn walk_escaped(
    value: &[u8],
    sep1: &[u8],
    sep2: &[u8],
    quote: Option<u8>,
    ascii_only: bool,
    mut emit: impl FnMut(&[u8]),
) {
    let mut i = 0;
    while i < value.len() {
        let rest = &value[i..];
        if let Some(sep) = [sep1, sep2]
            .into_iter()
            .find(|sep| !sep.is_empty() && rest.starts_with(sep))
        {
            for &b in sep {
                emit(&[b'\\', b]);
            }
            i += sep.len();
            continue;
        }
        let c = value[i];
        match c {
            b'\\' => emit(b"\\\\"),
            _ if Some(c) == quote => emit(&[b'\\', c]),
            b'\t' => emit(b"\\t"),
            b'\n' => emit(b"\\n"),
            b'\r' => emit(b"\\r"),
            0x0c => emit(b"\\f"),
            0x00..=0x1f | 0x7f => emit(&octal(c)),
            0x80..=0xff if ascii_only => emit(&octal(c)),
            0xc2 if value.get(i + 1).is_some_and(|n| (0x80..=0x9f).contains(n)) => {
                emit(&octal(c));
                emit(&octal(value[i + 1]));
                i += 1;
            }
            _ => emit(&[c]),
        }
        i += 1;
    }
}

fn octal(c: u8) -> [u8; 4] {
    [b'\\', b'0' + (c >> 6), b'0' + ((c >> 3) & 7), b'0' + (c & 7)]
}

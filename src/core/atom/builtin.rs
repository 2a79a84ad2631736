// Built-in value kinds; order here defines their ids.
use crate::core::atom::{Atom, AtomError, AtomHooks, AtomId, AtomWidth};
use crate::core::escape;
use crate::core::numeric::{self, IntWidth, NIL_TEXT};
use crate::core::strheap::STR_NIL;

pub const VOID: AtomId = AtomId(0);
pub const BIT: AtomId = AtomId(1);
pub const BTE: AtomId = AtomId(2);
pub const SHT: AtomId = AtomId(3);
pub const INT: AtomId = AtomId(4);
pub const OID: AtomId = AtomId(5);
pub const FLT: AtomId = AtomId(6);
pub const DBL: AtomId = AtomId(7);
pub const LNG: AtomId = AtomId(8);
pub const HGE: AtomId = AtomId(9);
pub const UUID: AtomId = AtomId(10);
pub const STR: AtomId = AtomId(11);

pub const OID_NIL: u64 = 1 << 63;

const BIT_NIL: [u8; 1] = [0x80];
const OID_NIL_BYTES: [u8; 8] = OID_NIL.to_le_bytes();
const FLT_NIL: [u8; 4] = f32::NAN.to_le_bytes();
const DBL_NIL: [u8; 8] = f64::NAN.to_le_bytes();
const UUID_NIL: [u8; 16] = [0; 16];

pub(crate) fn builtin_atoms() -> Vec<Box<dyn Atom>> {
    vec![
        Box::new(VoidAtom),
        Box::new(BitAtom),
        Box::new(IntAtom::new("bte", IntWidth::Bte)),
        Box::new(IntAtom::new("sht", IntWidth::Sht)),
        Box::new(IntAtom::new("int", IntWidth::Int)),
        Box::new(OidAtom),
        Box::new(FloatAtom { double: false }),
        Box::new(FloatAtom { double: true }),
        Box::new(IntAtom::new("lng", IntWidth::Lng)),
        Box::new(IntAtom::new("hge", IntWidth::Hge)),
        Box::new(UuidAtom),
        Box::new(StrAtom),
    ]
}

fn skip_ws(bytes: &[u8], mut pos: usize) -> usize {
    while bytes.get(pos).is_some_and(u8::is_ascii_whitespace) {
        pos += 1;
    }
    pos
}

// `nil` as a whole word at `pos`; returns the end position including trailing whitespace.
fn nil_at(bytes: &[u8], pos: usize) -> Option<usize> {
    let end = pos + NIL_TEXT.len();
    let word = bytes.get(pos..end)?;
    if word != NIL_TEXT.as_bytes() || bytes.get(end).is_some_and(u8::is_ascii_alphanumeric) {
        return None;
    }
    Some(skip_ws(bytes, end))
}

fn exact<const N: usize>(bytes: &[u8]) -> Result<[u8; N], AtomError> {
    bytes.try_into().map_err(|_| AtomError::Length {
        expected: N,
        actual: bytes.len(),
    })
}

/// Dense row-id sequences; values live only in the column's seqbase.
struct VoidAtom;

impl Atom for VoidAtom {
    fn name(&self) -> &str {
        "void"
    }

    fn width(&self) -> AtomWidth {
        AtomWidth::Fixed(0)
    }

    fn nil(&self) -> &[u8] {
        &[]
    }

    fn parse(&self, text: &str) -> Result<(Vec<u8>, usize), AtomError> {
        let bytes = text.as_bytes();
        let start = skip_ws(bytes, 0);
        let consumed = nil_at(bytes, start).ok_or(AtomError::Syntax { consumed: start })?;
        Ok((Vec::new(), consumed))
    }

    fn format(&self, bytes: &[u8]) -> Result<String, AtomError> {
        exact::<0>(bytes)?;
        Ok(NIL_TEXT.to_string())
    }
}

struct BitAtom;

impl Atom for BitAtom {
    fn name(&self) -> &str {
        "bit"
    }

    fn width(&self) -> AtomWidth {
        AtomWidth::Fixed(1)
    }

    fn nil(&self) -> &[u8] {
        &BIT_NIL
    }

    fn parse(&self, text: &str) -> Result<(Vec<u8>, usize), AtomError> {
        let bytes = text.as_bytes();
        let start = skip_ws(bytes, 0);
        if let Some(consumed) = nil_at(bytes, start) {
            return Ok((BIT_NIL.to_vec(), consumed));
        }
        let rest = &bytes[start..];
        let (value, len) = if rest.starts_with(b"true") {
            (1u8, 4)
        } else if rest.starts_with(b"false") {
            (0u8, 5)
        } else if rest.starts_with(b"1") {
            (1u8, 1)
        } else if rest.starts_with(b"0") {
            (0u8, 1)
        } else {
            return Err(AtomError::Syntax { consumed: start });
        };
        if bytes.get(start + len).is_some_and(u8::is_ascii_alphanumeric) {
            return Err(AtomError::Syntax {
                consumed: start + len,
            });
        }
        Ok((vec![value], skip_ws(bytes, start + len)))
    }

    fn format(&self, bytes: &[u8]) -> Result<String, AtomError> {
        let [value] = exact::<1>(bytes)?;
        Ok(match value {
            0x80 => NIL_TEXT,
            0 => "false",
            _ => "true",
        }
        .to_string())
    }
}

struct IntAtom {
    name: &'static str,
    width: IntWidth,
    nil: [u8; 16],
}

impl IntAtom {
    fn new(name: &'static str, width: IntWidth) -> Self {
        let full = width.nil().to_le_bytes();
        let mut nil = [0u8; 16];
        nil[..width.bytes()].copy_from_slice(&full[..width.bytes()]);
        Self { name, width, nil }
    }
}

impl Atom for IntAtom {
    fn name(&self) -> &str {
        self.name
    }

    fn width(&self) -> AtomWidth {
        AtomWidth::Fixed(self.width.bytes() as u8)
    }

    fn nil(&self) -> &[u8] {
        &self.nil[..self.width.bytes()]
    }

    fn parse(&self, text: &str) -> Result<(Vec<u8>, usize), AtomError> {
        let parsed = numeric::parse_int(text, self.width)?;
        let bytes = numeric::encode_int(parsed.value, self.width).map_err(|_| {
            AtomError::Overflow {
                consumed: parsed.consumed,
            }
        })?;
        Ok((bytes, parsed.consumed))
    }

    fn format(&self, bytes: &[u8]) -> Result<String, AtomError> {
        let value = numeric::decode_int(bytes, self.width)?;
        Ok(numeric::format_int(value, self.width))
    }
}

/// Row identifiers, printed as `N@0`.
struct OidAtom;

impl Atom for OidAtom {
    fn name(&self) -> &str {
        "oid"
    }

    fn width(&self) -> AtomWidth {
        AtomWidth::Fixed(8)
    }

    fn nil(&self) -> &[u8] {
        &OID_NIL_BYTES
    }

    fn parse(&self, text: &str) -> Result<(Vec<u8>, usize), AtomError> {
        let parsed = numeric::parse_int(text, IntWidth::Lng)?;
        let Some(value) = parsed.value else {
            return Ok((OID_NIL_BYTES.to_vec(), parsed.consumed));
        };
        if value < 0 {
            return Err(AtomError::Syntax {
                consumed: parsed.consumed,
            });
        }
        // the `@0` suffix must touch the digits
        let digits_end = text[..parsed.consumed].trim_end().len();
        let mut consumed = parsed.consumed;
        if text.as_bytes()[digits_end..].starts_with(b"@0") {
            consumed = skip_ws(text.as_bytes(), digits_end + 2);
        }
        Ok(((value as u64).to_le_bytes().to_vec(), consumed))
    }

    fn format(&self, bytes: &[u8]) -> Result<String, AtomError> {
        let value = u64::from_le_bytes(exact::<8>(bytes)?);
        if value == OID_NIL {
            return Ok(NIL_TEXT.to_string());
        }
        Ok(format!("{value}@0"))
    }
}

struct FloatAtom {
    double: bool,
}

impl FloatAtom {
    fn token_end(bytes: &[u8], start: usize) -> usize {
        let mut pos = start;
        if matches!(bytes.get(pos), Some(b'+' | b'-')) {
            pos += 1;
        }
        while bytes.get(pos).is_some_and(|c| c.is_ascii_digit() || *c == b'.') {
            pos += 1;
        }
        if matches!(bytes.get(pos), Some(b'e' | b'E')) {
            let mut exp = pos + 1;
            if matches!(bytes.get(exp), Some(b'+' | b'-')) {
                exp += 1;
            }
            if bytes.get(exp).is_some_and(u8::is_ascii_digit) {
                pos = exp;
                while bytes.get(pos).is_some_and(u8::is_ascii_digit) {
                    pos += 1;
                }
            }
        }
        pos
    }
}

impl Atom for FloatAtom {
    fn name(&self) -> &str {
        if self.double { "dbl" } else { "flt" }
    }

    fn width(&self) -> AtomWidth {
        AtomWidth::Fixed(if self.double { 8 } else { 4 })
    }

    fn nil(&self) -> &[u8] {
        if self.double { &DBL_NIL } else { &FLT_NIL }
    }

    fn parse(&self, text: &str) -> Result<(Vec<u8>, usize), AtomError> {
        let bytes = text.as_bytes();
        let start = skip_ws(bytes, 0);
        if let Some(consumed) = nil_at(bytes, start) {
            return Ok((self.nil().to_vec(), consumed));
        }
        let end = Self::token_end(bytes, start);
        let value: f64 = text[start..end]
            .parse()
            .map_err(|_| AtomError::Syntax { consumed: start })?;
        let consumed = skip_ws(bytes, end);
        if !value.is_finite() {
            return Err(AtomError::Overflow { consumed });
        }
        if self.double {
            return Ok((value.to_le_bytes().to_vec(), consumed));
        }
        let narrow = value as f32;
        if !narrow.is_finite() {
            return Err(AtomError::Overflow { consumed });
        }
        Ok((narrow.to_le_bytes().to_vec(), consumed))
    }

    fn format(&self, bytes: &[u8]) -> Result<String, AtomError> {
        let value = if self.double {
            f64::from_le_bytes(exact::<8>(bytes)?)
        } else {
            f64::from(f32::from_le_bytes(exact::<4>(bytes)?))
        };
        if value.is_nan() {
            return Ok(NIL_TEXT.to_string());
        }
        if self.double {
            Ok(format!("{value}"))
        } else {
            Ok(format!("{}", value as f32))
        }
    }
}

struct UuidAtom;

const UUID_GROUPS: [usize; 5] = [4, 2, 2, 2, 6];

impl Atom for UuidAtom {
    fn name(&self) -> &str {
        "uuid"
    }

    fn width(&self) -> AtomWidth {
        AtomWidth::Fixed(16)
    }

    fn nil(&self) -> &[u8] {
        &UUID_NIL
    }

    fn parse(&self, text: &str) -> Result<(Vec<u8>, usize), AtomError> {
        let bytes = text.as_bytes();
        let start = skip_ws(bytes, 0);
        if let Some(consumed) = nil_at(bytes, start) {
            return Ok((UUID_NIL.to_vec(), consumed));
        }
        let mut out = Vec::with_capacity(16);
        let mut pos = start;
        for (group, &len) in UUID_GROUPS.iter().enumerate() {
            if group > 0 {
                if bytes.get(pos) != Some(&b'-') {
                    return Err(AtomError::Syntax { consumed: pos });
                }
                pos += 1;
            }
            for _ in 0..len {
                let hi = hex_digit(bytes, pos)?;
                let lo = hex_digit(bytes, pos + 1)?;
                out.push(hi << 4 | lo);
                pos += 2;
            }
        }
        if bytes.get(pos).is_some_and(u8::is_ascii_hexdigit) {
            return Err(AtomError::Syntax { consumed: pos });
        }
        Ok((out, skip_ws(bytes, pos)))
    }

    fn format(&self, bytes: &[u8]) -> Result<String, AtomError> {
        let raw = exact::<16>(bytes)?;
        if raw == UUID_NIL {
            return Ok(NIL_TEXT.to_string());
        }
        let mut out = String::with_capacity(36);
        let mut index = 0;
        for (group, &len) in UUID_GROUPS.iter().enumerate() {
            if group > 0 {
                out.push('-');
            }
            for byte in &raw[index..index + len] {
                out.push_str(&format!("{byte:02x}"));
            }
            index += len;
        }
        Ok(out)
    }
}

fn hex_digit(bytes: &[u8], pos: usize) -> Result<u8, AtomError> {
    bytes
        .get(pos)
        .and_then(|&c| (c as char).to_digit(16))
        .map(|d| d as u8)
        .ok_or(AtomError::Syntax { consumed: pos })
}

/// Variable-length UTF-8 strings stored in a string heap.
struct StrAtom;

fn str_element_length(bytes: &[u8]) -> usize {
    bytes.len() + 1
}

impl Atom for StrAtom {
    fn name(&self) -> &str {
        "str"
    }

    fn width(&self) -> AtomWidth {
        AtomWidth::Var
    }

    fn nil(&self) -> &[u8] {
        STR_NIL
    }

    fn parse(&self, text: &str) -> Result<(Vec<u8>, usize), AtomError> {
        let bytes = text.as_bytes();
        let start = skip_ws(bytes, 0);
        if let Some(consumed) = nil_at(bytes, start) {
            return Ok((STR_NIL.to_vec(), consumed));
        }
        let (value, end) = escape::parse_quoted(text)?;
        Ok((value, skip_ws(bytes, end)))
    }

    fn format(&self, bytes: &[u8]) -> Result<String, AtomError> {
        if bytes == STR_NIL {
            return Ok(NIL_TEXT.to_string());
        }
        let mut out = Vec::with_capacity(escape::escaped_len(bytes, b"", b"", Some(b'"'), false) + 2);
        out.push(b'"');
        out.extend_from_slice(&escape::escape(bytes, b"", b"", Some(b'"'), false));
        out.push(b'"');
        String::from_utf8(out).map_err(|err| AtomError::NotUtf8 {
            at: err.utf8_error().valid_up_to(),
        })
    }

    fn hooks(&self) -> AtomHooks {
        AtomHooks {
            element_length: Some(str_element_length),
            ..AtomHooks::default()
        }
    }
}

//! Purpose: Overflow-checked text <-> integer conversion for the fixed-width integer kinds.
//! Exports: `IntWidth`, `Parsed`, `NumError`, `parse_int`, `parse_int_exact`, `format_int`,
//! `format_lng`, `format_hge`, `decode_int`, `encode_int`.
//! Role: Leaf codec used by the built-in atoms (`bte`, `sht`, `int`, `lng`, `hge`, `oid`).
//! Invariants: Accumulation never wraps; overflow is reported, never truncated.
//! Invariants: The minimum value of each width is its nil pattern and never parses from digits.
use std::fmt;

pub const NIL_TEXT: &str = "nil";

const MAX_EXP: usize = 39;
const HGE_SPLIT: i128 = 1_000_000_000_000_000_000;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IntWidth {
    Bte,
    Sht,
    Int,
    Lng,
    Hge,
}

impl IntWidth {
    pub fn bytes(self) -> usize {
        match self {
            IntWidth::Bte => 1,
            IntWidth::Sht => 2,
            IntWidth::Int => 4,
            IntWidth::Lng => 8,
            IntWidth::Hge => 16,
        }
    }

    pub fn from_bytes(bytes: usize) -> Option<Self> {
        match bytes {
            1 => Some(IntWidth::Bte),
            2 => Some(IntWidth::Sht),
            4 => Some(IntWidth::Int),
            8 => Some(IntWidth::Lng),
            16 => Some(IntWidth::Hge),
            _ => None,
        }
    }

    /// Largest magnitude representable for either sign.
    pub fn max(self) -> i128 {
        self.limits()[0].max_mantissa as i128
    }

    pub fn nil(self) -> i128 {
        -self.max() - 1
    }

    fn limits(self) -> &'static [ExpLimit; MAX_EXP] {
        match self {
            IntWidth::Bte => &BTE_LIMITS,
            IntWidth::Sht => &SHT_LIMITS,
            IntWidth::Int => &INT_LIMITS,
            IntWidth::Lng => &LNG_LIMITS,
            IntWidth::Hge => &HGE_LIMITS,
        }
    }
}

// Entry k: the largest mantissa that survives a trailing `E<k>` and the 10^k it is scaled by.
#[derive(Clone, Copy, Debug)]
struct ExpLimit {
    max_mantissa: u128,
    scale: u128,
}

const fn exp_limits(max: u128) -> [ExpLimit; MAX_EXP] {
    let mut out = [ExpLimit {
        max_mantissa: 0,
        scale: 0,
    }; MAX_EXP];
    let mut scale: u128 = 1;
    let mut k = 0;
    while k < MAX_EXP {
        out[k] = ExpLimit {
            max_mantissa: max / scale,
            scale,
        };
        if k + 1 < MAX_EXP {
            scale *= 10;
        }
        k += 1;
    }
    out
}

static BTE_LIMITS: [ExpLimit; MAX_EXP] = exp_limits(i8::MAX as u128);
static SHT_LIMITS: [ExpLimit; MAX_EXP] = exp_limits(i16::MAX as u128);
static INT_LIMITS: [ExpLimit; MAX_EXP] = exp_limits(i32::MAX as u128);
static LNG_LIMITS: [ExpLimit; MAX_EXP] = exp_limits(i64::MAX as u128);
static HGE_LIMITS: [ExpLimit; MAX_EXP] = exp_limits(i128::MAX as u128);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Parsed {
    /// `None` is the nil pattern.
    pub value: Option<i128>,
    pub consumed: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NumError {
    Syntax { consumed: usize },
    Overflow { consumed: usize },
    Length { expected: usize, actual: usize },
}

impl fmt::Display for NumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumError::Syntax { consumed } => write!(f, "not a number (at byte {consumed})"),
            NumError::Overflow { consumed } => {
                write!(f, "numeric overflow (token ends at byte {consumed})")
            }
            NumError::Length { expected, actual } => {
                write!(f, "expected {expected} value bytes, found {actual}")
            }
        }
    }
}

impl std::error::Error for NumError {}

/// Parses `[ws] (nil | [sign] digits [E digits] [LL]) [ws]` from the front of `text`.
pub fn parse_int(text: &str, width: IntWidth) -> Result<Parsed, NumError> {
    let bytes = text.as_bytes();
    let mut pos = skip_ws(bytes, 0);

    if bytes[pos..].starts_with(NIL_TEXT.as_bytes())
        && !bytes
            .get(pos + NIL_TEXT.len())
            .is_some_and(|c| c.is_ascii_alphanumeric())
    {
        let consumed = skip_ws(bytes, pos + NIL_TEXT.len());
        return Ok(Parsed {
            value: None,
            consumed,
        });
    }

    let mut negative = false;
    match bytes.get(pos) {
        Some(b'-') => {
            negative = true;
            pos += 1;
        }
        Some(b'+') => pos += 1,
        _ => {}
    }
    if !bytes.get(pos).is_some_and(u8::is_ascii_digit) {
        return Err(NumError::Syntax { consumed: pos });
    }

    let limits = width.limits();
    let max = limits[0].max_mantissa;
    let mut base: u128 = 0;
    let mut overflow = false;
    while let Some(&c) = bytes.get(pos) {
        if !c.is_ascii_digit() {
            break;
        }
        let digit = u128::from(c - b'0');
        if !overflow {
            if base > (max - digit) / 10 {
                overflow = true;
            } else {
                base = base * 10 + digit;
            }
        }
        pos += 1;
    }

    if matches!(bytes.get(pos), Some(b'e' | b'E'))
        && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)
    {
        pos += 1;
        let mut exp: usize = 0;
        while let Some(&c) = bytes.get(pos) {
            if !c.is_ascii_digit() {
                break;
            }
            exp = exp.saturating_mul(10).saturating_add(usize::from(c - b'0'));
            pos += 1;
        }
        if !overflow && base != 0 {
            match limits.get(exp) {
                Some(limit) if base <= limit.max_mantissa => base *= limit.scale,
                _ => overflow = true,
            }
        }
    }

    if bytes[pos..].starts_with(b"LL") {
        pos += 2;
    }
    pos = skip_ws(bytes, pos);

    if overflow {
        return Err(NumError::Overflow { consumed: pos });
    }
    let magnitude = base as i128;
    Ok(Parsed {
        value: Some(if negative { -magnitude } else { magnitude }),
        consumed: pos,
    })
}

/// Like [`parse_int`] but the whole of `text` must be one token.
pub fn parse_int_exact(text: &str, width: IntWidth) -> Result<Option<i128>, NumError> {
    let parsed = parse_int(text, width)?;
    if parsed.consumed != text.len() {
        return Err(NumError::Syntax {
            consumed: parsed.consumed,
        });
    }
    Ok(parsed.value)
}

pub fn format_int(value: Option<i128>, width: IntWidth) -> String {
    match value {
        None => NIL_TEXT.to_string(),
        Some(v) if v == width.nil() => NIL_TEXT.to_string(),
        Some(v) if width == IntWidth::Hge => format_hge(v),
        Some(v) => format_lng(v as i64),
    }
}

pub fn format_lng(value: i64) -> String {
    if value == i64::MIN {
        return NIL_TEXT.to_string();
    }
    value.to_string()
}

/// Values outside the 8-byte range print as the high part followed by 18 zero-padded digits.
pub fn format_hge(value: i128) -> String {
    if value == i128::MIN {
        return NIL_TEXT.to_string();
    }
    if value > i128::from(i64::MIN) && value <= i128::from(i64::MAX) {
        return format_lng(value as i64);
    }
    let high = value / HGE_SPLIT;
    let low = (value % HGE_SPLIT).unsigned_abs();
    format!("{}{low:018}", format_hge(high))
}

pub fn decode_int(bytes: &[u8], width: IntWidth) -> Result<Option<i128>, NumError> {
    if bytes.len() != width.bytes() {
        return Err(NumError::Length {
            expected: width.bytes(),
            actual: bytes.len(),
        });
    }
    let value = match width {
        IntWidth::Bte => i128::from(bytes[0] as i8),
        IntWidth::Sht => i128::from(i16::from_le_bytes([bytes[0], bytes[1]])),
        IntWidth::Int => i128::from(i32::from_le_bytes(read_array(bytes))),
        IntWidth::Lng => i128::from(i64::from_le_bytes(read_array(bytes))),
        IntWidth::Hge => i128::from_le_bytes(read_array(bytes)),
    };
    if value == width.nil() {
        return Ok(None);
    }
    Ok(Some(value))
}

pub fn encode_int(value: Option<i128>, width: IntWidth) -> Result<Vec<u8>, NumError> {
    let value = value.unwrap_or(width.nil());
    if value < width.nil() || value > width.max() {
        return Err(NumError::Overflow { consumed: 0 });
    }
    let full = value.to_le_bytes();
    Ok(full[..width.bytes()].to_vec())
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

fn skip_ws(bytes: &[u8], mut pos: usize) -> usize {
    while bytes.get(pos).is_some_and(u8::is_ascii_whitespace) {
        pos += 1;
    }
    pos
}

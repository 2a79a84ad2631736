//! Purpose: Offset-indexed storage for variable-length string values with small-heap dedup.
//! Exports: `StringHeap`, `StrHeapRef`, `str_hash`, `decode_var_offset`, `encode_var_offset`,
//! layout constants (`STR_HASH_SIZE`, `ELIM_LIMIT`, `STR_NIL`).
//! Role: Byte layout of `.theap` files; the pool reads them through `StrHeapRef`.
//! Invariants: Offset 0 is never a value; it means "not found".
//! Invariants: Only values placed while the heap is under `ELIM_LIMIT` are chained for dedup.
use bstr::ByteSlice;

use crate::core::error::{Error, ErrorKind};

pub const STR_HASH_TABLE: usize = 1 << 10;
pub const STR_HASH_SIZE: usize = STR_HASH_TABLE * 8;
pub const ELIM_LIMIT: usize = 64 * 1024;
pub const STR_NIL: &[u8] = &[0x80];

const VAR_ALIGN: usize = 8;
const VAR_SHIFT: u32 = 3;
const WORD: usize = 8;

/// FNV-1a over the value bytes.
pub fn str_hash(value: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in value {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Maps a tail slot of `width` bytes to a heap offset.
pub fn decode_var_offset(raw: u64, width: usize) -> u64 {
    match width {
        1 | 2 => (raw << VAR_SHIFT) + STR_HASH_SIZE as u64,
        _ => raw,
    }
}

pub fn encode_var_offset(offset: u64, width: usize) -> Option<u64> {
    match width {
        1 | 2 => {
            let rel = offset.checked_sub(STR_HASH_SIZE as u64)?;
            if rel % VAR_ALIGN as u64 != 0 {
                return None;
            }
            let raw = rel >> VAR_SHIFT;
            let limit = if width == 1 { u64::from(u8::MAX) } else { u64::from(u16::MAX) };
            (raw <= limit).then_some(raw)
        }
        4 if offset > u64::from(u32::MAX) => None,
        _ => Some(offset),
    }
}

#[derive(Clone, Copy, Debug)]
pub struct StrHeapRef<'a> {
    bytes: &'a [u8],
    hashash: bool,
}

impl<'a> StrHeapRef<'a> {
    pub fn new(bytes: &'a [u8], hashash: bool) -> Result<Self, Error> {
        if !bytes.is_empty() && bytes.len() < STR_HASH_SIZE {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("string heap smaller than its bucket table"));
        }
        Ok(Self { bytes, hashash })
    }

    pub fn free(&self) -> usize {
        self.bytes.len()
    }

    pub fn hashash(&self) -> bool {
        self.hashash
    }

    /// Offset of an existing copy of `value`, or 0.
    pub fn locate(&self, value: &[u8]) -> u64 {
        if self.bytes.len() >= ELIM_LIMIT || self.bytes.len() < STR_HASH_SIZE {
            return 0;
        }
        let bucket = bucket_of(value);
        let mut pos = read_word(self.bytes, bucket * WORD).unwrap_or(0);
        while pos != 0 {
            if self.get(pos).is_ok_and(|stored| stored == value) {
                return pos;
            }
            let Some(link) = self
                .link_offset(pos)
                .and_then(|at| read_word(self.bytes, at))
            else {
                return 0;
            };
            // chains only ever point backwards
            if link >= pos {
                return 0;
            }
            pos = link;
        }
        0
    }

    pub fn get(&self, offset: u64) -> Result<&'a [u8], Error> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        if start < STR_HASH_SIZE || start >= self.bytes.len() {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!("string offset {offset} outside heap of {} bytes", self.bytes.len())));
        }
        let tail = &self.bytes[start..];
        let end = tail.find_byte(0).ok_or_else(|| {
            Error::new(ErrorKind::Corrupt)
                .with_message(format!("string at offset {offset} is not terminated"))
        })?;
        Ok(&tail[..end])
    }

    /// The hash word stored ahead of the value when the heap keeps them.
    pub fn stored_hash(&self, offset: u64) -> Option<u64> {
        if !self.hashash {
            return None;
        }
        let at = usize::try_from(offset).ok()?.checked_sub(WORD)?;
        read_word(self.bytes, at)
    }

    fn link_offset(&self, pos: u64) -> Option<usize> {
        let extra = if self.hashash { 2 * WORD } else { WORD };
        usize::try_from(pos).ok()?.checked_sub(extra)
    }
}

/// Growable string heap; the in-memory counterpart of a `.theap` file.
#[derive(Clone, Debug)]
pub struct StringHeap {
    bytes: Vec<u8>,
    hashash: bool,
}

impl StringHeap {
    pub fn new(hashash: bool) -> Self {
        Self {
            bytes: vec![0u8; STR_HASH_SIZE],
            hashash,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>, hashash: bool) -> Result<Self, Error> {
        if bytes.len() < STR_HASH_SIZE {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("string heap smaller than its bucket table"));
        }
        Ok(Self { bytes, hashash })
    }

    pub fn as_heap_ref(&self) -> StrHeapRef<'_> {
        StrHeapRef {
            bytes: &self.bytes,
            hashash: self.hashash,
        }
    }

    pub fn free(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn locate(&self, value: &[u8]) -> u64 {
        self.as_heap_ref().locate(value)
    }

    pub fn get(&self, offset: u64) -> Result<&[u8], Error> {
        self.as_heap_ref().get(offset)
    }

    /// Stores `value` and returns its offset, reusing an existing copy when one is found.
    pub fn put(&mut self, value: &[u8]) -> Result<u64, Error> {
        if value.contains(&0) {
            return Err(Error::new(ErrorKind::Usage).with_message("string values cannot contain NUL"));
        }
        let found = self.locate(value);
        if found != 0 {
            return Ok(found);
        }

        let hash = str_hash(value);
        let bucket = bucket_of(value);
        let linked = self.bytes.len() < ELIM_LIMIT;
        let padded = self.bytes.len().next_multiple_of(VAR_ALIGN);
        let needed = (padded - self.bytes.len())
            + if linked { WORD } else { 0 }
            + if self.hashash { WORD } else { 0 }
            + value.len()
            + 1;
        self.bytes.try_reserve(needed).map_err(|err| {
            Error::new(ErrorKind::Capacity)
                .with_message("string heap allocation failed")
                .with_source(err)
        })?;
        self.bytes.resize(padded, 0);

        if linked {
            let head = read_word(&self.bytes, bucket * WORD).unwrap_or(0);
            self.bytes.extend_from_slice(&head.to_le_bytes());
        }
        if self.hashash {
            self.bytes.extend_from_slice(&hash.to_le_bytes());
        }
        let offset = self.bytes.len() as u64;
        self.bytes.extend_from_slice(value);
        self.bytes.push(0);
        if linked {
            write_word(&mut self.bytes, bucket * WORD, offset);
        }
        Ok(offset)
    }
}

impl Default for StringHeap {
    fn default() -> Self {
        Self::new(false)
    }
}

fn bucket_of(value: &[u8]) -> usize {
    (str_hash(value) as usize) & (STR_HASH_TABLE - 1)
}

fn read_word(bytes: &[u8], offset: usize) -> Option<u64> {
    let raw = bytes.get(offset..offset.checked_add(WORD)?)?;
    let mut out = [0u8; WORD];
    out.copy_from_slice(raw);
    Some(u64::from_le_bytes(out))
}

fn write_word(bytes: &mut [u8], offset: usize, value: u64) {
    bytes[offset..offset + WORD].copy_from_slice(&value.to_le_bytes());
}

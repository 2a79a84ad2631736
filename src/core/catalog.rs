//! Purpose: Parse the versioned catalog (`BBP.dir`) into column descriptors.
//! Exports: `Catalog`, `parse_catalog`, `read_catalog`, `CATALOG_SIZE_PREFIX`, `TMP_NAME_PREFIX`.
//! Role: Runs once while a pool opens; every kind token is resolved through the atom registry.
//! Invariants: Any malformed line aborts the whole parse; no partial catalog is returned.
//! Invariants: Fields are consumed strictly left to right; each scanner reports bytes consumed.
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::core::atom::{AtomRegistry, AtomWidth};
use crate::core::column::{
    ColumnDescriptor, ColumnId, ColumnProperties, HeapDescriptor, StorageMode, Witnesses,
    PROPERTY_MASK,
};
use crate::core::error::{Error, ErrorKind};
use crate::core::farm::{io_error_kind, SharedLock};
use crate::core::format::{
    check_catalog_version, NativeWidths, CATALOG_VERSION_HEAD_FIELDS,
};

pub const CATALOG_MAGIC: &str = "BBP.dir, GDKversion ";
pub const CATALOG_SIZE_PREFIX: &str = "BBPsize=";
pub const TMP_NAME_PREFIX: &str = "tmp_";

#[derive(Debug)]
pub struct Catalog {
    pub version: u32,
    pub widths: NativeWidths,
    pub size_hint: Option<usize>,
    pub columns: Vec<ColumnDescriptor>,
}

/// Reads the catalog text under a shared advisory lock, normalizing `\r\n` to `\n`.
pub fn read_catalog(path: &Path, lock: bool) -> Result<String, Error> {
    let file = File::open(path)
        .map_err(|err| Error::new(io_error_kind(&err)).with_path(path).with_source(err))?;
    let _guard = if lock {
        Some(SharedLock::acquire(&file, path)?)
    } else {
        None
    };
    let mut text = String::new();
    (&file).read_to_string(&mut text).map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message("catalog is not readable text")
            .with_path(path)
            .with_source(err)
    })?;
    if text.contains("\r\n") {
        text = text.replace("\r\n", "\n");
    }
    Ok(text)
}

pub fn parse_catalog(text: &str, atoms: &mut AtomRegistry) -> Result<Catalog, Error> {
    let mut lines = text.lines().enumerate().map(|(index, line)| (index + 1, line));

    let (line_no, first) = lines
        .next()
        .ok_or_else(|| Error::new(ErrorKind::Corrupt).with_message("catalog is empty"))?;
    let version = parse_version_line(first).map_err(|err| err.with_line(line_no))?;
    check_catalog_version(version).map_err(|err| err.with_line(line_no))?;

    let (line_no, second) = lines.next().ok_or_else(|| {
        Error::new(ErrorKind::Corrupt).with_message("catalog is missing the native widths line")
    })?;
    let widths = parse_widths_line(second).map_err(|err| err.with_line(line_no))?;
    NativeWidths::running()
        .check(widths)
        .map_err(|err| err.with_line(line_no))?;

    let mut size_hint = None;
    let mut columns = Vec::new();
    let mut ids = HashSet::new();
    let mut names = HashMap::new();
    for (line_no, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        if columns.is_empty() && size_hint.is_none() {
            if let Some(rest) = line.strip_prefix(CATALOG_SIZE_PREFIX) {
                let (hint, _) = scan_u64(rest, "size hint").map_err(|err| err.with_line(line_no))?;
                size_hint = Some(usize::try_from(hint).unwrap_or(usize::MAX));
                continue;
            }
        }
        let column = parse_record(line, version, atoms).map_err(|err| err.with_line(line_no))?;
        if !ids.insert(column.id) {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("duplicate column id")
                .with_id(u64::from(column.id.0))
                .with_line(line_no));
        }
        if let Some(previous) = names.insert(column.name.clone(), column.id) {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!(
                    "duplicate column name {} (already used by column {previous})",
                    column.name
                ))
                .with_id(u64::from(column.id.0))
                .with_line(line_no));
        }
        columns.push(column);
    }

    Ok(Catalog {
        version,
        widths,
        size_hint,
        columns,
    })
}

fn parse_version_line(line: &str) -> Result<u32, Error> {
    let token = line
        .strip_prefix(CATALOG_MAGIC)
        .map(str::trim)
        .ok_or_else(|| Error::new(ErrorKind::Corrupt).with_message("not a catalog file"))?;
    u32::from_str_radix(token, 8).map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message(format!("bad catalog version {token:?}"))
            .with_source(err)
    })
}

fn parse_widths_line(line: &str) -> Result<NativeWidths, Error> {
    let mut fields = Fields::new(line);
    let ptr = fields.usize("pointer width")?;
    let oid = fields.usize("oid width")?;
    let max_int = fields.usize("max integer width")?;
    fields.expect_end()?;
    Ok(NativeWidths { ptr, oid, max_int })
}

fn parse_record(
    line: &str,
    version: u32,
    atoms: &mut AtomRegistry,
) -> Result<ColumnDescriptor, Error> {
    let mut fields = Fields::new(line);

    let raw_id = fields.u64("column id")?;
    let id = match u32::try_from(raw_id) {
        Ok(0) | Err(_) => {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!("column id {raw_id} out of range")));
        }
        Ok(id) => ColumnId(id),
    };
    let corrupt = |message: String| {
        Error::new(ErrorKind::Corrupt)
            .with_message(message)
            .with_id(raw_id)
    };

    let status = fields.u32("status")?;
    let name = fields.word("name")?;
    let name = if name.starts_with(TMP_NAME_PREFIX) {
        format!("{TMP_NAME_PREFIX}{:o}", id.0)
    } else {
        name.to_string()
    };
    let stem = fields.word("file stem")?.to_string();

    let bits = fields.u32("properties")?;
    let properties = ColumnProperties::from_bits(bits).map_err(|unknown| {
        corrupt(format!(
            "unknown property bits {unknown:#x} (mask {PROPERTY_MASK:#x}); library and data disagree"
        ))
    })?;
    let witnesses = Witnesses {
        nokey: [fields.u64("nokey0")?, fields.u64("nokey1")?],
        nosorted: fields.u64("nosorted")?,
        norevsorted: fields.u64("norevsorted")?,
    };
    let inserted = fields.u64("inserted")?;
    if inserted != 0 {
        return Err(corrupt(format!(
            "inserted count {inserted} is not zero; catalog holds an uncommitted write"
        )));
    }
    let count = fields.u64("count")?;
    let capacity = fields.u64("capacity")?;
    let seqbase = fields.u64("seqbase")?;

    if version == CATALOG_VERSION_HEAD_FIELDS {
        fields.word("head type")?;
        for what in ["head width", "head var", "head properties", "head free", "head size"] {
            fields.u64(what)?;
        }
    }

    let type_name = fields.word("type")?;
    let kind = atoms.lookup(type_name);
    let width = fields.usize("width")?;
    let var = match fields.u64("var flag")? {
        0 => false,
        1 => true,
        other => return Err(corrupt(format!("var flag {other} is not 0 or 1"))),
    };
    match atoms.width(kind) {
        Some(AtomWidth::Var) if !var => {
            return Err(corrupt(format!("{type_name} is variable-sized but the catalog says fixed")));
        }
        Some(AtomWidth::Fixed(_)) if var => {
            return Err(corrupt(format!("{type_name} is fixed-size but the catalog says variable")));
        }
        Some(AtomWidth::Fixed(bytes)) if usize::from(bytes) != width => {
            return Err(corrupt(format!(
                "{type_name} has width {bytes} but the catalog says {width}"
            )));
        }
        _ => {}
    }
    let width_ok = if var {
        matches!(width, 1 | 2 | 4 | 8)
    } else {
        matches!(width, 0 | 1 | 2 | 4 | 8 | 16)
    };
    if !width_ok {
        return Err(corrupt(format!("unsupported element width {width}")));
    }

    let flags = fields.u32("heap flags")?;
    let mut tail = parse_heap(&mut fields, true).map_err(|err| err.with_id(raw_id))?;
    tail.flags_from_bits(flags)
        .map_err(|unknown| corrupt(format!("unknown heap flags {unknown:#x}")))?;
    tail.parent = parent_field(&mut fields, "parent")?;
    tail.offset = fields.u64("offset")?;

    let needed = count
        .checked_mul(width as u64)
        .ok_or_else(|| corrupt(format!("count {count} overflows the heap size")))?;
    if needed > tail.free {
        return Err(corrupt(format!(
            "heap holds {} bytes but {count} elements of width {width} need {needed}",
            tail.free
        )));
    }

    let vheap = if var {
        let mut vheap = parse_heap(&mut fields, false).map_err(|err| err.with_id(raw_id))?;
        vheap.hashash = tail.hashash;
        vheap.parent = parent_field(&mut fields, "var parent")?;
        Some(vheap)
    } else {
        None
    };

    let options = fields.rest().to_string();
    Ok(ColumnDescriptor {
        id,
        name,
        stem,
        status,
        kind,
        width,
        var,
        count,
        capacity,
        properties,
        witnesses,
        seqbase,
        tail,
        vheap,
        options,
    })
}

// Heap flags live on the primary heap only; the var heap inherits `hashash` from it.
fn parse_heap(fields: &mut Fields<'_>, primary: bool) -> Result<HeapDescriptor, Error> {
    let label = if primary { "" } else { "var " };
    let free = fields.u64(if primary { "free" } else { "var free" })?;
    let size = fields.u64(if primary { "size" } else { "var size" })?;
    let code = fields.u64(if primary { "storage" } else { "var storage" })?;
    if free > size {
        return Err(Error::new(ErrorKind::Corrupt)
            .with_message(format!("{label}heap free {free} exceeds size {size}")));
    }
    let storage = StorageMode::from_code(code).ok_or_else(|| {
        Error::new(ErrorKind::Corrupt).with_message(format!("unknown {label}storage mode {code}"))
    })?;
    Ok(HeapDescriptor {
        free,
        size,
        storage,
        parent: None,
        offset: 0,
        hashash: false,
        shared_hash: false,
    })
}

fn parent_field(fields: &mut Fields<'_>, what: &'static str) -> Result<Option<ColumnId>, Error> {
    let raw = fields.u64(what)?;
    let parent = u32::try_from(raw).map_err(|_| {
        Error::new(ErrorKind::Corrupt).with_message(format!("{what} {raw} out of range"))
    })?;
    Ok((parent != 0).then_some(ColumnId(parent)))
}

/// Scans one whitespace-delimited token; returns it with the bytes consumed (leading space included).
fn scan_word(text: &str) -> Option<(&str, usize)> {
    let start = text.len() - text.trim_start().len();
    let rest = &text[start..];
    let len = rest.find(char::is_whitespace).unwrap_or(rest.len());
    if len == 0 {
        return None;
    }
    Some((&rest[..len], start + len))
}

fn scan_u64(text: &str, what: &'static str) -> Result<(u64, usize), Error> {
    let (token, consumed) = scan_word(text).ok_or_else(|| missing(what))?;
    let value = token.parse::<u64>().map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message(format!("bad {what} {token:?}"))
            .with_source(err)
    })?;
    Ok((value, consumed))
}

fn missing(what: &'static str) -> Error {
    Error::new(ErrorKind::Corrupt).with_message(format!("missing {what}"))
}

struct Fields<'a> {
    line: &'a str,
    pos: usize,
}

impl<'a> Fields<'a> {
    fn new(line: &'a str) -> Self {
        Self { line, pos: 0 }
    }

    fn word(&mut self, what: &'static str) -> Result<&'a str, Error> {
        let (token, consumed) = scan_word(&self.line[self.pos..]).ok_or_else(|| missing(what))?;
        self.pos += consumed;
        Ok(token)
    }

    fn u64(&mut self, what: &'static str) -> Result<u64, Error> {
        let (value, consumed) = scan_u64(&self.line[self.pos..], what)?;
        self.pos += consumed;
        Ok(value)
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, Error> {
        let value = self.u64(what)?;
        u32::try_from(value).map_err(|_| {
            Error::new(ErrorKind::Corrupt).with_message(format!("{what} {value} out of range"))
        })
    }

    fn usize(&mut self, what: &'static str) -> Result<usize, Error> {
        let value = self.u64(what)?;
        usize::try_from(value).map_err(|_| {
            Error::new(ErrorKind::Corrupt).with_message(format!("{what} {value} out of range"))
        })
    }

    fn rest(&self) -> &'a str {
        self.line[self.pos..].trim()
    }

    fn expect_end(&self) -> Result<(), Error> {
        if self.rest().is_empty() {
            return Ok(());
        }
        Err(Error::new(ErrorKind::Corrupt)
            .with_message(format!("unexpected trailing fields {:?}", self.rest())))
    }
}

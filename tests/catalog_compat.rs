// Catalog compatibility checks surfaced through `BufferPool::open`.
mod common;

use colfarm::api::{
    Atom, AtomError, AtomHooks, AtomRegistry, AtomWidth, BufferPool, CATALOG_VERSION_MAX,
    CATALOG_VERSION_MIN, ColumnId, ErrorKind, NativeWidths, PoolOptions,
};
use common::{FarmBuilder, ints};

fn open_err(dir: &std::path::Path) -> colfarm::api::Error {
    BufferPool::open(PoolOptions::new(dir), AtomRegistry::new())
        .err()
        .expect("open should fail")
}

#[test]
fn versions_outside_the_supported_range_fail_distinctly() {
    let farm = FarmBuilder::new().version(CATALOG_VERSION_MIN - 1).build();
    assert_eq!(open_err(farm.path()).kind(), ErrorKind::VersionTooOld);

    let farm = FarmBuilder::new().version(CATALOG_VERSION_MAX + 1).build();
    let err = open_err(farm.path());
    assert_eq!(err.kind(), ErrorKind::VersionTooNew);
    assert!(err.to_string().contains("BBP.dir"));
}

#[test]
fn foreign_native_widths_are_incompatible() {
    let running = NativeWidths::running();
    let farm = FarmBuilder::new()
        .widths(NativeWidths {
            oid: 4,
            ..running
        })
        .build();
    assert_eq!(open_err(farm.path()).kind(), ErrorKind::Incompatible);
}

#[test]
fn duplicate_ids_abort_the_whole_catalog() {
    let farm = FarmBuilder::new()
        .record("1 1 a 1 0 0 0 0 0 0 0 0 0 int 4 0 0 0 0 0 0 0")
        .record("1 1 b 2 0 0 0 0 0 0 0 0 0 int 4 0 0 0 0 0 0 0")
        .build();
    let err = open_err(farm.path());
    assert_eq!(err.kind(), ErrorKind::Corrupt);
    assert_eq!(err.line(), Some(4));
    assert!(err.kind().is_fatal());
}

#[test]
fn missing_catalog_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert_eq!(open_err(dir.path()).kind(), ErrorKind::NotFound);
}

#[test]
fn custom_catalog_name_and_crlf_lines() {
    let farm = FarmBuilder::new()
        .record("1 1 a 1 0 0 0 0 0 0 0 0 0 int 4 0 0 0 0 0 0 0")
        .build();
    let text = std::fs::read_to_string(farm.path().join("BBP.dir")).expect("read");
    std::fs::write(farm.path().join("catalog.dir"), text.replace('\n', "\r\n")).expect("write");
    std::fs::remove_file(farm.path().join("BBP.dir")).expect("remove");

    let options = PoolOptions::new(farm.path()).catalog_file("catalog.dir");
    let pool = BufferPool::open(options, AtomRegistry::new()).expect("open");
    assert_eq!(pool.find("a"), Some(ColumnId(1)));
}

#[cfg(unix)]
#[test]
fn writer_lock_makes_open_busy() {
    use fs2::FileExt;

    let farm = FarmBuilder::new().build();
    let catalog = std::fs::File::open(farm.path().join("BBP.dir")).expect("open catalog");
    catalog.lock_exclusive().expect("lock");
    assert_eq!(open_err(farm.path()).kind(), ErrorKind::Busy);

    let options = PoolOptions::new(farm.path()).lock(false);
    BufferPool::open(options, AtomRegistry::new()).expect("unlocked open");
}

fn pin_day(_: &[u8]) {}

/// Days since an epoch, stored as `int`.
struct Day;

impl Atom for Day {
    fn name(&self) -> &str {
        "day"
    }

    fn width(&self) -> AtomWidth {
        AtomWidth::Fixed(4)
    }

    fn storage(&self) -> Option<&str> {
        Some("int")
    }

    fn nil(&self) -> &[u8] {
        &[0, 0, 0, 0x80]
    }

    fn parse(&self, text: &str) -> Result<(Vec<u8>, usize), AtomError> {
        let digits = text.strip_prefix('d').ok_or(AtomError::Syntax { consumed: 0 })?;
        let value: i32 = digits.parse().map_err(|_| AtomError::Syntax { consumed: 1 })?;
        Ok((value.to_le_bytes().to_vec(), text.len()))
    }

    fn format(&self, bytes: &[u8]) -> Result<String, AtomError> {
        let raw: [u8; 4] = bytes.try_into().map_err(|_| AtomError::Length {
            expected: 4,
            actual: bytes.len(),
        })?;
        Ok(format!("d{}", i32::from_le_bytes(raw)))
    }

    fn hooks(&self) -> AtomHooks {
        AtomHooks {
            fix: Some(pin_day),
            ..AtomHooks::default()
        }
    }
}

#[test]
fn plugin_kinds_resolve_and_force_full_loads() {
    let farm = FarmBuilder::new()
        .heap("7.tail", &ints(&[12, 40]))
        .record("7 1 days 7 0 0 0 0 0 0 2 2 0 day 4 0 0 8 8 0 0 0")
        .build();
    let mut atoms = AtomRegistry::new();
    let day = atoms.register(Box::new(Day)).expect("register");
    let int = atoms.find("int").expect("int");
    assert!(atoms.is_descendant(day, int));

    let mut pool = BufferPool::open(PoolOptions::new(farm.path()), atoms).expect("open");
    pool.quick_descriptor(ColumnId(7), false).expect("quick");
    assert_eq!(pool.info().loaded, 1);

    let column = pool.descriptor(ColumnId(7)).expect("descriptor");
    assert_eq!(column.format_value(1).expect("format"), "d40");
}

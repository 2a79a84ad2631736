//! Purpose: Centralize catalog format versioning and native-width compatibility policy.
//! Exports: `CATALOG_VERSION_MIN`, `CATALOG_VERSION_MAX`, `CATALOG_VERSION_HEAD_FIELDS`,
//! `NativeWidths`, `check_catalog_version`, `format_version`.
//! Role: Shared gate applied by the catalog parser before any column record is read.
//! Invariants: The supported range is inclusive; both ends fail with distinct error kinds.
//! Invariants: Catalogs are not portable across differing native widths.

use crate::core::error::{Error, ErrorKind};

/// Oldest layout still readable; its records carry head-heap fields that are skipped.
pub const CATALOG_VERSION_HEAD_FIELDS: u32 = 0o61042;
pub const CATALOG_VERSION_MIN: u32 = CATALOG_VERSION_HEAD_FIELDS;
pub const CATALOG_VERSION_MAX: u32 = 0o61043;

/// Versions are written in octal, as in `GDKversion 061043`.
pub fn format_version(version: u32) -> String {
    format!("{version:06o}")
}

pub fn check_catalog_version(version: u32) -> Result<(), Error> {
    let supported = format!(
        "supported: {} through {}",
        format_version(CATALOG_VERSION_MIN),
        format_version(CATALOG_VERSION_MAX)
    );
    if version < CATALOG_VERSION_MIN {
        return Err(Error::new(ErrorKind::VersionTooOld).with_message(format!(
            "catalog version {} needs migration by the system that wrote it ({supported})",
            format_version(version)
        )));
    }
    if version > CATALOG_VERSION_MAX {
        return Err(Error::new(ErrorKind::VersionTooNew).with_message(format!(
            "catalog version {} was written by an incompatible newer system ({supported})",
            format_version(version)
        )));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NativeWidths {
    pub ptr: usize,
    pub oid: usize,
    pub max_int: usize,
}

impl NativeWidths {
    pub fn running() -> Self {
        Self {
            ptr: std::mem::size_of::<usize>(),
            oid: std::mem::size_of::<u64>(),
            max_int: std::mem::size_of::<i128>(),
        }
    }

    pub fn check(self, found: NativeWidths) -> Result<(), Error> {
        if self == found {
            return Ok(());
        }
        Err(Error::new(ErrorKind::Incompatible).with_message(format!(
            "native widths differ: expected ptr={} oid={} max-int={}, catalog has ptr={} oid={} max-int={}",
            self.ptr, self.oid, self.max_int, found.ptr, found.oid, found.max_int
        )))
    }
}

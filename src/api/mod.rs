//! Purpose: Define the public Rust API boundary for colfarm.
//! Exports: Pool, catalog, atom, and string-heap types callers need.
//! Role: Additive-only surface; internal module paths stay free to move.
//! Invariants: Everything a caller needs to open a farm and read columns is reachable here.

mod info;

pub use crate::core::atom::{
    builtin, Atom, AtomDescriptor, AtomError, AtomHooks, AtomId, AtomRegistry, AtomWidth,
};
pub use crate::core::catalog::{parse_catalog, read_catalog, Catalog};
pub use crate::core::column::{
    ColumnDescriptor, ColumnId, ColumnProperties, HeapDescriptor, HeapKind, StorageMode,
    Witnesses,
};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::escape::{escape, escaped_len, parse_quoted, validate_and_compact, EscapeError};
pub use crate::core::format::{
    check_catalog_version, format_version, NativeWidths, CATALOG_VERSION_MAX, CATALOG_VERSION_MIN,
};
pub use crate::core::numeric::{
    decode_int, encode_int, format_hge, format_int, format_lng, parse_int, parse_int_exact,
    IntWidth, NumError, Parsed,
};
pub use crate::core::pool::{
    BufferPool, ColumnRef, ColumnSummary, PoolInfo, PoolOptions, DEFAULT_CATALOG_FILE,
};
pub use crate::core::slot::{SlotStatus, MAX_SLOTS, SLOT_CHUNK};
pub use crate::core::strheap::{
    decode_var_offset, encode_var_offset, str_hash, StrHeapRef, StringHeap, ELIM_LIMIT,
    STR_HASH_SIZE,
};
pub use info::{column_summary_json, pool_info_json};

//! Purpose: On-disk column ("BAT") descriptors as decoded from one catalog record.
//! Exports: `ColumnId`, `ColumnDescriptor`, `HeapDescriptor`, `HeapKind`, `StorageMode`,
//! `ColumnProperties`, `Witnesses`, property and heap flag masks.
//! Role: Plain data shared by the catalog parser (producer) and the buffer pool (consumer).
//! Invariants: Bit-packed catalog fields are decoded once into typed fields here.
//! Invariants: `free <= size` holds for every descriptor that leaves the parser.
use std::fmt;

use crate::core::atom::AtomId;

/// Property bits a catalog may carry; anything else means the data and library disagree.
pub const PROPERTY_MASK: u32 = 0x0f81;
const PROP_SORTED: u32 = 0x0001;
const PROP_REVSORTED: u32 = 0x0080;
const PROP_KEY: u32 = 0x0100;
const PROP_DENSE: u32 = 0x0200;
const PROP_NONIL: u32 = 0x0400;
const PROP_NIL: u32 = 0x0800;

pub const HEAP_FLAG_MASK: u32 = 0x3;
const HEAP_HASHASH: u32 = 0x1;
const HEAP_SHARED_HASH: u32 = 0x2;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ColumnId(pub u32);

impl ColumnId {
    pub const NIL: ColumnId = ColumnId(0);

    pub fn is_nil(self) -> bool {
        self.0 == 0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StorageMode {
    Mmap,
    Private,
    Anonymous,
}

impl StorageMode {
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(StorageMode::Mmap),
            1 => Some(StorageMode::Private),
            2 => Some(StorageMode::Anonymous),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            StorageMode::Mmap => 0,
            StorageMode::Private => 1,
            StorageMode::Anonymous => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HeapKind {
    Tail,
    Var,
}

impl HeapKind {
    pub fn extension(self) -> &'static str {
        match self {
            HeapKind::Tail => "tail",
            HeapKind::Var => "theap",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HeapDescriptor {
    pub free: u64,
    pub size: u64,
    pub storage: StorageMode,
    /// Column whose heap of the same kind this one is a window into.
    pub parent: Option<ColumnId>,
    pub offset: u64,
    pub hashash: bool,
    pub shared_hash: bool,
}

impl HeapDescriptor {
    pub fn is_view(&self) -> bool {
        self.parent.is_some()
    }

    pub fn flags_from_bits(&mut self, bits: u32) -> Result<(), u32> {
        let unknown = bits & !HEAP_FLAG_MASK;
        if unknown != 0 {
            return Err(unknown);
        }
        self.hashash = bits & HEAP_HASHASH != 0;
        self.shared_hash = bits & HEAP_SHARED_HASH != 0;
        Ok(())
    }

    pub fn flag_bits(&self) -> u32 {
        let mut bits = 0;
        if self.hashash {
            bits |= HEAP_HASHASH;
        }
        if self.shared_hash {
            bits |= HEAP_SHARED_HASH;
        }
        bits
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ColumnProperties {
    pub sorted: bool,
    pub revsorted: bool,
    pub key: bool,
    pub dense: bool,
    pub nonil: bool,
    pub nil: bool,
}

impl ColumnProperties {
    /// Decodes a catalog property word; returns the offending bits when outside the mask.
    pub fn from_bits(bits: u32) -> Result<Self, u32> {
        let unknown = bits & !PROPERTY_MASK;
        if unknown != 0 {
            return Err(unknown);
        }
        Ok(Self {
            sorted: bits & PROP_SORTED != 0,
            revsorted: bits & PROP_REVSORTED != 0,
            key: bits & PROP_KEY != 0,
            dense: bits & PROP_DENSE != 0,
            nonil: bits & PROP_NONIL != 0,
            nil: bits & PROP_NIL != 0,
        })
    }

    pub fn bits(&self) -> u32 {
        [
            (self.sorted, PROP_SORTED),
            (self.revsorted, PROP_REVSORTED),
            (self.key, PROP_KEY),
            (self.dense, PROP_DENSE),
            (self.nonil, PROP_NONIL),
            (self.nil, PROP_NIL),
        ]
        .into_iter()
        .filter(|(set, _)| *set)
        .fold(0, |acc, (_, bit)| acc | bit)
    }
}

/// Positions that falsify a property; 0 means "no witness recorded".
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Witnesses {
    pub nokey: [u64; 2],
    pub nosorted: u64,
    pub norevsorted: u64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnDescriptor {
    pub id: ColumnId,
    pub name: String,
    pub stem: String,
    pub status: u32,
    pub kind: AtomId,
    pub width: usize,
    pub var: bool,
    pub count: u64,
    pub capacity: u64,
    pub properties: ColumnProperties,
    pub witnesses: Witnesses,
    pub seqbase: u64,
    pub tail: HeapDescriptor,
    pub vheap: Option<HeapDescriptor>,
    pub options: String,
}

impl ColumnDescriptor {
    pub fn heap(&self, kind: HeapKind) -> Option<&HeapDescriptor> {
        match kind {
            HeapKind::Tail => Some(&self.tail),
            HeapKind::Var => self.vheap.as_ref(),
        }
    }

    /// Distinct parents of view heaps, in heap order.
    pub fn view_parents(&self) -> Vec<ColumnId> {
        let mut parents = Vec::new();
        for heap in [Some(&self.tail), self.vheap.as_ref()].into_iter().flatten() {
            match heap.parent {
                Some(parent) if !parents.contains(&parent) => parents.push(parent),
                _ => {}
            }
        }
        parents
    }

    pub fn heap_file_name(&self, kind: HeapKind) -> String {
        format!("{}.{}", self.stem, kind.extension())
    }
}

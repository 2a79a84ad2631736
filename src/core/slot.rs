//! Purpose: Descriptor table of the buffer pool, indexed directly by column id.
//! Exports: `SlotStatus`, `PoolSlot`, `Column`, `SlotTable`, `SLOT_CHUNK`, `MAX_SLOT_CHUNKS`.
//! Role: Storage for per-column status, reference counts, and cached materializations.
//! Invariants: Chunks are allocated whole with fallible reservation and never shrink.
//! Invariants: A chunk holds one pointer per position; slot bodies are boxed on insert.
//! Invariants: A slot carries LOADED exactly when its cached column holds resident heaps.
use std::fmt;

use crate::core::column::{ColumnDescriptor, ColumnId, HeapKind};
use crate::core::error::{Error, ErrorKind};
use crate::core::heap::Heap;

pub const SLOT_CHUNK: usize = 1 << 14;
pub const MAX_SLOT_CHUNKS: usize = 1 << 10;
pub const MAX_SLOTS: usize = SLOT_CHUNK * MAX_SLOT_CHUNKS;

#[derive(Clone, Copy, Default, Eq, PartialEq)]
pub struct SlotStatus(u16);

impl SlotStatus {
    pub const EXISTING: SlotStatus = SlotStatus(0x1);
    pub const LOADING: SlotStatus = SlotStatus(0x2);
    pub const LOADED: SlotStatus = SlotStatus(0x4);
    pub const DELETED: SlotStatus = SlotStatus(0x8);

    const NAMES: [(SlotStatus, &'static str); 4] = [
        (SlotStatus::EXISTING, "existing"),
        (SlotStatus::LOADING, "loading"),
        (SlotStatus::LOADED, "loaded"),
        (SlotStatus::DELETED, "deleted"),
    ];

    pub fn contains(self, other: SlotStatus) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: SlotStatus) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: SlotStatus) {
        self.0 &= !other.0;
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl fmt::Debug for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotStatus({})", self.names().join("|"))
    }
}

/// A materialized column: descriptor plus whatever heaps are resident.
#[derive(Debug)]
pub struct Column {
    pub desc: ColumnDescriptor,
    pub tail: Option<Heap>,
    pub vheap: Option<Heap>,
    /// Parents this column pins while its heaps are resident.
    pub parents: Vec<ColumnId>,
    pub shared_hash: Option<ColumnId>,
}

impl Column {
    pub fn described(desc: ColumnDescriptor) -> Self {
        Self {
            desc,
            tail: None,
            vheap: None,
            parents: Vec::new(),
            shared_hash: None,
        }
    }

    pub fn heap(&self, kind: HeapKind) -> Option<&Heap> {
        match kind {
            HeapKind::Tail => self.tail.as_ref(),
            HeapKind::Var => self.vheap.as_ref(),
        }
    }

    pub fn resident_bytes(&self) -> u64 {
        [self.tail.as_ref(), self.vheap.as_ref()]
            .into_iter()
            .flatten()
            .map(Heap::resident_bytes)
            .sum()
    }

    /// Drops resident heaps and hands back the parent references to release.
    pub fn evict(&mut self) -> Vec<ColumnId> {
        self.tail = None;
        self.vheap = None;
        self.shared_hash = None;
        std::mem::take(&mut self.parents)
    }
}

#[derive(Debug)]
pub struct PoolSlot {
    pub status: SlotStatus,
    /// Physical references: holders that need the heaps resident.
    pub refs: u32,
    /// Logical references: holders that only need the column to exist.
    pub lrefs: u32,
    /// Resident views that read through this column's heaps.
    pub view_pins: u32,
    pub record: ColumnDescriptor,
    pub cache: Option<Column>,
}

impl PoolSlot {
    pub fn new(record: ColumnDescriptor) -> Self {
        Self {
            status: SlotStatus::EXISTING,
            refs: 0,
            lrefs: 1,
            view_pins: 0,
            record,
            cache: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.status.contains(SlotStatus::LOADED)
    }
}

#[derive(Debug)]
pub struct SlotTable {
    chunks: Vec<Vec<Option<Box<PoolSlot>>>>,
    limit: usize,
    occupied: usize,
}

impl SlotTable {
    /// `limit` is clamped to `MAX_SLOTS`; ids at or above it are refused.
    pub fn new(limit: usize) -> Self {
        Self {
            chunks: Vec::new(),
            limit: limit.clamp(1, MAX_SLOTS),
            occupied: 0,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Allocated slot positions, always a whole number of chunks.
    pub fn capacity(&self) -> usize {
        self.chunks.len() * SLOT_CHUNK
    }

    pub fn len(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Grows the table so ids below `slots` are addressable.
    pub fn reserve(&mut self, slots: usize) -> Result<(), Error> {
        let slots = slots.min(self.limit);
        let wanted = slots.div_ceil(SLOT_CHUNK);
        while self.chunks.len() < wanted {
            self.chunks.try_reserve(1).map_err(|_| capacity_error(slots))?;
            let mut chunk = Vec::new();
            chunk
                .try_reserve_exact(SLOT_CHUNK)
                .map_err(|_| capacity_error(slots))?;
            chunk.resize_with(SLOT_CHUNK, || None);
            self.chunks.push(chunk);
            tracing::debug!(capacity = self.capacity(), "grew slot table");
        }
        Ok(())
    }

    pub fn insert(&mut self, record: ColumnDescriptor) -> Result<(), Error> {
        let id = record.id;
        let index = id.index();
        if index >= self.limit {
            return Err(Error::new(ErrorKind::Capacity)
                .with_message(format!("column id exceeds the slot limit of {}", self.limit))
                .with_id(u64::from(id.0)));
        }
        self.reserve(index + 1)?;
        let entry = &mut self.chunks[index / SLOT_CHUNK][index % SLOT_CHUNK];
        if entry.is_some() {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("slot already occupied")
                .with_id(u64::from(id.0)));
        }
        *entry = Some(Box::new(PoolSlot::new(record)));
        self.occupied += 1;
        Ok(())
    }

    pub fn get(&self, id: ColumnId) -> Option<&PoolSlot> {
        let index = id.index();
        self.chunks.get(index / SLOT_CHUNK)?[index % SLOT_CHUNK].as_deref()
    }

    pub fn get_mut(&mut self, id: ColumnId) -> Option<&mut PoolSlot> {
        let index = id.index();
        self.chunks.get_mut(index / SLOT_CHUNK)?[index % SLOT_CHUNK].as_deref_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PoolSlot> {
        self.chunks.iter().flatten().filter_map(|slot| slot.as_deref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PoolSlot> {
        self.chunks.iter_mut().flatten().filter_map(|slot| slot.as_deref_mut())
    }
}

fn capacity_error(slots: usize) -> Error {
    Error::new(ErrorKind::Capacity).with_message(format!("cannot allocate {slots} slots"))
}

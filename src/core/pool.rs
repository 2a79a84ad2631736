// Buffer pool: catalog-backed column table with reference counting and lazy heap loading.
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::atom::{builtin, AtomRegistry};
use crate::core::catalog::{parse_catalog, read_catalog};
use crate::core::column::{ColumnDescriptor, ColumnId, HeapKind};
use crate::core::error::{Error, ErrorKind};
use crate::core::farm::Farm;
use crate::core::format::format_version;
use crate::core::heap::Heap;
use crate::core::slot::{Column, PoolSlot, SlotStatus, SlotTable, MAX_SLOTS};
use crate::core::strheap::{decode_var_offset, StrHeapRef};

pub const DEFAULT_CATALOG_FILE: &str = "BBP.dir";
const MAX_VIEW_DEPTH: usize = 16;

#[derive(Clone, Debug)]
pub struct PoolOptions {
    pub farm: PathBuf,
    pub catalog_file: String,
    pub extra_farms: Vec<PathBuf>,
    pub max_slots: usize,
    pub lock: bool,
}

impl PoolOptions {
    pub fn new(farm: impl Into<PathBuf>) -> Self {
        Self {
            farm: farm.into(),
            catalog_file: DEFAULT_CATALOG_FILE.to_string(),
            extra_farms: Vec::new(),
            max_slots: MAX_SLOTS,
            lock: true,
        }
    }

    pub fn catalog_file(mut self, name: impl Into<String>) -> Self {
        self.catalog_file = name.into();
        self
    }

    /// Additional roots must name the same directory as `farm`.
    pub fn extra_farm(mut self, path: impl Into<PathBuf>) -> Self {
        self.extra_farms.push(path.into());
        self
    }

    /// Upper bound on column ids; clamped to the hard id-space limit.
    pub fn max_slots(mut self, slots: usize) -> Self {
        self.max_slots = slots.min(MAX_SLOTS);
        self
    }

    pub fn lock(mut self, lock: bool) -> Self {
        self.lock = lock;
        self
    }
}

pub struct BufferPool {
    farm: Farm,
    catalog_path: PathBuf,
    version: u32,
    atoms: AtomRegistry,
    slots: SlotTable,
    names: HashMap<String, ColumnId>,
    closed: bool,
}

impl BufferPool {
    /// Reads the catalog once and populates the slot table; no heap is touched.
    pub fn open(options: PoolOptions, mut atoms: AtomRegistry) -> Result<Self, Error> {
        let mut farm = Farm::new();
        farm.register(&options.farm)?;
        for extra in &options.extra_farms {
            farm.register(extra)?;
        }
        let catalog_path = farm.path(&options.catalog_file)?;
        let text = read_catalog(&catalog_path, options.lock)?;
        let catalog =
            parse_catalog(&text, &mut atoms).map_err(|err| err.with_path(&catalog_path))?;

        let mut slots = SlotTable::new(options.max_slots);
        if let Some(hint) = catalog.size_hint {
            slots.reserve(hint)?;
        }
        let mut names = HashMap::with_capacity(catalog.columns.len());
        for column in catalog.columns {
            names.insert(column.name.clone(), column.id);
            slots
                .insert(column)
                .map_err(|err| err.with_path(&catalog_path))?;
        }

        tracing::info!(
            farm = %farm.root()?.display(),
            version = %format_version(catalog.version),
            columns = slots.len(),
            unknown_kinds = atoms.unknown_names().len(),
            "opened buffer pool"
        );
        Ok(Self {
            farm,
            catalog_path,
            version: catalog.version,
            atoms,
            slots,
            names,
            closed: false,
        })
    }

    /// Takes a physical reference, loading the column's heaps when they are not resident.
    pub fn fix(&mut self, id: ColumnId) -> Result<u32, Error> {
        if id.is_nil() {
            return Ok(0);
        }
        let slot = self.live_slot_mut(id)?;
        if slot.status.contains(SlotStatus::LOADING) {
            return Err(busy(id));
        }
        slot.refs = slot.refs.checked_add(1).ok_or_else(|| {
            Error::new(ErrorKind::Overflow)
                .with_message("physical reference count overflow")
                .with_id(u64::from(id.0))
        })?;
        let refs = slot.refs;
        if !slot.is_loaded() {
            if let Err(err) = self.ensure_loaded(id) {
                if let Some(slot) = self.slots.get_mut(id) {
                    slot.refs -= 1;
                }
                return Err(err);
            }
        }
        Ok(refs)
    }

    /// Takes a logical reference; catalog columns start with one.
    pub fn retain(&mut self, id: ColumnId) -> Result<u32, Error> {
        if id.is_nil() {
            return Ok(0);
        }
        let slot = self.live_slot_mut(id)?;
        slot.lrefs = slot.lrefs.checked_add(1).ok_or_else(|| {
            Error::new(ErrorKind::Overflow)
                .with_message("logical reference count overflow")
                .with_id(u64::from(id.0))
        })?;
        Ok(slot.lrefs)
    }

    /// Loads the column if needed without taking a reference on it.
    pub fn descriptor(&mut self, id: ColumnId) -> Result<ColumnRef<'_>, Error> {
        self.ensure_loaded(id)?;
        self.column_ref(id)
    }

    /// Metadata without heap I/O, unless the kind cannot be described without loading.
    pub fn quick_descriptor(
        &mut self,
        id: ColumnId,
        deleting: bool,
    ) -> Result<&ColumnDescriptor, Error> {
        let kind = self.live_slot(id)?.record.kind;
        if self.atoms.requires_full_load(kind, deleting) {
            self.ensure_loaded(id)?;
        }
        let slot = self.live_slot_mut(id)?;
        if slot.cache.is_none() {
            slot.cache = Some(Column::described(slot.record.clone()));
        }
        match &slot.cache {
            Some(column) => Ok(&column.desc),
            None => Err(Error::new(ErrorKind::Internal)
                .with_message("descriptor cache missing")
                .with_id(u64::from(id.0))),
        }
    }

    /// Drops resident heaps and the caller's physical references on them.
    ///
    /// Refused while the column is loading or while a resident view reads through it.
    pub fn unload(&mut self, id: ColumnId, drop_descriptor: bool) -> Result<(), Error> {
        let slot = self.live_slot_mut(id)?;
        if slot.status.contains(SlotStatus::LOADING) {
            return Err(busy(id));
        }
        if slot.view_pins > 0 {
            return Err(Error::new(ErrorKind::Busy)
                .with_message(format!("column {id} backs {} resident views", slot.view_pins))
                .with_id(u64::from(id.0)));
        }
        let dropped_refs = std::mem::take(&mut slot.refs);
        let freed = slot.cache.as_ref().map_or(0, Column::resident_bytes);
        let parents = slot.cache.as_mut().map(Column::evict).unwrap_or_default();
        slot.status.remove(SlotStatus::LOADED);
        if drop_descriptor {
            slot.cache = None;
        }
        for parent in parents {
            self.release(parent);
        }
        tracing::debug!(column = %id, freed, dropped_refs, drop_descriptor, "unloaded column");
        Ok(())
    }

    /// Marks every slot deleted and drops all cached columns.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        for slot in self.slots.iter_mut() {
            slot.cache = None;
            slot.refs = 0;
            slot.view_pins = 0;
            slot.status.remove(SlotStatus::LOADING);
            slot.status.remove(SlotStatus::LOADED);
            slot.status.insert(SlotStatus::DELETED);
        }
        self.closed = true;
        tracing::debug!(catalog = %self.catalog_path.display(), "closed buffer pool");
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn farm(&self) -> Result<&Path, Error> {
        self.farm.root()
    }

    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    pub fn atoms(&self) -> &AtomRegistry {
        &self.atoms
    }

    pub fn status(&self, id: ColumnId) -> Option<SlotStatus> {
        self.slots.get(id).map(|slot| slot.status)
    }

    pub fn refs(&self, id: ColumnId) -> Option<u32> {
        self.slots.get(id).map(|slot| slot.refs)
    }

    pub fn lrefs(&self, id: ColumnId) -> Option<u32> {
        self.slots.get(id).map(|slot| slot.lrefs)
    }

    /// Resident views currently reading through `id`.
    pub fn view_pins(&self, id: ColumnId) -> Option<u32> {
        self.slots.get(id).map(|slot| slot.view_pins)
    }

    pub fn find(&self, name: &str) -> Option<ColumnId> {
        self.names
            .get(name)
            .copied()
            .filter(|id| self.live_slot(*id).is_ok())
    }

    pub fn ids(&self) -> Vec<ColumnId> {
        self.slots.iter().map(|slot| slot.record.id).collect()
    }

    pub fn info(&self) -> PoolInfo {
        let columns: Vec<ColumnSummary> = self
            .slots
            .iter()
            .map(|slot| ColumnSummary {
                id: slot.record.id.0,
                name: slot.record.name.clone(),
                kind: self
                    .atoms
                    .name(slot.record.kind)
                    .unwrap_or("?")
                    .to_string(),
                count: slot.record.count,
                status: slot.status.names(),
                refs: slot.refs,
                lrefs: slot.lrefs,
                view_pins: slot.view_pins,
                resident_bytes: slot.cache.as_ref().map_or(0, Column::resident_bytes),
            })
            .collect();
        PoolInfo {
            farm: self.farm.root().ok().map(Path::to_path_buf),
            catalog: self.catalog_path.clone(),
            version: format_version(self.version),
            slots: self.slots.len(),
            slot_capacity: self.slots.capacity(),
            loaded: columns
                .iter()
                .filter(|column| column.status.contains(&"loaded"))
                .count(),
            resident_bytes: columns.iter().map(|column| column.resident_bytes).sum(),
            unknown_kinds: self.atoms.unknown_names().to_vec(),
            columns,
        }
    }

    fn live_slot(&self, id: ColumnId) -> Result<&PoolSlot, Error> {
        self.slots
            .get(id)
            .filter(|slot| !slot.status.contains(SlotStatus::DELETED))
            .ok_or_else(|| not_found(id))
    }

    fn live_slot_mut(&mut self, id: ColumnId) -> Result<&mut PoolSlot, Error> {
        self.slots
            .get_mut(id)
            .filter(|slot| !slot.status.contains(SlotStatus::DELETED))
            .ok_or_else(|| not_found(id))
    }

    /// Loads a view parent and pins it until the view is unloaded.
    fn pin_parent(&mut self, parent: ColumnId) -> Result<(), Error> {
        self.ensure_loaded(parent)?;
        let slot = self.live_slot_mut(parent)?;
        slot.view_pins = slot.view_pins.checked_add(1).ok_or_else(|| {
            Error::new(ErrorKind::Overflow)
                .with_message("view pin count overflow")
                .with_id(u64::from(parent.0))
        })?;
        Ok(())
    }

    fn release(&mut self, parent: ColumnId) {
        if let Some(slot) = self.slots.get_mut(parent) {
            slot.view_pins = slot.view_pins.saturating_sub(1);
        }
    }

    fn ensure_loaded(&mut self, id: ColumnId) -> Result<(), Error> {
        let slot = self.live_slot_mut(id)?;
        if slot.is_loaded() {
            return Ok(());
        }
        if slot.status.contains(SlotStatus::LOADING) {
            return Err(busy(id));
        }
        slot.status.insert(SlotStatus::LOADING);
        let desc = slot.record.clone();

        let mut attached = Vec::new();
        let result = self.load_column(&desc, &mut attached);
        let outcome = match result {
            Ok(column) => {
                if let Some(slot) = self.slots.get_mut(id) {
                    tracing::debug!(
                        column = %id,
                        resident = column.resident_bytes(),
                        parents = column.parents.len(),
                        "loaded column"
                    );
                    slot.cache = Some(column);
                    slot.status.insert(SlotStatus::LOADED);
                }
                Ok(())
            }
            Err(err) => {
                for parent in attached.into_iter().rev() {
                    self.release(parent);
                }
                Err(err)
            }
        };
        if let Some(slot) = self.slots.get_mut(id) {
            slot.status.remove(SlotStatus::LOADING);
        }
        outcome
    }

    fn load_column(
        &mut self,
        desc: &ColumnDescriptor,
        attached: &mut Vec<ColumnId>,
    ) -> Result<Column, Error> {
        let id = u64::from(desc.id.0);
        for parent in desc.view_parents() {
            if parent == desc.id {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message("column is a view of itself")
                    .with_id(id));
            }
            if self.live_slot(parent).is_err() {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message(format!("view parent {parent} is not in the catalog"))
                    .with_id(id));
            }
            self.pin_parent(parent)?;
            attached.push(parent);
            tracing::debug!(column = %desc.id, parent = %parent, "attached view parent");
        }

        let tail = self.load_heap(desc, HeapKind::Tail)?;
        self.resolve_heap(&tail, 0)
            .map_err(|err| err.with_id(id))?;
        let vheap = match desc.vheap {
            Some(_) => {
                let heap = self.load_heap(desc, HeapKind::Var)?;
                let bytes = self.resolve_heap(&heap, 0).map_err(|err| err.with_id(id))?;
                StrHeapRef::new(bytes, heap.descriptor().hashash).map_err(|err| err.with_id(id))?;
                Some(heap)
            }
            None => None,
        };

        let shared_hash = if desc.tail.shared_hash {
            desc.tail.parent
        } else {
            None
        };
        Ok(Column {
            desc: desc.clone(),
            tail: Some(tail),
            vheap,
            parents: std::mem::take(attached),
            shared_hash,
        })
    }

    fn load_heap(&self, desc: &ColumnDescriptor, kind: HeapKind) -> Result<Heap, Error> {
        let heap = desc.heap(kind).ok_or_else(|| {
            Error::new(ErrorKind::Internal)
                .with_message(format!("column has no {} heap", kind.extension()))
                .with_id(u64::from(desc.id.0))
        })?;
        let path = self.farm.heap_path(desc, kind)?;
        Heap::load(&path, kind, heap).map_err(|err| err.with_id(u64::from(desc.id.0)))
    }

    /// Bytes of a heap, following view windows through resident parents.
    fn resolve_heap<'a>(&'a self, heap: &'a Heap, depth: usize) -> Result<&'a [u8], Error> {
        if let Some(bytes) = heap.bytes() {
            return Ok(bytes);
        }
        let Some((parent, offset, len)) = heap.view() else {
            return Err(Error::new(ErrorKind::Internal).with_message("heap has no bytes"));
        };
        if depth >= MAX_VIEW_DEPTH {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("view chain too deep")
                .with_id(u64::from(parent.0)));
        }
        let kind = heap.kind();
        let parent_heap = self
            .slots
            .get(parent)
            .and_then(|slot| slot.cache.as_ref())
            .and_then(|column| column.heap(kind))
            .ok_or_else(|| {
                Error::new(ErrorKind::Internal)
                    .with_message(format!(
                        "{} heap of view parent {parent} is not resident",
                        kind.extension()
                    ))
            })?;
        let bytes = self.resolve_heap(parent_heap, depth + 1)?;
        window(bytes, offset, len).ok_or_else(|| {
            Error::new(ErrorKind::Corrupt).with_message(format!(
                "view [{offset}, {offset}+{len}) lies outside the {}-byte {} heap of parent {parent}",
                bytes.len(),
                kind.extension()
            ))
        })
    }

    fn column_ref(&self, id: ColumnId) -> Result<ColumnRef<'_>, Error> {
        let slot = self.live_slot(id)?;
        let not_resident = || {
            Error::new(ErrorKind::Internal)
                .with_message("column is not resident")
                .with_id(u64::from(id.0))
        };
        let column = slot.cache.as_ref().ok_or_else(not_resident)?;
        let tail = match &column.tail {
            Some(heap) => self.resolve_heap(heap, 0)?,
            None => return Err(not_resident()),
        };
        let vheap = match &column.vheap {
            Some(heap) => Some(StrHeapRef::new(
                self.resolve_heap(heap, 0)?,
                heap.descriptor().hashash,
            )?),
            None => None,
        };
        Ok(ColumnRef {
            desc: &column.desc,
            tail,
            vheap,
            atoms: &self.atoms,
        })
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        self.close();
    }
}

fn window(bytes: &[u8], offset: u64, len: u64) -> Option<&[u8]> {
    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(usize::try_from(len).ok()?)?;
    bytes.get(start..end)
}

fn busy(id: ColumnId) -> Error {
    Error::new(ErrorKind::Busy)
        .with_message("column is being loaded")
        .with_id(u64::from(id.0))
}

fn not_found(id: ColumnId) -> Error {
    Error::new(ErrorKind::NotFound)
        .with_message("column not in pool")
        .with_id(u64::from(id.0))
}

/// Borrowed view of a resident column.
#[derive(Debug)]
pub struct ColumnRef<'a> {
    desc: &'a ColumnDescriptor,
    tail: &'a [u8],
    vheap: Option<StrHeapRef<'a>>,
    atoms: &'a AtomRegistry,
}

impl<'a> ColumnRef<'a> {
    pub fn descriptor(&self) -> &'a ColumnDescriptor {
        self.desc
    }

    pub fn len(&self) -> u64 {
        self.desc.count
    }

    pub fn is_empty(&self) -> bool {
        self.desc.count == 0
    }

    pub fn tail(&self) -> &'a [u8] {
        self.tail
    }

    pub fn vheap(&self) -> Option<&StrHeapRef<'a>> {
        self.vheap.as_ref()
    }

    /// Storage bytes of element `index`; void columns yield `seqbase + index` as an oid.
    pub fn value_bytes(&self, index: u64) -> Result<Cow<'a, [u8]>, Error> {
        let id = u64::from(self.desc.id.0);
        if index >= self.desc.count {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("index {index} out of range for {} elements", self.desc.count))
                .with_id(id));
        }
        let width = self.desc.width;
        if width == 0 {
            let value = if self.desc.seqbase == builtin::OID_NIL {
                builtin::OID_NIL
            } else {
                self.desc.seqbase.checked_add(index).ok_or_else(|| {
                    Error::new(ErrorKind::Overflow)
                        .with_message("dense oid overflow")
                        .with_id(id)
                })?
            };
            return Ok(Cow::Owned(value.to_le_bytes().to_vec()));
        }

        let corrupt = || {
            Error::new(ErrorKind::Corrupt)
                .with_message(format!("element {index} lies outside the tail heap"))
                .with_id(id)
        };
        let start = usize::try_from(index)
            .ok()
            .and_then(|index| index.checked_mul(width))
            .ok_or_else(corrupt)?;
        let raw = start
            .checked_add(width)
            .and_then(|end| self.tail.get(start..end))
            .ok_or_else(corrupt)?;
        if !self.desc.var {
            return Ok(Cow::Borrowed(raw));
        }

        let mut word = [0u8; 8];
        word[..width].copy_from_slice(raw);
        let offset = decode_var_offset(u64::from_le_bytes(word), width);
        let heap = self.vheap.as_ref().ok_or_else(|| {
            Error::new(ErrorKind::Corrupt)
                .with_message("variable-width column has no var heap")
                .with_id(id)
        })?;
        Ok(Cow::Borrowed(heap.get(offset).map_err(|err| err.with_id(id))?))
    }

    pub fn format_value(&self, index: u64) -> Result<String, Error> {
        let bytes = self.value_bytes(index)?;
        let kind = if self.desc.width == 0 {
            builtin::OID
        } else {
            self.desc.kind
        };
        self.atoms.format_value(kind, &bytes)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PoolInfo {
    pub farm: Option<PathBuf>,
    pub catalog: PathBuf,
    pub version: String,
    pub slots: usize,
    pub slot_capacity: usize,
    pub loaded: usize,
    pub resident_bytes: u64,
    pub unknown_kinds: Vec<String>,
    pub columns: Vec<ColumnSummary>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ColumnSummary {
    pub id: u32,
    pub name: String,
    pub kind: String,
    pub count: u64,
    pub status: Vec<&'static str>,
    pub refs: u32,
    pub lrefs: u32,
    pub view_pins: u32,
    pub resident_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::{BufferPool, PoolOptions};
    use crate::core::atom::AtomRegistry;
    use crate::core::column::ColumnId;
    use crate::core::error::ErrorKind;
    use crate::core::format::{format_version, NativeWidths, CATALOG_VERSION_MAX};
    use crate::core::slot::SlotStatus;
    use crate::core::strheap::StringHeap;

    fn write_catalog(dir: &std::path::Path, records: &[&str]) {
        let widths = NativeWidths::running();
        let mut text = format!(
            "BBP.dir, GDKversion {}\n{} {} {}\n",
            format_version(CATALOG_VERSION_MAX),
            widths.ptr,
            widths.oid,
            widths.max_int
        );
        for record in records {
            text.push_str(record);
            text.push('\n');
        }
        std::fs::write(dir.join("BBP.dir"), text).expect("write catalog");
    }

    fn ints(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|value| value.to_le_bytes()).collect()
    }

    fn open(dir: &std::path::Path) -> BufferPool {
        BufferPool::open(PoolOptions::new(dir), AtomRegistry::new()).expect("open")
    }

    #[test]
    fn fix_loads_once_and_counts_references() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("1.tail"), ints(&[10, 20, 30])).expect("tail");
        write_catalog(dir.path(), &["1 1 nums 1 0 0 0 0 0 0 3 3 0 int 4 0 0 12 12 0 0 0"]);
        let mut pool = open(dir.path());
        let id = ColumnId(1);

        assert_eq!(pool.fix(ColumnId::NIL).expect("nil"), 0);
        assert_eq!(pool.fix(id).expect("fix"), 1);
        assert_eq!(pool.fix(id).expect("fix"), 2);
        let status = pool.status(id).expect("status");
        assert!(status.contains(SlotStatus::LOADED));

        let column = pool.descriptor(id).expect("descriptor");
        assert_eq!(column.len(), 3);
        assert_eq!(column.format_value(1).expect("value"), "20");
        assert_eq!(
            column.value_bytes(2).expect("bytes").as_ref(),
            30i32.to_le_bytes().as_slice()
        );
        assert_eq!(column.value_bytes(3).expect_err("range").kind(), ErrorKind::Usage);

        pool.unload(id, false).expect("unload fixed column");
        assert_eq!(pool.refs(id), Some(0));
        assert!(!pool.status(id).expect("status").contains(SlotStatus::LOADED));
        assert_eq!(pool.fix(id).expect("refix"), 1);
        assert!(pool.status(id).expect("status").contains(SlotStatus::LOADED));
    }

    #[test]
    fn failed_load_rolls_back_the_reference() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_catalog(dir.path(), &["1 1 nums 1 0 0 0 0 0 0 3 3 0 int 4 0 0 12 12 0 0 0"]);
        let mut pool = open(dir.path());
        let err = pool.fix(ColumnId(1)).expect_err("missing heap");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(pool.refs(ColumnId(1)), Some(0));
        assert!(!pool.status(ColumnId(1)).expect("status").contains(SlotStatus::LOADING));

        std::fs::write(dir.path().join("1.tail"), ints(&[1, 2, 3])).expect("tail");
        assert_eq!(pool.fix(ColumnId(1)).expect("retry"), 1);
    }

    #[test]
    fn views_hold_their_parent_until_unloaded() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("1.tail"), ints(&[1, 2, 3, 4])).expect("tail");
        write_catalog(
            dir.path(),
            &[
                "1 1 base 1 0 0 0 0 0 0 4 4 0 int 4 0 0 16 16 0 0 0",
                "2 1 slice 2 0 0 0 0 0 0 2 2 0 int 4 0 0 8 8 0 1 4",
            ],
        );
        let mut pool = open(dir.path());
        let view = pool.descriptor(ColumnId(2)).expect("view");
        assert_eq!(view.tail(), ints(&[2, 3]).as_slice());
        assert_eq!(pool.view_pins(ColumnId(1)), Some(1));
        assert_eq!(pool.refs(ColumnId(1)), Some(0));
        assert_eq!(pool.refs(ColumnId(2)), Some(0));

        assert_eq!(pool.unload(ColumnId(1), false).expect_err("parent busy").kind(), ErrorKind::Busy);
        pool.unload(ColumnId(2), true).expect("unload view");
        assert_eq!(pool.view_pins(ColumnId(1)), Some(0));
        pool.unload(ColumnId(1), false).expect("unload parent");
        assert_eq!(pool.info().loaded, 0);
    }

    #[test]
    fn out_of_range_views_are_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("1.tail"), ints(&[1, 2])).expect("tail");
        write_catalog(
            dir.path(),
            &[
                "1 1 base 1 0 0 0 0 0 0 2 2 0 int 4 0 0 8 8 0 0 0",
                "2 1 slice 2 0 0 0 0 0 0 2 2 0 int 4 0 0 8 8 0 1 4",
            ],
        );
        let mut pool = open(dir.path());
        let err = pool.fix(ColumnId(2)).expect_err("window");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert_eq!(pool.view_pins(ColumnId(1)), Some(0));
        assert_eq!(pool.refs(ColumnId(2)), Some(0));
    }

    #[test]
    fn string_columns_decode_through_the_var_heap() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut heap = StringHeap::new(false);
        let alpha = heap.put(b"alpha").expect("put");
        let beta = heap.put(b"be\"ta").expect("put");
        let tail: Vec<u8> = [alpha, beta, alpha]
            .iter()
            .flat_map(|offset| (*offset as u32).to_le_bytes())
            .collect();
        std::fs::write(dir.path().join("3.tail"), &tail).expect("tail");
        std::fs::write(dir.path().join("3.theap"), heap.as_bytes()).expect("theap");
        let record = format!(
            "3 1 words 3 0 0 0 0 0 0 3 3 0 str 4 1 0 12 12 0 0 0 {free} {free} 0 0",
            free = heap.free()
        );
        write_catalog(dir.path(), &[record.as_str()]);

        let mut pool = open(dir.path());
        let column = pool.descriptor(ColumnId(3)).expect("descriptor");
        assert_eq!(column.value_bytes(2).expect("bytes").as_ref(), b"alpha");
        assert_eq!(column.format_value(1).expect("format"), "\"be\\\"ta\"");
    }

    #[test]
    fn quick_descriptor_avoids_heap_io() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_catalog(dir.path(), &["1 1 nums 1 0 0 0 0 0 0 3 3 0 int 4 0 0 12 12 0 0 0"]);
        let mut pool = open(dir.path());
        let desc = pool.quick_descriptor(ColumnId(1), false).expect("quick");
        assert_eq!(desc.name, "nums");
        assert_eq!(pool.info().loaded, 0);
        assert_eq!(pool.find("nums"), Some(ColumnId(1)));
        assert_eq!(pool.retain(ColumnId(1)).expect("retain"), 2);
    }

    #[test]
    fn close_marks_every_slot_deleted() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_catalog(dir.path(), &["1 1 nums 1 0 0 0 0 0 0 0 0 0 int 4 0 0 0 0 0 0 0"]);
        let mut pool = open(dir.path());
        pool.fix(ColumnId(1)).expect("fix");
        pool.close();
        assert!(pool.status(ColumnId(1)).expect("status").contains(SlotStatus::DELETED));
        assert_eq!(pool.fix(ColumnId(1)).expect_err("closed").kind(), ErrorKind::NotFound);
        assert_eq!(pool.find("nums"), None);
    }
}

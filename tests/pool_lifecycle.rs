// Buffer pool behavior over farms written to temporary directories.
mod common;

use colfarm::api::{
    AtomRegistry, BufferPool, CATALOG_VERSION_MIN, ColumnId, ErrorKind, PoolOptions, SlotStatus,
    StringHeap, pool_info_json,
};
use common::{FarmBuilder, ints, lngs};

fn open(dir: &std::path::Path) -> BufferPool {
    BufferPool::open(PoolOptions::new(dir), AtomRegistry::new()).expect("open pool")
}

#[test]
fn minimal_farm_opens_without_loading() {
    let farm = FarmBuilder::new()
        .version(CATALOG_VERSION_MIN)
        .record("1 1 col 01/1 0 0 0 0 0 0 0 0 0 void 0 0 0 0 0 int 4 0 0 0 0 0 0 0")
        .build();
    let mut pool = open(farm.path());

    assert_eq!(pool.len(), 1);
    let status = pool.status(ColumnId(1)).expect("slot");
    assert!(status.contains(SlotStatus::EXISTING));
    assert!(!status.contains(SlotStatus::LOADED));
    assert_eq!(pool.info().loaded, 0);

    let desc = pool.quick_descriptor(ColumnId(1), false).expect("quick");
    assert_eq!(desc.count, 0);
    assert_eq!(desc.capacity, 0);
    assert_eq!(pool.info().loaded, 0);
    assert_eq!(pool.info().resident_bytes, 0);
}

#[test]
fn self_view_is_rejected_on_fix() {
    let farm = FarmBuilder::new()
        .record("2 1 loop 2 0 0 0 0 0 0 0 0 0 int 4 0 0 0 0 0 2 0")
        .build();
    let mut pool = open(farm.path());
    let err = pool.fix(ColumnId(2)).expect_err("self view");
    assert_eq!(err.kind(), ErrorKind::Corrupt);
    assert_eq!(pool.refs(ColumnId(2)), Some(0));
    assert!(!pool.status(ColumnId(2)).expect("slot").contains(SlotStatus::LOADED));
}

#[test]
fn storage_modes_serve_the_same_values() {
    let farm = FarmBuilder::new()
        .heap("1.tail", &lngs(&[5, -7, i64::MIN]))
        .heap("2.tail", &lngs(&[5, -7, i64::MIN]))
        .heap("3.tail", &lngs(&[5, -7, i64::MIN]))
        .record("1 1 mapped 1 0 0 0 0 0 0 3 3 0 lng 8 0 0 24 24 0 0 0")
        .record("2 1 private 2 0 0 0 0 0 0 3 3 0 lng 8 0 0 24 24 1 0 0")
        .record("3 1 owned 3 0 0 0 0 0 0 3 3 0 lng 8 0 0 24 24 2 0 0")
        .build();
    let mut pool = open(farm.path());
    for id in 1..=3 {
        let column = pool.descriptor(ColumnId(id)).expect("descriptor");
        let values: Vec<String> = (0..column.len())
            .map(|index| column.format_value(index).expect("format"))
            .collect();
        assert_eq!(values, ["5", "-7", "nil"]);
    }
    assert_eq!(pool.info().loaded, 3);
    assert_eq!(pool.info().resident_bytes, 72);
}

#[test]
fn void_columns_are_dense_sequences() {
    let farm = FarmBuilder::new()
        .record("4 1 rows 4 0 0 0 0 0 0 3 0 100 void 0 0 0 0 0 0 0 0")
        .build();
    let mut pool = open(farm.path());
    let column = pool.descriptor(ColumnId(4)).expect("descriptor");
    assert_eq!(column.format_value(0).expect("first"), "100@0");
    assert_eq!(column.format_value(2).expect("last"), "102@0");
}

#[test]
fn string_views_share_the_parent_heap() {
    let mut heap = StringHeap::new(true);
    let red = heap.put(b"red").expect("put");
    let green = heap.put("gr\u{00fc}n".as_bytes()).expect("put");
    assert_eq!(heap.put(b"red").expect("dedup"), red);
    let offsets: Vec<u8> = [red, green, red, green]
        .iter()
        .flat_map(|offset| (*offset as u32).to_le_bytes())
        .collect();
    let free = heap.free();

    let farm = FarmBuilder::new()
        .heap("5.tail", &offsets)
        .heap("5.theap", heap.as_bytes())
        .record(format!(
            "5 1 colors 5 0 0 0 0 0 0 4 4 0 str 4 1 1 16 16 0 0 0 {free} {free} 0 0"
        ))
        .record(format!(
            "6 1 tail_colors 6 0 0 0 0 0 0 2 2 0 str 4 1 1 8 8 0 5 8 {free} {free} 0 5"
        ))
        .build();
    let mut pool = open(farm.path());

    let view = pool.descriptor(ColumnId(6)).expect("view");
    assert_eq!(view.format_value(0).expect("first"), "\"red\"");
    assert_eq!(view.format_value(1).expect("second"), "\"gr\u{00fc}n\"");
    assert!(view.vheap().expect("vheap").hashash());
    assert_eq!(pool.view_pins(ColumnId(5)), Some(1));
    assert_eq!(pool.refs(ColumnId(5)), Some(0));

    pool.unload(ColumnId(6), false).expect("unload view");
    assert_eq!(pool.view_pins(ColumnId(5)), Some(0));
    let desc = pool.quick_descriptor(ColumnId(6), false).expect("cached");
    assert_eq!(desc.name, "tail_colors");
}

#[test]
fn fixed_columns_can_be_unloaded_and_reloaded() {
    let farm = FarmBuilder::new()
        .heap("1.tail", &ints(&[1, 2]))
        .record("1 1 nums 1 0 0 0 0 0 0 2 2 0 int 4 0 0 8 8 0 0 0")
        .build();
    let mut pool = open(farm.path());
    assert_eq!(pool.fix(ColumnId(1)).expect("fix"), 1);
    assert_eq!(pool.fix(ColumnId(1)).expect("fix"), 2);

    pool.unload(ColumnId(1), true).expect("unload fixed column");
    assert_eq!(pool.refs(ColumnId(1)), Some(0));
    assert!(!pool.status(ColumnId(1)).expect("slot").contains(SlotStatus::LOADED));
    assert_eq!(pool.info().resident_bytes, 0);

    let column = pool.descriptor(ColumnId(1)).expect("reload");
    assert_eq!(column.format_value(1).expect("value"), "2");
    assert!(pool.status(ColumnId(1)).expect("slot").contains(SlotStatus::LOADED));
}

#[test]
fn parents_stay_pinned_while_views_are_resident() {
    let farm = FarmBuilder::new()
        .heap("1.tail", &ints(&[1, 2, 3]))
        .record("1 1 base 1 0 0 0 0 0 0 3 3 0 int 4 0 0 12 12 0 0 0")
        .record("2 1 slice 2 0 0 0 0 0 0 2 2 0 int 4 0 0 8 8 0 1 4")
        .build();
    let mut pool = open(farm.path());
    pool.fix(ColumnId(2)).expect("fix view");
    let err = pool.unload(ColumnId(1), true).expect_err("pinned parent");
    assert_eq!(err.kind(), ErrorKind::Busy);
    assert!(pool.status(ColumnId(1)).expect("slot").contains(SlotStatus::LOADED));

    pool.unload(ColumnId(2), true).expect("unload view");
    pool.unload(ColumnId(1), true).expect("unload parent");
    assert_eq!(pool.info().loaded, 0);
}

#[test]
fn view_cycle_reports_busy_and_leaves_no_state() {
    let farm = FarmBuilder::new()
        .record("1 1 left 1 0 0 0 0 0 0 2 2 0 int 4 0 0 8 8 0 2 0")
        .record("2 1 right 2 0 0 0 0 0 0 2 2 0 int 4 0 0 8 8 0 1 0")
        .build();
    let mut pool = open(farm.path());
    let err = pool.fix(ColumnId(1)).err().expect("cycle");
    assert_eq!(err.kind(), ErrorKind::Busy);
    assert_eq!(err.id(), Some(1));

    for id in [ColumnId(1), ColumnId(2)] {
        assert_eq!(pool.refs(id), Some(0));
        assert_eq!(pool.view_pins(id), Some(0));
        let status = pool.status(id).expect("slot");
        assert!(!status.contains(SlotStatus::LOADING));
        assert!(!status.contains(SlotStatus::LOADED));
    }
    assert_eq!(pool.fix(ColumnId(2)).err().expect("cycle").kind(), ErrorKind::Busy);
}

#[test]
fn unload_then_reload_reads_fresh_bytes() {
    let farm = FarmBuilder::new()
        .heap("1.tail", &ints(&[1, 2]))
        .record("1 1 nums 1 0 0 0 0 0 0 2 2 0 int 4 0 0 8 8 2 0 0")
        .build();
    let mut pool = open(farm.path());
    assert_eq!(pool.descriptor(ColumnId(1)).expect("load").format_value(1).expect("v"), "2");
    pool.unload(ColumnId(1), true).expect("unload");
    assert!(!pool.status(ColumnId(1)).expect("slot").contains(SlotStatus::LOADED));

    std::fs::write(farm.path().join("1.tail"), ints(&[3, 4])).expect("rewrite");
    assert_eq!(pool.descriptor(ColumnId(1)).expect("reload").format_value(1).expect("v"), "4");
}

#[test]
fn short_heap_file_is_corrupt() {
    let farm = FarmBuilder::new()
        .heap("1.tail", &ints(&[1]))
        .record("1 1 nums 1 0 0 0 0 0 0 2 2 0 int 4 0 0 8 8 0 0 0")
        .build();
    let mut pool = open(farm.path());
    let err = pool.fix(ColumnId(1)).expect_err("short");
    assert_eq!(err.kind(), ErrorKind::Corrupt);
    assert_eq!(err.id(), Some(1));
}

#[test]
fn second_farm_root_is_a_usage_error() {
    let farm = FarmBuilder::new().build();
    let other = tempfile::tempdir().expect("tempdir");
    let options = PoolOptions::new(farm.path()).extra_farm(other.path());
    let err = BufferPool::open(options, AtomRegistry::new()).err().expect("two farms");
    assert_eq!(err.kind(), ErrorKind::Usage);

    let options = PoolOptions::new(farm.path()).extra_farm(farm.path());
    BufferPool::open(options, AtomRegistry::new()).expect("same farm twice");
}

#[test]
fn ids_beyond_the_slot_limit_are_capacity_errors() {
    let farm = FarmBuilder::new()
        .size_hint(4)
        .record("9 1 far 9 0 0 0 0 0 0 0 0 0 int 4 0 0 0 0 0 0 0")
        .build();
    let options = PoolOptions::new(farm.path()).max_slots(8);
    let err = BufferPool::open(options, AtomRegistry::new()).err().expect("limit");
    assert_eq!(err.kind(), ErrorKind::Capacity);

    let pool = open(farm.path());
    assert_eq!(pool.ids(), vec![ColumnId(9)]);
}

#[test]
fn dropped_pool_releases_its_catalog() {
    let farm = FarmBuilder::new()
        .record("1 1 nums 1 0 0 0 0 0 0 0 0 0 int 4 0 0 0 0 0 0 0")
        .build();
    let mut pool = open(farm.path());
    pool.fix(ColumnId(1)).expect("fix");
    pool.close();
    assert_eq!(pool.descriptor(ColumnId(1)).err().expect("closed").kind(), ErrorKind::NotFound);
    drop(pool);
    let pool = open(farm.path());
    assert_eq!(pool.refs(ColumnId(1)), Some(0));
}

#[test]
fn info_envelope_reflects_residency() {
    let farm = FarmBuilder::new()
        .heap("1.tail", &ints(&[1, 2, 3]))
        .record("1 1 nums 1 0 0 0 0 0 0 3 3 0 int 4 0 0 12 12 0 0 0")
        .record("2 1 later 2 0 0 0 0 0 0 0 0 0 timestamp 8 0 0 0 0 0 0 0")
        .build();
    let mut pool = open(farm.path());
    pool.fix(ColumnId(1)).expect("fix");
    let info = pool_info_json(&pool.info());
    assert_eq!(info["slots"]["used"], 2);
    assert_eq!(info["slots"]["loaded"], 1);
    assert_eq!(info["resident_bytes"], 12);
    assert_eq!(info["unknown_kinds"][0], "timestamp");
    assert_eq!(info["columns"][1]["kind"], "timestamp");
}

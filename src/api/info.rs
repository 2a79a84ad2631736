//! Purpose: JSON envelope for buffer pool metadata.
//! Exports: `pool_info_json`, `column_summary_json`.
//! Role: Keep the info payload shape stable for anything that prints or ships it.
//! Invariants: Stable key names and order; `farm` is omitted when no root is registered.

use serde_json::{Map, Value, json};

use crate::core::pool::{ColumnSummary, PoolInfo};

pub fn pool_info_json(info: &PoolInfo) -> Value {
    let mut map = Map::new();
    if let Some(farm) = &info.farm {
        map.insert("farm".to_string(), json!(farm.display().to_string()));
    }
    map.insert(
        "catalog".to_string(),
        json!(info.catalog.display().to_string()),
    );
    map.insert("version".to_string(), json!(info.version));
    map.insert(
        "slots".to_string(),
        json!({
            "used": info.slots,
            "capacity": info.slot_capacity,
            "loaded": info.loaded,
        }),
    );
    map.insert("resident_bytes".to_string(), json!(info.resident_bytes));
    if !info.unknown_kinds.is_empty() {
        map.insert("unknown_kinds".to_string(), json!(info.unknown_kinds));
    }
    map.insert(
        "columns".to_string(),
        Value::Array(info.columns.iter().map(column_summary_json).collect()),
    );
    Value::Object(map)
}

pub fn column_summary_json(column: &ColumnSummary) -> Value {
    json!({
        "id": column.id,
        "name": column.name,
        "kind": column.kind,
        "count": column.count,
        "status": column.status,
        "refs": {
            "physical": column.refs,
            "logical": column.lrefs,
            "views": column.view_pins,
        },
        "resident_bytes": column.resident_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::pool_info_json;
    use crate::core::pool::{ColumnSummary, PoolInfo};
    use std::path::PathBuf;

    #[test]
    fn envelope_has_stable_keys() {
        let info = PoolInfo {
            farm: None,
            catalog: PathBuf::from("/farm/BBP.dir"),
            version: "061043".to_string(),
            slots: 1,
            slot_capacity: 16384,
            loaded: 1,
            resident_bytes: 12,
            unknown_kinds: vec!["timestamp".to_string()],
            columns: vec![ColumnSummary {
                id: 1,
                name: "nums".to_string(),
                kind: "int".to_string(),
                count: 3,
                status: vec!["existing", "loaded"],
                refs: 1,
                lrefs: 1,
                view_pins: 2,
                resident_bytes: 12,
            }],
        };
        let value = pool_info_json(&info);
        assert!(value.get("farm").is_none());
        assert_eq!(value["version"], "061043");
        assert_eq!(value["slots"]["loaded"], 1);
        assert_eq!(value["unknown_kinds"][0], "timestamp");
        assert_eq!(value["columns"][0]["refs"]["physical"], 1);
        assert_eq!(value["columns"][0]["refs"]["views"], 2);
        assert_eq!(value["columns"][0]["status"][1], "loaded");
    }
}

// Helpers for building throwaway farms on disk.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use colfarm::api::{CATALOG_VERSION_MAX, NativeWidths, format_version};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}

pub struct FarmBuilder {
    pub dir: tempfile::TempDir,
    version: u32,
    widths: NativeWidths,
    size_hint: Option<usize>,
    records: Vec<String>,
}

impl FarmBuilder {
    pub fn new() -> Self {
        init_tracing();
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
            version: CATALOG_VERSION_MAX,
            widths: NativeWidths::running(),
            size_hint: None,
            records: Vec::new(),
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn widths(mut self, widths: NativeWidths) -> Self {
        self.widths = widths;
        self
    }

    pub fn size_hint(mut self, hint: usize) -> Self {
        self.size_hint = Some(hint);
        self
    }

    pub fn record(mut self, record: impl Into<String>) -> Self {
        self.records.push(record.into());
        self
    }

    pub fn heap(self, name: &str, bytes: &[u8]) -> Self {
        std::fs::write(self.dir.path().join(name), bytes).expect("write heap");
        self
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.dir.path().join("BBP.dir")
    }

    /// Writes the catalog and hands back the directory guard.
    pub fn build(self) -> tempfile::TempDir {
        let mut text = format!(
            "BBP.dir, GDKversion {}\n{} {} {}\n",
            format_version(self.version),
            self.widths.ptr,
            self.widths.oid,
            self.widths.max_int
        );
        if let Some(hint) = self.size_hint {
            text.push_str(&format!("BBPsize={hint}\n"));
        }
        for record in &self.records {
            text.push_str(record);
            text.push('\n');
        }
        std::fs::write(self.catalog_path(), text).expect("write catalog");
        self.dir
    }
}

pub fn ints(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|value| value.to_le_bytes()).collect()
}

pub fn lngs(values: &[i64]) -> Vec<u8> {
    values.iter().flat_map(|value| value.to_le_bytes()).collect()
}

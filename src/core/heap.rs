// Loading heap files into memory according to their storage mode.
use std::fs::File;
use std::io::Read;
use std::path::Path;

use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::core::column::{ColumnId, HeapDescriptor, HeapKind, StorageMode};
use crate::core::error::{Error, ErrorKind};
use crate::core::farm::io_error_kind;

#[derive(Debug)]
pub enum HeapBytes {
    /// `free == 0`; no file is opened.
    Empty,
    Mapped(Mmap),
    /// Copy-on-write mapping; writes never reach the file.
    Private(MmapMut),
    Owned(Vec<u8>),
    /// Window `[offset, offset + len)` into the parent's heap of the same kind.
    View {
        parent: ColumnId,
        offset: u64,
        len: u64,
    },
}

#[derive(Debug)]
pub struct Heap {
    kind: HeapKind,
    desc: HeapDescriptor,
    bytes: HeapBytes,
}

impl Heap {
    /// Loads the first `free` bytes of `path`; views only record their parent window.
    pub fn load(path: &Path, kind: HeapKind, desc: &HeapDescriptor) -> Result<Self, Error> {
        let bytes = match desc.parent {
            Some(parent) => HeapBytes::View {
                parent,
                offset: desc.offset,
                len: desc.free,
            },
            None if desc.free == 0 => HeapBytes::Empty,
            None => load_file(path, desc)?,
        };
        tracing::debug!(
            path = %path.display(),
            heap = kind.extension(),
            free = desc.free,
            storage = desc.storage.code(),
            view = desc.parent.is_some(),
            "loaded heap"
        );
        Ok(Self {
            kind,
            desc: *desc,
            bytes,
        })
    }

    pub fn kind(&self) -> HeapKind {
        self.kind
    }

    pub fn descriptor(&self) -> &HeapDescriptor {
        &self.desc
    }

    pub fn raw(&self) -> &HeapBytes {
        &self.bytes
    }

    /// Resident bytes; `None` for views, which resolve through their parent.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.bytes {
            HeapBytes::Empty => Some(&[]),
            HeapBytes::Mapped(map) => Some(&map[..]),
            HeapBytes::Private(map) => Some(&map[..]),
            HeapBytes::Owned(buf) => Some(buf),
            HeapBytes::View { .. } => None,
        }
    }

    pub fn view(&self) -> Option<(ColumnId, u64, u64)> {
        match self.bytes {
            HeapBytes::View {
                parent,
                offset,
                len,
            } => Some((parent, offset, len)),
            _ => None,
        }
    }

    pub fn resident_bytes(&self) -> u64 {
        self.bytes().map_or(0, |bytes| bytes.len() as u64)
    }
}

fn load_file(path: &Path, desc: &HeapDescriptor) -> Result<HeapBytes, Error> {
    let free = usize::try_from(desc.free).map_err(|_| {
        Error::new(ErrorKind::Capacity)
            .with_message(format!("heap of {} bytes does not fit in memory", desc.free))
            .with_path(path)
    })?;
    let mut file = File::open(path)
        .map_err(|err| Error::new(io_error_kind(&err)).with_path(path).with_source(err))?;
    let actual = file
        .metadata()
        .map(|meta| meta.len())
        .map_err(|err| Error::new(ErrorKind::Io).with_path(path).with_source(err))?;
    if actual < desc.free {
        return Err(Error::new(ErrorKind::Corrupt)
            .with_message(format!(
                "heap file holds {actual} bytes but the catalog records {}",
                desc.free
            ))
            .with_path(path));
    }

    let bytes = match desc.storage {
        StorageMode::Mmap => {
            let map = unsafe {
                MmapOptions::new()
                    .len(free)
                    .map(&file)
                    .map_err(|err| Error::new(ErrorKind::Io).with_path(path).with_source(err))?
            };
            HeapBytes::Mapped(map)
        }
        StorageMode::Private => {
            let map = unsafe {
                MmapOptions::new()
                    .len(free)
                    .map_copy(&file)
                    .map_err(|err| Error::new(ErrorKind::Io).with_path(path).with_source(err))?
            };
            HeapBytes::Private(map)
        }
        StorageMode::Anonymous => {
            let mut buf = Vec::new();
            buf.try_reserve_exact(free).map_err(|_| {
                Error::new(ErrorKind::Capacity)
                    .with_message(format!("cannot allocate {free} bytes for heap"))
                    .with_path(path)
            })?;
            buf.resize(free, 0);
            file.read_exact(&mut buf)
                .map_err(|err| Error::new(ErrorKind::Io).with_path(path).with_source(err))?;
            HeapBytes::Owned(buf)
        }
    };
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::{Heap, HeapBytes};
    use crate::core::column::{ColumnId, HeapDescriptor, HeapKind, StorageMode};
    use crate::core::error::ErrorKind;

    fn desc(free: u64, storage: StorageMode) -> HeapDescriptor {
        HeapDescriptor {
            free,
            size: free,
            storage,
            parent: None,
            offset: 0,
            hashash: false,
            shared_hash: false,
        }
    }

    #[test]
    fn every_storage_mode_loads_the_free_prefix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("c.tail");
        std::fs::write(&path, [1u8, 2, 3, 4, 5, 6, 7, 8, 9]).expect("write");
        for storage in [StorageMode::Mmap, StorageMode::Private, StorageMode::Anonymous] {
            let heap = Heap::load(&path, HeapKind::Tail, &desc(8, storage)).expect("load");
            assert_eq!(heap.bytes(), Some(&[1u8, 2, 3, 4, 5, 6, 7, 8][..]));
            assert_eq!(heap.resident_bytes(), 8);
        }
    }

    #[test]
    fn empty_heaps_do_not_touch_the_filesystem() {
        let dir = tempfile::tempdir().expect("tempdir");
        let heap = Heap::load(&dir.path().join("absent.tail"), HeapKind::Tail, &desc(0, StorageMode::Mmap))
            .expect("empty");
        assert!(matches!(heap.raw(), HeapBytes::Empty));
        assert_eq!(heap.bytes(), Some(&[][..]));
    }

    #[test]
    fn short_and_missing_files_fail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("c.tail");
        std::fs::write(&path, [0u8; 4]).expect("write");
        let err = Heap::load(&path, HeapKind::Tail, &desc(8, StorageMode::Mmap)).expect_err("short");
        assert_eq!(err.kind(), ErrorKind::Corrupt);

        let err = Heap::load(&dir.path().join("none.tail"), HeapKind::Tail, &desc(8, StorageMode::Mmap))
            .expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn views_record_the_parent_window() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut view = desc(4, StorageMode::Mmap);
        view.parent = Some(ColumnId(3));
        view.offset = 8;
        let heap = Heap::load(&dir.path().join("absent.tail"), HeapKind::Tail, &view).expect("view");
        assert_eq!(heap.view(), Some((ColumnId(3), 8, 4)));
        assert_eq!(heap.bytes(), None);
        assert_eq!(heap.resident_bytes(), 0);
    }
}

// Storage root registration and advisory catalog locking.
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use libc::{EACCES, EPERM};

use crate::core::column::{ColumnDescriptor, HeapKind};
use crate::core::error::{Error, ErrorKind};

/// The single directory holding the catalog and every heap file.
#[derive(Debug, Default)]
pub struct Farm {
    root: Option<PathBuf>,
}

impl Farm {
    pub fn new() -> Self {
        Self::default()
    }

    /// First root wins; registering the same directory again is a no-op.
    pub fn register(&mut self, path: impl AsRef<Path>) -> Result<&Path, Error> {
        let path = path.as_ref();
        let meta = std::fs::metadata(path)
            .map_err(|err| Error::new(io_error_kind(&err)).with_path(path).with_source(err))?;
        if !meta.is_dir() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("farm root is not a directory")
                .with_path(path));
        }
        let canonical = path
            .canonicalize()
            .map_err(|err| Error::new(io_error_kind(&err)).with_path(path).with_source(err))?;
        if let Some(root) = &self.root {
            if *root != canonical {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!(
                        "only one farm is supported; already using {}",
                        root.display()
                    ))
                    .with_path(path));
            }
        } else {
            tracing::debug!(farm = %canonical.display(), "registered farm");
            self.root = Some(canonical);
        }
        self.root()
    }

    pub fn root(&self) -> Result<&Path, Error> {
        self.root
            .as_deref()
            .ok_or_else(|| Error::new(ErrorKind::Usage).with_message("no farm registered"))
    }

    pub fn path(&self, name: &str) -> Result<PathBuf, Error> {
        Ok(self.root()?.join(name))
    }

    pub fn heap_path(&self, desc: &ColumnDescriptor, kind: HeapKind) -> Result<PathBuf, Error> {
        self.path(&desc.heap_file_name(kind))
    }
}

/// Shared advisory lock held while the catalog is read; writers hold it exclusively.
pub struct SharedLock<'a> {
    file: &'a File,
}

impl<'a> SharedLock<'a> {
    pub fn acquire(file: &'a File, path: &Path) -> Result<Self, Error> {
        FileExt::try_lock_shared(file).map_err(|err| {
            Error::new(lock_error_kind(&err))
                .with_message("catalog is locked by a writer")
                .with_path(path)
                .with_source(err)
        })?;
        Ok(Self { file })
    }
}

impl Drop for SharedLock<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(self.file);
    }
}

fn lock_error_kind(err: &io::Error) -> ErrorKind {
    let errno = err.raw_os_error().unwrap_or_default();
    if errno == EACCES || errno == EPERM {
        return ErrorKind::Permission;
    }
    match err.kind() {
        io::ErrorKind::WouldBlock => ErrorKind::Busy,
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    }
}

pub(crate) fn io_error_kind(err: &io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    }
}

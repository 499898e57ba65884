//! Filesystem capability consumed by the explorer and the sync engine.
//!
//! Callers build one implementation at startup and hand it around as
//! `Arc<dyn FileSystem>`; tests swap in `MemFs` (feature `test-util`).

#[cfg(any(test, feature = "test-util"))]
mod mem;
mod os;

#[cfg(any(test, feature = "test-util"))]
pub use mem::MemFs;
pub use os::OsFs;

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct FsMetadata {
    pub is_dir: bool,
    pub len: u64,
    pub modified: SystemTime,
    /// Birth time where the platform records one.
    pub created: Option<SystemTime>,
    /// Unix permission bits, when available.
    pub mode: Option<u32>,
    pub readonly: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
}

pub trait FileSystem: Send + Sync {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Creates or truncates `path`. The parent directory must exist.
    fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>>;

    fn metadata(&self, path: &Path) -> io::Result<FsMetadata>;

    /// Immediate children of `path`, sorted by name.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<FsEntry>>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Resolved form of `path` with symlinks followed. Two paths naming the
    /// same directory canonicalize to the same value.
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        Ok(path.to_path_buf())
    }
}

/// Renders permission bits the way `ls -l` does, e.g. `drwxr-xr-x`.
pub fn permission_string(meta: &FsMetadata) -> String {
    let mode = meta.mode.unwrap_or_else(|| {
        let base = if meta.readonly { 0o444 } else { 0o644 };
        if meta.is_dir {
            base | 0o111
        } else {
            base
        }
    });
    let mut out = String::with_capacity(10);
    out.push(if meta.is_dir { 'd' } else { '-' });
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(is_dir: bool, mode: Option<u32>) -> FsMetadata {
        FsMetadata {
            is_dir,
            len: 0,
            modified: SystemTime::UNIX_EPOCH,
            created: None,
            mode,
            readonly: false,
        }
    }

    #[test]
    fn renders_unix_modes() {
        assert_eq!(permission_string(&meta(true, Some(0o755))), "drwxr-xr-x");
        assert_eq!(permission_string(&meta(false, Some(0o640))), "-rw-r-----");
    }

    #[test]
    fn falls_back_without_mode_bits() {
        assert_eq!(permission_string(&meta(false, None)), "-rw-r--r--");
        assert_eq!(permission_string(&meta(true, None)), "drwxr-xr-x");
    }
}

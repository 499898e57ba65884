use super::{FileSystem, FsEntry, FsMetadata};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

#[derive(Debug, Clone)]
enum Node {
    Dir { modified: SystemTime },
    File { data: Vec<u8>, modified: SystemTime },
}

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<PathBuf, Node>,
    denied: BTreeSet<PathBuf>,
    unreadable: BTreeSet<PathBuf>,
}

/// In-memory filesystem for tests. Clones share the same tree.
#[derive(Debug, Clone)]
pub struct MemFs {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    pub fn new() -> Self {
        let mut inner = Inner::default();
        inner.nodes.insert(
            PathBuf::from("/"),
            Node::Dir {
                modified: SystemTime::now(),
            },
        );
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn mkdir_all(&self, path: impl AsRef<Path>) {
        let mut inner = self.lock();
        for dir in path.as_ref().ancestors() {
            if dir.as_os_str().is_empty() {
                continue;
            }
            inner.nodes.entry(dir.to_path_buf()).or_insert(Node::Dir {
                modified: SystemTime::now(),
            });
        }
    }

    /// Writes a file, creating missing parent directories.
    pub fn write(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.mkdir_all(parent);
        }
        self.lock().nodes.insert(
            path.to_path_buf(),
            Node::File {
                data: data.into(),
                modified: SystemTime::now(),
            },
        );
    }

    pub fn read(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.lock().nodes.get(path.as_ref()) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.lock().nodes.contains_key(path.as_ref())
    }

    /// Every later operation on `path` fails with `PermissionDenied`.
    pub fn deny(&self, path: impl AsRef<Path>) {
        self.lock().denied.insert(path.as_ref().to_path_buf());
    }

    /// Opening `path` for reading fails with `PermissionDenied`; its metadata
    /// stays visible.
    pub fn deny_open(&self, path: impl AsRef<Path>) {
        self.lock().unreadable.insert(path.as_ref().to_path_buf());
    }

    /// Number of regular files below `dir` (any depth).
    pub fn file_count(&self, dir: impl AsRef<Path>) -> usize {
        let dir = dir.as_ref();
        self.lock()
            .nodes
            .iter()
            .filter(|(p, n)| matches!(n, Node::File { .. }) && p.starts_with(dir))
            .count()
    }
}

fn check(inner: &Inner, path: &Path) -> io::Result<()> {
    if inner.denied.contains(path) {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("permission denied: {}", path.display()),
        ));
    }
    Ok(())
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

impl FileSystem for MemFs {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let inner = self.lock();
        check(&inner, path)?;
        if inner.unreadable.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("permission denied: {}", path.display()),
            ));
        }
        match inner.nodes.get(path) {
            Some(Node::File { data, .. }) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(Node::Dir { .. }) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("is a directory: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        let mut inner = self.lock();
        check(&inner, path)?;
        let parent = path.parent().ok_or_else(|| not_found(path))?;
        check(&inner, parent)?;
        if !matches!(inner.nodes.get(parent), Some(Node::Dir { .. })) {
            return Err(not_found(parent));
        }
        if matches!(inner.nodes.get(path), Some(Node::Dir { .. })) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("is a directory: {}", path.display()),
            ));
        }
        inner.nodes.insert(
            path.to_path_buf(),
            Node::File {
                data: Vec::new(),
                modified: SystemTime::now(),
            },
        );
        Ok(Box::new(MemWriter {
            fs: self.clone(),
            path: path.to_path_buf(),
            buf: Vec::new(),
        }))
    }

    fn metadata(&self, path: &Path) -> io::Result<FsMetadata> {
        let inner = self.lock();
        check(&inner, path)?;
        match inner.nodes.get(path) {
            Some(Node::Dir { modified }) => Ok(FsMetadata {
                is_dir: true,
                len: 0,
                modified: *modified,
                created: Some(*modified),
                mode: Some(0o755),
                readonly: false,
            }),
            Some(Node::File { data, modified }) => Ok(FsMetadata {
                is_dir: false,
                len: data.len() as u64,
                modified: *modified,
                created: Some(*modified),
                mode: Some(0o644),
                readonly: false,
            }),
            None => Err(not_found(path)),
        }
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<FsEntry>> {
        let inner = self.lock();
        check(&inner, path)?;
        match inner.nodes.get(path) {
            Some(Node::Dir { .. }) => {}
            Some(Node::File { .. }) => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("not a directory: {}", path.display()),
                ))
            }
            None => return Err(not_found(path)),
        }
        let mut entries: Vec<FsEntry> = inner
            .nodes
            .iter()
            .filter(|(p, _)| p.parent() == Some(path))
            .filter_map(|(p, node)| {
                let name = p.file_name()?.to_string_lossy().into_owned();
                Some(FsEntry {
                    name,
                    path: p.clone(),
                    is_dir: matches!(node, Node::Dir { .. }),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut inner = self.lock();
        check(&inner, from)?;
        check(&inner, to)?;
        if !inner.nodes.contains_key(from) {
            return Err(not_found(from));
        }
        let moved: Vec<PathBuf> = inner
            .nodes
            .keys()
            .filter(|p| p.starts_with(from))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = inner.nodes.remove(&old) {
                let suffix = old.strip_prefix(from).unwrap_or(Path::new(""));
                let new = if suffix.as_os_str().is_empty() {
                    to.to_path_buf()
                } else {
                    to.join(suffix)
                };
                inner.nodes.insert(new, node);
            }
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut inner = self.lock();
        check(&inner, path)?;
        match inner.nodes.get(path) {
            Some(Node::File { .. }) => {
                inner.nodes.remove(path);
                Ok(())
            }
            Some(Node::Dir { .. }) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("is a directory: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }
}

struct MemWriter {
    fs: MemFs,
    path: PathBuf,
    buf: Vec<u8>,
}

impl MemWriter {
    fn commit(&self) {
        let mut inner = self.fs.lock();
        inner.nodes.insert(
            self.path.clone(),
            Node::File {
                data: self.buf.clone(),
                modified: SystemTime::now(),
            },
        );
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.commit();
        Ok(())
    }
}

impl Drop for MemWriter {
    fn drop(&mut self) {
        self.commit();
    }
}

//! Walks a directory tree to a bounded depth and applies the listing filters.
//!
//! Filters per entry, in order:
//! 1. hidden names (leading `.`) are dropped unless `show_hidden`;
//! 2. names matching an `exclude` glob are dropped, directories with their
//!    whole subtree;
//! 3. files must match one `include` glob (when any are given) and then the
//!    regex (when one is given).
//!
//! Directories that pass 1-2 are always descended into, but once include or
//! regex filtering is active they are left out of the result.

use crate::error::ExploreError;
use crate::fs::{permission_string, FileSystem, FsEntry};
use crate::mime;
use crate::models::{EntryInfo, FileInfo};
use chrono::{DateTime, Utc};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    /// Levels below the root to list; the root's children are level 1.
    /// `0` lists the root level only, negative values mean unlimited.
    pub depth: i32,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub regex_pattern: Option<String>,
    pub show_hidden: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            depth: 1,
            include: Vec::new(),
            exclude: Vec::new(),
            regex_pattern: None,
            show_hidden: false,
        }
    }
}

impl ListOptions {
    pub fn max_level(&self) -> Option<usize> {
        match self.depth {
            d if d < 0 => None,
            0 => Some(1),
            d => Some(d as usize),
        }
    }
}

struct Filters {
    show_hidden: bool,
    exclude: GlobSet,
    include: Option<GlobSet>,
    regex: Option<Regex>,
}

impl Filters {
    fn compile(options: &ListOptions) -> Result<Self, ExploreError> {
        let regex = match options.regex_pattern.as_deref().filter(|p| !p.is_empty()) {
            Some(pattern) => Some(
                Regex::new(pattern).map_err(|e| ExploreError::PatternInvalid(e.to_string()))?,
            ),
            None => None,
        };
        let exclude = build_globset(&options.exclude)?;
        let include = if options.include.is_empty() {
            None
        } else {
            Some(build_globset(&options.include)?)
        };
        Ok(Self {
            show_hidden: options.show_hidden,
            exclude,
            include,
            regex,
        })
    }

    fn admits(&self, name: &str) -> bool {
        if !self.show_hidden && is_hidden(name) {
            return false;
        }
        !self.exclude.is_match(name)
    }

    fn admits_file(&self, name: &str) -> bool {
        if let Some(include) = &self.include {
            if !include.is_match(name) {
                return false;
            }
        }
        self.regex.as_ref().map_or(true, |re| re.is_match(name))
    }

    /// Include/regex mode finds files; directories are only traversed.
    fn finds_files_only(&self) -> bool {
        self.include.is_some() || self.regex.is_some()
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, ExploreError> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = GlobBuilder::new(pat)
            .literal_separator(true)
            .build()
            .map_err(|e| ExploreError::PatternInvalid(e.to_string()))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| ExploreError::PatternInvalid(e.to_string()))
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

pub fn list(
    fs: &dyn FileSystem,
    root: impl AsRef<Path>,
    options: &ListOptions,
) -> Result<Vec<FileInfo>, ExploreError> {
    let root = root.as_ref();
    if root.as_os_str().is_empty() {
        return Err(ExploreError::InvalidPath);
    }
    let filters = Filters::compile(options)?;
    let entries = fs
        .read_dir(root)
        .map_err(|e| ExploreError::from_io(root, e))?;

    let mut out = Vec::new();
    let mut ancestors = vec![fs
        .canonicalize(root)
        .map_err(|e| ExploreError::from_io(root, e))?];
    let mut walker = Walker {
        fs,
        max_level: options.max_level(),
        filters: &filters,
        ancestors: &mut ancestors,
        out: &mut out,
    };
    walker.walk(entries, 1);
    debug!(root = %root.display(), count = out.len(), "listed directory");
    Ok(out)
}

struct Walker<'a> {
    fs: &'a dyn FileSystem,
    max_level: Option<usize>,
    filters: &'a Filters,
    /// Canonical paths of the directories on the current descent path.
    ancestors: &'a mut Vec<PathBuf>,
    out: &'a mut Vec<FileInfo>,
}

impl Walker<'_> {
    fn walk(&mut self, entries: Vec<FsEntry>, level: usize) {
        for entry in entries {
            if !self.filters.admits(&entry.name) {
                continue;
            }
            if !entry.is_dir && !self.filters.admits_file(&entry.name) {
                continue;
            }

            if !(entry.is_dir && self.filters.finds_files_only()) {
                match file_info(self.fs, &entry) {
                    Ok(info) => self.out.push(info),
                    Err(e) => {
                        warn!(path = %entry.path.display(), error = %e, "skipping unreadable entry");
                        continue;
                    }
                }
            }

            if entry.is_dir && self.max_level.map_or(true, |max| level < max) {
                self.descend(&entry, level);
            }
        }
    }

    fn descend(&mut self, entry: &FsEntry, level: usize) {
        let real = match self.fs.canonicalize(&entry.path) {
            Ok(real) => real,
            Err(e) => {
                warn!(path = %entry.path.display(), error = %e, "skipping unresolvable directory");
                return;
            }
        };
        // A directory already on the descent path is reached through a link cycle.
        if self.ancestors.contains(&real) {
            warn!(path = %entry.path.display(), target = %real.display(), "not following directory loop");
            return;
        }
        match self.fs.read_dir(&entry.path) {
            Ok(children) => {
                self.ancestors.push(real);
                self.walk(children, level + 1);
                self.ancestors.pop();
            }
            Err(e) => {
                warn!(path = %entry.path.display(), error = %e, "skipping unreadable directory")
            }
        }
    }
}

fn file_info(fs: &dyn FileSystem, entry: &FsEntry) -> std::io::Result<FileInfo> {
    let meta = fs.metadata(&entry.path)?;
    let mod_time: DateTime<Utc> = meta.modified.into();
    let create_time = meta.created.map(DateTime::<Utc>::from).unwrap_or(mod_time);
    let mime_type = if meta.is_dir {
        None
    } else {
        mime::detect(fs, &entry.path).ok()
    };
    Ok(FileInfo {
        name: entry.name.clone(),
        path: entry.path.to_string_lossy().into_owned(),
        size: meta.len,
        is_directory: meta.is_dir,
        mod_time,
        create_time,
        permissions: permission_string(&meta),
        mime_type,
    })
}

/// Immediate children of `dir`, unfiltered.
pub fn list_children(
    fs: &dyn FileSystem,
    dir: impl AsRef<Path>,
) -> Result<Vec<EntryInfo>, ExploreError> {
    let dir = dir.as_ref();
    if dir.as_os_str().is_empty() {
        return Err(ExploreError::InvalidPath);
    }
    let entries = fs.read_dir(dir).map_err(|e| ExploreError::from_io(dir, e))?;
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let meta = match fs.metadata(&entry.path) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %entry.path.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        out.push(EntryInfo {
            name: entry.name,
            path: entry.path.to_string_lossy().into_owned(),
            is_dir: entry.is_dir,
            size: meta.len,
            mod_time: meta.modified.into(),
        });
    }
    Ok(out)
}

//! Entry Builder: constructs the header tree for one archive
//!
//! `Filesystem` owns the tree and the running byte-offset counter for the
//! archive's data region. Insertions resolve nodes by archive path
//! (auto-vivifying missing directories), fill in entry attributes, and
//! reserve offsets so that packed file byte ranges tile the data region
//! from 0 with no gaps.

use crate::error::HeaderError;
use crate::header::node::{DirectoryEntry, FileEntry, LinkEntry, Node, MAX_FILE_SIZE};
use crate::header::path;
use crate::integrity::{Blake3Provider, IntegrityProvider};
use crate::transform::{self, ContentTransform};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// Stat fields the builder needs from a source file
#[derive(Debug, Clone, Copy)]
pub struct FileStat {
    pub size: u64,
    pub mode: u32,
}

impl FileStat {
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            metadata.permissions().mode()
        };
        #[cfg(not(unix))]
        let mode = 0;

        Self {
            size: metadata.len(),
            mode,
        }
    }
}

/// Per-insertion options
#[derive(Default)]
pub struct InsertOptions {
    /// Optional content rewrite applied before sizing packed files
    pub transform: Option<Arc<dyn ContentTransform>>,
}

/// Mutable construction state: the tree and the running byte counter.
///
/// Kept behind one lock so offset reservation and counter advance form a
/// single critical section with respect to concurrent insertions.
pub(crate) struct State {
    pub(crate) header: DirectoryEntry,
    pub(crate) offset: u64,
}

/// Header index for a single archive rooted at a source directory
pub struct Filesystem {
    pub(crate) root: PathBuf,
    pub(crate) provider: Arc<dyn IntegrityProvider>,
    pub(crate) state: Mutex<State>,
}

impl Filesystem {
    /// Create an empty header for the archive rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            provider: Arc::new(Blake3Provider),
            state: Mutex::new(State {
                header: DirectoryEntry::default(),
                offset: 0,
            }),
        }
    }

    /// Replace the integrity provider
    pub fn with_provider(mut self, provider: Arc<dyn IntegrityProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Archive root on the source filesystem
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Total bytes reserved in the data region so far
    pub fn data_size(&self) -> u64 {
        self.state.lock().offset
    }

    /// Snapshot of the completed header tree
    pub fn header(&self) -> DirectoryEntry {
        self.state.lock().header.clone()
    }

    /// Serialize the header payload (`{ "files": { ... } }`)
    pub fn header_json(&self) -> Result<String, HeaderError> {
        let header = self.header();
        Ok(serde_json::to_string(&header)?)
    }

    /// Insert a directory, creating intermediate directories as needed.
    ///
    /// Marking `should_unpack` makes every file later inserted beneath it
    /// unpacked, regardless of the per-file flag.
    pub fn insert_directory(&self, p: &Path, should_unpack: bool) {
        let segments = path::split_archive_path(&self.root, p);
        let mut state = self.state.lock();
        let dir = dir_mut(&mut state.header, &segments);
        if should_unpack {
            dir.unpacked = true;
        }
        trace!(path = %p.display(), unpacked = dir.unpacked, "Inserted directory");
    }

    /// Insert a file entry.
    ///
    /// Unpacked files (per-call flag or parent-directory intent) record
    /// size and integrity only. Packed files are optionally transformed,
    /// size-checked against the format's 32-bit limit, and assigned the
    /// next offset in the data region.
    #[instrument(skip(self, stat, options), fields(path = %p.display()))]
    pub async fn insert_file(
        &self,
        p: &Path,
        should_unpack: bool,
        stat: &FileStat,
        options: &InsertOptions,
    ) -> Result<(), HeaderError> {
        let segments = path::split_archive_path(&self.root, p);
        let (name, dir_segments) = match segments.split_last() {
            Some((name, dirs)) => (name.clone(), dirs.to_vec()),
            None => {
                return Err(HeaderError::InvalidPath(
                    "cannot insert a file at the archive root".to_string(),
                ))
            }
        };

        // Vivify the parent early so its unpacked intent is visible, then
        // release the lock before any I/O.
        let dir_unpacked = {
            let mut state = self.state.lock();
            dir_mut(&mut state.header, &dir_segments).unpacked
        };

        if should_unpack || dir_unpacked {
            let integrity = self.provider.digest(p).await?;
            let entry = FileEntry {
                size: stat.size,
                offset: None,
                integrity: Some(integrity),
                executable: false,
                unpacked: true,
                staging: None,
            };
            let mut state = self.state.lock();
            let dir = dir_mut(&mut state.header, &dir_segments);
            dir.files.insert(name, Node::File(entry));
            debug!(size = stat.size, "Inserted unpacked file");
            return Ok(());
        }

        let (size, staging) = match options
            .transform
            .as_ref()
            .and_then(|transform| transform.transformer(p))
        {
            Some(transformer) => {
                let staged = transform::stage(p, transformer).await?;
                (staged.size, Some(staged.path))
            }
            None => (stat.size, None),
        };

        if size > MAX_FILE_SIZE {
            return Err(HeaderError::OversizeFile {
                path: p.to_path_buf(),
                size,
            });
        }

        // Digest the original source, not the transformed bytes.
        let integrity = self.provider.digest(p).await?;
        let executable = !cfg!(windows) && (stat.mode & 0o100) != 0;

        let mut entry = FileEntry {
            size,
            offset: None,
            integrity: Some(integrity),
            executable,
            unpacked: false,
            staging,
        };

        // Offset reservation and counter advance are one critical section:
        // the recorded offset is the counter value before this file's bytes.
        let mut state = self.state.lock();
        entry.offset = Some(state.offset);
        state.offset += size;
        let offset = entry.offset;
        let dir = dir_mut(&mut state.header, &dir_segments);
        dir.files.insert(name, Node::File(entry));
        drop(state);

        debug!(size, offset = offset.unwrap_or(0), "Inserted packed file");
        Ok(())
    }

    /// Insert a symlink entry.
    ///
    /// The link target is resolved against the canonical archive root; a
    /// target outside the root is rejected. Returns the stored
    /// root-relative, `/`-separated target.
    #[instrument(skip(self), fields(path = %p.display()))]
    pub fn insert_link(&self, p: &Path) -> Result<String, HeaderError> {
        let target = std::fs::read_link(p)?;
        let parent = dunce::canonicalize(p.parent().unwrap_or_else(|| Path::new(".")))?;
        let real_root = dunce::canonicalize(&self.root)?;

        // Dereference symlinks inside the target path itself, so a target
        // routing through a symlinked directory cannot smuggle the link
        // outside the root. Dangling targets fall back to a lexical
        // collapse of the joined path.
        let joined = parent.join(&target);
        let resolved = match dunce::canonicalize(&joined) {
            Ok(real) => real,
            Err(_) => path::lexical_resolve(&joined),
        };
        let relative = resolved
            .strip_prefix(&real_root)
            .map_err(|_| HeaderError::SymlinkEscape {
                path: p.to_path_buf(),
                target: resolved.clone(),
            })?;
        let link_segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let link = path::join_display(&link_segments);

        let segments = path::split_archive_path(&self.root, p);
        let (name, dir_segments) = match segments.split_last() {
            Some((name, dirs)) => (name.clone(), dirs.to_vec()),
            None => {
                return Err(HeaderError::InvalidPath(
                    "cannot insert a link at the archive root".to_string(),
                ))
            }
        };

        let mut state = self.state.lock();
        let dir = dir_mut(&mut state.header, &dir_segments);
        dir.files
            .insert(name, Node::Link(LinkEntry { link: link.clone() }));
        drop(state);

        debug!(link = %link, "Inserted symlink");
        Ok(link)
    }
}

/// Walk `segments` from `dir`, auto-vivifying missing directories, and
/// return the terminal directory. A non-directory node in the way is
/// replaced by an empty directory.
pub(crate) fn dir_mut<'a>(
    dir: &'a mut DirectoryEntry,
    segments: &[String],
) -> &'a mut DirectoryEntry {
    match segments.split_first() {
        None => dir,
        Some((name, rest)) => {
            let child = dir
                .files
                .entry(name.clone())
                .or_insert_with(Node::directory);
            if !child.is_directory() {
                *child = Node::directory();
            }
            match child {
                Node::Directory(next) => dir_mut(next, rest),
                _ => unreachable!("child was just made a directory"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    async fn insert(fs_index: &Filesystem, path: &Path, unpack: bool) {
        let stat = FileStat::from_metadata(&fs::metadata(path).unwrap());
        fs_index
            .insert_file(path, unpack, &stat, &InsertOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_packed_offsets_tile_from_zero() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        fs::write(root.join("a.txt"), "aaaa").unwrap();
        fs::write(root.join("b.txt"), "bb").unwrap();
        fs::write(root.join("c.txt"), "ccccc").unwrap();

        let fs_index = Filesystem::new(&root);
        insert(&fs_index, &root.join("a.txt"), false).await;
        insert(&fs_index, &root.join("b.txt"), false).await;
        insert(&fs_index, &root.join("c.txt"), false).await;

        let header = fs_index.header();
        let offset = |name: &str| header.files[name].as_file().unwrap().offset.unwrap();
        assert_eq!(offset("a.txt"), 0);
        assert_eq!(offset("b.txt"), 4);
        assert_eq!(offset("c.txt"), 6);
        assert_eq!(fs_index.data_size(), 11);
    }

    #[tokio::test]
    async fn test_unpacked_file_has_no_offset() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        fs::write(root.join("a.txt"), "aaaa").unwrap();

        let fs_index = Filesystem::new(&root);
        insert(&fs_index, &root.join("a.txt"), true).await;

        let header = fs_index.header();
        let file = header.files["a.txt"].as_file().unwrap();
        assert!(file.unpacked);
        assert_eq!(file.offset, None);
        assert!(file.integrity.is_some());
        assert_eq!(fs_index.data_size(), 0);
    }

    #[tokio::test]
    async fn test_unpacked_directory_dominates_per_call_flag() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        fs::create_dir(root.join("native")).unwrap();
        fs::write(root.join("native").join("mod.node"), "binary").unwrap();

        let fs_index = Filesystem::new(&root);
        fs_index.insert_directory(&root.join("native"), true);
        insert(&fs_index, &root.join("native").join("mod.node"), false).await;

        let header = fs_index.header();
        let native = header.files["native"].as_directory().unwrap();
        assert!(native.unpacked);
        let file = native.files["mod.node"].as_file().unwrap();
        assert!(file.unpacked);
        assert_eq!(file.offset, None);
    }

    #[tokio::test]
    async fn test_oversize_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        fs::write(root.join("big.bin"), "stub").unwrap();

        let fs_index = Filesystem::new(&root);
        let stat = FileStat {
            size: MAX_FILE_SIZE + 1,
            mode: 0o644,
        };
        let result = fs_index
            .insert_file(&root.join("big.bin"), false, &stat, &InsertOptions::default())
            .await;
        assert!(matches!(result, Err(HeaderError::OversizeFile { .. })));
    }

    #[tokio::test]
    async fn test_size_at_limit_is_accepted() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        fs::write(root.join("big.bin"), "stub").unwrap();

        let fs_index = Filesystem::new(&root);
        let stat = FileStat {
            size: MAX_FILE_SIZE,
            mode: 0o644,
        };
        fs_index
            .insert_file(&root.join("big.bin"), false, &stat, &InsertOptions::default())
            .await
            .unwrap();
        assert_eq!(fs_index.data_size(), MAX_FILE_SIZE);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_executable_bit_is_recorded() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        let script = root.join("run.sh");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let fs_index = Filesystem::new(&root);
        insert(&fs_index, &script, false).await;

        let header = fs_index.header();
        assert!(header.files["run.sh"].as_file().unwrap().executable);
    }

    #[tokio::test]
    async fn test_intermediate_directories_are_vivified() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        fs::create_dir_all(root.join("a").join("b")).unwrap();
        fs::write(root.join("a").join("b").join("c.txt"), "x").unwrap();

        let fs_index = Filesystem::new(&root);
        insert(&fs_index, &root.join("a").join("b").join("c.txt"), false).await;

        let header = fs_index.header();
        let a = header.files["a"].as_directory().unwrap();
        let b = a.files["b"].as_directory().unwrap();
        assert!(b.files["c.txt"].as_file().is_some());
    }

    #[tokio::test]
    async fn test_reinsertion_replaces_entry_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        fs::write(root.join("a.txt"), "aaaa").unwrap();
        fs::write(root.join("b.txt"), "bb").unwrap();

        let fs_index = Filesystem::new(&root);
        insert(&fs_index, &root.join("a.txt"), false).await;
        insert(&fs_index, &root.join("b.txt"), false).await;
        insert(&fs_index, &root.join("a.txt"), false).await;

        let header = fs_index.header();
        let names: Vec<&String> = header.files.keys().collect();
        assert_eq!(names, ["a.txt", "b.txt"]);
        // Re-insertion consumed a fresh offset for the replacement entry.
        assert_eq!(header.files["a.txt"].as_file().unwrap().offset, Some(6));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_insert_link_within_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        fs::write(root.join("target.txt"), "t").unwrap();
        std::os::unix::fs::symlink("target.txt", root.join("alias")).unwrap();

        let fs_index = Filesystem::new(&root);
        let link = fs_index.insert_link(&root.join("alias")).unwrap();

        assert_eq!(link, "target.txt");
        let header = fs_index.header();
        assert_eq!(header.files["alias"].as_link().unwrap().link, "target.txt");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_insert_link_nested_target() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("sub").join("target.txt"), "t").unwrap();
        std::os::unix::fs::symlink("sub/target.txt", root.join("alias")).unwrap();

        let fs_index = Filesystem::new(&root);
        let link = fs_index.insert_link(&root.join("alias")).unwrap();
        assert_eq!(link, "sub/target.txt");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_insert_link_escaping_root_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let outside = temp_dir.path().join("outside.txt");
        fs::write(&outside, "o").unwrap();
        let root = temp_dir.path().join("root");
        fs::create_dir(&root).unwrap();
        std::os::unix::fs::symlink("../outside.txt", root.join("escape")).unwrap();

        let fs_index = Filesystem::new(&root);
        let result = fs_index.insert_link(&root.join("escape"));
        assert!(matches!(result, Err(HeaderError::SymlinkEscape { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_insert_link_through_symlinked_directory_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let outside = temp_dir.path().join("outside");
        fs::create_dir(&outside).unwrap();
        fs::write(outside.join("secret.txt"), "s").unwrap();
        let root = temp_dir.path().join("root");
        fs::create_dir(&root).unwrap();
        // The target has no `..` segment of its own; it escapes through a
        // symlinked directory inside the root.
        std::os::unix::fs::symlink("../outside", root.join("sub")).unwrap();
        std::os::unix::fs::symlink("sub/secret.txt", root.join("leak")).unwrap();

        let fs_index = Filesystem::new(&root);
        let result = fs_index.insert_link(&root.join("leak"));
        assert!(matches!(result, Err(HeaderError::SymlinkEscape { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_insert_link_dangling_target_within_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        std::os::unix::fs::symlink("missing.txt", root.join("alias")).unwrap();

        let fs_index = Filesystem::new(&root);
        let link = fs_index.insert_link(&root.join("alias")).unwrap();
        assert_eq!(link, "missing.txt");
    }
}

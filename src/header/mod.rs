//! Archive header tree
//!
//! Builds and queries the in-memory index describing a single-file
//! archive: directories, files, symlinks and unpacked entries, with
//! sizes, data-region offsets and integrity digests.

pub mod builder;
pub mod lookup;
pub mod node;
pub mod path;
pub mod walker;

pub use builder::{FileStat, Filesystem, InsertOptions};
pub use node::{DirectoryEntry, FileEntry, LinkEntry, Node, MAX_FILE_SIZE};
pub use walker::ListOptions;

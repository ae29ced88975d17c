//! Packfs: header index engine for single-file archives
//!
//! Builds the metadata tree ("header") describing an archive's contents:
//! directories, files, symlinks and unpacked entries annotated with size,
//! byte offset into the concatenated-data region, content-integrity
//! digest, executable bit and link target. An external writer serializes
//! the header next to the concatenated file bytes; this crate only
//! constructs and validates the index.

pub mod error;
pub mod header;
pub mod integrity;
pub mod logging;
pub mod transform;

pub use error::{ConfigError, HeaderError};
pub use header::{
    DirectoryEntry, FileEntry, FileStat, Filesystem, InsertOptions, LinkEntry, ListOptions, Node,
    MAX_FILE_SIZE,
};
pub use integrity::{Blake3Provider, Integrity, IntegrityProvider};
pub use transform::{ContentTransform, StreamTransformer};

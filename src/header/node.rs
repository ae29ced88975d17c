//! Header tree node types and their serialized shape
//!
//! The serialized form is the archive's on-disk header payload:
//! `{ "files": { name: node, ... } }` recursively, where a node carries
//! `size`, `offset` (decimal string), `integrity`, `executable`, `unpacked`
//! or `link` depending on its kind. This shape must be reproduced exactly
//! for interoperability with existing archives.

use crate::integrity::Integrity;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Largest size the header format can declare for a single file (32-bit field).
pub const MAX_FILE_SIZE: u64 = u32::MAX as u64;

/// A node in the header tree
///
/// Untagged: the serialized kind is implied by which fields are present
/// (`files` for directories, `link` for symlinks, `size` for files).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Directory(DirectoryEntry),
    Link(LinkEntry),
    File(FileEntry),
}

/// Directory node: named children in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub files: IndexMap<String, Node>,
    /// Inherited-intent flag: every file inserted beneath an unpacked
    /// directory is itself stored unpacked.
    #[serde(default, skip_serializing_if = "is_false")]
    pub unpacked: bool,
}

/// File node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub size: u64,
    /// Byte offset into the archive's concatenated-data region.
    /// Present only for packed files; serialized as a decimal string.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "offset_string"
    )]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<Integrity>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub executable: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unpacked: bool,
    /// Where transformed content was staged, for the external writer.
    /// Not part of the header payload.
    #[serde(skip)]
    pub staging: Option<PathBuf>,
}

/// Symlink node: target path relative to the archive root, `/`-separated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkEntry {
    pub link: String,
}

impl Node {
    /// Empty directory node, the auto-vivification default
    pub fn directory() -> Self {
        Node::Directory(DirectoryEntry::default())
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    pub fn as_directory(&self) -> Option<&DirectoryEntry> {
        match self {
            Node::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn as_directory_mut(&mut self) -> Option<&mut DirectoryEntry> {
        match self {
            Node::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileEntry> {
        match self {
            Node::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<&LinkEntry> {
        match self {
            Node::Link(link) => Some(link),
            _ => None,
        }
    }

    /// Whether this entry is stored outside the archive's data region
    pub fn unpacked(&self) -> bool {
        match self {
            Node::Directory(dir) => dir.unpacked,
            Node::File(file) => file.unpacked,
            Node::Link(_) => false,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Offsets are stored as `u64` in memory and encoded as decimal strings in
/// the header payload, matching readers that cannot represent 64-bit
/// integers exactly.
mod offset_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(offset) => serializer.serialize_str(&offset.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            Some(text) => text
                .parse::<u64>()
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

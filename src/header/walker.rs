//! Tree walker: listings and offset-contiguity validation
//!
//! Walks the completed header tree depth-first in insertion order and
//! renders one line per entry. The contiguity validator cross-checks
//! declared offset/size pairs: every packed file must chain off a
//! predecessor (or start at 0) and into a successor (or be the last byte
//! range), so a tampered header entry with a fabricated byte range is
//! detected without reading the archive's data bytes.

use crate::header::builder::Filesystem;
use crate::header::node::{DirectoryEntry, Node};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Listing options
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Prefix each line with its pack state (`pack  : ` / `unpack: `)
    pub is_pack: bool,
    /// Drop unpacked entries' own lines (descendants are still walked)
    pub ignore_unpack: bool,
    /// Drop packed entries whose byte range does not chain with the rest
    pub ignore_fake_file: bool,
}

/// Byte-range summary for one packed file, collected during the walk
struct PackedRecord {
    full_path: String,
    offset: Option<u64>,
    size: u64,
}

struct Line {
    full_path: String,
    rendered: String,
}

impl Filesystem {
    /// List entry paths depth-first from the archive root (`/`), in each
    /// directory's child-insertion order. The root itself is not listed.
    pub fn list_files(&self, options: &ListOptions) -> Vec<String> {
        let state = self.state.lock();
        let mut lines = Vec::new();
        let mut records = Vec::new();
        fill_lines("", &state.header, options, &mut lines, &mut records);
        drop(state);

        if !options.ignore_fake_file {
            return lines.into_iter().map(|line| line.rendered).collect();
        }

        let dropped = unchained_entries(&records);
        if !dropped.is_empty() {
            warn!(count = dropped.len(), "Dropped entries with broken offset chains");
        }
        lines
            .into_iter()
            .filter(|line| !dropped.contains(&line.full_path))
            .map(|line| line.rendered)
            .collect()
    }
}

fn fill_lines(
    base: &str,
    dir: &DirectoryEntry,
    options: &ListOptions,
    lines: &mut Vec<Line>,
    records: &mut Vec<PackedRecord>,
) {
    for (name, node) in &dir.files {
        let full_path = format!("{}/{}", base, name);
        let unpacked = node.unpacked();

        let rendered = if options.is_pack {
            let state = if unpacked { "unpack" } else { "pack  " };
            format!("{}: {}", state, full_path)
        } else {
            full_path.clone()
        };

        if !(options.ignore_unpack && unpacked) {
            lines.push(Line {
                full_path: full_path.clone(),
                rendered,
            });
        }

        if options.ignore_fake_file {
            if let Node::File(file) = node {
                if !file.unpacked {
                    records.push(PackedRecord {
                        full_path: full_path.clone(),
                        offset: file.offset,
                        size: file.size,
                    });
                }
            }
        }

        if let Node::Directory(child) = node {
            fill_lines(&full_path, child, options, lines, records);
        }
    }
}

/// Paths of packed files whose declared byte range does not chain.
///
/// Directories, symlinks and unpacked files carry no byte range and are
/// never dropped. A packed file is chained when its range starts at 0 or
/// at some other entry's end, and either ends the region (maximal offset)
/// or feeds some other entry's start.
fn unchained_entries(records: &[PackedRecord]) -> HashSet<String> {
    let max_offset = records.iter().filter_map(|r| r.offset).max();

    let mut dropped = HashSet::new();
    for record in records {
        let offset = match record.offset {
            Some(offset) => offset,
            // A packed file without an offset cannot be verified.
            None => {
                dropped.insert(record.full_path.clone());
                continue;
            }
        };

        let has_predecessor = offset == 0
            || records.iter().any(|other| {
                other.full_path != record.full_path
                    && other.offset.map(|o| o + other.size) == Some(offset)
            });
        let has_successor = Some(offset) == max_offset
            || records.iter().any(|other| {
                other.full_path != record.full_path
                    && other.offset == Some(offset + record.size)
            });

        if !(has_predecessor && has_successor) {
            debug!(
                path = %record.full_path,
                offset,
                size = record.size,
                "Entry fails contiguity check"
            );
            dropped.insert(record.full_path.clone());
        }
    }
    dropped
}

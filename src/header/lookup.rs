//! Node Accessor: point lookups into the completed header tree

use crate::error::HeaderError;
use crate::header::builder::Filesystem;
use crate::header::node::Node;
use crate::header::path;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

impl Filesystem {
    /// Look up the node at an archive path without creating anything.
    ///
    /// Returns the root directory when the path has no basename relative
    /// to the archive root, and `None` when any segment is missing.
    pub fn get_node(&self, p: &Path) -> Option<Node> {
        let segments = path::split_archive_path(&self.root, p);
        let state = self.state.lock();
        match segments.split_last() {
            None => Some(Node::Directory(state.header.clone())),
            Some((name, dirs)) => {
                let mut current = &state.header;
                for segment in dirs {
                    current = current.files.get(segment)?.as_directory()?;
                }
                current.files.get(name).cloned()
            }
        }
    }

    /// Look up a file node, resolving symlink chains when `follow_links`.
    ///
    /// A missing path fails with `NotFound`. Link chains are resolved
    /// against the archive root with a visited set, so a cyclic chain
    /// fails with `CyclicLink` instead of recursing forever.
    pub fn get_file(&self, p: &Path, follow_links: bool) -> Result<Node, HeaderError> {
        let mut visited = HashSet::new();
        self.resolve_file(p, follow_links, &mut visited)
    }

    fn resolve_file(
        &self,
        p: &Path,
        follow_links: bool,
        visited: &mut HashSet<PathBuf>,
    ) -> Result<Node, HeaderError> {
        if !visited.insert(p.to_path_buf()) {
            return Err(HeaderError::CyclicLink(p.display().to_string()));
        }

        let node = self
            .get_node(p)
            .ok_or_else(|| HeaderError::NotFound(p.display().to_string()))?;

        match node {
            Node::Link(link) if follow_links => {
                let target = self.root.join(&link.link);
                self.resolve_file(&target, follow_links, visited)
            }
            other => Ok(other),
        }
    }
}

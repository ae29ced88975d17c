//! Content transform hook and temp-file staging
//!
//! A transform may rewrite a file's bytes before they enter the archive's
//! data region. Transformed content is piped into a freshly created temp
//! file whose size supersedes the source's stat size; the staged file is
//! kept alive for the external writer, so cleanup is the caller's or the
//! OS's responsibility.

use crate::error::HeaderError;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Decides, per source path, whether content should be rewritten
pub trait ContentTransform: Send + Sync {
    /// Return a transformer for `path`, or `None` to pack the bytes as-is.
    fn transformer(&self, path: &Path) -> Option<Box<dyn StreamTransformer>>;
}

/// Streams source bytes into their transformed form
pub trait StreamTransformer: Send {
    /// Returns the number of bytes written to `output`.
    fn pipe(&mut self, input: &mut dyn Read, output: &mut dyn Write) -> io::Result<u64>;
}

/// Transformed content staged on disk, ready for the writer
#[derive(Debug)]
pub struct StagedContent {
    pub path: PathBuf,
    pub size: u64,
}

/// Pipe `source` through `transformer` into a fresh temp file.
pub(crate) async fn stage(
    source: &Path,
    transformer: Box<dyn StreamTransformer>,
) -> Result<StagedContent, HeaderError> {
    let source = source.to_path_buf();
    let staged = tokio::task::spawn_blocking(move || {
        let mut transformer = transformer;
        stage_blocking(&source, transformer.as_mut())
    })
    .await
    .map_err(|e| HeaderError::Io(io::Error::new(io::ErrorKind::Other, e)))??;

    debug!(
        path = %staged.path.display(),
        size = staged.size,
        "Staged transformed content"
    );
    Ok(staged)
}

fn stage_blocking(
    source: &Path,
    transformer: &mut dyn StreamTransformer,
) -> Result<StagedContent, HeaderError> {
    let staging_dir = tempfile::Builder::new().prefix("packfs-").tempdir()?;
    // Hand the directory off un-deleted; the writer still needs the bytes.
    let staging_dir = staging_dir.keep();

    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "content".to_string());
    let staged_path = staging_dir.join(name);

    let mut input = std::fs::File::open(source)?;
    let mut output = std::fs::File::create(&staged_path)?;
    let size = transformer.pipe(&mut input, &mut output)?;
    output.flush()?;

    Ok(StagedContent {
        path: staged_path,
        size,
    })
}

//! Document sources
//!
//! Where unit texts come from. Fetching or scraping is someone else's job;
//! a source only hands over `index -> text`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unit {index} appears twice ({} and {})", first.display(), second.display())]
    DuplicateIndex {
        index: u32,
        first: PathBuf,
        second: PathBuf,
    },
}

pub trait DocumentSource: Send + Sync {
    /// Unit texts keyed by index
    fn load_units(&self) -> Result<BTreeMap<u32, String>, SourceError>;
}

/// Reads `<index>.txt` files from a directory.
///
/// Files whose stem is not a number are ignored, as are subdirectories.
/// `007.txt` is unit 7.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn unit_index(path: &Path) -> Option<u32> {
        if path.extension()?.to_str()? != "txt" {
            return None;
        }
        path.file_stem()?.to_str()?.parse().ok()
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SourceError {
    let path = path.to_path_buf();
    move |source| SourceError::Io { path, source }
}

impl DocumentSource for DirectorySource {
    fn load_units(&self) -> Result<BTreeMap<u32, String>, SourceError> {
        let mut paths: BTreeMap<u32, PathBuf> = BTreeMap::new();
        for entry in std::fs::read_dir(&self.root).map_err(io_err(&self.root))? {
            let path = entry.map_err(io_err(&self.root))?.path();
            if !path.is_file() {
                continue;
            }
            let Some(index) = Self::unit_index(&path) else {
                debug!(path = %path.display(), "skipping non-unit file");
                continue;
            };
            if let Some(first) = paths.get(&index) {
                return Err(SourceError::DuplicateIndex {
                    index,
                    first: first.clone(),
                    second: path,
                });
            }
            paths.insert(index, path);
        }

        let mut units = BTreeMap::new();
        for (index, path) in paths {
            let text = std::fs::read_to_string(&path).map_err(io_err(&path))?;
            units.insert(index, text);
        }
        Ok(units)
    }
}

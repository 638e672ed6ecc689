//! Output file naming

use crate::error::Result;
use chrono::Local;
use std::path::{Path, PathBuf};

/// Resolves where a stage writes its output file
pub trait OutputLocator {
    /// Full path for a new file named from `prefix` and `extension` (with dot)
    fn build_file_path(&self, prefix: &str, extension: &str) -> Result<PathBuf>;
}

/// Timestamped files in one base directory, created on demand
///
/// Files are named `{prefix}-{yyyyMMddHHmmss}{extension}`, e.g.
/// `students-20240131093000.xlsx`.
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    base: PathBuf,
}

impl DirectoryLocator {
    pub fn new<P: AsRef<Path>>(base: P) -> Self {
        DirectoryLocator {
            base: base.as_ref().to_path_buf(),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl OutputLocator for DirectoryLocator {
    fn build_file_path(&self, prefix: &str, extension: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.base)?;
        let stamp = Local::now().format("%Y%m%d%H%M%S");
        Ok(self.base.join(format!("{}-{}{}", prefix, stamp, extension)))
    }
}

//! Loading script files from disk.

use std::fs;
use std::path::Path;

use anyhow::Context;
use metervm_core::SourceFile;

/// Read every path into a [`SourceFile`] named after the path as given.
pub fn load(paths: &[impl AsRef<Path>]) -> anyhow::Result<Vec<SourceFile>> {
    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(SourceFile::new(path.display().to_string(), text))
        })
        .collect()
}

//! I/O helpers for missions: configuration, transports, backends, operator
//! approval, prompts and persistent records.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub mod approval;
pub mod audit;
pub mod backend;
pub mod config;
pub mod knowledge;
pub mod process;
pub mod prompt;
pub mod transport;

/// Write `contents` to a sibling temp file, then rename over `path`.
///
/// An interrupted write leaves the previous file intact.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let file_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

//! Recursive directory size computation

use std::fs;
use std::path::Path;

use crate::{Error, Result};

/// Compute the total size in bytes of all regular files under `dir`.
///
/// Symlinks are not followed. Entries that disappear mid-walk are skipped,
/// since environments can be mutated by the package manager while a scan
/// is in flight.
pub fn dir_size(dir: &Path) -> Result<u64> {
    if !dir.is_dir() {
        return Err(Error::NotADirectory {
            path: dir.to_path_buf(),
        });
    }
    let mut total = 0u64;
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let entries = match fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() {
                if let Ok(meta) = entry.metadata() {
                    total += meta.len();
                }
            }
        }
    }

    Ok(total)
}

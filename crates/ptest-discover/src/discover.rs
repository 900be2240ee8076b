use ptest_core::{FileIdentity, PtestError, Registry, Test};
use std::ffi::OsString;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

/// Scan `root` for immediate subdirectories that provide a regular-file
/// `ptest/run-ptest` driver, returning them as a [`Registry`] in C-locale
/// byte order. Stat misses and non-regular-file candidates are skipped
/// silently; a duplicate `(dev, ino)` pair keeps only the first occurrence.
pub fn discover(root: &Path) -> Result<Registry, PtestError> {
    let canonical = fs::canonicalize(root)?;
    let root_meta = fs::metadata(&canonical)?;
    if !root_meta.is_dir() {
        return Err(PtestError::InvalidInput(format!(
            "{} is not a directory",
            canonical.display()
        )));
    }

    // std::fs::read_dir never yields "." or ".." (unlike scandir), so no
    // explicit exclusion is needed here.
    let mut names: Vec<OsString> = fs::read_dir(&canonical)?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect::<Result<_, std::io::Error>>()?;
    names.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));

    let mut registry = Registry::new();
    for name in names {
        let name_str = name.to_string_lossy().into_owned();
        let candidate = canonical.join(&name).join("ptest").join("run-ptest");

        let meta = match fs::metadata(&candidate) {
            Ok(m) => m,
            Err(_) => continue,
        };
        if !meta.is_file() {
            continue;
        }

        let file_identity = FileIdentity {
            dev: meta.dev(),
            ino: meta.ino(),
        };

        if !registry.push_if_new(Test {
            name: name_str.clone(),
            run_path: candidate,
            file_identity,
        }) {
            tracing::debug!(name = %name_str, "skipping duplicate ptest (same device+inode)");
        }
    }

    Ok(registry)
}

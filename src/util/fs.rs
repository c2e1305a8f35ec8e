//! Filesystem utilities.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Read a file to bytes, with nice error messages.
pub fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read file: {}", path.display()))
}

/// Write a set of files, relative to `root`, so that either every file is
/// replaced or none is.
///
/// All contents are staged in temporary files next to their destination
/// before the first rename. A failure while staging leaves the destination
/// tree untouched.
pub fn write_all_atomic(root: &Path, files: &[(String, Vec<u8>)]) -> Result<Vec<PathBuf>> {
    let mut staged = Vec::with_capacity(files.len());
    for (relative, contents) in files {
        let dest = root.join(relative);
        staged.push((stage(&dest, contents)?, dest));
    }

    let mut written = Vec::with_capacity(staged.len());
    for (temp, dest) in staged {
        persist(temp, &dest)?;
        written.push(dest);
    }
    Ok(written)
}

fn stage(dest: &Path, contents: &[u8]) -> Result<NamedTempFile> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    ensure_dir(&parent)?;

    let mut temp = NamedTempFile::new_in(&parent)
        .with_context(|| format!("failed to create temporary file in {}", parent.display()))?;
    temp.write_all(contents)
        .with_context(|| format!("failed to stage {}", dest.display()))?;
    temp.as_file()
        .sync_all()
        .with_context(|| format!("failed to flush {}", dest.display()))?;
    Ok(temp)
}

fn persist(temp: NamedTempFile, dest: &Path) -> Result<()> {
    temp.persist(dest)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to write file: {}", dest.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_all_atomic_replaces_contents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("configdata.json");
        let file = |contents: &[u8]| vec![("configdata.json".to_string(), contents.to_vec())];

        write_all_atomic(tmp.path(), &file(b"{}")).unwrap();
        write_all_atomic(tmp.path(), &file(b"{\"target_id\":\"linux-x86_64\"}")).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "{\"target_id\":\"linux-x86_64\"}"
        );
    }

    #[test]
    fn test_write_all_atomic_creates_parents() {
        let tmp = TempDir::new().unwrap();
        let files = vec![
            ("Makefile".to_string(), b"all:\n".to_vec()),
            ("nested/dir/configdata.pm".to_string(), b"1;\n".to_vec()),
        ];

        let written = write_all_atomic(tmp.path(), &files).unwrap();

        assert_eq!(written.len(), 2);
        assert!(tmp.path().join("Makefile").exists());
        assert!(tmp.path().join("nested/dir/configdata.pm").exists());
    }

    #[test]
    fn test_write_all_atomic_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let files = vec![("Makefile".to_string(), b"all:\n".to_vec())];
        write_all_atomic(tmp.path(), &files).unwrap();

        let entries: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}

//! Filesystem Adapter
//!
//! Thin helpers over `std::fs` used by the cache: reads that report absence
//! instead of failing, idempotent directory management, locked writes and
//! collision-free random file names.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of generated file names.
pub const RANDOM_NAME_LENGTH: usize = 32;

// == Path ==
/// Joins `parts` onto `base`, ignoring leading separators in the parts.
pub fn path<I, P>(base: impl AsRef<Path>, parts: I) -> PathBuf
where
    I: IntoIterator<Item = P>,
    P: AsRef<str>,
{
    let mut joined = base.as_ref().to_path_buf();
    for part in parts {
        let part = part.as_ref().trim_matches(|c| c == '/' || c == '\\');
        if !part.is_empty() {
            joined.push(part);
        }
    }
    joined
}

// == Read ==
/// Reads a whole file, returning `None` if it is missing or unreadable.
pub fn read(path: impl AsRef<Path>) -> Option<Vec<u8>> {
    fs::read(path).ok()
}

// == Write ==
/// Writes `contents` to `path`, replacing any existing file.
pub fn write(path: impl AsRef<Path>, contents: &[u8]) -> io::Result<()> {
    fs::write(path, contents)
}

/// Replaces `path` with `contents` through a synced temporary file in the
/// same directory, so readers see either the old or the new contents.
///
/// The temporary is removed if any step fails.
pub fn write_atomic(path: impl AsRef<Path>, contents: &[u8]) -> io::Result<()> {
    let path = path.as_ref();
    let tmp_path = temp_path_for(path);

    let result = File::create(&tmp_path)
        .and_then(|mut file| {
            file.write_all(contents)?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&tmp_path, path));

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

/// Hidden sibling of `path` used as the staging file of an atomic write.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, random_name(8)))
}

/// Writes `contents` while holding an exclusive advisory lock on the file.
pub fn write_with_lock(path: impl AsRef<Path>, contents: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    FileExt::lock_exclusive(&file)?;

    let written = file.write_all(contents).and_then(|_| file.flush());
    let unlocked = FileExt::unlock(&file);

    written.and(unlocked)
}

/// Deletes a file; a missing file is fine.
pub fn delete_file(path: impl AsRef<Path>) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

// == Directories ==
/// Creates a directory and its parents; an existing directory is fine.
pub fn create_dir(path: impl AsRef<Path>) -> io::Result<()> {
    fs::create_dir_all(path)
}

/// Lists the regular files directly inside `dir`, dot-files included.
///
/// A missing directory lists as empty. Paths come back sorted.
pub fn list_dir(dir: impl AsRef<Path>) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Recursively deletes a directory; a missing directory is fine.
pub fn delete_dir(dir: impl AsRef<Path>) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

// == Available Path ==
/// Returns a path inside `dir` whose random name is not yet taken.
pub fn available_path(dir: impl AsRef<Path>) -> PathBuf {
    let dir = dir.as_ref();
    dir.join(available_name(dir))
}

/// Returns a random file name not yet taken inside `dir`.
pub fn available_name(dir: impl AsRef<Path>) -> String {
    let dir = dir.as_ref();
    loop {
        let name = random_name(RANDOM_NAME_LENGTH);
        if !dir.join(&name).exists() {
            return name;
        }
    }
}

/// Random string of ASCII letters and digits.
pub fn random_name(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

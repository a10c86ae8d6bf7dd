use globset::{GlobBuilder, GlobMatcher};
use log::{debug, warn};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Directories never descended into when expanding filesets.
pub const DEFAULT_EXCLUDES: [&str; 3] = [".git", "target", "node_modules"];

pub fn read_file_contents(path: &Path) -> io::Result<String> {
    if !path.is_file() && path.exists() {
        warn!("Not a file: {}", path.display());
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", path.display()),
        ));
    }

    debug!("Reading file contents: {}", path.display());
    let mut file = fs::File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    debug!("Read {} bytes from file", contents.len());
    Ok(contents)
}

/// Every regular file below `dir`, sorted by name at each level so
/// expansions are stable across runs.
pub fn list_files(dir: &Path, exclude_dirs: &[&str]) -> Vec<PathBuf> {
    let mut result = Vec::new();

    for entry in walkdir::WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir()
                    && exclude_dirs
                        .iter()
                        .any(|ex| e.file_name().to_string_lossy() == *ex))
        })
        .filter_map(Result::ok)
    {
        if entry.file_type().is_file() {
            result.push(entry.path().to_path_buf());
        }
    }

    debug!("Found {} files under {}", result.len(), dir.display());
    result
}

/// Compiles a fileset pattern. `*` and `?` stay within one path segment;
/// only `**` crosses directories.
pub fn build_matcher(pattern: &str) -> Result<GlobMatcher, globset::Error> {
    Ok(GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}

pub fn is_pattern(entry: &str) -> bool {
    entry.contains(['*', '?', '['])
}

/// Replaces `path` with `content` via a temporary sibling file and a rename,
/// so a reader never observes a half-written file. Missing parent
/// directories are created and existing permissions are carried over.
pub fn write_file_atomic(path: &Path, content: &str) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(content.as_bytes())?;
    temp.as_file().sync_all()?;

    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(temp.path(), metadata.permissions())?;
    }

    temp.persist(path).map_err(|e| e.error)?;
    debug!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

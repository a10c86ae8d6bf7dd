use crate::domain::errors::{FilemapError, Result};
use crate::infra::config::Config;
use crate::infra::file_system::{DEFAULT_EXCLUDES, build_matcher, is_pattern, list_files};
use indexmap::IndexSet;
use log::{debug, info, warn};
use std::path::{Component, Path, PathBuf};

/// Maps file and fileset names to normalized paths relative to a working
/// root. Normalized paths use `/` separators and never leave the root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn full_path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Lexically normalizes `path`, rejecting absolute paths and `..`
    /// segments that climb above the root.
    pub fn normalize(&self, path: &str) -> Result<String> {
        let mut parts: Vec<String> = Vec::new();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return Err(FilemapError::PathEscape(path.to_string()));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(FilemapError::PathEscape(path.to_string()));
                }
            }
        }

        if parts.is_empty() {
            return Err(FilemapError::PathEscape(path.to_string()));
        }
        Ok(parts.join("/"))
    }

    /// Order-preserving, deduplicated union of `explicit_files` followed by
    /// the files of each named fileset.
    pub fn resolve(
        &self,
        explicit_files: &[String],
        fileset_names: &[String],
        config: &Config,
    ) -> Result<Vec<String>> {
        let mut resolved: IndexSet<String> = IndexSet::new();

        for file in explicit_files {
            resolved.insert(self.normalize(file)?);
        }

        for name in fileset_names {
            let fileset = config
                .find_fileset(name)
                .ok_or_else(|| FilemapError::UnknownFileset(name.clone()))?;
            debug!("Expanding fileset {} ({} entries)", name, fileset.files.len());

            for pattern in &fileset.files {
                for path in self.expand(pattern)? {
                    resolved.insert(path);
                }
            }
        }

        info!("Resolved {} file(s)", resolved.len());
        Ok(resolved.into_iter().collect())
    }

    /// A fileset entry is a wildcard pattern, a directory, or a plain path.
    fn expand(&self, pattern: &str) -> Result<Vec<String>> {
        let normalized = self.normalize(pattern)?;

        if is_pattern(&normalized) {
            let matcher =
                build_matcher(&normalized).map_err(|source| FilemapError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
            let matches: Vec<String> = self
                .relative_files(&self.root)
                .into_iter()
                .filter(|path| matcher.is_match(path))
                .collect();
            if matches.is_empty() {
                warn!("Pattern {} matched no files", pattern);
            }
            return Ok(matches);
        }

        let full = self.full_path(&normalized);
        if full.is_dir() {
            let files = self.relative_files(&full);
            if files.is_empty() {
                warn!("Directory {} contains no files", pattern);
            }
            return Ok(files);
        }

        Ok(vec![normalized])
    }

    fn relative_files(&self, dir: &Path) -> Vec<String> {
        list_files(dir, &DEFAULT_EXCLUDES)
            .into_iter()
            .filter_map(|path| {
                let relative = path.strip_prefix(&self.root).ok()?;
                let parts: Vec<_> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                Some(parts.join("/"))
            })
            .collect()
    }
}

use crate::core::codec;
use crate::core::path_resolver::PathResolver;
use crate::core::write_back;
use crate::domain::errors::{FilemapError, Result};
use crate::domain::models::{FileEntry, OutputFormat, WriteReport};
use crate::infra::config::Config;
use crate::infra::file_system::read_file_contents;
use indexmap::IndexMap;
use log::{debug, info, warn};
use std::path::Path;

/// The files of one invocation, keyed by normalized relative path in the
/// order they were first loaded.
#[derive(Debug, Clone)]
pub struct Filemap {
    resolver: PathResolver,
    entries: IndexMap<String, FileEntry>,
    warnings: Vec<String>,
}

impl Filemap {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            resolver: PathResolver::new(root.as_ref()),
            entries: IndexMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.entries.get(path)
    }

    pub fn entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.values()
    }

    pub fn updated_paths(&self) -> Vec<String> {
        self.entries
            .values()
            .filter(|entry| entry.is_updated())
            .map(|entry| entry.path.clone())
            .collect()
    }

    /// Warnings recorded by the most recent decode.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Reads every path under the root. Stops at the first failure; a path
    /// that is already present is re-read in place.
    pub fn load_files(&mut self, paths: &[String]) -> Result<()> {
        for path in paths {
            let relative = self.resolver.normalize(path)?;
            let full = self.resolver.full_path(&relative);
            let content =
                read_file_contents(&full).map_err(|e| FilemapError::io(relative.clone(), e))?;

            if self.entries.contains_key(&relative) {
                debug!("Reloading {}", relative);
            }
            self.entries
                .insert(relative.clone(), FileEntry::new(relative, content));
        }
        info!("Filemap holds {} file(s)", self.entries.len());
        Ok(())
    }

    pub fn load_filesets(&mut self, names: &[String], config: &Config) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        info!("Loading filesets: {:?}", names);
        let paths = self.resolver.resolve(&[], names, config)?;
        self.load_files(&paths)
    }

    /// Explicit files first, then filesets, as one deduplicated load.
    pub fn load(&mut self, files: &[String], filesets: &[String], config: &Config) -> Result<()> {
        let paths = self.resolver.resolve(files, filesets, config)?;
        self.load_files(&paths)
    }

    /// Prompt text in the marker format with relative paths.
    pub fn encode_to_input_text(&self) -> String {
        codec::encode_raw(
            self.entries
                .values()
                .map(|entry| (entry.path.as_str(), entry.current_content())),
        )
    }

    /// Renders the current state with paths joined to the working root.
    pub fn encode_to_input_text_full_paths(&self, format: OutputFormat) -> Result<String> {
        let full_paths: Vec<String> = self
            .entries
            .keys()
            .map(|path| self.resolver.full_path(path).display().to_string())
            .collect();

        let encoded = codec::encode(
            format,
            full_paths
                .iter()
                .zip(self.entries.values())
                .map(|(path, entry)| (path.as_str(), entry.current_content())),
        )?;
        Ok(encoded)
    }

    /// Stores the updates found in `text`, creating entries for new paths.
    /// Blocks with unusable paths are skipped and recorded as warnings. If
    /// nothing usable remains the filemap is left untouched.
    pub fn decode_from_output_text(&mut self, text: &str) -> Result<usize> {
        let decoded = codec::decode(text);
        let mut warnings = decoded.warnings;
        let mut accepted = Vec::new();

        for (path, content) in decoded.updates {
            match self.resolver.normalize(&path) {
                Ok(relative) => accepted.push((relative, content)),
                Err(e) => warnings.push(format!("skipping {}: {}", path, e)),
            }
        }

        for warning in &warnings {
            warn!("{}", warning);
        }
        self.warnings = warnings;

        if accepted.is_empty() {
            return Err(FilemapError::Decode("no valid updates found".to_string()));
        }

        let count = accepted.len();
        for (relative, content) in accepted {
            match self.entries.get_mut(&relative) {
                Some(entry) => entry.updated_content = Some(content),
                None => {
                    debug!("Model introduced new file {}", relative);
                    let mut entry = FileEntry::new(relative.clone(), String::new());
                    entry.updated_content = Some(content);
                    self.entries.insert(relative, entry);
                }
            }
        }

        info!("Decoded {} update(s)", count);
        Ok(count)
    }

    /// Drops a pending update; new files introduced by the model are removed
    /// entirely.
    pub fn discard_update(&mut self, path: &str) {
        let Some(entry) = self.entries.get_mut(path) else {
            return;
        };
        entry.updated_content = None;
        let full = self.resolver.full_path(path);
        if entry.original_content.is_empty() && !full.exists() {
            self.entries.shift_remove(path);
        }
    }

    pub fn write_updates_to_files(&self) -> Result<WriteReport> {
        write_back::apply(self)
    }
}

use crate::domain::errors::FilemapError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One file tracked by a [`Filemap`](crate::core::filemap::Filemap).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub original_content: String,
    pub updated_content: Option<String>,
}

impl FileEntry {
    pub fn new(path: String, original_content: String) -> Self {
        Self {
            path,
            original_content,
            updated_content: None,
        }
    }

    /// Content as it stands after decode: the update if there is one.
    pub fn current_content(&self) -> &str {
        self.updated_content
            .as_deref()
            .unwrap_or(&self.original_content)
    }

    pub fn is_updated(&self) -> bool {
        self.updated_content.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Raw,
    #[default]
    Json,
}

impl FromStr for OutputFormat {
    type Err = FilemapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(OutputFormat::Raw),
            "json" => Ok(OutputFormat::Json),
            _ => Err(FilemapError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Raw => write!(f, "raw"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Outcome of a write-back pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub written: Vec<String>,
    pub skipped: Vec<String>,
}

/// Everything a command needs after flags and config have been merged.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub root_path: String,
    pub files: Vec<String>,
    pub filesets: Vec<String>,
    pub user_request: String,
    pub write: bool,
    pub review: bool,
    pub output_format: OutputFormat,
    pub output_path: Option<String>,
    pub clipboard_output: bool,
    pub dry_run: bool,
}

#[cfg(feature = "clipboard-support")]
use clipboard::{ClipboardContext, ClipboardProvider};
use crate::domain::models::WriteReport;
use crossterm::{
    ExecutableCommand,
    style::{Color, ResetColor, SetForegroundColor},
};
use log::{debug, info};
#[cfg(feature = "clipboard-support")]
use log::warn;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

pub trait OutputWriter {
    fn write(&self, content: &str) -> anyhow::Result<()>;
}

pub struct FileWriter {
    path: String,
}

impl FileWriter {
    pub fn new(path: String) -> Self {
        Self { path }
    }
}

impl OutputWriter for FileWriter {
    fn write(&self, content: &str) -> anyhow::Result<()> {
        debug!("Writing output to file: {}", self.path);
        fs::write(Path::new(&self.path), content)?;
        info!("Output written to file: {}", self.path);
        Ok(())
    }
}

pub struct ConsoleWriter;

impl OutputWriter for ConsoleWriter {
    fn write(&self, content: &str) -> anyhow::Result<()> {
        debug!("Writing output to console");
        let mut stdout = io::stdout().lock();
        stdout.write_all(content.as_bytes())?;
        if !content.ends_with('\n') {
            stdout.write_all(b"\n")?;
        }
        Ok(())
    }
}

#[cfg(feature = "clipboard-support")]
pub struct ClipboardWriter;

#[cfg(feature = "clipboard-support")]
impl OutputWriter for ClipboardWriter {
    fn write(&self, content: &str) -> anyhow::Result<()> {
        debug!("Writing output to clipboard");

        let mut ctx: ClipboardContext = match ClipboardProvider::new() {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("Failed to access clipboard: {}", e);
                return Err(anyhow::anyhow!("Failed to access clipboard: {}", e));
            }
        };

        match ctx.set_contents(content.to_owned()) {
            Ok(_) => {
                info!("Output copied to clipboard (size: {} bytes)", content.len());
                Ok(())
            }
            Err(e) => {
                warn!("Failed to copy to clipboard: {}", e);
                Err(anyhow::anyhow!("Failed to copy to clipboard: {}", e))
            }
        }
    }
}

pub fn create_writer(
    output_path: &Option<String>,
    clipboard_output: bool,
) -> anyhow::Result<Box<dyn OutputWriter>> {
    if clipboard_output {
        #[cfg(feature = "clipboard-support")]
        return Ok(Box::new(ClipboardWriter));
        #[cfg(not(feature = "clipboard-support"))]
        anyhow::bail!("Clipboard output requires the clipboard-support feature");
    }

    Ok(match output_path {
        Some(path) => Box::new(FileWriter::new(path.clone())),
        None => Box::new(ConsoleWriter),
    })
}

pub fn write_output(
    formatted_content: &str,
    output_path: Option<String>,
    clipboard_output: bool,
) -> anyhow::Result<()> {
    let writer = create_writer(&output_path, clipboard_output)?;
    writer.write(formatted_content)?;

    if clipboard_output && output_path.is_none() {
        let mut stdout = io::stdout();
        stdout.execute(SetForegroundColor(Color::Green))?;
        writeln!(stdout, "\n📋 Content copied to clipboard!")?;
        stdout.execute(ResetColor)?;

        writeln!(stdout, "\nPreview of copied content:\n")?;
        writeln!(stdout, "{}", preview(formatted_content, 200))?;
    }

    Ok(())
}

fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() > max_chars {
        let safe_substring: String = content.chars().take(max_chars).collect();
        format!("{}...", safe_substring)
    } else {
        content.to_string()
    }
}

/// Colored summary printed after write-back.
pub fn print_write_summary(report: &WriteReport) -> anyhow::Result<()> {
    let mut stdout = io::stdout();

    stdout.execute(SetForegroundColor(Color::Green))?;
    writeln!(stdout, "✓ Updated {} file(s)", report.written.len())?;
    stdout.execute(ResetColor)?;
    for path in &report.written {
        writeln!(stdout, "  {}", path)?;
    }

    if !report.skipped.is_empty() {
        stdout.execute(SetForegroundColor(Color::DarkGrey))?;
        writeln!(stdout, "  ({} file(s) unchanged)", report.skipped.len())?;
        stdout.execute(ResetColor)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_file_writer() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_string_lossy().to_string();
        let writer = FileWriter::new(path.clone());
        let content = "Test output";

        writer.write(content).unwrap();

        let read_content = fs::read_to_string(path).unwrap();
        assert_eq!(read_content, content);
    }

    #[test]
    fn test_write_output_to_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_string_lossy().to_string();

        write_output("[]", Some(path.clone()), false).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "[]");
    }

    #[test]
    fn test_utf8_safe_preview() {
        let content =
            "اهلا مرحب عبدالله 🚀 This string has UTF-8 characters like: ├── ./src/file.rs";

        let shortened = preview(content, 20);
        assert_eq!(shortened.chars().count(), 23);
        assert!(shortened.ends_with("..."));
        assert_eq!(preview("short", 20), "short");
    }
}

use crate::core::filemap::Filemap;
use crate::domain::errors::{FilemapError, Result};
use crate::domain::models::WriteReport;
use crate::infra::file_system::write_file_atomic;
use log::{debug, error, info};

/// Writes every updated entry in insertion order, each one atomically.
///
/// The first failure aborts the pass. Files written before it stay written
/// and are listed in the returned error; there is no rollback.
pub fn apply(filemap: &Filemap) -> Result<WriteReport> {
    let mut report = WriteReport::default();

    for entry in filemap.entries() {
        let Some(content) = entry.updated_content.as_deref() else {
            debug!("No update for {}, leaving it untouched", entry.path);
            report.skipped.push(entry.path.clone());
            continue;
        };

        let full = filemap.resolver().full_path(&entry.path);
        if let Err(source) = write_file_atomic(&full, content) {
            error!(
                "Failed to write {} after {} successful write(s)",
                entry.path,
                report.written.len()
            );
            return Err(FilemapError::WriteBack {
                path: entry.path.clone(),
                written: report.written,
                source,
            });
        }
        report.written.push(entry.path.clone());
    }

    info!(
        "Wrote {} file(s), left {} untouched",
        report.written.len(),
        report.skipped.len()
    );
    Ok(report)
}

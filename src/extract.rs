use std::fs;
use std::io::{self, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};

use filetime::FileTime;

use crate::error::{Severity, ZipError, ZipResult};
use crate::reader::ZipReader;

/// Outcome counts of a batch run over an archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub extracted: usize,
    /// Entries dropped for header or CRC faults.
    pub corrupted: usize,
    /// Entries that could not be unlocked with the available passwords.
    pub wrong_password: usize,
    /// Encrypted entries not attempted after the user stopped giving passwords.
    pub skipped_encrypted: usize,
    pub failed: usize,
}

impl ExtractSummary {
    pub fn is_clean(&self) -> bool {
        self.corrupted == 0
            && self.wrong_password == 0
            && self.skipped_encrypted == 0
            && self.failed == 0
    }
}

impl<R: Read + Seek> ZipReader<R> {
    /// Extract one entry below `dest_dir`, creating parent directories.
    pub fn extract<P: AsRef<Path>>(&mut self, name: &str, dest_dir: P) -> ZipResult<()> {
        extract_entry(self, name, dest_dir.as_ref())
    }

    /// Extract every entry below `dest_dir`.
    ///
    /// Per-entry faults are logged and counted, and corrupted entries are
    /// dropped from the index; only fatal errors abort the run.
    pub fn extract_all<P: AsRef<Path>>(&mut self, dest_dir: P) -> ZipResult<ExtractSummary> {
        let dest_dir = dest_dir.as_ref();
        run_batch(self, |archive, name| extract_entry(archive, name, dest_dir))
    }

    /// Decompress and verify every entry without writing anything.
    pub fn test_all(&mut self) -> ZipResult<ExtractSummary> {
        run_batch(self, |archive, name| archive.extract_to(name, &mut io::sink()))
    }
}

fn run_batch<R, F>(archive: &mut ZipReader<R>, mut action: F) -> ZipResult<ExtractSummary>
where
    R: Read + Seek,
    F: FnMut(&mut ZipReader<R>, &str) -> ZipResult<()>,
{
    let mut summary = ExtractSummary::default();
    let mut passwords_exhausted = false;

    for name in archive.names() {
        let encrypted = archive.entry(&name).is_some_and(|e| e.is_encrypted);
        if passwords_exhausted && encrypted {
            summary.skipped_encrypted += 1;
            continue;
        }

        match action(archive, &name) {
            Ok(()) => summary.extracted += 1,
            Err(e) if e.severity() == Severity::Fatal => return Err(e),
            Err(ZipError::PasswordsExhausted) => {
                log::warn!("[ZIP] no password for '{name}', skipping encrypted entries");
                passwords_exhausted = true;
                summary.skipped_encrypted += 1;
            }
            Err(e) if e.is_entry_corruption() => {
                log::warn!("[ZIP] {name}: {e}; dropping entry");
                archive.discard_corrupted(&name);
                summary.corrupted += 1;
            }
            Err(e) if e.is_authentication() => {
                log::warn!("[ZIP] {e}");
                summary.wrong_password += 1;
            }
            Err(e) => {
                log::warn!("[ZIP] {name}: {e}");
                summary.failed += 1;
            }
        }
    }

    log::info!(
        "[ZIP] {} extracted, {} corrupted, {} wrong password, {} skipped, {} failed",
        summary.extracted,
        summary.corrupted,
        summary.wrong_password,
        summary.skipped_encrypted,
        summary.failed
    );
    Ok(summary)
}

/// Resolve an archive name below `dest_dir`, rejecting anything that
/// could escape it.
fn destination(dest_dir: &Path, name: &str) -> ZipResult<PathBuf> {
    let file_name = name.replace('\\', "/");
    let relative = Path::new(&file_name);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(ZipError::PathTraversal(file_name));
    }
    Ok(dest_dir.join(relative))
}

/// Extract a single entry into `dest_dir`.
pub fn extract_entry<R: Read + Seek>(
    archive: &mut ZipReader<R>,
    name: &str,
    dest_dir: &Path,
) -> ZipResult<()> {
    let info = archive
        .entry(name)
        .ok_or_else(|| ZipError::EntryNotFound(name.to_string()))?;
    let dest_path = destination(dest_dir, name)?;

    // Handle directories.
    if info.is_directory {
        archive.extract_to(name, &mut io::sink())?;
        fs::create_dir_all(&dest_path).map_err(ZipError::CantOpenDestFile)?;
        return Ok(());
    }

    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent).map_err(ZipError::CantOpenDestFile)?;
    }

    let mut file = fs::File::create(&dest_path).map_err(ZipError::CantOpenDestFile)?;
    let result = archive
        .extract_to(name, &mut file)
        .and_then(|()| file.flush().map_err(ZipError::CantOpenDestFile));
    drop(file);

    // Never leave unverified plaintext behind.
    if let Err(e) = result {
        let _ = fs::remove_file(&dest_path);
        return Err(e);
    }

    // Set file modification time.
    if let Some(systime) = info.modified.to_system_time() {
        let ft = FileTime::from_system_time(systime);
        let _ = filetime::set_file_mtime(&dest_path, ft);
    }

    Ok(())
}

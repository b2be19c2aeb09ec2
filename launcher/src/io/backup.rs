//! Pre-launch copies of the data file into the backup directory.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info};

use crate::core::backup_name::{backup_file_name, parse_backup_name};
use crate::error::LaunchError;

/// Copies taken within one second before giving up on a free name.
const MAX_BACKUPS_PER_SECOND: u32 = 100;

/// Copy `data_file` into `backup_dir` as `<timestamp><suffix>`.
///
/// Returns `Ok(None)` without touching anything when the data file does not
/// exist yet (fresh machine). The source file is only read. An existing
/// backup is never overwritten: a copy taken in the same second as an
/// earlier one gets the next free sequence number.
pub fn backup_data_file(
    data_file: &Path,
    backup_dir: &Path,
    suffix: &str,
    taken_at: NaiveDateTime,
) -> Result<Option<PathBuf>, LaunchError> {
    if !data_file.is_file() {
        debug!(path = %data_file.display(), "no data file, skipping backup");
        return Ok(None);
    }
    let failed = |to: &Path, source: io::Error| LaunchError::Backup {
        from: data_file.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    let mut source = File::open(data_file).map_err(|e| failed(backup_dir, e))?;
    for seq in 0..MAX_BACKUPS_PER_SECOND {
        let dest = backup_dir.join(backup_file_name(taken_at, seq, suffix));
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&dest) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(failed(&dest, e)),
        };
        if let Err(e) = io::copy(&mut source, &mut file).and_then(|_| file.sync_all()) {
            let _ = fs::remove_file(&dest);
            return Err(failed(&dest, e));
        }
        info!(from = %data_file.display(), to = %dest.display(), "data file backed up");
        return Ok(Some(dest));
    }
    Err(failed(
        backup_dir,
        io::Error::new(
            io::ErrorKind::AlreadyExists,
            "no free backup name left for this second",
        ),
    ))
}

/// A backup file found in the backup directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub taken_at: NaiveDateTime,
    pub size_bytes: u64,
}

/// List backups in `backup_dir`, oldest first.
///
/// Files whose names do not follow the backup naming scheme are skipped. A
/// missing directory yields an empty list.
pub fn list_backups(backup_dir: &Path, suffix: &str) -> Result<Vec<BackupEntry>> {
    if !backup_dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    let dir = fs::read_dir(backup_dir)
        .with_context(|| format!("read backup dir {}", backup_dir.display()))?;
    for entry in dir {
        let entry = entry.with_context(|| format!("read entry in {}", backup_dir.display()))?;
        let name = entry.file_name();
        let Some((taken_at, seq)) = name.to_str().and_then(|n| parse_backup_name(n, suffix))
        else {
            continue;
        };
        let meta = entry
            .metadata()
            .with_context(|| format!("stat {}", entry.path().display()))?;
        if !meta.is_file() {
            continue;
        }
        let backup = BackupEntry {
            path: entry.path(),
            taken_at,
            size_bytes: meta.len(),
        };
        entries.push((seq, backup));
    }
    entries.sort_by_key(|(seq, backup)| (backup.taken_at, *seq));
    Ok(entries.into_iter().map(|(_, backup)| backup).collect())
}

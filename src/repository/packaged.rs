//! Engine shipped alongside a packaged launcher.

use super::ENGINE_BINARY;
use crate::error::{LauncherError, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Signature of a zip end-of-central-directory record.
const EOCD_SIGNATURE: &[u8; 4] = b"PK\x05\x06";

/// Fixed size of the end-of-central-directory record.
const EOCD_SIZE: u64 = 22;

/// Largest archive comment a zip file may carry.
const MAX_COMMENT_LEN: u64 = u16::MAX as u64;

/// Number of hex characters kept from the archive digest.
const VERSION_UID_LEN: usize = 40;

/// Whether `path` is a readable zip archive.
///
/// Only the end-of-central-directory record is checked, so an executable with
/// a zip payload appended counts. Unreadable paths are not archives.
pub fn is_archive(path: &Path) -> bool {
    match File::open(path) {
        Ok(mut file) => has_end_of_central_directory(&mut file).unwrap_or(false),
        Err(_) => false,
    }
}

fn has_end_of_central_directory<R: Read + Seek>(reader: &mut R) -> io::Result<bool> {
    let len = reader.seek(SeekFrom::End(0))?;
    if len < EOCD_SIZE {
        return Ok(false);
    }

    let tail_len = len.min(EOCD_SIZE + MAX_COMMENT_LEN);
    reader.seek(SeekFrom::Start(len - tail_len))?;
    let mut tail = Vec::new();
    reader.take(tail_len).read_to_end(&mut tail)?;

    // The comment length field must account for exactly the bytes that follow
    // the record.
    let record_end = EOCD_SIZE as usize;
    // The file may have shrunk since its length was taken.
    let Some(last_start) = tail.len().checked_sub(record_end) else {
        return Ok(false);
    };
    let found = (0..=last_start).rev().any(|start| {
        let record = &tail[start..start + record_end];
        if &record[..4] != EOCD_SIGNATURE {
            return false;
        }
        let comment_len = u16::from_le_bytes([record[20], record[21]]) as usize;
        start + record_end + comment_len == tail.len()
    });

    Ok(found)
}

/// A launcher packaged as an archive.
///
/// The archive stays open for as long as the provider lives, so the version
/// uid always describes the file that was selected.
#[derive(Debug)]
pub struct PackagedRepository {
    archive_path: PathBuf,
    archive: File,
}

impl PackagedRepository {
    pub fn open(archive_path: &Path) -> Result<Self> {
        let archive = File::open(archive_path).map_err(|e| {
            LauncherError::io(
                format!("failed to open package '{}'", archive_path.display()),
                e,
            )
        })?;

        Ok(Self {
            archive_path: archive_path.to_path_buf(),
            archive,
        })
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Leading hex digits of the archive's SHA-256.
    pub fn version_uid(&self) -> Result<String> {
        let read_err = |e| {
            LauncherError::io(
                format!("failed to read package '{}'", self.archive_path.display()),
                e,
            )
        };

        let mut archive = &self.archive;
        archive.seek(SeekFrom::Start(0)).map_err(read_err)?;
        let mut hasher = Sha256::new();
        io::copy(&mut archive, &mut hasher).map_err(read_err)?;

        let mut digest = hex::encode(hasher.finalize());
        digest.truncate(VERSION_UID_LEN);
        Ok(digest)
    }

    /// The engine lives next to the archive.
    pub fn engine_path(&self) -> PathBuf {
        self.archive_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(ENGINE_BINARY)
    }
}

impl Drop for PackagedRepository {
    fn drop(&mut self) {
        debug!(archive = %self.archive_path().display(), "closing package");
    }
}

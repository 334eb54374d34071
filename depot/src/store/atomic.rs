//! Atomic object writes.
//!
//! Readers of the store must never observe a half-written table or
//! checkpoint, so every object is written to a temp file in the same
//! directory and renamed into place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Generate a temp path for atomic writes.
/// Format: {dir}/.tmp.{random}.{filename}
pub fn temp_path(final_path: &Path) -> PathBuf {
    let filename = final_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("object");
    let random: u64 = rand::random();
    let temp_name = format!(".tmp.{:016x}.{}", random, filename);
    final_path.with_file_name(temp_name)
}

/// Write content to `final_path`, replacing any previous version.
pub fn replace_file(final_path: &Path, content: &[u8]) -> io::Result<()> {
    let temp = temp_path(final_path);
    fs::write(&temp, content)?;
    match fs::rename(&temp, final_path) {
        Ok(()) => Ok(()),
        Err(e) => {
            // Clean up temp file so it never shows up as a stray object
            let _ = fs::remove_file(&temp);
            Err(e)
        }
    }
}

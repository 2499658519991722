use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;

/// A fully written temp file beside `target`, renamed into place by [`StagedFile::commit`].
///
/// Dropping it uncommitted removes the temp file and leaves `target` untouched.
#[must_use = "a staged file does nothing until committed"]
#[derive(Debug)]
pub struct StagedFile {
    temp: Option<PathBuf>,
    target: PathBuf,
}

impl StagedFile {
    pub fn write<F>(target: &Path, write: F) -> Result<Self>
    where
        F: FnOnce(&mut BufWriter<File>) -> Result<()>,
    {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let temp = temp_path(target);
        // Owns the temp path from here on so a failed write cleans up after itself.
        let staged = Self {
            temp: Some(temp.clone()),
            target: target.to_path_buf(),
        };
        let mut writer = BufWriter::new(File::create(&temp)?);
        write(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;

        debug!("Staged {}", staged.target.display());
        Ok(staged)
    }

    pub fn commit(mut self) -> Result<()> {
        if let Some(temp) = self.temp.take() {
            fs::rename(&temp, &self.target)?;
        }
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            match fs::remove_file(&temp) {
                Ok(()) => debug!("Discarded {}", temp.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Could not remove {}: {}", temp.display(), e),
            }
        }
    }
}

/// `<file name>.tmp` beside `target`, so targets sharing a stem never collide.
fn temp_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("docrag"));
    name.push(".tmp");
    target.with_file_name(name)
}

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("process {pid} did not exit within {}s", timeout.as_secs_f64())]
    ProcessTimeout { pid: u32, timeout: Duration },

    #[error("download failed: {0}")]
    DownloadFailure(String),

    #[error("archive rejected: {0}")]
    ArchiveFormat(String),

    #[error("install failed for {}: {reason}", target.display())]
    InstallFailure { target: PathBuf, reason: String },

    /// The swap failed and the backup could not be moved back. The install
    /// location may hold neither the old nor the new bundle.
    #[error(
        "install failed for {} and restoring backup {} also failed: {reason}",
        target.display(),
        backup.display()
    )]
    RestoreFailure {
        target: PathBuf,
        backup: PathBuf,
        reason: String,
    },
}

impl UpdateError {
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::RestoreFailure { .. })
    }

    pub fn download(err: impl std::fmt::Display) -> Self {
        Self::DownloadFailure(format!("{err:#}"))
    }

    pub fn archive(err: impl std::fmt::Display) -> Self {
        Self::ArchiveFormat(format!("{err:#}"))
    }
}

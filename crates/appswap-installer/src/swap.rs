use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use appswap_core::UpdateError;

use crate::fs_utils::{move_path, path_exists, remove_path_if_exists};

/// The filesystem moves performed while swapping a bundle into place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStep {
    /// Old bundle renamed into the backup slot.
    Backup,
    /// New bundle moved into the install location.
    MoveIn,
    /// Backup renamed back after a failed move-in.
    Restore,
}

impl SwapStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backup => "backup",
            Self::MoveIn => "move-in",
            Self::Restore => "restore",
        }
    }
}

/// `App.app` -> `App.app.backup`, in the same directory.
pub fn backup_path_for(bundle_path: &Path, backup_suffix: &str) -> PathBuf {
    let mut name = bundle_path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".");
    name.push(backup_suffix);
    bundle_path.with_file_name(name)
}

pub fn replace_bundle(
    new_bundle: &Path,
    old_bundle: &Path,
    backup_suffix: &str,
) -> std::result::Result<(), UpdateError> {
    replace_bundle_with_mover(new_bundle, old_bundle, backup_suffix, default_mover)
}

fn default_mover(step: SwapStep, src: &Path, dst: &Path) -> Result<()> {
    tracing::debug!(step = step.as_str(), src = %src.display(), dst = %dst.display(), "swap step");
    match step {
        // The backup slot is a sibling of the bundle, so a plain rename suffices
        // and never leaves a half-copied tree on either side.
        SwapStep::Backup | SwapStep::Restore => fs::rename(src, dst)
            .with_context(|| format!("failed to rename {} to {}", src.display(), dst.display())),
        SwapStep::MoveIn => move_path(src, dst),
    }
}

/// Swaps `new_bundle` into `old_bundle`'s location, keeping the previous
/// bundle in the backup slot until the new one is in place. On failure the
/// backup is moved back; if that also fails the error is
/// [`UpdateError::RestoreFailure`].
pub fn replace_bundle_with_mover<Mover>(
    new_bundle: &Path,
    old_bundle: &Path,
    backup_suffix: &str,
    mut mover: Mover,
) -> std::result::Result<(), UpdateError>
where
    Mover: FnMut(SwapStep, &Path, &Path) -> Result<()>,
{
    let install_failure = |reason: String| UpdateError::InstallFailure {
        target: old_bundle.to_path_buf(),
        reason,
    };

    if !path_exists(new_bundle) {
        return Err(install_failure(format!(
            "new bundle does not exist: {}",
            new_bundle.display()
        )));
    }

    let backup = backup_path_for(old_bundle, backup_suffix);
    match remove_path_if_exists(&backup) {
        Ok(true) => tracing::warn!(backup = %backup.display(), "purged stale backup"),
        Ok(false) => {}
        Err(err) => {
            return Err(install_failure(format!(
                "failed to remove stale backup {}: {err}",
                backup.display()
            )));
        }
    }

    let had_existing = path_exists(old_bundle);
    if had_existing {
        tracing::debug!(from = %old_bundle.display(), to = %backup.display(), "backing up bundle");
        if let Err(err) = mover(SwapStep::Backup, old_bundle, &backup) {
            return Err(rollback(old_bundle, &backup, &mut mover, err, false));
        }
    }

    tracing::debug!(from = %new_bundle.display(), to = %old_bundle.display(), "moving new bundle in");
    if let Err(err) = mover(SwapStep::MoveIn, new_bundle, old_bundle) {
        return Err(rollback(old_bundle, &backup, &mut mover, err, had_existing));
    }

    if had_existing {
        if let Err(err) = remove_path_if_exists(&backup) {
            // The new bundle is already live; a leftover backup is purged next run.
            tracing::warn!(
                backup = %backup.display(),
                error = %err,
                "failed to remove backup after successful swap"
            );
        }
    }

    tracing::info!(bundle = %old_bundle.display(), "bundle replaced");
    Ok(())
}

fn rollback<Mover>(
    old_bundle: &Path,
    backup: &Path,
    mover: &mut Mover,
    err: anyhow::Error,
    discard_partial_target: bool,
) -> UpdateError
where
    Mover: FnMut(SwapStep, &Path, &Path) -> Result<()>,
{
    let reason = format!("{err:#}");
    tracing::warn!(bundle = %old_bundle.display(), error = %reason, "swap failed, rolling back");

    if !path_exists(backup) {
        return UpdateError::InstallFailure {
            target: old_bundle.to_path_buf(),
            reason,
        };
    }

    // Whatever a failed move-in left at the target is not a usable bundle.
    if discard_partial_target && path_exists(old_bundle) {
        if let Err(cleanup_err) = remove_path_if_exists(old_bundle) {
            return restore_failure(
                old_bundle,
                backup,
                format!("{reason}; failed removing partial bundle: {cleanup_err}"),
            );
        }
    }

    if path_exists(old_bundle) {
        // The old bundle never left its location, so the slot holds a duplicate.
        if let Err(cleanup_err) = remove_path_if_exists(backup) {
            tracing::warn!(backup = %backup.display(), error = %cleanup_err, "failed to remove backup");
        }
        return UpdateError::InstallFailure {
            target: old_bundle.to_path_buf(),
            reason,
        };
    }

    match mover(SwapStep::Restore, backup, old_bundle) {
        Ok(()) => {
            tracing::info!(bundle = %old_bundle.display(), "previous bundle restored");
            UpdateError::InstallFailure {
                target: old_bundle.to_path_buf(),
                reason,
            }
        }
        Err(restore_err) => restore_failure(
            old_bundle,
            backup,
            format!("{reason}; restore failed: {restore_err:#}"),
        ),
    }
}

fn restore_failure(old_bundle: &Path, backup: &Path, reason: String) -> UpdateError {
    tracing::error!(
        bundle = %old_bundle.display(),
        backup = %backup.display(),
        reason = %reason,
        "install location left inconsistent; previous bundle remains at backup path"
    );
    UpdateError::RestoreFailure {
        target: old_bundle.to_path_buf(),
        backup: backup.to_path_buf(),
        reason,
    }
}

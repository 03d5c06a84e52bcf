use std::fs;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

/// Removes a file, symlink or directory tree. Returns whether anything was removed.
pub fn remove_path_if_exists(path: &Path) -> io::Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    if metadata.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(true)
}

pub(crate) fn path_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Moves `src` to `dst` by rename, falling back to copy-then-remove when the
/// two paths live on different filesystems. A failed copy leaves no partial
/// `dst` behind.
pub fn move_path(src: &Path, dst: &Path) -> Result<()> {
    move_path_with_rename(src, dst, |from, to| fs::rename(from, to))
}

pub(crate) fn move_path_with_rename<Rename>(
    src: &Path,
    dst: &Path,
    mut rename: Rename,
) -> Result<()>
where
    Rename: FnMut(&Path, &Path) -> io::Result<()>,
{
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create install parent: {}", parent.display()))?;
    }

    let rename_err = match rename(src, dst) {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };
    if !path_exists(src) || path_exists(dst) {
        return Err(rename_err).with_context(|| {
            format!("failed to move {} to {}", src.display(), dst.display())
        });
    }

    tracing::debug!(
        src = %src.display(),
        dst = %dst.display(),
        error = %rename_err,
        "rename failed, copying instead"
    );
    if let Err(copy_err) = copy_path(src, dst) {
        if let Err(cleanup_err) = remove_path_if_exists(dst) {
            return Err(anyhow!(
                "failed to copy {} to {}: {copy_err:#}; additionally failed to remove partial copy: {cleanup_err}",
                src.display(),
                dst.display()
            ));
        }
        return Err(copy_err);
    }

    remove_path_if_exists(src)
        .with_context(|| format!("failed to cleanup staged source: {}", src.display()))?;
    Ok(())
}

fn copy_path(src: &Path, dst: &Path) -> Result<()> {
    let metadata =
        fs::symlink_metadata(src).with_context(|| format!("failed to stat {}", src.display()))?;
    if metadata.is_dir() {
        return copy_dir_recursive(src, dst);
    }
    copy_entry(src, dst, &metadata)
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;
    for entry in fs::read_dir(src).with_context(|| format!("failed to read {}", src.display()))? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let metadata = fs::symlink_metadata(&src_path)
            .with_context(|| format!("failed to stat {}", src_path.display()))?;
        if metadata.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
            continue;
        }
        copy_entry(&src_path, &dst_path, &metadata)?;
    }

    let permissions = fs::metadata(src)
        .with_context(|| format!("failed to stat {}", src.display()))?
        .permissions();
    fs::set_permissions(dst, permissions)
        .with_context(|| format!("failed to set permissions on {}", dst.display()))?;
    Ok(())
}

fn copy_entry(src: &Path, dst: &Path, metadata: &fs::Metadata) -> Result<()> {
    #[cfg(unix)]
    if metadata.file_type().is_symlink() {
        let target =
            fs::read_link(src).with_context(|| format!("failed to read symlink {}", src.display()))?;
        std::os::unix::fs::symlink(&target, dst).with_context(|| {
            format!(
                "failed to create symlink {} -> {}",
                dst.display(),
                target.display()
            )
        })?;
        return Ok(());
    }
    #[cfg(not(unix))]
    let _ = metadata;

    fs::copy(src, dst)
        .with_context(|| format!("failed to copy {} to {}", src.display(), dst.display()))?;
    Ok(())
}

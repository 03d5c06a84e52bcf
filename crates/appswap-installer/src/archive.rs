use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use appswap_core::{ArchiveType, UpdateError};
use flate2::read::GzDecoder;
use zip::ZipArchive;

const MACOS_METADATA_DIR: &str = "__MACOSX";

/// Extracts the archive at `archive_path` into `extract_to` and returns the
/// single installable bundle inside it. Bundles are looked for at the top
/// level first, then exactly one directory deep.
pub fn locate_bundle(
    archive_path: &Path,
    extract_to: &Path,
    bundle_suffix: &str,
) -> std::result::Result<PathBuf, UpdateError> {
    let archive_type = detect_archive_type(archive_path, None).map_err(UpdateError::archive)?;
    extract_archive(archive_path, extract_to, archive_type).map_err(UpdateError::archive)?;
    find_bundle(extract_to, bundle_suffix)
}

/// Prefers the file's magic bytes over the hint derived from its url.
pub fn detect_archive_type(archive_path: &Path, hint: Option<ArchiveType>) -> Result<ArchiveType> {
    let mut header = [0_u8; 4];
    let mut file = File::open(archive_path)
        .with_context(|| format!("failed to open archive {}", archive_path.display()))?;
    let read = read_prefix(&mut file, &mut header)
        .with_context(|| format!("failed to read archive {}", archive_path.display()))?;

    if let Some(sniffed) = ArchiveType::sniff(&header[..read]) {
        return Ok(sniffed);
    }
    hint.ok_or_else(|| {
        anyhow!(
            "unrecognized archive format: {} (expected zip or tar.gz)",
            archive_path.display()
        )
    })
}

fn read_prefix(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            read => filled += read,
        }
    }
    Ok(filled)
}

pub fn extract_archive(archive_path: &Path, dst: &Path, archive_type: ArchiveType) -> Result<()> {
    fs::create_dir_all(dst)
        .with_context(|| format!("failed to create extraction dir {}", dst.display()))?;
    tracing::debug!(
        archive = %archive_path.display(),
        dst = %dst.display(),
        kind = archive_type.as_str(),
        "extracting archive"
    );
    match archive_type {
        ArchiveType::Zip => extract_zip(archive_path, dst),
        ArchiveType::TarGz => extract_tar_gz(archive_path, dst),
    }
}

fn extract_tar_gz(archive_path: &Path, dst: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("failed to open archive {}", archive_path.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    archive
        .unpack(dst)
        .with_context(|| format!("failed to extract tar archive {}", archive_path.display()))
}

fn extract_zip(archive_path: &Path, dst: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("failed to open archive {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("failed to read zip archive {}", archive_path.display()))?;

    let root = fs::canonicalize(dst)
        .with_context(|| format!("failed to resolve extraction dir {}", dst.display()))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read zip entry #{index}"))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(anyhow!(
                "zip entry escapes extraction root: {}",
                entry.name()
            ));
        };
        let out_path = root.join(&relative);

        if entry.is_dir() {
            ensure_within_root(&root, &out_path, entry.name())?;
            fs::create_dir_all(&out_path)
                .with_context(|| format!("failed to create {}", out_path.display()))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            ensure_within_root(&root, parent, entry.name())?;
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        if fs::symlink_metadata(&out_path)
            .is_ok_and(|metadata| metadata.file_type().is_symlink())
        {
            return Err(anyhow!(
                "zip entry would write through an existing symlink: {}",
                entry.name()
            ));
        }

        #[cfg(unix)]
        if entry.unix_mode().is_some_and(is_symlink_mode) {
            let mut target = String::new();
            entry
                .read_to_string(&mut target)
                .with_context(|| format!("failed to read symlink entry {}", entry.name()))?;
            if !symlink_target_is_enclosed(&relative, Path::new(&target)) {
                return Err(anyhow!(
                    "zip symlink escapes extraction root: {} -> {target}",
                    entry.name()
                ));
            }
            std::os::unix::fs::symlink(&target, &out_path).with_context(|| {
                format!("failed to create symlink {} -> {target}", out_path.display())
            })?;
            continue;
        }

        let mut out_file = File::create(&out_path)
            .with_context(|| format!("failed to create {}", out_path.display()))?;
        io::copy(&mut entry, &mut out_file)
            .with_context(|| format!("failed to write {}", out_path.display()))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o7777))
                .with_context(|| format!("failed to set permissions on {}", out_path.display()))?;
        }
    }

    Ok(())
}

/// Fails when the deepest existing ancestor of `path` resolves outside `root`,
/// which happens once an earlier entry planted a symlink on the way.
fn ensure_within_root(root: &Path, path: &Path, entry_name: &str) -> Result<()> {
    let mut existing = path;
    while fs::symlink_metadata(existing).is_err() {
        match existing.parent() {
            Some(parent) => existing = parent,
            None => break,
        }
    }
    let resolved = fs::canonicalize(existing)
        .with_context(|| format!("failed to resolve path for zip entry {entry_name}"))?;
    if !resolved.starts_with(root) {
        return Err(anyhow!(
            "zip entry escapes extraction root through a symlink: {entry_name}"
        ));
    }
    Ok(())
}

/// Lexical check that a link stored at `entry` never points above the root.
#[cfg(unix)]
fn symlink_target_is_enclosed(entry: &Path, target: &Path) -> bool {
    use std::path::Component;

    let mut depth = entry
        .parent()
        .map(|parent| parent.components().count())
        .unwrap_or(0);
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

#[cfg(unix)]
fn is_symlink_mode(mode: u32) -> bool {
    mode & 0o170000 == 0o120000
}

/// Searches `root` and then each of its immediate subdirectories for an
/// entry ending in `.{bundle_suffix}`. Deeper nesting is not searched.
pub fn find_bundle(root: &Path, bundle_suffix: &str) -> std::result::Result<PathBuf, UpdateError> {
    let top_level = sorted_entries(root).map_err(UpdateError::archive)?;
    if let Some(bundle) = top_level
        .iter()
        .find(|path| is_bundle(path, bundle_suffix))
    {
        return Ok(bundle.clone());
    }

    for dir in top_level.iter().filter(|path| path.is_dir()) {
        if dir.file_name().is_some_and(|name| name == MACOS_METADATA_DIR) {
            continue;
        }
        let nested = sorted_entries(dir).map_err(UpdateError::archive)?;
        if let Some(bundle) = nested.into_iter().find(|path| is_bundle(path, bundle_suffix)) {
            return Ok(bundle);
        }
    }

    Err(UpdateError::ArchiveFormat(format!(
        "no .{bundle_suffix} bundle found in {} or its immediate subdirectories",
        root.display()
    )))
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        entries.push(entry?.path());
    }
    entries.sort();
    Ok(entries)
}

fn is_bundle(path: &Path, bundle_suffix: &str) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    // AppleDouble resource-fork companions (`._Name.app`) are not bundles.
    if name.starts_with("._") {
        return false;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(bundle_suffix))
}
